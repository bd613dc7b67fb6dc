use chrono::{DateTime, Utc};
use openssl::x509::X509;
use serde::{Deserialize, Serialize};

use crate::provider::CaProvider;

/// 憑證申請完成後交給呼叫端的結果。
///
/// `certificate_pem` 是 CA 回傳的憑證鏈原文；`private_key_pem` 是本次申請新產生的網域私鑰。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateBundle {
    #[serde(rename = "certificatePEM")]
    pub certificate_pem: String,
    #[serde(rename = "privateKeyPEM")]
    pub private_key_pem: String,
    pub domain: String,
    pub provider: CaProvider,
    pub issued_at: DateTime<Utc>,
}

impl CertificateBundle {
    pub fn new(
        certificate_pem: String,
        private_key_pem: String,
        domain: &str,
        provider: CaProvider,
    ) -> Self {
        CertificateBundle {
            certificate_pem,
            private_key_pem,
            domain: domain.to_string(),
            provider,
            issued_at: Utc::now(),
        }
    }

    /// 鏈中第一張（葉）憑證的到期時間；無法解析時回傳 `None`。
    ///
    /// 僅供顯示，不影響申請流程。
    pub fn not_after(&self) -> Option<String> {
        let leaf = X509::from_pem(self.certificate_pem.as_bytes()).ok()?;
        Some(leaf.not_after().to_string())
    }
}
