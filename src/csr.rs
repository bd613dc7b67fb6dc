use openssl::{
    hash::MessageDigest,
    nid::Nid,
    stack::Stack,
    x509::{extension::SubjectAlternativeName, X509NameBuilder, X509Req},
};
use thiserror::Error;
use tracing::debug;

use crate::key_pair::KeyPair;

/// 建立 CSR 時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum CsrError {
    #[error("OpenSSL error: {0}")]
    OpensslError(#[from] openssl::error::ErrorStack),
    #[error("No SAN entries")]
    NoSanEntries,
    #[error("CSR signature does not verify against its own public key")]
    VerificationFailed,
}

type Result<T> = std::result::Result<T, CsrError>;

/// CN 欄位的長度上限（RFC 5280 ub-common-name）。
const MAX_COMMON_NAME_LEN: usize = 64;

/// 證書簽名請求建構器。
///
/// 主體的 CN 為第一個名稱，所有名稱都放進 SAN 擴展；以 SHA-256 簽署。
#[derive(Debug, Clone)]
pub struct CsrBuilder {
    names: Vec<String>,
}

impl CsrBuilder {
    /// 以主要網域建立。
    pub fn new(domain: &str) -> Self {
        CsrBuilder {
            names: vec![domain.to_string()],
        }
    }

    /// 加入額外的 DNS 名稱；重複的名稱會被忽略。
    pub fn san(mut self, dns_name: &str) -> Self {
        if !self.names.iter().any(|n| n == dns_name) {
            self.names.push(dns_name.to_string());
        }
        self
    }

    /// 以網域金鑰簽署並回傳 CSR。
    ///
    /// # 錯誤
    ///
    /// 沒有任何名稱時回傳 [`CsrError::NoSanEntries`]；
    /// 簽署後無法以自身公鑰驗證時回傳 [`CsrError::VerificationFailed`]。
    pub fn build(self, key_pair: &KeyPair) -> Result<X509Req> {
        let Some(common_name) = self.names.first().filter(|n| !n.is_empty()) else {
            return Err(CsrError::NoSanEntries);
        };

        let mut req_builder = X509Req::builder()?;
        req_builder.set_version(0)?;

        let mut subject = X509NameBuilder::new()?;
        // 過長的名稱只出現在 SAN
        if common_name.len() <= MAX_COMMON_NAME_LEN {
            subject.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
        }
        req_builder.set_subject_name(&subject.build())?;

        let mut san = SubjectAlternativeName::new();
        for name in &self.names {
            san.dns(name);
        }
        let san_extension = san.build(&req_builder.x509v3_context(None))?;
        let mut extensions = Stack::new()?;
        extensions.push(san_extension)?;
        req_builder.add_extensions(&extensions)?;

        req_builder.set_pubkey(&key_pair.pri_key)?;
        req_builder.sign(&key_pair.pri_key, MessageDigest::sha256())?;
        let req = req_builder.build();

        if !req.verify(&key_pair.pub_key)? {
            return Err(CsrError::VerificationFailed);
        }
        debug!(names = ?self.names, "CSR signed");
        Ok(req)
    }
}

/// 為單一網域產生 DER 編碼的 CSR，即 finalize 時送出的內容。
pub fn generate_csr(domain: &str, key_pair: &KeyPair) -> Result<Vec<u8>> {
    Ok(CsrBuilder::new(domain).build(key_pair)?.to_der()?)
}
