use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{base64::encode_url, canonical::to_canonical_string};

/// 載荷建立或驗證失敗時的錯誤。
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Invalid payload: {0}")]
    Invalid(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, PayloadError>;

/// JWS 的載荷。
///
/// `PostAsGet` 代表空字串載荷，也就是 ACME 的 POST-as-GET；
/// 它與 `{}` 不同，後者是觸發挑戰時送出的空物件。
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    PostAsGet,
}

impl Payload {
    /// 序列化後送入簽名的位元組（正規化 JSON 的 UTF-8，或空字串）。
    pub fn to_canonical_string(&self) -> String {
        match self {
            Payload::Json(value) => to_canonical_string(value),
            Payload::PostAsGet => String::new(),
        }
    }

    /// `base64url(canonical(payload))`；POST-as-GET 時為空字串。
    pub fn encode(&self) -> String {
        encode_url(self.to_canonical_string().as_bytes())
    }
}

/// 所有 ACME 請求載荷的共通行為。
pub trait PayloadT: Serialize {
    /// 檢查載荷內容是否合理，預設不做任何檢查。
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// 驗證後轉換為可簽署的 [`Payload`]。
    fn to_payload(&self) -> Result<Payload> {
        self.validate()?;
        Ok(Payload::Json(serde_json::to_value(self)?))
    }
}

/// newAccount 載荷。
#[derive(Debug, Serialize, Deserialize)]
pub struct NewAccountPayload {
    #[serde(rename = "termsOfServiceAgreed")]
    pub terms_of_service_agreed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Vec<String>>,
}

impl NewAccountPayload {
    /// 建立同意服務條款的載荷，若提供電子郵件則補上 `mailto:` 前綴作為聯絡方式。
    pub fn new(email: Option<&str>) -> Self {
        let contact = email
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(|email| {
                if email.starts_with("mailto:") {
                    vec![email.to_string()]
                } else {
                    vec![format!("mailto:{}", email)]
                }
            });

        NewAccountPayload {
            terms_of_service_agreed: true,
            contact,
        }
    }
}

impl PayloadT for NewAccountPayload {
    fn validate(&self) -> Result<()> {
        if !self.terms_of_service_agreed {
            return Err(PayloadError::Invalid(
                "Terms of service must be agreed".into(),
            ));
        }
        Ok(())
    }
}

/// 憑證涵蓋的識別項。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: String,
}

impl Identifier {
    pub fn dns(value: &str) -> Self {
        Identifier {
            type_: "dns".to_string(),
            value: value.to_string(),
        }
    }
}

/// newOrder 載荷。
#[derive(Debug, Serialize, Deserialize)]
pub struct NewOrderPayload {
    pub identifiers: Vec<Identifier>,
}

impl NewOrderPayload {
    /// 為單一網域建立訂單載荷。
    pub fn new(domain: &str) -> Self {
        NewOrderPayload {
            identifiers: vec![Identifier::dns(domain)],
        }
    }
}

impl PayloadT for NewOrderPayload {
    fn validate(&self) -> Result<()> {
        if self.identifiers.is_empty() {
            return Err(PayloadError::Invalid(
                "At least one identifier is required".into(),
            ));
        }
        if self.identifiers.iter().any(|id| id.value.is_empty()) {
            return Err(PayloadError::Invalid(
                "Identifier value cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// 觸發挑戰驗證的空物件 `{}`。
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ChallengeTriggerPayload {}

impl PayloadT for ChallengeTriggerPayload {}

/// finalize 載荷，`csr` 為 DER 編碼 CSR 的 base64url。
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalizeOrderPayload {
    pub csr: String,
}

impl FinalizeOrderPayload {
    pub fn new(csr_der: &[u8]) -> Self {
        FinalizeOrderPayload {
            csr: encode_url(csr_der),
        }
    }
}

impl PayloadT for FinalizeOrderPayload {}
