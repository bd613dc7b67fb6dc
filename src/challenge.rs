//! 授權、挑戰模型，以及挑戰內容（key authorization、DNS TXT 值）的產生。

use std::{fmt, str::FromStr};

use openssl::sha::sha256;
use serde::{Deserialize, Serialize};

use crate::{
    base64::encode_url,
    error::{AcmeError, Result},
    key_pair::KeyPair,
    payload::Identifier,
    problem::Problem,
};

/// 外部協作者選擇的驗證方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeType {
    #[serde(rename = "http-01")]
    Http01,
    #[serde(rename = "dns-01")]
    Dns01,
}

impl ChallengeType {
    /// ACME 協定中的挑戰類型名稱。
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http01 => "http-01",
            Self::Dns01 => "dns-01",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeType {
    type Err = AcmeError;

    /// 除協定名稱外也接受 `webserver`/`http` 與 `dns`。
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http-01" | "http" | "webserver" => Ok(Self::Http01),
            "dns-01" | "dns" => Ok(Self::Dns01),
            other => Err(AcmeError::UnsupportedChallengeType(other.to_string())),
        }
    }
}

/// 挑戰狀態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

/// 授權狀態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

/// CA 發出的單一挑戰。
///
/// `token` 每張新訂單都不同，不可跨申請快取。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// 原始類型字串；CA 可能提供本客戶端不支援的類型（例如 `tls-alpn-01`）。
    #[serde(rename = "type")]
    pub type_: String,
    pub url: String,
    /// 缺少時為空字串，產生內容前由 [`Challenge::checked_token`] 拒絕。
    #[serde(default)]
    pub token: String,
    pub status: ChallengeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Problem>,
}

impl Challenge {
    pub fn is_type(&self, challenge_type: ChallengeType) -> bool {
        self.type_ == challenge_type.as_str()
    }

    /// 回傳可用於 key authorization 的 token。
    ///
    /// # 錯誤
    ///
    /// token 為空或含有 base64url 以外的字元時回傳 [`AcmeError::InvalidChallengeToken`]。
    pub fn checked_token(&self) -> Result<&str> {
        let valid = !self.token.is_empty()
            && self
                .token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(&self.token)
        } else {
            Err(AcmeError::InvalidChallengeToken {
                url: self.url.clone(),
                token: self.token.clone(),
            })
        }
    }

    /// 失敗原因，供錯誤訊息使用。
    pub fn error_detail(&self) -> String {
        self.error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// 單一識別項的授權。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub identifier: Identifier,
    pub status: AuthorizationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    pub challenges: Vec<Challenge>,
    #[serde(default)]
    pub wildcard: bool,
}

/// 依外部協作者宣告的驗證方式挑選挑戰。
///
/// # 錯誤
///
/// 授權中沒有該類型的挑戰時回傳 [`AcmeError::UnsupportedChallengeType`]。
pub fn select_challenge(
    authorization: &Authorization,
    method: ChallengeType,
) -> Result<&Challenge> {
    authorization
        .challenges
        .iter()
        .find(|c| c.is_type(method))
        .ok_or_else(|| AcmeError::UnsupportedChallengeType(method.as_str().to_string()))
}

/// HTTP-01 要公開的內容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Http01Material {
    pub token: String,
    /// 必須逐位元組作為回應本文。
    pub key_authorization: String,
}

impl Http01Material {
    /// 網站伺服器需提供此內容的路徑。
    pub fn path(&self) -> String {
        format!("/.well-known/acme-challenge/{}", self.token)
    }
}

/// DNS-01 要公開的 TXT 記錄。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dns01Material {
    /// 相對於網域的主機名稱，固定為 `_acme-challenge`。
    pub host: String,
    pub value: String,
}

impl Dns01Material {
    pub const HOST: &'static str = "_acme-challenge";

    /// 完整記錄名稱；萬用字元網域的記錄放在其基底網域下。
    pub fn record_name(&self, domain: &str) -> String {
        let base = domain.strip_prefix("*.").unwrap_or(domain);
        format!("{}.{}", self.host, base)
    }
}

/// 交給外部協作者公開的挑戰內容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ChallengeMaterial {
    #[serde(rename = "http-01")]
    Http01(Http01Material),
    #[serde(rename = "dns-01")]
    Dns01(Dns01Material),
}

/// `token + "." + thumbprint(帳戶公鑰)`。
pub fn key_authorization(token: &str, account_key: &KeyPair) -> Result<String> {
    Ok(format!("{}.{}", token, account_key.thumbprint()?))
}

/// HTTP-01 內容：token 與 key authorization。
pub fn http01_material(challenge: &Challenge, account_key: &KeyPair) -> Result<Http01Material> {
    let token = challenge.checked_token()?;
    Ok(Http01Material {
        token: token.to_string(),
        key_authorization: key_authorization(token, account_key)?,
    })
}

/// DNS-01 內容：`base64url(SHA-256(keyAuthorization))`。
///
/// 注意這是 HTTP-01 內容的雜湊值，而不是同一個字串。
pub fn dns01_material(challenge: &Challenge, account_key: &KeyPair) -> Result<Dns01Material> {
    let key_authorization = key_authorization(challenge.checked_token()?, account_key)?;
    Ok(Dns01Material {
        host: Dns01Material::HOST.to_string(),
        value: encode_url(sha256(key_authorization.as_bytes())),
    })
}

/// 依挑戰類型產生對應的內容。
pub fn material_for(
    challenge: &Challenge,
    method: ChallengeType,
    account_key: &KeyPair,
) -> Result<ChallengeMaterial> {
    match method {
        ChallengeType::Http01 => Ok(ChallengeMaterial::Http01(http01_material(
            challenge,
            account_key,
        )?)),
        ChallengeType::Dns01 => Ok(ChallengeMaterial::Dns01(dns01_material(
            challenge,
            account_key,
        )?)),
    }
}
