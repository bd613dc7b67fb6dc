use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown CA provider: {0}")]
pub struct UnknownProvider(pub String);

/// 憑證頒發機構的選擇。
///
/// 內建的提供者以固定識別字表示，`Custom` 則直接使用目錄 URL，
/// 例如測試用的 Pebble。識別字同時作為帳戶儲存的命名空間。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CaProvider {
    #[default]
    LetsEncrypt,
    LetsEncryptStaging,
    ZeroSsl,
    Custom(String),
}

impl CaProvider {
    /// 此提供者的 ACME 目錄 URL。
    pub fn directory_url(&self) -> &str {
        match self {
            Self::LetsEncrypt => "https://acme-v02.api.letsencrypt.org/directory",
            Self::LetsEncryptStaging => "https://acme-staging-v02.api.letsencrypt.org/directory",
            Self::ZeroSsl => "https://acme.zerossl.com/v2/DV90/directory",
            Self::Custom(url) => url,
        }
    }

    /// 識別字；自訂提供者回傳其目錄 URL。
    pub fn as_str(&self) -> &str {
        match self {
            Self::LetsEncrypt => "letsencrypt",
            Self::LetsEncryptStaging => "letsencrypt-staging",
            Self::ZeroSsl => "zerossl",
            Self::Custom(url) => url,
        }
    }

    /// 可安全作為儲存路徑片段的名稱。
    pub fn storage_namespace(&self) -> String {
        match self {
            Self::Custom(url) => {
                let cleaned: String = url
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
                    .collect();
                format!("custom_{}", cleaned.trim_matches('_'))
            }
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for CaProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaProvider {
    type Err = UnknownProvider;

    /// 接受內建識別字（不分大小寫）或 `http(s)://` 開頭的目錄 URL。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "letsencrypt" | "le" => Ok(Self::LetsEncrypt),
            "letsencrypt-staging" | "le-staging" => Ok(Self::LetsEncryptStaging),
            "zerossl" => Ok(Self::ZeroSsl),
            lower if lower.starts_with("https://") || lower.starts_with("http://") => {
                Ok(Self::Custom(s.to_string()))
            }
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

impl TryFrom<String> for CaProvider {
    type Error = UnknownProvider;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CaProvider> for String {
    fn from(value: CaProvider) -> Self {
        value.as_str().to_string()
    }
}
