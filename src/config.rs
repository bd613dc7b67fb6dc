//! 客戶端設定。
//!
//! 可由 [`ClientConfigBuilder`] 在程式中建立，或從 TOML 檔載入：
//!
//! ```toml
//! provider = "letsencrypt-staging"
//! identity = "tenant-a"
//! contact_email = "admin@example.com"
//!
//! [challenge_poll]
//! max_attempts = 30
//! interval = 3
//! ```

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{key_pair::KeyPair, provider::CaProvider, storage::KeyUtils};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

type Result<T> = std::result::Result<T, ConfigError>;

/// 固定間隔的輪詢策略：每次查詢前先等待 `interval`，最多查詢 `max_attempts` 次。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub max_attempts: u32,
    /// 以秒為單位寫在設定檔中。
    #[serde(with = "duration_secs")]
    pub interval: Duration,
}

impl PollPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        PollPolicy {
            max_attempts,
            interval,
        }
    }

    /// 最長等待時間。
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_INTERVAL)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

/// 一次憑證申請所需的全部設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub provider: CaProvider,
    /// 帳戶儲存的命名空間，讓多個獨立使用者不共用同一個 CA 帳戶。
    pub identity: String,
    pub contact_email: Option<String>,
    pub account_key_bits: u32,
    pub domain_key_bits: u32,
    pub challenge_poll: PollPolicy,
    pub order_poll: PollPolicy,
    /// 帳戶資料的根目錄；未設定時使用 [`ClientConfig::default_storage_path`]。
    pub storage_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            provider: CaProvider::default(),
            identity: Self::DEFAULT_IDENTITY.to_string(),
            contact_email: None,
            account_key_bits: KeyPair::ACCOUNT_KEY_BITS,
            domain_key_bits: KeyPair::DOMAIN_KEY_BITS,
            challenge_poll: PollPolicy::default(),
            order_poll: PollPolicy::default(),
            storage_path: None,
        }
    }
}

impl ClientConfig {
    pub const DEFAULT_IDENTITY: &'static str = "default";

    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// 解析 TOML 字串；未出現的欄位使用預設值。
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// 從檔案載入設定。
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// 實際使用的儲存根目錄。
    pub fn resolved_storage_path(&self) -> PathBuf {
        self.storage_path
            .clone()
            .unwrap_or_else(Self::default_storage_path)
    }

    /// `$HOME/.local/share/<套件名稱>`；沒有 `HOME` 時改用 `/var/lib`。
    pub fn default_storage_path() -> PathBuf {
        let app_name = env!("CARGO_PKG_NAME");
        match env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".local/share").join(app_name),
            None => PathBuf::from("/var/lib").join(app_name),
        }
    }

    pub fn validate(&self) -> Result<()> {
        KeyUtils::validate_segment(&self.identity)
            .map_err(|_| ConfigError::Invalid(format!("invalid identity {:?}", self.identity)))?;
        for (name, bits) in [
            ("account_key_bits", self.account_key_bits),
            ("domain_key_bits", self.domain_key_bits),
        ] {
            if bits < KeyPair::ACCOUNT_KEY_BITS {
                return Err(ConfigError::Invalid(format!(
                    "{} must be at least {}, got {}",
                    name,
                    KeyPair::ACCOUNT_KEY_BITS,
                    bits
                )));
            }
        }
        for (name, policy) in [
            ("challenge_poll", &self.challenge_poll),
            ("order_poll", &self.order_poll),
        ] {
            if policy.max_attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{}.max_attempts must be at least 1",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// [`ClientConfig`] 的建構器。
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(mut self, provider: CaProvider) -> Self {
        self.config.provider = provider;
        self
    }

    pub fn identity(mut self, identity: &str) -> Self {
        self.config.identity = identity.to_string();
        self
    }

    pub fn contact_email(mut self, email: &str) -> Self {
        self.config.contact_email = Some(email.to_string());
        self
    }

    pub fn account_key_bits(mut self, bits: u32) -> Self {
        self.config.account_key_bits = bits;
        self
    }

    pub fn domain_key_bits(mut self, bits: u32) -> Self {
        self.config.domain_key_bits = bits;
        self
    }

    pub fn challenge_poll(mut self, policy: PollPolicy) -> Self {
        self.config.challenge_poll = policy;
        self
    }

    pub fn order_poll(mut self, policy: PollPolicy) -> Self {
        self.config.order_poll = policy;
        self
    }

    pub fn storage_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.storage_path = Some(path.into());
        self
    }

    /// # 錯誤
    ///
    /// 身分名稱、金鑰長度或輪詢次數不合法時回傳 [`ConfigError::Invalid`]。
    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
