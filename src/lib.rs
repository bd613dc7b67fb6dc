//! # ACME v2 憑證申請函式庫
//!
//! 本庫實作 ACME（RFC 8555）客戶端，向 Let's Encrypt、ZeroSSL 或任何相容的 CA
//! 申請單一網域的 TLS 憑證。挑戰內容（HTTP 檔案或 DNS TXT 記錄）的公開交由呼叫端處理，
//! 本庫只負責協定本身。
//!
//! ## 模組
//!
//! - **協定基礎**：[`canonical`]、[`base64`]、[`jwk`]、[`jws`]、[`protection`]、[`signature`]
//!   負責正規化 JSON、JWK thumbprint 與 RS256 簽章。
//! - **連線**：[`transport`]、[`directory`]、[`nonce`]、[`session`] 管理單一流程的目錄、
//!   nonce 與已簽署請求（包含 badNonce 重試一次）。
//! - **流程步驟**：[`account`]、[`order`]、[`challenge`]、[`csr`]。
//! - **對外介面**：[`flow`] 提供兩階段流程，[`config`] 提供設定，
//!   [`certificate`] 是最終輸出。
//!
//! ## 使用方式
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use acme_issue::{
//!     challenge::{ChallengeMaterial, ChallengeType},
//!     config::ClientConfig,
//!     flow::CertificateFlow,
//!     provider::CaProvider,
//!     storage::FileStorage,
//!     transport::ReqwestTransport,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .provider(CaProvider::LetsEncryptStaging)
//!         .contact_email("admin@example.com")
//!         .build()?;
//!     let storage = Arc::new(FileStorage::open(config.resolved_storage_path())?);
//!     let flow = CertificateFlow::new(config, storage);
//!
//!     // 1. 建立訂單並取得挑戰內容
//!     let pending = flow.begin(
//!         Box::new(ReqwestTransport::new()?),
//!         "example.com",
//!         ChallengeType::Http01,
//!     )?;
//!     if let ChallengeMaterial::Http01(http) = pending.material() {
//!         println!("serve {} at {}", http.key_authorization, http.path());
//!     }
//!
//!     // 2. 公開後完成申請
//!     let bundle = pending.complete()?;
//!     println!("{}", bundle.certificate_pem);
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod base64;
pub mod canonical;
pub mod certificate;
pub mod challenge;
pub mod config;
pub mod csr;
pub mod directory;
pub mod domain;
pub mod error;
pub mod flow;
pub mod jwk;
pub mod jws;
pub mod key_pair;
pub mod nonce;
pub mod order;
pub mod payload;
pub mod problem;
pub mod protection;
pub mod provider;
pub mod session;
pub mod signature;
pub mod storage;
pub mod transport;

pub use certificate::CertificateBundle;
pub use challenge::{ChallengeMaterial, ChallengeType};
pub use config::{ClientConfig, PollPolicy};
pub use error::{AcmeError, Result};
pub use flow::{CertificateFlow, PendingValidation};
pub use provider::CaProvider;
