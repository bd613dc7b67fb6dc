use thiserror::Error;

use crate::{
    csr::CsrError, domain::DomainError, jws::JwsError, key_pair::KeyError, payload::PayloadError,
    problem::Problem, storage::StorageError, transport::TransportError,
};

/// ACME 流程中所有元件回報給呼叫端的錯誤。
///
/// 除了 badNonce 會自動重簽一次之外，其餘錯誤對目前這次憑證申請而言都是終結性的；
/// 要重來必須從建立訂單開始。
#[derive(Debug, Error)]
pub enum AcmeError {
    #[error("ACME directory unavailable: {0}")]
    DirectoryUnavailable(String),
    #[error("Unable to obtain a replay nonce: {0}")]
    NonceUnavailable(String),
    #[error("Signing error: {0}")]
    SigningError(#[from] JwsError),
    #[error("Account creation failed: {detail}")]
    AccountCreationFailed { detail: String },
    #[error("Unsupported challenge type: {0}")]
    UnsupportedChallengeType(String),
    #[error("Challenge at {url} carries an unusable token: {token:?}")]
    InvalidChallengeToken { url: String, token: String },
    #[error("Challenge validation failed: {detail}")]
    ChallengeValidationFailed { detail: String },
    #[error("Challenge was not validated after {attempts} attempts")]
    ChallengeTimeout { attempts: u32 },
    #[error("Order failed: {detail}")]
    OrderFailed { detail: String },
    #[error("Order was not completed after {attempts} attempts")]
    OrderTimeout { attempts: u32 },
    #[error("CSR signing error: {0}")]
    CsrSigningError(#[from] CsrError),
    #[error("Certificate download failed: {0}")]
    CertificateDownloadFailed(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("ACME request to {url} failed: {problem}")]
    Request { url: String, problem: Problem },
    #[error("Missing {header} header in response from {url}")]
    MissingHeader { header: &'static str, url: String },
    #[error("Invalid domain: {0}")]
    InvalidDomain(#[from] DomainError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AcmeError>;
