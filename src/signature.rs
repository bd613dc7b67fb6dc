use openssl::{
    hash::MessageDigest,
    pkey::{HasPublic, PKeyRef},
    sign::{Signer, Verifier},
};
use thiserror::Error;

use crate::key_pair::KeyPair;

/// 簽名操作可能遇到的錯誤。
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Signing error: {0}")]
    SigningError(String),
    #[error("Verification error: {0}")]
    VerificationError(String),
}

/// 以 RSASSA-PKCS1-v1_5 與 SHA-256（RS256）簽署資料，回傳原始簽名位元組。
pub fn sign_rs256(data: &[u8], key_pair: &KeyPair) -> Result<Vec<u8>, SignatureError> {
    let mut signer = Signer::new(MessageDigest::sha256(), &key_pair.pri_key)
        .map_err(|e| SignatureError::SigningError(e.to_string()))?;
    signer
        .update(data)
        .map_err(|e| SignatureError::SigningError(e.to_string()))?;
    signer
        .sign_to_vec()
        .map_err(|e| SignatureError::SigningError(e.to_string()))
}

/// 驗證 RS256 簽名。
pub fn verify_rs256<T: HasPublic>(
    data: &[u8],
    signature: &[u8],
    public_key: &PKeyRef<T>,
) -> Result<bool, SignatureError> {
    let mut verifier = Verifier::new(MessageDigest::sha256(), public_key)
        .map_err(|e| SignatureError::VerificationError(e.to_string()))?;
    verifier
        .update(data)
        .map_err(|e| SignatureError::VerificationError(e.to_string()))?;
    verifier
        .verify(signature)
        .map_err(|e| SignatureError::VerificationError(e.to_string()))
}
