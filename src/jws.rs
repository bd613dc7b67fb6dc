//! JSON Web Signature (JWS) 的建立與序列化。
//!
//! 每個經過驗證的 ACME 請求都以 flattened JSON 序列化的 JWS 送出：
//! `{"protected": .., "payload": .., "signature": ..}`，三者皆為 base64url 字串。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    base64::{decode_url, encode_url, DecodeError},
    jwk::JwkError,
    key_pair::KeyPair,
    payload::Payload,
    protection::ProtectedHeader,
    signature::{sign_rs256, SignatureError},
};

/// 與 JWS 相關的錯誤。
#[derive(Error, Debug)]
pub enum JwsError {
    /// 沒有可用的 nonce。
    #[error("No nonce available for signing")]
    MissingNonce,
    #[error("JWK error: {0}")]
    Jwk(#[from] JwkError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),
    #[error("Base64 decode error: {0}")]
    Decode(#[from] DecodeError),
}

type Result<T> = std::result::Result<T, JwsError>;

/// 已簽署的 JWS 信封。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Jws {
    protected: String,
    payload: String,
    signature: String,
}

impl Jws {
    /// base64url 編碼的受保護標頭。
    pub fn protected(&self) -> &str {
        &self.protected
    }

    /// base64url 編碼的載荷；POST-as-GET 時為空字串。
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// base64url 編碼的簽名。
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// 簽名所涵蓋的輸入：`protected + "." + payload`。
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.protected, self.payload)
    }

    /// 解碼受保護標頭，主要用於檢查與測試。
    pub fn decode_protected(&self) -> Result<ProtectedHeader> {
        let bytes = decode_url(&self.protected)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// 序列化為請求本文。
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// 簽署一個 ACME 請求。
///
/// 標頭與載荷分別經正規化 JSON 編碼後再以 base64url 編碼，
/// 簽名對象為 `SHA-256(protected.payload)`，簽名結果的原始位元組直接以 base64url 編碼。
///
/// # 參數
///
/// - `url`: 請求目標，會寫入標頭的 `url`。
/// - `payload`: 載荷；[`Payload::PostAsGet`] 代表空本文。
/// - `key_pair`: 帳戶金鑰。
/// - `nonce`: 目前持有的 nonce，`None` 時回傳 [`JwsError::MissingNonce`]。
/// - `account_url`: 已知時以 `kid` 取代 `jwk`。
pub fn sign(
    url: &str,
    payload: &Payload,
    key_pair: &KeyPair,
    nonce: Option<&str>,
    account_url: Option<&str>,
) -> Result<Jws> {
    let nonce = nonce.ok_or(JwsError::MissingNonce)?;
    let header = ProtectedHeader::new(nonce, url, key_pair, account_url)?;

    let protected = encode_url(header.to_canonical_json()?.as_bytes());
    let payload = payload.encode();
    let signing_input = format!("{}.{}", protected, payload);
    let signature = encode_url(sign_rs256(signing_input.as_bytes(), key_pair)?);

    Ok(Jws {
        protected,
        payload,
        signature,
    })
}
