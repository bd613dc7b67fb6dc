use serde::{Deserialize, Serialize};

use crate::{
    canonical::to_canonical,
    jwk::{Jwk, JwkError},
    key_pair::KeyPair,
};

/// JWS 受保護標頭。
///
/// 帳戶 URL 已知時以 `kid` 識別帳戶，否則內嵌帳戶公鑰的 `jwk`；兩者不會同時出現。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    /// 簽章演算法，固定為 `RS256`。
    pub alg: String,
    /// 本次請求消耗的 nonce。
    pub nonce: String,
    /// 必須與 HTTP 請求目標完全相同。
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Jwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl ProtectedHeader {
    pub const ALG: &'static str = "RS256";

    /// 建立標頭。
    ///
    /// # 參數
    ///
    /// - `nonce`: 目前持有的 nonce。
    /// - `url`: 請求目標 URL。
    /// - `key_pair`: 帳戶金鑰，僅在 `account_url` 為 `None` 時用於產生 `jwk`。
    /// - `account_url`: 已註冊帳戶的 URL。
    pub fn new(
        nonce: &str,
        url: &str,
        key_pair: &KeyPair,
        account_url: Option<&str>,
    ) -> Result<Self, JwkError> {
        let (jwk, kid) = match account_url {
            Some(kid) => (None, Some(kid.to_owned())),
            None => (Some(Jwk::from_key_pair(key_pair)?), None),
        };

        Ok(Self {
            alg: Self::ALG.to_owned(),
            nonce: nonce.to_owned(),
            url: url.to_owned(),
            jwk,
            kid,
        })
    }

    /// 正規化 JSON 表示。
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        to_canonical(self)
    }
}
