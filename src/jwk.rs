use openssl::sha::sha256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{base64::encode_url, canonical::to_canonical, key_pair::KeyPair};

/// JWK 產生與序列化時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum JwkError {
    /// 金鑰無法轉換為 RSA 公開參數。
    #[error("Failed to convert key: {0}")]
    KeyConversionError(String),
    /// 序列化錯誤。
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// JSON Web Key，目前僅支援 RSA。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kty")]
pub enum Jwk {
    /// RSA 格式的 JWK。
    #[serde(rename = "RSA")]
    Rsa(RsaJwk),
}

/// RSA 公鑰的 JWK 參數，`n` 與 `e` 皆為去除前導零位元組後的大端序 base64url。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaJwk {
    pub n: String,
    pub e: String,
}

impl Jwk {
    /// 由金鑰對的公鑰建立 JWK。
    pub fn from_key_pair(key_pair: &KeyPair) -> Result<Self, JwkError> {
        let rsa = key_pair
            .pub_key
            .rsa()
            .map_err(|e| JwkError::KeyConversionError(e.to_string()))?;
        Ok(Self::from_rsa_components(&rsa.n().to_vec(), &rsa.e().to_vec()))
    }

    /// 由大端序的模數與指數建立 JWK。
    ///
    /// 某些大數實作會為正數補上 `0x00` 符號位元組，這裡一律去除。
    pub fn from_rsa_components(modulus: &[u8], exponent: &[u8]) -> Self {
        Jwk::Rsa(RsaJwk {
            n: encode_url(strip_leading_zeros(modulus)),
            e: encode_url(strip_leading_zeros(exponent)),
        })
    }

    /// 正規化 JSON 表示（`{"e":..,"kty":"RSA","n":..}`）。
    pub fn to_canonical_json(&self) -> Result<String, JwkError> {
        Ok(to_canonical(self)?)
    }

    /// RFC 7638 thumbprint：`base64url(SHA-256(canonical JWK))`。
    pub fn thumbprint(&self) -> Result<String, JwkError> {
        let canonical = self.to_canonical_json()?;
        Ok(encode_url(sha256(canonical.as_bytes())))
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(bytes.len().saturating_sub(1));
    &bytes[first..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base64::decode_url;

    // RFC 7638 §3.1
    const RFC_N: &str = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";
    const RFC_THUMBPRINT: &str = "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs";

    #[test]
    fn test_rfc7638_thumbprint() {
        let n = decode_url(RFC_N).unwrap();
        let jwk = Jwk::from_rsa_components(&n, &[0x01, 0x00, 0x01]);
        assert_eq!(jwk.thumbprint().unwrap(), RFC_THUMBPRINT);
    }

    #[test]
    fn test_sign_byte_is_stripped() {
        let n = decode_url(RFC_N).unwrap();
        let mut padded = vec![0x00];
        padded.extend_from_slice(&n);
        let jwk = Jwk::from_rsa_components(&padded, &[0x00, 0x01, 0x00, 0x01]);
        let Jwk::Rsa(rsa) = &jwk;
        assert_eq!(rsa.n, RFC_N);
        assert_eq!(rsa.e, "AQAB");
        assert_eq!(jwk.thumbprint().unwrap(), RFC_THUMBPRINT);
    }

    #[test]
    fn test_canonical_member_order() {
        let jwk = Jwk::from_rsa_components(&[0x0A], &[0x01, 0x00, 0x01]);
        assert_eq!(
            jwk.to_canonical_json().unwrap(),
            r#"{"e":"AQAB","kty":"RSA","n":"Cg"}"#
        );
    }

    #[test]
    fn test_thumbprint_depends_on_key() {
        let a = KeyPair::generate(2048).unwrap();
        let b = KeyPair::generate(2048).unwrap();
        assert_ne!(a.thumbprint().unwrap(), b.thumbprint().unwrap());
        assert_eq!(a.thumbprint().unwrap(), a.thumbprint().unwrap());
    }
}
