//! URL 安全且不含填充的 Base64 編解碼，供 JWS、JWK 與挑戰內容使用。

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;

/// Base64url 解碼失敗時的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid base64url input: {0}")]
    Invalid(String),
}

/// 將任意位元組編碼為 base64url 字串（無 `=` 填充）。
///
/// 文字必須先以 UTF-8 位元組傳入；二進位資料（例如簽名）直接傳入原始位元組，
/// 不可先轉成字串。
pub fn encode_url<T: AsRef<[u8]>>(input: T) -> String {
    URL_SAFE_NO_PAD.encode(input.as_ref())
}

/// 解碼 base64url 字串，容許輸入帶有結尾的 `=` 填充。
pub fn decode_url(input: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_NO_PAD
        .decode(input.trim_end_matches('='))
        .map_err(|e| DecodeError::Invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_url_safe(s: &str) {
        assert!(!s.contains('+'), "{s} contains '+'");
        assert!(!s.contains('/'), "{s} contains '/'");
        assert!(!s.contains('='), "{s} contains '='");
    }

    #[test]
    fn test_text_encoding() {
        assert_eq!(encode_url("Hello, World!"), "SGVsbG8sIFdvcmxkIQ");
        assert_eq!(encode_url("a"), "YQ");
        assert_eq!(encode_url("ab"), "YWI");
        assert_eq!(encode_url("abc"), "YWJj");
    }

    #[test]
    fn test_binary_data_is_url_safe() {
        let encoded = encode_url([0xFB, 0xFF, 0xBF, 0xFE]);
        assert_eq!(encoded, "-_-__g");
        assert_url_safe(&encoded);

        let all_bytes: Vec<u8> = (0..=255).collect();
        for len in 0..all_bytes.len() {
            assert_url_safe(&encode_url(&all_bytes[..len]));
        }
    }

    #[test]
    fn test_decode_accepts_padding() {
        assert_eq!(decode_url("SGVsbG8sIFdvcmxkIQ").unwrap(), b"Hello, World!");
        assert_eq!(decode_url("SGVsbG8sIFdvcmxkIQ==").unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_decode_rejects_standard_alphabet() {
        assert!(matches!(decode_url("+/+/"), Err(DecodeError::Invalid(_))));
    }
}
