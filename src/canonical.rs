//! 正規化 JSON 編碼。
//!
//! 簽名與 JWK thumbprint 涵蓋的是序列化後的位元組，而非抽象的 JSON 結構，
//! 因此所有送入簽名或雜湊的 JSON 都必須經由此模組產生：
//! 物件的鍵以字典序遞迴排列，陣列保持原有順序，輸出為不含空白的緊湊格式。

use serde::Serialize;
use serde_json::{Map, Value};

/// 遞迴地重建一份鍵已排序的 JSON 值。
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            let mut sorted = Map::with_capacity(entries.len());
            for (key, value) in entries {
                sorted.insert(key.clone(), canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// 將 JSON 值編碼為正規化字串。對任何 `Value` 皆不會失敗。
pub fn to_canonical_string(value: &Value) -> String {
    canonicalize(value).to_string()
}

/// 將可序列化的型別編碼為正規化字串。
///
/// 只有在型別本身無法表示為 JSON（例如鍵不是字串的 map）時才會失敗。
pub fn to_canonical<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    Ok(to_canonical_string(&serde_json::to_value(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_recursively() {
        let value = json!({
            "url": "https://ca/new-order",
            "alg": "RS256",
            "jwk": {"n": "abc", "kty": "RSA", "e": "AQAB"},
        });
        assert_eq!(
            to_canonical_string(&value),
            r#"{"alg":"RS256","jwk":{"e":"AQAB","kty":"RSA","n":"abc"},"url":"https://ca/new-order"}"#
        );
    }

    #[test]
    fn test_source_key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":[3,2,1],"x":null}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":null,"y":[3,2,1]},"b":1}"#).unwrap();
        assert_eq!(to_canonical_string(&a), to_canonical_string(&b));
    }

    #[test]
    fn test_arrays_keep_element_order() {
        let value = json!({"identifiers": [
            {"value": "b.example", "type": "dns"},
            {"value": "a.example", "type": "dns"},
        ]});
        assert_eq!(
            to_canonical_string(&value),
            r#"{"identifiers":[{"type":"dns","value":"b.example"},{"type":"dns","value":"a.example"}]}"#
        );
    }

    #[test]
    fn test_idempotent() {
        let value = json!({"termsOfServiceAgreed": true, "contact": ["mailto:a@b.c"], "z": {"ü": "\"q\"", "a": 1.5}});
        let first = to_canonical_string(&value);
        let reparsed: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(to_canonical_string(&reparsed), first);
    }

    #[test]
    fn test_empty_object_and_scalars() {
        assert_eq!(to_canonical_string(&json!({})), "{}");
        assert_eq!(to_canonical_string(&json!("text")), r#""text""#);
        assert_eq!(to_canonical_string(&json!(42)), "42");
    }

    #[test]
    fn test_serializable_struct() {
        #[derive(Serialize)]
        struct Payload {
            zeta: u8,
            alpha: &'static str,
        }
        let encoded = to_canonical(&Payload { zeta: 1, alpha: "x" }).unwrap();
        assert_eq!(encoded, r#"{"alpha":"x","zeta":1}"#);
    }
}
