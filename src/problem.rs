use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transport::HttpResponse;

pub const BAD_NONCE: &str = "urn:ietf:params:acme:error:badNonce";

/// RFC 7807 `application/problem+json` 錯誤文件。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl Problem {
    /// 從非 2xx 回應取出錯誤資訊。
    ///
    /// 內容類型為 JSON（含 `problem+json`）且能解析時使用其欄位；
    /// 否則將整個本文視為不透明文字放入 `detail`。
    pub fn from_response(response: &HttpResponse) -> Self {
        let is_json = response
            .content_type()
            .is_some_and(|ct| ct.contains("json"));

        if is_json {
            if let Ok(mut problem) = response.json::<Problem>() {
                problem.status.get_or_insert(response.status);
                return problem;
            }
        }

        let text = response.text();
        Problem {
            type_: None,
            detail: (!text.trim().is_empty()).then(|| text.trim().to_string()),
            status: Some(response.status),
        }
    }

    pub fn is_bad_nonce(&self) -> bool {
        self.type_.as_deref() == Some(BAD_NONCE)
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.type_, &self.detail) {
            (Some(t), Some(d)) => write!(f, "{}: {}", t, d),
            (Some(t), None) => write!(f, "{}", t),
            (None, Some(d)) => write!(f, "{}", d),
            (None, None) => match self.status {
                Some(status) => write!(f, "HTTP {}", status),
                None => write!(f, "unknown error"),
            },
        }
    }
}
