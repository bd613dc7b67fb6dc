//! HTTP 傳輸層。
//!
//! 協定邏輯只透過 [`Transport`] 與 CA 溝通，正式環境使用 [`ReqwestTransport`]，
//! 測試則可以替換成腳本化的模擬 CA。傳輸層不做任何重試。

use std::{collections::HashMap, fmt, time::Duration};

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

pub const CONTENT_TYPE_JOSE: &str = "application/jose+json";
pub const HEADER_REPLAY_NONCE: &str = "replay-nonce";
pub const HEADER_LOCATION: &str = "location";
pub const HEADER_CONTENT_TYPE: &str = "content-type";

/// 網路層級的錯誤。
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Transport error: {0}")]
    Other(String),
}

/// 與傳輸實作無關的 HTTP 回應。標頭名稱一律轉為小寫。
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// 加入一個標頭（名稱不分大小寫）。
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn replay_nonce(&self) -> Option<&str> {
        self.header(HEADER_REPLAY_NONCE)
    }

    pub fn location(&self) -> Option<&str> {
        self.header(HEADER_LOCATION)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(HEADER_CONTENT_TYPE)
    }

    /// 以 UTF-8 解讀本文，無效位元組以替代字元取代。
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// 送出 ACME 所需的三種 HTTP 請求。
pub trait Transport: Send + Sync + fmt::Debug {
    /// GET，用於取得目錄。
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;

    /// HEAD，用於 newNonce。
    fn head(&self, url: &str) -> Result<HttpResponse, TransportError>;

    /// 以 `application/jose+json` 送出 JWS。
    fn post_jose(&self, url: &str, body: String) -> Result<HttpResponse, TransportError>;
}

/// 以 `reqwest` 阻塞式客戶端實作的傳輸層。
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    /// 指定單次請求逾時。
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    fn convert(response: reqwest::blocking::Response) -> Result<HttpResponse, TransportError> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes()?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        debug!(url, "GET");
        Self::convert(self.client.get(url).send()?)
    }

    fn head(&self, url: &str) -> Result<HttpResponse, TransportError> {
        debug!(url, "HEAD");
        Self::convert(self.client.head(url).send()?)
    }

    fn post_jose(&self, url: &str, body: String) -> Result<HttpResponse, TransportError> {
        debug!(url, "POST");
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_JOSE)
            .body(body)
            .send()?;
        Self::convert(response)
    }
}
