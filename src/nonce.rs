use tracing::debug;

use crate::{
    error::{AcmeError, Result},
    transport::{HttpResponse, Transport},
};

/// 單一流程持有的防重放 nonce。
///
/// 任何時刻最多持有一個 nonce。每個已簽署請求都會消耗它，
/// 而每個回應（不論成功或失敗）附帶的 `Replay-Nonce` 會覆寫它；
/// 手上沒有 nonce 時才以 HEAD 向 newNonce 端點索取。
#[derive(Debug)]
pub struct NonceManager {
    url: String,
    current: Option<String>,
}

impl NonceManager {
    /// 建立管理器。
    ///
    /// # 參數
    ///
    /// * `url` - 目錄中的 `newNonce` 端點。
    pub fn new(url: impl Into<String>) -> Self {
        NonceManager {
            url: url.into(),
            current: None,
        }
    }

    /// 目前持有的 nonce（不觸發網路請求）。
    pub fn held(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// 回傳目前持有的 nonce；若沒有則透過 HEAD 請求取得。
    ///
    /// # 錯誤
    ///
    /// 網路失敗或回應缺少 `Replay-Nonce` 時回傳 [`AcmeError::NonceUnavailable`]。
    pub fn current(&mut self, transport: &dyn Transport) -> Result<String> {
        if let Some(nonce) = &self.current {
            return Ok(nonce.clone());
        }

        let response = transport
            .head(&self.url)
            .map_err(|e| AcmeError::NonceUnavailable(format!("{}: {}", self.url, e)))?;
        let nonce = response
            .replay_nonce()
            .ok_or_else(|| {
                AcmeError::NonceUnavailable(format!(
                    "no Replay-Nonce header in response from {} (HTTP {})",
                    self.url, response.status
                ))
            })?
            .to_string();

        debug!("fetched fresh nonce");
        self.current = Some(nonce.clone());
        Ok(nonce)
    }

    /// 取出 nonce 供一次簽署使用；取出後不再持有。
    pub fn take(&mut self, transport: &dyn Transport) -> Result<String> {
        let nonce = self.current(transport)?;
        self.current = None;
        Ok(nonce)
    }

    /// 以回應中的 `Replay-Nonce` 覆寫持有的 nonce；回應沒有時維持不變。
    pub fn update_from(&mut self, response: &HttpResponse) {
        if let Some(nonce) = response.replay_nonce() {
            self.current = Some(nonce.to_string());
        }
    }
}
