//! 訂單、授權與挑戰的協定步驟，以及固定間隔的輪詢。
//!
//! 狀態轉換完全由 CA 決定，客戶端只能透過輪詢觀察：
//! 建立訂單 → 取得授權 → 選擇挑戰 → 觸發 → 輪詢 → {valid | invalid | 逾時}，
//! 接著 finalize → 輪詢訂單 → 下載憑證。

use std::thread;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    challenge::{Authorization, Challenge, ChallengeStatus},
    config::PollPolicy,
    error::{AcmeError, Result},
    payload::{
        ChallengeTriggerPayload, FinalizeOrderPayload, Identifier, NewOrderPayload, PayloadT,
    },
    problem::Problem,
    session::AcmeSession,
    transport::HEADER_LOCATION,
};

/// 訂單狀態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

/// CA 回傳的訂單資源。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    pub identifiers: Vec<Identifier>,
    pub authorizations: Vec<String>,
    pub finalize: String,
    /// 只在狀態為 valid 時存在。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Problem>,
}

impl Order {
    fn failure_detail(&self) -> String {
        self.error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("order status is {:?}", self.status))
    }
}

/// 為單一網域建立訂單，回傳訂單與其 URL（`Location` 標頭）。
///
/// # 錯誤
///
/// CA 拒絕時回傳 [`AcmeError::OrderFailed`]；缺少 `Location` 時回傳 [`AcmeError::MissingHeader`]。
pub fn create_order(session: &mut AcmeSession, domain: &str) -> Result<(Order, String)> {
    let new_order = session.directory().new_order.clone();
    let payload = NewOrderPayload::new(domain).to_payload()?;
    let response = session
        .signed_post(&new_order, &payload)
        .map_err(into_order_failed)?;

    let order_url = response
        .location()
        .ok_or_else(|| AcmeError::MissingHeader {
            header: HEADER_LOCATION,
            url: new_order.clone(),
        })?
        .to_string();
    let order: Order = response.json()?;
    info!(domain, order_url = %order_url, status = ?order.status, "order created");
    Ok((order, order_url))
}

/// 以 POST-as-GET 取得授權。
pub fn get_authorization(session: &mut AcmeSession, url: &str) -> Result<Authorization> {
    let authorization: Authorization = session.post_as_get(url)?.json()?;
    debug!(url, status = ?authorization.status, "authorization fetched");
    Ok(authorization)
}

/// 送出 `{}` 通知 CA 開始驗證挑戰。
pub fn trigger(session: &mut AcmeSession, challenge: &Challenge) -> Result<()> {
    let payload = ChallengeTriggerPayload::default().to_payload()?;
    session.signed_post(&challenge.url, &payload)?;
    info!(url = %challenge.url, challenge_type = %challenge.type_, "challenge triggered");
    Ok(())
}

/// 單次輪詢的判斷結果。
enum Poll<T> {
    Done(T),
    Pending(String),
}

/// 依策略反覆 POST-as-GET `url`，每次查詢前先等待完整的間隔。
///
/// `step` 決定資源是否已到終點，或回傳錯誤中止；次數用盡時回傳 `None`。
fn poll_until<R, T>(
    session: &mut AcmeSession,
    url: &str,
    policy: &PollPolicy,
    mut step: impl FnMut(R) -> Result<Poll<T>>,
) -> Result<Option<T>>
where
    R: DeserializeOwned,
{
    for attempt in 1..=policy.max_attempts {
        thread::sleep(policy.interval);
        let resource: R = session.post_as_get(url)?.json()?;
        match step(resource)? {
            Poll::Done(value) => return Ok(Some(value)),
            Poll::Pending(status) => {
                info!(url, attempt, max = policy.max_attempts, %status, "still waiting");
            }
        }
    }
    Ok(None)
}

/// 輪詢挑戰直到 valid。
///
/// # 錯誤
///
/// 挑戰變為 invalid 時回傳 [`AcmeError::ChallengeValidationFailed`]，
/// 次數用盡時回傳 [`AcmeError::ChallengeTimeout`]。
pub fn poll_challenge(
    session: &mut AcmeSession,
    url: &str,
    policy: &PollPolicy,
) -> Result<Challenge> {
    let outcome = poll_until(session, url, policy, |challenge: Challenge| {
        match challenge.status {
            ChallengeStatus::Valid => Ok(Poll::Done(challenge)),
            ChallengeStatus::Invalid => Err(AcmeError::ChallengeValidationFailed {
                detail: challenge.error_detail(),
            }),
            status => Ok(Poll::Pending(format!("{:?}", status))),
        }
    })?;

    match outcome {
        Some(challenge) => {
            info!(url, "challenge validated");
            Ok(challenge)
        }
        None => Err(AcmeError::ChallengeTimeout {
            attempts: policy.max_attempts,
        }),
    }
}

/// 輪詢訂單直到 valid，回傳帶有憑證 URL 的最終訂單。
///
/// # 錯誤
///
/// 訂單變為 invalid 時回傳 [`AcmeError::OrderFailed`]，
/// 次數用盡時回傳 [`AcmeError::OrderTimeout`]。
pub fn poll_order(session: &mut AcmeSession, url: &str, policy: &PollPolicy) -> Result<Order> {
    let outcome = poll_until(session, url, policy, |order: Order| match order.status {
        OrderStatus::Valid if order.certificate.is_some() => Ok(Poll::Done(order)),
        OrderStatus::Valid => Err(AcmeError::OrderFailed {
            detail: "order is valid but has no certificate URL".to_string(),
        }),
        OrderStatus::Invalid => Err(AcmeError::OrderFailed {
            detail: order.failure_detail(),
        }),
        status => Ok(Poll::Pending(format!("{:?}", status))),
    })?;

    outcome.ok_or(AcmeError::OrderTimeout {
        attempts: policy.max_attempts,
    })
}

/// 送出 DER 編碼的 CSR。
///
/// # 錯誤
///
/// CA 拒絕 CSR 或訂單已失效時回傳 [`AcmeError::OrderFailed`]。
pub fn finalize(session: &mut AcmeSession, order: &Order, csr_der: &[u8]) -> Result<Order> {
    let payload = FinalizeOrderPayload::new(csr_der).to_payload()?;
    let updated: Order = session
        .signed_post(&order.finalize, &payload)
        .map_err(into_order_failed)?
        .json()?;
    if updated.status == OrderStatus::Invalid {
        return Err(AcmeError::OrderFailed {
            detail: updated.failure_detail(),
        });
    }
    info!(url = %order.finalize, status = ?updated.status, "order finalized");
    Ok(updated)
}

/// 以 POST-as-GET 下載 PEM 憑證鏈，原文回傳不做解析。
///
/// # 錯誤
///
/// 任何失敗都回傳 [`AcmeError::CertificateDownloadFailed`]。
pub fn download_certificate(session: &mut AcmeSession, url: &str) -> Result<String> {
    let response = session
        .post_as_get(url)
        .map_err(|e| AcmeError::CertificateDownloadFailed(e.to_string()))?;
    let pem = String::from_utf8(response.body).map_err(|e| {
        AcmeError::CertificateDownloadFailed(format!("certificate is not valid UTF-8: {}", e))
    })?;
    if pem.trim().is_empty() {
        return Err(AcmeError::CertificateDownloadFailed(format!(
            "empty certificate body from {}",
            url
        )));
    }
    info!(url, "certificate downloaded");
    Ok(pem)
}

fn into_order_failed(err: AcmeError) -> AcmeError {
    match err {
        AcmeError::Request { problem, .. } => AcmeError::OrderFailed {
            detail: problem.to_string(),
        },
        other => other,
    }
}
