//! 供外部協作者使用的兩階段憑證申請流程。
//!
//! 1. [`CertificateFlow::begin`]：取得目錄、確保帳戶、建立訂單、取得授權並產生挑戰內容。
//! 2. 呼叫端公開 [`PendingValidation::material`]（HTTP 檔案或 DNS TXT 記錄）。
//! 3. [`PendingValidation::complete`]：觸發驗證、輪詢、產生網域金鑰與 CSR、finalize、下載憑證。
//!
//! 任何一步失敗都是終結性的；要重試就重新呼叫 `begin`，這會建立新訂單與新的 token，
//! 先前公開的內容隨之失效。

use std::sync::{Arc, PoisonError};

use tracing::info;

use crate::{
    account::{ensure_account, load_or_generate_key, AccountLocation},
    certificate::CertificateBundle,
    challenge::{
        material_for, select_challenge, Challenge, ChallengeMaterial, ChallengeStatus,
        ChallengeType,
    },
    config::ClientConfig,
    csr::generate_csr,
    domain::validate_domain,
    error::{AcmeError, Result},
    key_pair::KeyPair,
    order::{
        create_order, download_certificate, finalize, get_authorization, poll_challenge,
        poll_order, trigger, Order, OrderStatus,
    },
    session::AcmeSession,
    storage::Storage,
    transport::Transport,
};

/// 依設定建立各次申請流程。
///
/// 每次 `begin` 都有自己的 session（nonce、帳戶金鑰、訂單），
/// 因此同一個 `CertificateFlow` 可以在不同執行緒上同時處理不同網域。
/// 共用同一個帳戶位置的流程只在取得帳戶時互相等待，之後各自進行。
#[derive(Debug, Clone)]
pub struct CertificateFlow {
    config: ClientConfig,
    storage: Arc<dyn Storage>,
}

impl CertificateFlow {
    pub fn new(config: ClientConfig, storage: Arc<dyn Storage>) -> Self {
        CertificateFlow { config, storage }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 開始一次申請，回傳等待公開的挑戰內容。
    ///
    /// # 參數
    ///
    /// * `transport` - 本次流程專用的傳輸層。
    /// * `domain` - 要申請的網域，會先經過 [`validate_domain`]。
    /// * `method` - 呼叫端能公開的驗證方式。
    ///
    /// # 錯誤
    ///
    /// 網域不合法、帳戶無法建立、訂單被拒或授權中沒有對應類型的挑戰時回傳錯誤。
    pub fn begin(
        &self,
        transport: Box<dyn Transport>,
        domain: &str,
        method: ChallengeType,
    ) -> Result<PendingValidation> {
        let domain = validate_domain(domain, &method)?;
        let provider = self.config.provider.clone();
        info!(%domain, %provider, %method, "starting certificate request");

        let location = AccountLocation::new(&provider, &self.config.identity)?;
        let mut session = {
            let account_lock = location.lock();
            let _guard = account_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let account_key = load_or_generate_key(
                self.storage.as_ref(),
                &location,
                self.config.account_key_bits,
            )?;

            let mut session = AcmeSession::connect(transport, provider, account_key)?;
            ensure_account(
                &mut session,
                self.storage.as_ref(),
                &location,
                self.config.contact_email.as_deref(),
            )?;
            session
        };

        let (order, order_url) = create_order(&mut session, &domain)?;
        let authorization_url = order
            .authorizations
            .first()
            .ok_or_else(|| AcmeError::OrderFailed {
                detail: format!("order {} has no authorizations", order_url),
            })?
            .clone();
        let authorization = get_authorization(&mut session, &authorization_url)?;
        let challenge = select_challenge(&authorization, method)?.clone();
        let material = material_for(&challenge, method, session.account_key())?;

        Ok(PendingValidation {
            session,
            config: self.config.clone(),
            domain,
            method,
            order,
            order_url,
            challenge,
            material,
        })
    }

    /// 一次完成整個流程；`publish` 在觸發驗證前被呼叫，負責公開挑戰內容。
    pub fn issue<F>(
        &self,
        transport: Box<dyn Transport>,
        domain: &str,
        method: ChallengeType,
        publish: F,
    ) -> Result<CertificateBundle>
    where
        F: FnOnce(&PendingValidation) -> Result<()>,
    {
        let pending = self.begin(transport, domain, method)?;
        publish(&pending)?;
        pending.complete()
    }
}

/// 已建立訂單、等待呼叫端公開挑戰內容的流程。
///
/// 由 [`PendingValidation::complete`] 消耗；每個值只對應一張訂單。
#[derive(Debug)]
pub struct PendingValidation {
    session: AcmeSession,
    config: ClientConfig,
    domain: String,
    method: ChallengeType,
    order: Order,
    order_url: String,
    challenge: Challenge,
    material: ChallengeMaterial,
}

impl PendingValidation {
    /// 需要公開的挑戰內容。
    pub fn material(&self) -> &ChallengeMaterial {
        &self.material
    }

    /// 正規化後的網域。
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn method(&self) -> ChallengeType {
        self.method
    }

    pub fn order_url(&self) -> &str {
        &self.order_url
    }

    pub fn challenge_url(&self) -> &str {
        &self.challenge.url
    }

    pub fn account_url(&self) -> Option<&str> {
        self.session.account_url()
    }

    /// 觸發驗證並完成申請。
    ///
    /// # 錯誤
    ///
    /// 挑戰失敗或逾時、CSR 無法簽署、訂單失敗或逾時、憑證下載失敗時回傳對應的 [`AcmeError`]。
    pub fn complete(mut self) -> Result<CertificateBundle> {
        let session = &mut self.session;

        // 授權可能在先前的訂單中已通過
        if self.challenge.status != ChallengeStatus::Valid {
            trigger(session, &self.challenge)?;
            poll_challenge(session, &self.challenge.url, &self.config.challenge_poll)?;
        }

        let domain_key = KeyPair::generate(self.config.domain_key_bits)?;
        let csr = generate_csr(&self.domain, &domain_key)?;
        let finalized = finalize(session, &self.order, &csr)?;

        let final_order =
            if finalized.status == OrderStatus::Valid && finalized.certificate.is_some() {
                finalized
            } else {
                poll_order(session, &self.order_url, &self.config.order_poll)?
            };
        let certificate_url = final_order
            .certificate
            .ok_or_else(|| AcmeError::OrderFailed {
                detail: "order is valid but has no certificate URL".to_string(),
            })?;

        let certificate_pem = download_certificate(session, &certificate_url)?;
        info!(domain = %self.domain, "certificate issued");

        Ok(CertificateBundle::new(
            certificate_pem,
            domain_key.private_key_pem()?,
            &self.domain,
            session.provider().clone(),
        ))
    }
}
