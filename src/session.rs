//! 單一憑證申請流程的協定上下文。
//!
//! [`AcmeSession`] 持有目錄、nonce、帳戶金鑰與帳戶 URL，
//! 並負責所有已簽署請求的收發。不同流程各自擁有一個 session，彼此不共享任何可變狀態。

use tracing::{debug, warn};

use crate::{
    directory::Directory,
    error::{AcmeError, Result},
    jws,
    key_pair::KeyPair,
    nonce::NonceManager,
    payload::Payload,
    problem::Problem,
    provider::CaProvider,
    transport::{HttpResponse, Transport},
};

#[derive(Debug)]
pub struct AcmeSession {
    transport: Box<dyn Transport>,
    provider: CaProvider,
    directory: Directory,
    nonces: NonceManager,
    account_key: KeyPair,
    account_url: Option<String>,
}

impl AcmeSession {
    /// 取得提供者的目錄並建立 session。
    ///
    /// # 錯誤
    ///
    /// 目錄無法取得時回傳 [`AcmeError::DirectoryUnavailable`]。
    pub fn connect(
        transport: Box<dyn Transport>,
        provider: CaProvider,
        account_key: KeyPair,
    ) -> Result<Self> {
        let directory = Directory::fetch(transport.as_ref(), provider.directory_url())?;
        Ok(Self::with_directory(transport, provider, directory, account_key))
    }

    /// 以已知的目錄建立 session，不發出任何請求。
    pub fn with_directory(
        transport: Box<dyn Transport>,
        provider: CaProvider,
        directory: Directory,
        account_key: KeyPair,
    ) -> Self {
        let nonces = NonceManager::new(directory.new_nonce.clone());
        AcmeSession {
            transport,
            provider,
            directory,
            nonces,
            account_key,
            account_url: None,
        }
    }

    pub fn provider(&self) -> &CaProvider {
        &self.provider
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn account_key(&self) -> &KeyPair {
        &self.account_key
    }

    pub fn account_url(&self) -> Option<&str> {
        self.account_url.as_deref()
    }

    /// 設定帳戶 URL；之後的請求改以 `kid` 標識帳戶。
    pub fn set_account_url(&mut self, url: impl Into<String>) {
        self.account_url = Some(url.into());
    }

    /// 送出已簽署的 POST，並回傳成功的回應。
    ///
    /// 每個請求消耗一個 nonce，每個回應帶回的 `Replay-Nonce` 都會被保留。
    /// 伺服器回報 `badNonce` 時，以錯誤回應中的新 nonce 重新簽署並重送一次；
    /// 第二次仍失敗則照常回報錯誤。
    ///
    /// # 錯誤
    ///
    /// 非 2xx 回應回傳 [`AcmeError::Request`]，內含解析後的 [`Problem`]。
    pub fn signed_post(&mut self, url: &str, payload: &Payload) -> Result<HttpResponse> {
        let response = self.send_once(url, payload)?;
        if response.is_success() {
            return Ok(response);
        }

        let problem = Problem::from_response(&response);
        if !problem.is_bad_nonce() {
            return Err(AcmeError::Request {
                url: url.to_string(),
                problem,
            });
        }

        warn!(url, "server rejected nonce, retrying once");
        let retry = self.send_once(url, payload)?;
        if retry.is_success() {
            Ok(retry)
        } else {
            Err(AcmeError::Request {
                url: url.to_string(),
                problem: Problem::from_response(&retry),
            })
        }
    }

    /// POST-as-GET：以空字串載荷讀取資源。
    pub fn post_as_get(&mut self, url: &str) -> Result<HttpResponse> {
        self.signed_post(url, &Payload::PostAsGet)
    }

    fn send_once(&mut self, url: &str, payload: &Payload) -> Result<HttpResponse> {
        let nonce = self.nonces.take(self.transport.as_ref())?;
        let jws = jws::sign(
            url,
            payload,
            &self.account_key,
            Some(&nonce),
            self.account_url.as_deref(),
        )?;
        let body = jws.to_json()?;

        let response = self.transport.post_jose(url, body)?;
        self.nonces.update_from(&response);
        debug!(url, status = response.status, "signed request completed");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::{
        base64::decode_url,
        jws::Jws,
        transport::TransportError,
    };

    #[derive(Debug, Default)]
    struct Recorded {
        posts: Vec<(String, Jws)>,
        heads: usize,
    }

    /// 依序回放預先排好的 POST 回應。
    #[derive(Debug, Clone, Default)]
    struct ScriptedTransport {
        replies: Arc<Mutex<VecDeque<std::result::Result<HttpResponse, TransportError>>>>,
        recorded: Arc<Mutex<Recorded>>,
    }

    impl ScriptedTransport {
        fn push(&self, response: HttpResponse) {
            self.replies.lock().unwrap().push_back(Ok(response));
        }

        fn push_failure(&self, reason: &str) {
            self.replies
                .lock()
                .unwrap()
                .push_back(Err(TransportError::Other(reason.to_string())));
        }
    }

    impl Transport for ScriptedTransport {
        fn get(&self, _url: &str) -> std::result::Result<HttpResponse, TransportError> {
            Err(TransportError::Other("unexpected GET".into()))
        }

        fn head(&self, _url: &str) -> std::result::Result<HttpResponse, TransportError> {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.heads += 1;
            Ok(HttpResponse::new(200).with_header("Replay-Nonce", &format!("head-{}", recorded.heads)))
        }

        fn post_jose(
            &self,
            url: &str,
            body: String,
        ) -> std::result::Result<HttpResponse, TransportError> {
            let jws: Jws = serde_json::from_str(&body).unwrap();
            self.recorded
                .lock()
                .unwrap()
                .posts
                .push((url.to_string(), jws));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))
        }
    }

    fn directory() -> Directory {
        serde_json::from_value(serde_json::json!({
            "newNonce": "https://ca/new-nonce",
            "newAccount": "https://ca/new-acct",
            "newOrder": "https://ca/new-order"
        }))
        .unwrap()
    }

    fn session(transport: &ScriptedTransport) -> AcmeSession {
        AcmeSession::with_directory(
            Box::new(transport.clone()),
            CaProvider::LetsEncryptStaging,
            directory(),
            KeyPair::generate(2048).unwrap(),
        )
    }

    fn bad_nonce(fresh: &str) -> HttpResponse {
        HttpResponse::new(400)
            .with_header("Content-Type", "application/problem+json")
            .with_header("Replay-Nonce", fresh)
            .with_body(r#"{"type":"urn:ietf:params:acme:error:badNonce","detail":"stale"}"#)
    }

    #[test]
    fn test_nonce_chain_and_kid() {
        let transport = ScriptedTransport::default();
        transport.push(HttpResponse::new(200).with_header("Replay-Nonce", "n-1"));
        transport.push(HttpResponse::new(200).with_header("Replay-Nonce", "n-2"));

        let mut session = session(&transport);
        session.post_as_get("https://ca/a").unwrap();
        session.set_account_url("https://ca/acct/1");
        session.post_as_get("https://ca/b").unwrap();

        let recorded = transport.recorded.lock().unwrap();
        assert_eq!(recorded.heads, 1);
        let first = recorded.posts[0].1.decode_protected().unwrap();
        let second = recorded.posts[1].1.decode_protected().unwrap();
        assert_eq!(first.nonce, "head-1");
        assert!(first.jwk.is_some() && first.kid.is_none());
        assert_eq!(second.nonce, "n-1");
        assert_eq!(second.kid.as_deref(), Some("https://ca/acct/1"));
        assert!(second.jwk.is_none());
        assert_eq!(recorded.posts[1].1.payload(), "");
    }

    #[test]
    fn test_bad_nonce_is_retried_once_with_fresh_nonce() {
        let transport = ScriptedTransport::default();
        transport.push(bad_nonce("fresh-1"));
        transport.push(HttpResponse::new(201).with_header("Replay-Nonce", "n-2"));

        let mut session = session(&transport);
        let payload = Payload::Json(serde_json::json!({"termsOfServiceAgreed": true}));
        let response = session.signed_post("https://ca/new-acct", &payload).unwrap();
        assert_eq!(response.status, 201);

        let recorded = transport.recorded.lock().unwrap();
        assert_eq!(recorded.posts.len(), 2);
        let retry = recorded.posts[1].1.decode_protected().unwrap();
        assert_eq!(retry.nonce, "fresh-1");
        assert_eq!(
            decode_url(recorded.posts[0].1.payload()).unwrap(),
            decode_url(recorded.posts[1].1.payload()).unwrap()
        );
    }

    #[test]
    fn test_second_bad_nonce_is_reported() {
        let transport = ScriptedTransport::default();
        transport.push(bad_nonce("fresh-1"));
        transport.push(bad_nonce("fresh-2"));
        transport.push(HttpResponse::new(200));

        let mut session = session(&transport);
        let err = session.post_as_get("https://ca/a").unwrap_err();
        match err {
            AcmeError::Request { url, problem } => {
                assert_eq!(url, "https://ca/a");
                assert!(problem.is_bad_nonce());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.recorded.lock().unwrap().posts.len(), 2);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let transport = ScriptedTransport::default();
        transport.push(
            HttpResponse::new(403)
                .with_header("Content-Type", "application/problem+json")
                .with_header("Replay-Nonce", "n-2")
                .with_body(r#"{"type":"urn:ietf:params:acme:error:unauthorized","detail":"no"}"#),
        );

        let mut session = session(&transport);
        assert!(matches!(
            session.post_as_get("https://ca/a"),
            Err(AcmeError::Request { .. })
        ));
        assert_eq!(transport.recorded.lock().unwrap().posts.len(), 1);
        assert_eq!(session.nonces.held(), Some("n-2"));
    }

    #[test]
    fn test_network_failure_is_not_retried() {
        let transport = ScriptedTransport::default();
        transport.push(HttpResponse::new(200).with_header("Replay-Nonce", "n-1"));
        transport.push_failure("connection reset");
        transport.push(HttpResponse::new(200).with_header("Replay-Nonce", "n-3"));

        let mut session = session(&transport);
        session.set_account_url("https://ca/acct/1");
        session.post_as_get("https://ca/order/1").unwrap();
        assert!(matches!(
            session.post_as_get("https://ca/chall/1"),
            Err(AcmeError::Transport(TransportError::Other(reason))) if reason == "connection reset"
        ));
        assert_eq!(transport.recorded.lock().unwrap().posts.len(), 2);
        assert_eq!(session.nonces.held(), None);

        session.post_as_get("https://ca/order/1").unwrap();
        let recorded = transport.recorded.lock().unwrap();
        let nonces: Vec<String> = recorded
            .posts
            .iter()
            .map(|(_, jws)| jws.decode_protected().unwrap().nonce)
            .collect();
        assert_eq!(nonces, vec!["head-1", "n-1", "head-2"]);
        assert_eq!(recorded.heads, 2);
    }
}
