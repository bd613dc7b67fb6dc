use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{AcmeError, Result},
    problem::Problem,
    transport::Transport,
};

/// ACME 服務目錄：操作名稱與其絕對 URL 的對應。
///
/// 於流程初始化時取得一次，之後在該流程的生命週期內不再變動。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Directory {
    #[serde(rename = "newNonce")]
    pub new_nonce: String,
    #[serde(rename = "newAccount")]
    pub new_account: String,
    #[serde(rename = "newOrder")]
    pub new_order: String,
    #[serde(rename = "revokeCert", default, skip_serializing_if = "Option::is_none")]
    pub revoke_cert: Option<String>,
    #[serde(rename = "keyChange", default, skip_serializing_if = "Option::is_none")]
    pub key_change: Option<String>,
    #[serde(rename = "renewalInfo", default, skip_serializing_if = "Option::is_none")]
    pub renewal_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<DirectoryMeta>,
}

/// 目錄中的選用 `meta` 欄位。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DirectoryMeta {
    #[serde(rename = "termsOfService", default, skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(rename = "caaIdentities", default, skip_serializing_if = "Vec::is_empty")]
    pub caa_identities: Vec<String>,
    #[serde(rename = "externalAccountRequired", default)]
    pub external_account_required: bool,
}

impl Directory {
    /// 以 GET 取得目錄。
    ///
    /// # 錯誤
    ///
    /// 網路錯誤、非 2xx 回應或無法解析的本文都會回傳 [`AcmeError::DirectoryUnavailable`]。
    pub fn fetch(transport: &dyn Transport, url: &str) -> Result<Self> {
        debug!(url, "fetching ACME directory");
        let response = transport
            .get(url)
            .map_err(|e| AcmeError::DirectoryUnavailable(format!("{}: {}", url, e)))?;

        if !response.is_success() {
            let problem = Problem::from_response(&response);
            return Err(AcmeError::DirectoryUnavailable(format!(
                "{}: {}",
                url, problem
            )));
        }

        let directory: Directory = response.json().map_err(|e| {
            AcmeError::DirectoryUnavailable(format!("{}: invalid directory document: {}", url, e))
        })?;
        info!(url, new_order = %directory.new_order, "ACME directory loaded");
        Ok(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, TransportError};

    #[derive(Debug)]
    struct StaticTransport(std::result::Result<HttpResponse, String>);

    impl Transport for StaticTransport {
        fn get(&self, _url: &str) -> std::result::Result<HttpResponse, TransportError> {
            self.0.clone().map_err(TransportError::Other)
        }
        fn head(&self, _url: &str) -> std::result::Result<HttpResponse, TransportError> {
            unreachable!()
        }
        fn post_jose(
            &self,
            _url: &str,
            _body: String,
        ) -> std::result::Result<HttpResponse, TransportError> {
            unreachable!()
        }
    }

    const LE_DIRECTORY: &str = r#"{
        "keyChange": "https://acme-v02.api.letsencrypt.org/acme/key-change",
        "meta": {
            "caaIdentities": ["letsencrypt.org"],
            "termsOfService": "https://letsencrypt.org/documents/LE-SA-v1.4-April-3-2024.pdf",
            "website": "https://letsencrypt.org"
        },
        "newAccount": "https://acme-v02.api.letsencrypt.org/acme/new-acct",
        "newNonce": "https://acme-v02.api.letsencrypt.org/acme/new-nonce",
        "newOrder": "https://acme-v02.api.letsencrypt.org/acme/new-order",
        "renewalInfo": "https://acme-v02.api.letsencrypt.org/draft-ietf-acme-ari-03/renewalInfo",
        "revokeCert": "https://acme-v02.api.letsencrypt.org/acme/revoke-cert",
        "xRandomKey": "https://community.letsencrypt.org/t/adding-random-entries-to-the-directory/33417"
    }"#;

    #[test]
    fn test_parses_directory() {
        let transport = StaticTransport(Ok(HttpResponse::new(200).with_body(LE_DIRECTORY)));
        let dir = Directory::fetch(&transport, "https://ca/directory").unwrap();
        assert_eq!(
            dir.new_nonce,
            "https://acme-v02.api.letsencrypt.org/acme/new-nonce"
        );
        assert_eq!(
            dir.key_change.as_deref(),
            Some("https://acme-v02.api.letsencrypt.org/acme/key-change")
        );
        let meta = dir.meta.unwrap();
        assert_eq!(meta.caa_identities, vec!["letsencrypt.org"]);
        assert!(!meta.external_account_required);
    }

    #[test]
    fn test_non_success_is_unavailable() {
        let transport = StaticTransport(Ok(HttpResponse::new(503).with_body("down")));
        assert!(matches!(
            Directory::fetch(&transport, "https://ca/directory"),
            Err(AcmeError::DirectoryUnavailable(_))
        ));
    }

    #[test]
    fn test_network_error_is_unavailable() {
        let transport = StaticTransport(Err("connection refused".into()));
        let err = Directory::fetch(&transport, "https://ca/directory").unwrap_err();
        assert!(matches!(err, AcmeError::DirectoryUnavailable(ref m) if m.contains("connection refused")));
    }

    #[test]
    fn test_missing_required_url() {
        let transport =
            StaticTransport(Ok(HttpResponse::new(200).with_body(r#"{"newNonce":"x"}"#)));
        assert!(matches!(
            Directory::fetch(&transport, "https://ca/directory"),
            Err(AcmeError::DirectoryUnavailable(_))
        ));
    }
}
