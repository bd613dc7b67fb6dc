//! ACME 帳戶的取得與持久化。
//!
//! 每個 (提供者, 身分) 組合對應一個帳戶，儲存在 `{provider}/{identity}/` 之下：
//! `account_key.pem` 是帳戶私鑰，`account_url` 是 CA 回傳的帳戶 URL。
//! 兩者都存在時直接沿用，不再向 CA 註冊。
//!
//! 同一個位置的「讀取或產生金鑰」與「註冊帳戶」必須在 [`AccountLocation::lock`]
//! 之下進行，否則並行的流程會各自產生金鑰並註冊出不同的帳戶。

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

use tracing::{info, warn};

use crate::{
    error::{AcmeError, Result},
    key_pair::KeyPair,
    payload::{NewAccountPayload, PayloadT},
    provider::CaProvider,
    session::AcmeSession,
    storage::{KeyUtils, Storage},
    transport::HEADER_LOCATION,
};

/// 單一帳戶在儲存中的位置。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountLocation {
    url_key: String,
    key_key: String,
}

impl AccountLocation {
    /// # 錯誤
    ///
    /// 身分名稱不是合法的路徑片段時回傳 [`AcmeError::Storage`]。
    pub fn new(provider: &CaProvider, identity: &str) -> Result<Self> {
        let identity = KeyUtils::validate_segment(identity)?;
        let base = format!("{}/{}", provider.storage_namespace(), identity);
        Ok(AccountLocation {
            url_key: format!("{}/account_url", base),
            key_key: format!("{}/account_key.pem", base),
        })
    }

    pub fn url_key(&self) -> &str {
        &self.url_key
    }

    pub fn key_key(&self) -> &str {
        &self.key_key
    }

    /// 此位置在本行程內共用的帳戶鎖。
    ///
    /// 相同位置永遠取得同一把鎖，不同位置互不影響。
    pub fn lock(&self) -> Arc<Mutex<()>> {
        static LOCKS: OnceLock<Mutex<HashMap<AccountLocation, Arc<Mutex<()>>>>> = OnceLock::new();
        let mut locks = LOCKS
            .get_or_init(Default::default)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let lock = locks.entry(self.clone()).or_default().clone();
        lock
    }
}

/// 讀取帳戶金鑰；不存在時產生新的並寫入儲存。
///
/// 新產生金鑰時，舊的帳戶 URL 已不屬於這把金鑰，會一併刪除。
///
/// # 參數
///
/// * `bits` - 新金鑰的長度，只在需要產生時使用。
pub fn load_or_generate_key(
    storage: &dyn Storage,
    location: &AccountLocation,
    bits: u32,
) -> Result<KeyPair> {
    if let Some(pem) = storage.read_optional(location.key_key())? {
        return Ok(KeyPair::from_pem(&pem)?);
    }

    let key_pair = KeyPair::generate(bits)?;
    storage.write_file(location.key_key(), key_pair.private_key_pem()?.as_bytes())?;
    if storage.exists(location.url_key())? {
        warn!(key = location.url_key(), "discarding account URL of a lost account key");
        storage.remove(location.url_key())?;
    }
    info!(bits, "generated new account key");
    Ok(key_pair)
}

/// 確保 session 綁定到一個帳戶，回傳帳戶 URL。
///
/// 儲存中已有帳戶 URL 時直接使用，不發出任何請求；否則以 `jwk` 標頭 POST 到
/// `newAccount`，並從 `Location` 標頭取得帳戶 URL 後寫入儲存。
///
/// # 錯誤
///
/// CA 拒絕註冊或回應缺少 `Location` 時回傳 [`AcmeError::AccountCreationFailed`]。
pub fn ensure_account(
    session: &mut AcmeSession,
    storage: &dyn Storage,
    location: &AccountLocation,
    contact_email: Option<&str>,
) -> Result<String> {
    if let Some(url) = storage.read_optional(location.url_key())? {
        let url = String::from_utf8_lossy(&url).trim().to_string();
        if !url.is_empty() {
            session.set_account_url(url.clone());
            return Ok(url);
        }
    }

    let new_account = session.directory().new_account.clone();
    let payload = NewAccountPayload::new(contact_email).to_payload()?;
    let response = match session.signed_post(&new_account, &payload) {
        Ok(response) => response,
        Err(AcmeError::Request { problem, .. }) => {
            return Err(AcmeError::AccountCreationFailed {
                detail: problem.to_string(),
            })
        }
        Err(e) => return Err(e),
    };

    let url = response
        .location()
        .ok_or_else(|| AcmeError::AccountCreationFailed {
            detail: format!("missing {} header in newAccount response", HEADER_LOCATION),
        })?
        .to_string();

    storage.write_file(location.url_key(), url.as_bytes())?;
    info!(account_url = %url, "ACME account registered");
    session.set_account_url(url.clone());
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;

    #[test]
    fn test_location_layout() {
        let location = AccountLocation::new(&CaProvider::ZeroSsl, "tenant-a").unwrap();
        assert_eq!(location.url_key(), "zerossl/tenant-a/account_url");
        assert_eq!(location.key_key(), "zerossl/tenant-a/account_key.pem");
        assert!(matches!(
            AccountLocation::new(&CaProvider::ZeroSsl, "../escape"),
            Err(AcmeError::Storage(_))
        ));
    }

    #[test]
    fn test_lock_is_shared_per_location() {
        let a = AccountLocation::new(&CaProvider::LetsEncrypt, "lock-a").unwrap();
        let b = AccountLocation::new(&CaProvider::LetsEncrypt, "lock-b").unwrap();
        assert!(Arc::ptr_eq(&a.lock(), &a.clone().lock()));
        assert!(!Arc::ptr_eq(&a.lock(), &b.lock()));
    }

    #[test]
    fn test_concurrent_key_loading_agrees_on_stored_key() {
        use std::sync::Barrier;

        let storage = MemStorage::new();
        let location = AccountLocation::new(&CaProvider::LetsEncrypt, "race").unwrap();
        let barrier = Barrier::new(2);

        let thumbprints: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        let lock = location.lock();
                        let _guard = lock.lock().unwrap();
                        load_or_generate_key(&storage, &location, 2048)
                            .unwrap()
                            .thumbprint()
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let stored = KeyPair::from_pem(&storage.read_file(location.key_key()).unwrap())
            .unwrap()
            .thumbprint()
            .unwrap();
        assert_eq!(thumbprints, vec![stored.clone(), stored]);
    }

    #[test]
    fn test_key_is_generated_once() {
        let storage = MemStorage::new();
        let location = AccountLocation::new(&CaProvider::LetsEncrypt, "default").unwrap();
        storage
            .write_file(location.url_key(), b"https://ca/acct/stale")
            .unwrap();

        let first = load_or_generate_key(&storage, &location, 2048).unwrap();
        assert!(!storage.exists(location.url_key()).unwrap());

        let second = load_or_generate_key(&storage, &location, 2048).unwrap();
        assert_eq!(first.thumbprint().unwrap(), second.thumbprint().unwrap());
    }
}
