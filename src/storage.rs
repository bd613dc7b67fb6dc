use std::{
    collections::HashMap,
    fmt, fs,
    io::{self, Write},
    path::{Component, Path, PathBuf},
    sync::RwLock,
};

use tempfile::NamedTempFile;
use thiserror::Error;

/// 儲存操作可能發生的錯誤類型。
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Key is invalid: {0}")]
    InvalidKey(String),
    #[error("Key not found: {0}")]
    NotFound(String),
    #[error("Lock poisoned")]
    LockPoisoned,
}

/// 儲存操作的結果類型。
pub type Result<T> = std::result::Result<T, StorageError>;

/// 以 `/` 分隔的鍵存取位元組資料的儲存介面。
pub trait Storage: Send + Sync + fmt::Debug {
    /// 讀取鍵對應的內容，不存在時回傳 [`StorageError::NotFound`]。
    fn read_file(&self, key: &str) -> Result<Vec<u8>>;

    /// 寫入（覆寫）鍵對應的內容，必要時建立上層目錄。
    fn write_file(&self, key: &str, value: &[u8]) -> Result<()>;

    /// 刪除鍵；鍵不存在時不視為錯誤。
    fn remove(&self, key: &str) -> Result<()>;

    /// 檢查鍵是否存在。
    fn exists(&self, key: &str) -> Result<bool>;

    /// 讀取內容，不存在時回傳 `None`。
    fn read_optional(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.read_file(key) {
            Ok(data) => Ok(Some(data)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// 鍵的正規化與驗證。
pub(crate) struct KeyUtils;

impl KeyUtils {
    /// 將鍵正規化為相對路徑，拒絕空鍵、控制字元、`..` 與絕對路徑。
    fn normalize(key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("Empty key".to_string()));
        }
        if key.chars().any(|c| c.is_control()) {
            return Err(StorageError::InvalidKey(format!(
                "Invalid characters in key: {:?}",
                key
            )));
        }
        if key.ends_with('/') {
            return Err(StorageError::InvalidKey(format!(
                "Key cannot end with '/': {}",
                key
            )));
        }

        let mut normalized = PathBuf::new();
        for component in Path::new(key).components() {
            match component {
                Component::CurDir => {}
                Component::Normal(name) => {
                    let name = name.to_str().ok_or_else(|| {
                        StorageError::InvalidKey(format!("Non-UTF8 path component in: {}", key))
                    })?;
                    if name.contains('\\') {
                        return Err(StorageError::InvalidKey(format!(
                            "Invalid path component: {}",
                            name
                        )));
                    }
                    normalized.push(name);
                }
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "Key must be a relative path without '..': {}",
                        key
                    )))
                }
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(StorageError::InvalidKey(format!("Invalid key: {}", key)));
        }
        Ok(normalized)
    }

    /// 驗證單一路徑片段（例如身分命名空間），只允許英數字與 `.`、`_`、`-`。
    pub(crate) fn validate_segment(segment: &str) -> Result<&str> {
        let valid = !segment.is_empty()
            && segment != "."
            && segment != ".."
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if valid {
            Ok(segment)
        } else {
            Err(StorageError::InvalidKey(format!(
                "Invalid key segment: {:?}",
                segment
            )))
        }
    }
}

/// 以目錄樹實作的儲存，每個鍵對應根目錄下的一個檔案。
///
/// Unix 上檔案權限為 `0600`，寫入時先寫暫存檔再改名，避免中斷留下半份私鑰。
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// 開啟（必要時建立）根目錄。
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root.join(KeyUtils::normalize(key)?))
    }
}

impl Storage for FileStorage {
    fn read_file(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_file(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        let parent = path.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(parent)?;

        // 暫存檔名每次都不同，同一個鍵可以並行寫入
        let mut temp = NamedTempFile::new_in(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o600))?;
        }
        temp.write_all(value)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key)?.is_file())
    }
}

/// 基於記憶體的儲存實作，適合單次執行或測試。
#[derive(Debug, Default)]
pub struct MemStorage {
    data: RwLock<HashMap<PathBuf, Vec<u8>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemStorage {
    fn read_file(&self, key: &str) -> Result<Vec<u8>> {
        let path = KeyUtils::normalize(key)?;
        self.data
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(&path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn write_file(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = KeyUtils::normalize(key)?;
        self.data
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(path, value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = KeyUtils::normalize(key)?;
        self.data
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .remove(&path);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let path = KeyUtils::normalize(key)?;
        Ok(self
            .data
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .contains_key(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(storage: &dyn Storage) -> Result<()> {
        storage.write_file("letsencrypt/default/account_url", b"https://ca/acct/1")?;
        assert!(storage.exists("letsencrypt/default/account_url")?);
        assert_eq!(
            storage.read_file("letsencrypt/default/account_url")?,
            b"https://ca/acct/1"
        );

        storage.write_file("letsencrypt/default/account_url", b"https://ca/acct/2")?;
        assert_eq!(
            storage.read_optional("./letsencrypt/default/account_url")?,
            Some(b"https://ca/acct/2".to_vec())
        );

        storage.remove("letsencrypt/default/account_url")?;
        storage.remove("letsencrypt/default/account_url")?;
        assert!(!storage.exists("letsencrypt/default/account_url")?);
        assert!(matches!(
            storage.read_file("letsencrypt/default/account_url"),
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(storage.read_optional("missing")?, None);
        Ok(())
    }

    #[test]
    fn test_mem_storage_basic_operations() -> Result<()> {
        exercise(&MemStorage::new())
    }

    #[test]
    fn test_file_storage_basic_operations() -> Result<()> {
        let temp_dir = tempdir()?;
        let storage = FileStorage::open(temp_dir.path().join("store"))?;
        exercise(&storage)
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir()?;
        let storage = FileStorage::open(temp_dir.path())?;
        storage.write_file("zerossl/alice/account_key.pem", b"secret")?;
        let mode = fs::metadata(temp_dir.path().join("zerossl/alice/account_key.pem"))?
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }

    #[test]
    fn test_concurrent_writes_to_same_key() -> Result<()> {
        use std::sync::Barrier;

        let temp_dir = tempdir()?;
        let storage = FileStorage::open(temp_dir.path())?;
        let key = "letsencrypt/default/account_key.pem";

        for _ in 0..50 {
            let barrier = Barrier::new(2);
            let results: Vec<Result<()>> = std::thread::scope(|scope| {
                let handles: Vec<_> = [b"first".as_slice(), b"second".as_slice()]
                    .into_iter()
                    .map(|value| {
                        let (storage, barrier) = (&storage, &barrier);
                        scope.spawn(move || {
                            barrier.wait();
                            storage.write_file(key, value)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            for result in results {
                result?;
            }
            let stored = storage.read_file(key)?;
            assert!(stored == b"first" || stored == b"second");
        }

        let leftovers: Vec<_> = fs::read_dir(temp_dir.path().join("letsencrypt/default"))?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<io::Result<_>>()?;
        assert_eq!(leftovers, vec![std::ffi::OsString::from("account_key.pem")]);
        Ok(())
    }

    #[test]
    fn test_invalid_keys() {
        let storage = MemStorage::new();
        for key in ["", "dir/", "../escape", "/absolute", "a/../../b", "bad\nkey"] {
            assert!(
                matches!(storage.write_file(key, b"x"), Err(StorageError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_segment() {
        assert!(KeyUtils::validate_segment("tenant-42.prod_a").is_ok());
        for bad in ["", "..", "a/b", "with space", "é"] {
            assert!(KeyUtils::validate_segment(bad).is_err(), "{bad:?}");
        }
    }
}
