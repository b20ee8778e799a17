//! Durable key-value storage for the session token.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{ApiError, ApiResult};

/// Key holding the bearer token string.
pub const TOKEN_KEY: &str = "auth_token";
/// Key holding the serialized user descriptor.
pub const USER_KEY: &str = "user";
/// Key holding the RFC 3339 time the token was obtained.
pub const ISSUED_AT_KEY: &str = "issued_at";

/// Length of the origin digest appended to store file names.
const ORIGIN_DIGEST_LEN: usize = 12;

/// Origin-scoped string store that survives restarts.
///
/// Only the session guard writes to it.
pub trait TokenStore: Send + Sync {
    /// Value stored under `key`, if any.
    fn get(&self, key: &str) -> ApiResult<Option<String>>;
    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> ApiResult<()>;
    /// Drop `key`; missing keys are not an error.
    fn remove(&self, key: &str) -> ApiResult<()>;
    /// Drop every entry.
    fn clear(&self) -> ApiResult<()>;
}

/// JSON file store, one file per backend origin.
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStore {
    /// Store backed by the file at `path`, created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store file for `origin` inside `dir`.
    pub fn for_origin(dir: impl AsRef<Path>, origin: &str) -> Self {
        Self::new(dir.as_ref().join(store_file_name(origin)))
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> ApiResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|err| {
            ApiError::Store(format!("failed to read {}: {err}", self.path.display()))
        })?;
        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                warn!(path = %self.path.display(), "discarding unreadable token store: {err}");
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> ApiResult<()> {
        if entries.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path).map_err(|err| {
                    ApiError::Store(format!("failed to remove {}: {err}", self.path.display()))
                })?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                ApiError::Store(format!("failed to create {}: {err}", parent.display()))
            })?;
        }
        let serialized = serde_json::to_vec_pretty(entries)
            .map_err(|err| ApiError::Store(format!("failed to serialize token store: {err}")))?;
        fs::write(&self.path, serialized).map_err(|err| {
            ApiError::Store(format!("failed to write {}: {err}", self.path.display()))
        })?;
        restrict_permissions(&self.path);
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> ApiResult<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> ApiResult<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn remove(&self, key: &str) -> ApiResult<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        if entries.remove(key).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }

    fn clear(&self) -> ApiResult<()> {
        let _guard = self.lock.lock();
        self.write_entries(&BTreeMap::new())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!(path = %path.display(), "failed to restrict token store permissions: {err}");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

/// In-process store; nothing survives the process.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> ApiResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ApiResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> ApiResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> ApiResult<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

/// Readable prefix plus a digest of the exact origin, so origins that
/// sanitize alike still get distinct files.
fn store_file_name(origin: &str) -> String {
    let digest = hex::encode(Sha256::digest(origin.trim().as_bytes()));
    format!(
        "{}-{}.json",
        sanitize_origin(origin),
        &digest[..ORIGIN_DIGEST_LEN]
    )
}

/// File-name-safe form of a backend origin.
fn sanitize_origin(origin: &str) -> String {
    let mut result = String::with_capacity(origin.len());
    let mut last_was_separator = true;
    for ch in origin.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            result.push(ch.to_ascii_lowercase());
            last_was_separator = false;
        } else if !last_was_separator {
            result.push('_');
            last_was_separator = true;
        }
    }
    let trimmed = result.trim_end_matches('_');
    if trimmed.is_empty() {
        "default".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_survives_reopening() -> ApiResult<()> {
        let dir = tempdir().map_err(|err| ApiError::Store(err.to_string()))?;
        let store = FileTokenStore::for_origin(dir.path(), "http://localhost:8080");
        store.set(TOKEN_KEY, "abc")?;
        store.set(USER_KEY, r#"{"id":"u1"}"#)?;

        let reopened = FileTokenStore::for_origin(dir.path(), "http://localhost:8080");
        assert_eq!(reopened.get(TOKEN_KEY)?.as_deref(), Some("abc"));
        assert_eq!(reopened.get(USER_KEY)?.as_deref(), Some(r#"{"id":"u1"}"#));

        reopened.remove(USER_KEY)?;
        assert_eq!(store.get(USER_KEY)?, None);
        assert_eq!(store.get(TOKEN_KEY)?.as_deref(), Some("abc"));
        Ok(())
    }

    #[test]
    fn clear_removes_the_file() -> ApiResult<()> {
        let dir = tempdir().map_err(|err| ApiError::Store(err.to_string()))?;
        let store = FileTokenStore::for_origin(dir.path(), "https://stock.example.com");
        store.set(TOKEN_KEY, "abc")?;
        assert!(store.path().exists());

        store.clear()?;
        assert!(!store.path().exists());
        assert_eq!(store.get(TOKEN_KEY)?, None);
        store.clear()?;
        Ok(())
    }

    #[test]
    fn stores_are_scoped_by_origin() -> ApiResult<()> {
        let dir = tempdir().map_err(|err| ApiError::Store(err.to_string()))?;
        let local = FileTokenStore::for_origin(dir.path(), "http://localhost:8080");
        let remote = FileTokenStore::for_origin(dir.path(), "https://stock.example.com");
        local.set(TOKEN_KEY, "local-token")?;

        assert_ne!(local.path(), remote.path());
        assert_eq!(remote.get(TOKEN_KEY)?, None);
        Ok(())
    }

    #[test]
    fn corrupt_file_reads_as_empty() -> ApiResult<()> {
        let dir = tempdir().map_err(|err| ApiError::Store(err.to_string()))?;
        let store = FileTokenStore::new(dir.path().join("session.json"));
        fs::write(store.path(), "{not json").map_err(|err| ApiError::Store(err.to_string()))?;

        assert_eq!(store.get(TOKEN_KEY)?, None);
        store.set(TOKEN_KEY, "fresh")?;
        assert_eq!(store.get(TOKEN_KEY)?.as_deref(), Some("fresh"));
        Ok(())
    }

    #[test]
    fn sanitize_creates_safe_filenames() {
        assert_eq!(sanitize_origin("http://localhost:8080"), "http_localhost_8080");
        assert_eq!(
            sanitize_origin("https://Stock.Example.com/api/"),
            "https_stock_example_com_api"
        );
        assert_eq!(sanitize_origin("://"), "default");
    }

    #[test]
    fn origins_that_sanitize_alike_get_distinct_files() -> ApiResult<()> {
        let dir = tempdir().map_err(|err| ApiError::Store(err.to_string()))?;
        let port = FileTokenStore::for_origin(dir.path(), "http://host:8080");
        let path = FileTokenStore::for_origin(dir.path(), "http://host/8080");
        assert_eq!(sanitize_origin("http://host:8080"), sanitize_origin("http://host/8080"));
        assert_ne!(port.path(), path.path());

        port.set(TOKEN_KEY, "port-token")?;
        assert_eq!(path.get(TOKEN_KEY)?, None);

        let name = store_file_name("http://host:8080");
        assert!(name.starts_with("http_host_8080-"));
        assert_eq!(name.len(), "http_host_8080-".len() + ORIGIN_DIGEST_LEN + ".json".len());
        assert_eq!(name, store_file_name("http://host:8080"));
        Ok(())
    }
}
