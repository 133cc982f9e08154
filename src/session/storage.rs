//! Durable client storage for the session token and user snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};

use super::SessionError;
use crate::types::UserRecord;

/// Storage key of the session token.
pub const TOKEN_KEY: &str = "dreambig.session_token";
/// Storage key of the serialized [`UserRecord`].
pub const USER_KEY: &str = "dreambig.user";

/// String key/value store, the client's equivalent of `localStorage`.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.entries.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// JSON object on disk, rewritten through a temporary file on every change.
///
/// I/O is synchronous and runs on the calling task while the file lock is
/// held. The file only ever holds the two session entries, so each call is
/// a single small read or write. Hosts with slower storage should implement
/// [`KeyValueStore`] over it themselves.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>, SessionError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(SessionError::Storage(format!("read {}: {e}", self.path.display()))),
        };
        match serde_json::from_str(&data) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Corrupt storage file, starting empty");
                Ok(HashMap::new())
            }
        }
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<(), SessionError> {
        let json = serde_json::to_string(entries)
            .map_err(|e| SessionError::Storage(format!("serialize: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| SessionError::Storage(format!("write {}: {e}", self.path.display())))
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> Result<(), SessionError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all()?;
        f(&mut entries);
        self.write_all(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.update(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

/// The two persisted session entries. Only the session manager writes them.
pub struct SessionStorage<S> {
    store: S,
}

impl<S: KeyValueStore> SessionStorage<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persist a fresh session. The token is written last, so a failure
    /// part-way never leaves a token without its user record.
    pub fn save(&self, token: &str, user: &UserRecord) -> Result<(), SessionError> {
        self.save_user(user)?;
        if let Err(e) = self.store.set(TOKEN_KEY, token) {
            let _ = self.store.remove(USER_KEY);
            return Err(e);
        }
        Ok(())
    }

    pub fn save_user(&self, user: &UserRecord) -> Result<(), SessionError> {
        let json = serde_json::to_string(user)
            .map_err(|e| SessionError::Storage(format!("serialize user: {e}")))?;
        self.store.set(USER_KEY, &json)
    }

    pub fn token(&self) -> Option<String> {
        self.store
            .get(TOKEN_KEY)
            .inspect_err(|e| tracing::warn!(error = %e, "Failed to read session token"))
            .ok()
            .flatten()
    }

    /// The stored user record. An unreadable record counts as absent.
    pub fn user(&self) -> Option<UserRecord> {
        let raw = self
            .store
            .get(USER_KEY)
            .inspect_err(|e| tracing::warn!(error = %e, "Failed to read user record"))
            .ok()
            .flatten()?;
        serde_json::from_str(&raw)
            .inspect_err(|e| tracing::warn!(error = %e, "Stored user record is corrupt"))
            .ok()
    }

    /// Both entries present and the user record readable.
    pub fn has_session(&self) -> bool {
        self.token().is_some() && self.user().is_some()
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        let token = self.store.remove(TOKEN_KEY);
        let user = self.store.remove(USER_KEY);
        token.and(user)
    }
}
