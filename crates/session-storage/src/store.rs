//! Session state blob persistence.

use crate::{StateStorage, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Persists one opaque session state blob under `<session name>-<auth type>`.
#[derive(Clone)]
pub struct SessionStateStore {
    storage: Arc<dyn StateStorage>,
    key: String,
}

impl SessionStateStore {
    pub fn new(storage: Arc<dyn StateStorage>, session_name: &str, auth_type: &str) -> Self {
        Self {
            storage,
            key: format!("{}-{}", session_name, auth_type),
        }
    }

    /// The derived storage key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Serialize and store the state.
    pub fn put<T: Serialize>(&self, state: &T) -> StorageResult<()> {
        let encoded = serde_json::to_string(state)?;
        self.storage.set(&self.key, &encoded)
    }

    /// Load the stored state.
    ///
    /// A blob that no longer decodes is logged and treated as absent.
    pub fn get<T: DeserializeOwned>(&self) -> StorageResult<Option<T>> {
        let Some(raw) = self.storage.get(&self.key)? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Discarding unreadable session state");
                Ok(None)
            }
        }
    }

    /// Remove the stored state. Returns whether anything was stored.
    pub fn remove(&self) -> StorageResult<bool> {
        self.storage.delete(&self.key)
    }
}

impl std::fmt::Debug for SessionStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStateStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        user: String,
        token: String,
    }

    #[test]
    fn test_key_is_session_name_dash_auth_type() {
        let store = SessionStateStore::new(Arc::new(MemoryStorage::new()), "angular", "mockAuth");
        assert_eq!(store.key(), "angular-mockAuth");
    }

    #[test]
    fn test_put_get_remove() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStateStore::new(storage.clone(), "angular", "mockAuth");

        assert_eq!(store.get::<Blob>().unwrap(), None);

        let blob = Blob {
            user: "alice".to_string(),
            token: "T1".to_string(),
        };
        store.put(&blob).unwrap();
        assert!(storage.has("angular-mockAuth").unwrap());
        assert_eq!(store.get::<Blob>().unwrap(), Some(blob));

        assert!(store.remove().unwrap());
        assert!(!store.remove().unwrap());
        assert_eq!(store.get::<Blob>().unwrap(), None);
    }

    #[test]
    fn test_corrupt_blob_reads_as_absent() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("angular-mockAuth", "{not json").unwrap();

        let store = SessionStateStore::new(storage, "angular", "mockAuth");
        assert_eq!(store.get::<Blob>().unwrap(), None);
    }

    #[test]
    fn test_sessions_with_different_names_do_not_collide() {
        let storage: Arc<dyn StateStorage> = Arc::new(MemoryStorage::new());
        let a = SessionStateStore::new(storage.clone(), "a", "mockAuth");
        let b = SessionStateStore::new(storage, "b", "mockAuth");

        a.put(&"first").unwrap();
        assert_eq!(b.get::<String>().unwrap(), None);
        assert_eq!(a.get::<String>().unwrap().as_deref(), Some("first"));
    }
}
