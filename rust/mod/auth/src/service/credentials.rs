use std::sync::Arc;

use mirror_kv::KVStore;

use crate::service::AuthError;

const PREFIX: &str = "auth:credentials:";

/// Password that last logged in successfully, per username. Entries do not
/// expire; a later successful login overwrites them.
pub struct CredentialCache {
    kv: Arc<dyn KVStore>,
}

impl CredentialCache {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self { kv }
    }

    fn key(username: &str) -> String {
        format!("{PREFIX}{username}")
    }

    pub fn store(&self, username: &str, password: &str) -> Result<(), AuthError> {
        self.kv
            .set(&Self::key(username), password.as_bytes())
            .map_err(|e| AuthError::Storage(e.to_string()))
    }

    pub fn get(&self, username: &str) -> Result<Option<String>, AuthError> {
        let Some(raw) = self
            .kv
            .get(&Self::key(username))
            .map_err(|e| AuthError::Storage(e.to_string()))?
        else {
            return Ok(None);
        };
        String::from_utf8(raw)
            .map(Some)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    pub fn forget(&self, username: &str) -> Result<(), AuthError> {
        self.kv
            .delete(&Self::key(username))
            .map_err(|e| AuthError::Storage(e.to_string()))
    }

    /// Usernames with a cached password, sorted.
    pub fn usernames(&self) -> Result<Vec<String>, AuthError> {
        let entries = self
            .kv
            .scan(PREFIX)
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        Ok(entries
            .into_iter()
            .map(|(key, _)| key[PREFIX.len()..].to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_kv::{MemoryStore, RedbStore};

    #[test]
    fn store_get_forget() {
        let cache = CredentialCache::new(Arc::new(MemoryStore::new()));
        assert_eq!(cache.get("alice").unwrap(), None);
        cache.store("alice", "secret").unwrap();
        cache.store("alice", "newer").unwrap();
        cache.store("bob", "hunter2").unwrap();
        assert_eq!(cache.get("alice").unwrap().as_deref(), Some("newer"));
        assert_eq!(cache.usernames().unwrap(), vec!["alice", "bob"]);
        cache.forget("alice").unwrap();
        assert_eq!(cache.get("alice").unwrap(), None);
    }

    #[test]
    fn survives_reopen_on_redb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.redb");
        {
            let cache = CredentialCache::new(Arc::new(RedbStore::open(&path).unwrap()));
            cache.store("alice", "secret").unwrap();
        }
        let cache = CredentialCache::new(Arc::new(RedbStore::open(&path).unwrap()));
        assert_eq!(cache.get("alice").unwrap().as_deref(), Some("secret"));
    }
}
