use crate::common::{FaceLockError, Result};
use crate::core::embedding::Embedding;
use crate::core::matcher::Identity;
use crate::storage::{new_identity_id, newest_first, AccessEvent, Datastore};
use chrono::Utc;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    identities: Vec<Identity>,
    events: Vec<AccessEvent>,
}

/// Process-local datastore. Can be told to reject writes so callers'
/// failure paths can be exercised.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identities(identities: Vec<Identity>) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.identities = identities;
        }
        store
    }

    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.lock() {
            *flag = fail;
        }
    }

    /// All events in insertion order.
    pub fn events(&self) -> Vec<AccessEvent> {
        self.inner.lock().map(|inner| inner.events.clone()).unwrap_or_default()
    }

    fn check_writable(&self) -> Result<()> {
        let failing = self.fail_writes.lock().map(|flag| *flag).unwrap_or(false);
        if failing {
            Err(FaceLockError::Persistence("datastore rejected the write".into()))
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| FaceLockError::Persistence("memory store poisoned".into()))
    }
}

impl Datastore for MemoryStore {
    fn list_identities(&self) -> Result<Vec<Identity>> {
        Ok(self.lock()?.identities.clone())
    }

    fn identity_exists(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.identities.iter().any(|identity| identity.name == name))
    }

    fn create_identity(&self, name: &str, embeddings: Vec<Embedding>) -> Result<Identity> {
        self.check_writable()?;
        let identity = Identity {
            id: new_identity_id(),
            name: name.to_string(),
            embeddings,
            created_at: Utc::now(),
        };
        self.lock()?.identities.push(identity.clone());
        Ok(identity)
    }

    fn append_access_event(&self, event: &AccessEvent) -> Result<()> {
        self.check_writable()?;
        self.lock()?.events.push(event.clone());
        Ok(())
    }

    fn list_access_events(&self, limit: usize) -> Result<Vec<AccessEvent>> {
        Ok(newest_first(self.lock()?.events.clone(), limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_writes_leave_store_untouched() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(matches!(
            store.create_identity("alice", vec![vec![0.0]]),
            Err(FaceLockError::Persistence(_))
        ));
        assert!(store.append_access_event(&AccessEvent::denied(50)).is_err());
        assert!(store.list_identities().unwrap().is_empty());
        assert!(store.events().is_empty());
    }

    #[test]
    fn created_identities_are_listed() {
        let store = MemoryStore::new();
        let created = store.create_identity("alice", vec![vec![1.0, 0.0]]).unwrap();
        assert!(store.identity_exists("alice").unwrap());
        assert!(!store.identity_exists("bob").unwrap());
        assert_eq!(store.list_identities().unwrap(), vec![created]);
    }
}
