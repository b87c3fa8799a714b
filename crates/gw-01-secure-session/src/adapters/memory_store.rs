//! In-memory PSK store. Provisioned at startup, read concurrently by
//! handshakes afterwards.

use std::collections::HashMap;

use parking_lot::RwLock;
use shared_crypto::SecretKey;

use crate::domain::{KeyStoreError, PskEntry};
use crate::ports::outbound::PskKeyStore;

#[derive(Debug, Default)]
pub struct InMemoryPskStore {
    entries: RwLock<HashMap<Vec<u8>, SecretKey>>,
}

impl InMemoryPskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from entries, rejecting duplicate identities.
    pub fn with_entries(entries: impl IntoIterator<Item = PskEntry>) -> Result<Self, KeyStoreError> {
        let store = Self::new();
        for entry in entries {
            store.insert(entry)?;
        }
        Ok(store)
    }

    /// Entries are immutable: re-inserting an identity fails.
    pub fn insert(&self, entry: PskEntry) -> Result<(), KeyStoreError> {
        let mut entries = self.entries.write();
        let identity = entry.identity().as_bytes().to_vec();
        if entries.contains_key(&identity) {
            return Err(KeyStoreError::DuplicateIdentity);
        }
        entries.insert(identity, entry.secret().clone());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl PskKeyStore for InMemoryPskStore {
    fn lookup(&self, identity: &[u8]) -> Result<SecretKey, KeyStoreError> {
        self.entries
            .read()
            .get(identity)
            .cloned()
            .ok_or(KeyStoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_lookup_hit_and_miss() {
        let store =
            InMemoryPskStore::with_entries([PskEntry::new("Client_identity", "secretPSK").unwrap()])
                .unwrap();
        assert_eq!(store.lookup(b"Client_identity").unwrap().as_bytes(), b"secretPSK");
        assert_eq!(store.lookup(b"nobody").unwrap_err(), KeyStoreError::NotFound);
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let store = InMemoryPskStore::new();
        store.insert(PskEntry::new("a", "one").unwrap()).unwrap();
        assert_eq!(
            store.insert(PskEntry::new("a", "two").unwrap()).unwrap_err(),
            KeyStoreError::DuplicateIdentity
        );
        assert_eq!(store.lookup(b"a").unwrap().as_bytes(), b"one");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_reads() {
        let store = Arc::new(
            InMemoryPskStore::with_entries([PskEntry::new("dev", "k").unwrap()]).unwrap(),
        );
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(store.lookup(b"dev").is_ok());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
