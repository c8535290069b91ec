//! Entry store backends for identity records.
//!
//! Two interchangeable variants exist:
//! - [`LocalEntryStore`] keeps records natively in a process-local map
//! - [`SharedEntryStore`] keeps JSON payloads in an external [`SharedCache`]

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

use super::identity::IdentityKey;
use super::record::IdentityRecord;
use crate::error::Result;

/// Version tag appended to shared cache keys.
///
/// Bump it when the serialized record layout changes incompatibly so old
/// payloads are ignored instead of misread.
pub const PAYLOAD_VERSION: &str = "v1";

/// Storage for one identity record per hashed identity.
///
/// Implementations provide no atomicity; the engine serializes
/// read-modify-write cycles per key.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Load the record stored under `key`, if any.
    async fn load(&self, key: &IdentityKey) -> Result<Option<IdentityRecord>>;

    /// Store `record` under `key`, replacing any previous record.
    async fn save(&self, key: &IdentityKey, record: &IdentityRecord) -> Result<()>;

    /// Short backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Process-local store holding records by value.
///
/// Entries carry no cache-level expiry; stale signatures are pruned by the
/// engine and empty records are dropped on save.
#[derive(Debug, Default)]
pub struct LocalEntryStore {
    records: DashMap<String, IdentityRecord>,
}

impl LocalEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identities with a stored record.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every stored record.
    pub fn clear(&self) {
        self.records.clear();
    }
}

#[async_trait]
impl EntryStore for LocalEntryStore {
    async fn load(&self, key: &IdentityKey) -> Result<Option<IdentityRecord>> {
        Ok(self
            .records
            .get(key.as_str())
            .map(|entry| entry.value().clone()))
    }

    async fn save(&self, key: &IdentityKey, record: &IdentityRecord) -> Result<()> {
        if record.is_empty() {
            self.records.remove(key.as_str());
        } else {
            self.records.insert(key.as_str().to_string(), record.clone());
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

/// Byte-oriented external cache, e.g. Redis.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Fetch the payload under `key`; `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete `key`; deleting an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Store that serializes records to JSON in a [`SharedCache`].
pub struct SharedEntryStore {
    cache: Arc<dyn SharedCache>,
}

impl SharedEntryStore {
    pub fn new(cache: Arc<dyn SharedCache>) -> Self {
        Self { cache }
    }

    /// Cache key for an identity: the hashed identity plus the payload version.
    pub fn cache_key(key: &IdentityKey) -> String {
        format!("{}.{}", key, PAYLOAD_VERSION)
    }
}

impl std::fmt::Debug for SharedEntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedEntryStore")
            .field("payload_version", &PAYLOAD_VERSION)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EntryStore for SharedEntryStore {
    async fn load(&self, key: &IdentityKey) -> Result<Option<IdentityRecord>> {
        let cache_key = Self::cache_key(key);
        match self.cache.get(&cache_key).await? {
            Some(payload) => {
                trace!(cache_key = %cache_key, bytes = payload.len(), "Decoding shared record");
                Ok(Some(serde_json::from_slice(&payload)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, key: &IdentityKey, record: &IdentityRecord) -> Result<()> {
        let cache_key = Self::cache_key(key);
        if record.is_empty() {
            return self.cache.remove(&cache_key).await;
        }

        let payload = serde_json::to_vec(record)?;
        self.cache.set(&cache_key, payload).await
    }

    fn backend_name(&self) -> &'static str {
        "shared"
    }
}

/// Shared cache kept in process memory.
///
/// Useful for single-node deployments and tests; it exercises the same
/// serialization path as a real external cache.
#[derive(Debug, Default)]
pub struct InMemorySharedCache {
    entries: DashMap<String, Vec<u8>>,
}

impl InMemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw payload under `key`.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Write a raw payload, bypassing serialization.
    pub fn insert_raw(&self, key: impl Into<String>, value: Vec<u8>) {
        self.entries.insert(key.into(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BruteGuardError;
    use crate::throttle::request::ClientRequest;
    use chrono::Utc;

    fn sample_record(identity: &str) -> IdentityRecord {
        let mut record = IdentityRecord::new(identity);
        let request = ClientRequest::new(identity, "POST", "/login");
        record.record_hit("login", &request, Utc::now());
        record.record_hit("login", &request, Utc::now());
        record
    }

    #[test]
    fn test_local_store_round_trip() {
        tokio_test::block_on(async {
            let store = LocalEntryStore::new();
            let key = IdentityKey::derive("127.0.0.1");

            assert!(store.load(&key).await.unwrap().is_none());

            let record = sample_record("127.0.0.1");
            store.save(&key, &record).await.unwrap();

            assert_eq!(store.load(&key).await.unwrap(), Some(record));
            assert_eq!(store.len(), 1);
        });
    }

    #[test]
    fn test_local_store_drops_empty_record() {
        tokio_test::block_on(async {
            let store = LocalEntryStore::new();
            let key = IdentityKey::derive("127.0.0.1");

            store.save(&key, &sample_record("127.0.0.1")).await.unwrap();
            store
                .save(&key, &IdentityRecord::new("127.0.0.1"))
                .await
                .unwrap();

            assert!(store.is_empty());
            assert!(store.load(&key).await.unwrap().is_none());
        });
    }

    #[test]
    fn test_shared_store_uses_versioned_key() {
        tokio_test::block_on(async {
            let cache = Arc::new(InMemorySharedCache::new());
            let store = SharedEntryStore::new(cache.clone());
            let key = IdentityKey::derive("10.0.0.1");

            store.save(&key, &sample_record("10.0.0.1")).await.unwrap();

            let expected = format!("{}.v1", key);
            assert_eq!(cache.keys(), vec![expected.clone()]);
            assert!(cache.raw(key.as_str()).is_none());

            let payload = String::from_utf8(cache.raw(&expected).unwrap()).unwrap();
            assert!(payload.contains("\"hitCount\":2"));
        });
    }

    #[test]
    fn test_shared_store_round_trip() {
        tokio_test::block_on(async {
            let store = SharedEntryStore::new(Arc::new(InMemorySharedCache::new()));
            let key = IdentityKey::derive("10.0.0.1");
            let record = sample_record("10.0.0.1");

            store.save(&key, &record).await.unwrap();
            assert_eq!(store.load(&key).await.unwrap(), Some(record));
        });
    }

    #[test]
    fn test_shared_store_ignores_unversioned_payload() {
        tokio_test::block_on(async {
            let cache = Arc::new(InMemorySharedCache::new());
            let store = SharedEntryStore::new(cache.clone());
            let key = IdentityKey::derive("10.0.0.1");

            cache.insert_raw(key.as_str(), b"legacy binary payload".to_vec());
            assert!(store.load(&key).await.unwrap().is_none());
        });
    }

    #[test]
    fn test_shared_store_corrupt_payload_is_an_error() {
        tokio_test::block_on(async {
            let cache = Arc::new(InMemorySharedCache::new());
            let store = SharedEntryStore::new(cache.clone());
            let key = IdentityKey::derive("10.0.0.1");

            cache.insert_raw(SharedEntryStore::cache_key(&key), b"{not json".to_vec());

            let result = store.load(&key).await;
            assert!(matches!(result, Err(BruteGuardError::Serialization(_))));
        });
    }

    #[test]
    fn test_shared_store_removes_empty_record() {
        tokio_test::block_on(async {
            let cache = Arc::new(InMemorySharedCache::new());
            let store = SharedEntryStore::new(cache.clone());
            let key = IdentityKey::derive("10.0.0.1");

            store.save(&key, &sample_record("10.0.0.1")).await.unwrap();
            store
                .save(&key, &IdentityRecord::new("10.0.0.1"))
                .await
                .unwrap();

            assert!(cache.is_empty());
        });
    }
}
