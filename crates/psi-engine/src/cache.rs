//! Cache adapter contract consulted by the engine
//!
//! Entries are write-once: a cache key encodes the plaintext and the key
//! material, so a second, different value under the same key means the key
//! material drifted or the key derivation collided. Both must surface.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::error::CacheError;

#[async_trait]
pub trait PsiCache: Send + Sync {
    /// Look up a value. Absent keys are `Ok(None)`, never an error.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value under a key that must not already hold a different one.
    ///
    /// Re-putting the identical value is accepted as a no-op.
    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// Caching disabled: nothing is ever found, every put succeeds
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl PsiCache for NoCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Process-local cache. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<DashMap<String, String>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PsiCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        // the entry guard holds the shard lock, so racing writers serialize here
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(existing) if existing.get() == value => Ok(()),
            Entry::Occupied(_) => Err(CacheError::KeyConflict {
                key: key.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(value.to_string());
                Ok(())
            }
        }
    }
}
