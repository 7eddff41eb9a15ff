use std::{collections::HashMap, hash::Hash, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{CacheBackend, ConditionalSync, TaggedCacheBackend, WardenStorageError};

struct Entry<Value> {
    value: Value,
    tag: Option<String>,
}

/// An unbounded, in-process [CacheBackend] backed by a [HashMap]. Supports
/// tags, so it can be shared between several [crate::Partition]s.
#[derive(Clone)]
pub struct MemoryCacheBackend<Key, Value> {
    entries: Arc<RwLock<HashMap<Key, Entry<Value>>>>,
}

impl<Key, Value> Default for MemoryCacheBackend<Key, Value> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<Key, Value> MemoryCacheBackend<Key, Value>
where
    Key: Eq + Hash,
{
    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether a value is cached against `key`
    pub fn contains(&self, key: &Key) -> bool {
        self.entries.read().contains_key(key)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Key, Value> CacheBackend for MemoryCacheBackend<Key, Value>
where
    Key: Clone + Eq + Hash + ConditionalSync,
    Value: Clone + ConditionalSync,
{
    type Key = Key;
    type Value = Value;

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, WardenStorageError> {
        Ok(self
            .entries
            .read()
            .get(key)
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: Self::Key, value: Self::Value) -> Result<(), WardenStorageError> {
        self.entries.write().insert(key, Entry { value, tag: None });
        Ok(())
    }

    async fn delete(&self, key: &Self::Key) -> Result<(), WardenStorageError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn flush(&self) -> Result<(), WardenStorageError> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Key, Value> TaggedCacheBackend for MemoryCacheBackend<Key, Value>
where
    Key: Clone + Eq + Hash + ConditionalSync,
    Value: Clone + ConditionalSync,
{
    async fn set_tagged(
        &self,
        tag: &str,
        key: Self::Key,
        value: Self::Value,
    ) -> Result<(), WardenStorageError> {
        self.entries.write().insert(
            key,
            Entry {
                value,
                tag: Some(tag.to_owned()),
            },
        );
        Ok(())
    }

    async fn flush_tag(&self, tag: &str) -> Result<(), WardenStorageError> {
        self.entries
            .write()
            .retain(|_, entry| entry.tag.as_deref() != Some(tag));
        Ok(())
    }
}
