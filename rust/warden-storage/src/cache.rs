use async_trait::async_trait;

use crate::{ConditionalSend, ConditionalSync, WardenStorageError};

mod memory;
pub use memory::*;

mod partition;
pub use partition::*;

/// A [CacheBackend] is a facade over a key/value cache. Entries never expire
/// on their own: whoever writes to the cache is responsible for deleting
/// entries once they go stale.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait CacheBackend: Clone + ConditionalSync {
    /// The key type used by this [CacheBackend]
    type Key: ConditionalSync;
    /// The value type able to be cached by this [CacheBackend]
    type Value: ConditionalSend;

    /// Retrieve the value (if any) cached against the given key
    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, WardenStorageError>;
    /// Cache the given value against the given key, without expiry
    async fn set(&self, key: Self::Key, value: Self::Value) -> Result<(), WardenStorageError>;
    /// Forget the value cached against the given key
    async fn delete(&self, key: &Self::Key) -> Result<(), WardenStorageError>;
    /// Forget every cached value
    async fn flush(&self) -> Result<(), WardenStorageError>;
}

/// A [CacheBackend] that can label entries with a tag and flush every entry
/// carrying a tag without touching the rest of the cache.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait TaggedCacheBackend: CacheBackend {
    /// Cache the given value against the given key, labelled with `tag`
    async fn set_tagged(
        &self,
        tag: &str,
        key: Self::Key,
        value: Self::Value,
    ) -> Result<(), WardenStorageError>;
    /// Forget every value labelled with `tag`
    async fn flush_tag(&self, tag: &str) -> Result<(), WardenStorageError>;
}
