use std::sync::Arc;

use async_trait::async_trait;

use crate::{CacheBackend, TaggedCacheBackend, WardenStorageError};

/// A [Partition] acts as a view over a [TaggedCacheBackend] that confines
/// writes and flushes to a single tag. Entries written by anyone else sharing
/// the backend survive a [CacheBackend::flush] of the partition.
#[derive(Clone)]
pub struct Partition<Backend>
where
    Backend: TaggedCacheBackend,
{
    backend: Backend,
    tag: Arc<str>,
}

impl<Backend> Partition<Backend>
where
    Backend: TaggedCacheBackend,
{
    /// Scope the provided [TaggedCacheBackend] to `tag`
    pub fn new(backend: Backend, tag: impl Into<Arc<str>>) -> Self {
        Self {
            backend,
            tag: tag.into(),
        }
    }

    /// The tag this partition writes under
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Backend> CacheBackend for Partition<Backend>
where
    Backend: TaggedCacheBackend,
{
    type Key = Backend::Key;
    type Value = Backend::Value;

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, WardenStorageError> {
        self.backend.get(key).await
    }

    async fn set(&self, key: Self::Key, value: Self::Value) -> Result<(), WardenStorageError> {
        self.backend.set_tagged(&self.tag, key, value).await
    }

    async fn delete(&self, key: &Self::Key) -> Result<(), WardenStorageError> {
        self.backend.delete(key).await
    }

    async fn flush(&self) -> Result<(), WardenStorageError> {
        self.backend.flush_tag(&self.tag).await
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::MemoryCacheBackend;

    #[tokio::test]
    async fn it_can_wrap_a_shared_cache_in_a_partition() -> Result<()> {
        let shared = MemoryCacheBackend::<String, u32>::default();
        let partition = Partition::new(shared.clone(), "warden");

        shared.set("session".into(), 1).await?;
        partition.set("map".into(), 2).await?;

        assert_eq!(partition.get(&"map".into()).await?, Some(2));

        partition.flush().await?;

        assert_eq!(partition.get(&"map".into()).await?, None);
        assert_eq!(shared.get(&"session".into()).await?, Some(1));

        Ok(())
    }
}
