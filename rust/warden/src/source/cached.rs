use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{trace, warn};
use warden_model::EntityRef;
use warden_storage::CacheBackend;

use super::MapSource;
use crate::{PermissionMap, WardenError};

/// A [CachedMapSource] acts as a transparent proxy to an inner [MapSource].
/// Maps are computed once per authority and kept in a [CacheBackend] until
/// they are explicitly forgotten; nothing expires on its own.
///
/// Concurrent misses for the same authority are collapsed: only the first
/// caller computes the map while the rest wait for it to land in the cache.
/// A cache that cannot be read is treated as empty, so an outage costs
/// recomputation rather than producing denials.
#[derive(Clone)]
pub struct CachedMapSource<Source, Cache>
where
    Source: MapSource,
    Cache: CacheBackend<Key = String, Value = Arc<PermissionMap>>,
{
    source: Source,
    cache: Cache,
    prefix: Arc<str>,
    flights: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl<Source, Cache> CachedMapSource<Source, Cache>
where
    Source: MapSource,
    Cache: CacheBackend<Key = String, Value = Arc<PermissionMap>>,
{
    /// Front `source` with `cache`, keying entries under `prefix`
    pub fn new(source: Source, cache: Cache, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            source,
            cache,
            prefix: prefix.into(),
            flights: Arc::new(DashMap::new()),
        }
    }

    /// The cache key of `authority`'s map: `{prefix}.{type}-{id}`. Any `-`
    /// or `%` inside the type or id is percent-encoded, so the separator is
    /// unambiguous and distinct authorities never share a key.
    pub fn key_for(&self, authority: &EntityRef) -> String {
        let type_tag = escape_key_part(&authority.type_tag);
        match authority.persisted_id() {
            Some(id) => format!("{}.{}-{}", self.prefix, type_tag, escape_key_part(id.as_str())),
            None => format!("{}.{}", self.prefix, type_tag),
        }
    }

    async fn lookup(&self, key: &String) -> Option<Arc<PermissionMap>> {
        match self.cache.get(key).await {
            Ok(Some(map)) => {
                trace!(key, "Permission map cache hit");
                Some(map)
            }
            Ok(None) => {
                trace!(key, "Permission map cache miss");
                None
            }
            Err(error) => {
                warn!(key, %error, "Permission map cache read failed; computing from store");
                None
            }
        }
    }
}

fn escape_key_part(part: &str) -> Cow<'_, str> {
    if part.contains(['%', '-']) {
        Cow::Owned(part.replace('%', "%25").replace('-', "%2D"))
    } else {
        Cow::Borrowed(part)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Source, Cache> MapSource for CachedMapSource<Source, Cache>
where
    Source: MapSource,
    Cache: CacheBackend<Key = String, Value = Arc<PermissionMap>>,
{
    async fn map_for(&self, authority: &EntityRef) -> Result<Arc<PermissionMap>, WardenError> {
        if !authority.is_persisted() {
            return Err(WardenError::AuthorityNotFound(authority.clone()));
        }

        let key = self.key_for(authority);
        if let Some(map) = self.lookup(&key).await {
            return Ok(map);
        }

        let flight = self.flights.entry(key.clone()).or_default().clone();
        let result = {
            let _guard = flight.lock().await;

            match self.lookup(&key).await {
                Some(map) => Ok(map),
                None => match self.source.map_for(authority).await {
                    Ok(map) => {
                        if let Err(error) = self.cache.set(key.clone(), map.clone()).await {
                            warn!(key, %error, "Permission map cache write failed");
                        }
                        Ok(map)
                    }
                    Err(error) => Err(error),
                },
            }
        };

        // Only the map itself may still hold the lock once every caller is done.
        drop(flight);
        self.flights
            .remove_if(&key, |_, flight| Arc::strong_count(flight) == 1);

        result
    }

    async fn forget(&self, authority: &EntityRef) -> Result<(), WardenError> {
        let key = self.key_for(authority);
        trace!(key, "Forgetting permission map");
        self.cache
            .delete(&key)
            .await
            .map_err(|error| WardenError::Cache(error.to_string()))
    }

    async fn forget_all(&self) -> Result<(), WardenError> {
        trace!(prefix = %self.prefix, "Forgetting every permission map");
        self.cache
            .flush()
            .await
            .map_err(|error| WardenError::Cache(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use warden_storage::{MemoryCacheBackend, WardenStorageError};

    use super::*;

    #[derive(Clone, Default)]
    struct CountingSource {
        computed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MapSource for CountingSource {
        async fn map_for(&self, _authority: &EntityRef) -> Result<Arc<PermissionMap>, WardenError> {
            self.computed.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Arc::new(PermissionMap::new(
                ["admin".to_string()],
                ["edit".to_string()],
                [],
            )))
        }

        async fn forget(&self, _authority: &EntityRef) -> Result<(), WardenError> {
            Ok(())
        }

        async fn forget_all(&self) -> Result<(), WardenError> {
            Ok(())
        }
    }

    #[derive(Clone)]
    struct UnreachableCache;

    #[async_trait]
    impl CacheBackend for UnreachableCache {
        type Key = String;
        type Value = Arc<PermissionMap>;

        async fn get(&self, _key: &String) -> Result<Option<Self::Value>, WardenStorageError> {
            Err(WardenStorageError::Cache("connection refused".into()))
        }

        async fn set(&self, _key: String, _value: Self::Value) -> Result<(), WardenStorageError> {
            Err(WardenStorageError::Cache("connection refused".into()))
        }

        async fn delete(&self, _key: &String) -> Result<(), WardenStorageError> {
            Err(WardenStorageError::Cache("connection refused".into()))
        }

        async fn flush(&self) -> Result<(), WardenStorageError> {
            Err(WardenStorageError::Cache("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn it_computes_each_map_once_until_forgotten() -> Result<()> {
        let source = CountingSource::default();
        let cached = CachedMapSource::new(
            source.clone(),
            MemoryCacheBackend::default(),
            "warden.permissions",
        );
        let user = EntityRef::new("user", 1u64);

        cached.map_for(&user).await?;
        cached.map_for(&user).await?;
        assert_eq!(source.computed.load(Ordering::SeqCst), 1);

        cached.forget(&user).await?;
        cached.map_for(&user).await?;
        assert_eq!(source.computed.load(Ordering::SeqCst), 2);

        cached.forget_all().await?;
        cached.map_for(&user).await?;
        assert_eq!(source.computed.load(Ordering::SeqCst), 3);

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn it_collapses_concurrent_misses() -> Result<()> {
        let source = CountingSource::default();
        let cached = CachedMapSource::new(
            source.clone(),
            MemoryCacheBackend::default(),
            "warden.permissions",
        );
        let user = EntityRef::new("user", 1u64);

        let lookups = (0..16).map(|_| {
            let cached = cached.clone();
            let user = user.clone();
            tokio::spawn(async move { cached.map_for(&user).await })
        });

        for lookup in futures_util::future::join_all(lookups).await {
            assert!(lookup??.allowed().contains("edit"));
        }

        assert_eq!(source.computed.load(Ordering::SeqCst), 1);
        assert!(cached.flights.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn it_falls_back_to_the_source_when_the_cache_is_down() -> Result<()> {
        let source = CountingSource::default();
        let cached = CachedMapSource::new(source.clone(), UnreachableCache, "warden.permissions");
        let user = EntityRef::new("user", 1u64);

        let map = cached.map_for(&user).await?;
        assert!(map.allowed().contains("edit"));

        let forget = cached.forget(&user).await;
        assert!(matches!(forget, Err(WardenError::Cache(_))));
        Ok(())
    }

    #[tokio::test]
    async fn it_keys_maps_by_type_and_id() {
        let cached = CachedMapSource::new(
            CountingSource::default(),
            MemoryCacheBackend::default(),
            "warden.permissions",
        );

        assert_eq!(
            cached.key_for(&EntityRef::new("user", 7u64)),
            "warden.permissions.user-7"
        );
        assert_eq!(
            cached.key_for(&EntityRef::new("team-a", "1")),
            "warden.permissions.team%2Da-1"
        );
    }

    #[tokio::test]
    async fn it_keeps_keys_distinct_when_parts_contain_separators() {
        let cached = CachedMapSource::new(
            CountingSource::default(),
            MemoryCacheBackend::default(),
            "warden.permissions",
        );

        let refs = [
            EntityRef::new("team-a", "1"),
            EntityRef::new("team", "a-1"),
            EntityRef::new("team", "a%2D1"),
            EntityRef::new("team%2Da", "1"),
            EntityRef::unsaved("team-a-1"),
        ];
        let keys: std::collections::BTreeSet<String> =
            refs.iter().map(|authority| cached.key_for(authority)).collect();

        assert_eq!(keys.len(), refs.len());
    }
}
