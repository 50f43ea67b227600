// src/cache.rs

use crate::error::{NilaJwtError, Result};
use crate::model::{KeySet, Metadata};
use async_trait::async_trait;
use moka::future::Cache;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// A value held by a [`MetadataStore`].
#[derive(Debug, Clone)]
pub enum CachedItem {
    Metadata(Arc<Metadata>),
    Keys(Arc<KeySet>),
}

/// The computation run by a store on a cache miss.
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<CachedItem>> + Send + 'a>>;

/// Get-or-compute storage for discovery metadata and key sets.
///
/// Implementations must run at most one `fetch` per key at a time: callers
/// that arrive while a computation is in flight wait for its result instead
/// of starting their own.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Returns the cached value for `key`, or runs `fetch`, stores its
    /// successful result and returns it. Failed fetches are not stored.
    async fn get_with(&self, key: &str, fetch: FetchFuture<'_>) -> Result<CachedItem>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str);

    fn contains(&self, key: &str) -> bool;
}

/// In-memory [`MetadataStore`] backed by `moka`.
#[derive(Clone)]
pub struct MokaStore {
    cache: Cache<String, CachedItem>,
}

impl Default for MokaStore {
    fn default() -> Self {
        Self::new(MokaStore::DEFAULT_CAPACITY, None)
    }
}

impl MokaStore {
    pub const DEFAULT_CAPACITY: u64 = 1_000;

    /// Creates a store holding at most `max_capacity` entries. When
    /// `time_to_live` is set, entries are evicted that long after insertion.
    pub fn new(max_capacity: u64, time_to_live: Option<Duration>) -> Self {
        let mut builder = Cache::builder().max_capacity(max_capacity);
        if let Some(ttl) = time_to_live {
            builder = builder.time_to_live(ttl);
        }
        Self { cache: builder.build() }
    }
}

#[async_trait]
impl MetadataStore for MokaStore {
    async fn get_with(&self, key: &str, fetch: FetchFuture<'_>) -> Result<CachedItem> {
        self.cache
            .try_get_with(key.to_string(), fetch)
            .await
            .map_err(NilaJwtError::from_shared)
    }

    async fn delete(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn metadata_item() -> CachedItem {
        CachedItem::Metadata(Arc::new(Metadata::new(serde_json::json!({ "issuer": "https://example.com" }))))
    }

    #[tokio::test]
    async fn computes_once_then_serves_cached_value() {
        let store = MokaStore::default();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let item = store
                .get_with(
                    "k",
                    Box::pin(async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, NilaJwtError>(metadata_item())
                    }),
                )
                .await
                .unwrap();
            assert!(matches!(item, CachedItem::Metadata(_)));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.contains("k"));
    }

    #[tokio::test]
    async fn failed_fetch_is_not_stored() {
        let store = MokaStore::default();
        let err = store
            .get_with("k", Box::pin(async { Err::<CachedItem, _>(NilaJwtError::InvalidMetadata("boom".to_string())) }))
            .await
            .unwrap_err();
        assert!(matches!(err.root(), NilaJwtError::InvalidMetadata(_)));
        assert!(!store.contains("k"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MokaStore::default();
        store.delete("missing").await;

        store
            .get_with("k", Box::pin(async { Ok::<_, NilaJwtError>(metadata_item()) }))
            .await
            .unwrap();
        store.delete("k").await;
        store.delete("k").await;
        assert!(!store.contains("k"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_fetch() {
        let store = MokaStore::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                store
                    .get_with(
                        "shared",
                        Box::pin(async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, NilaJwtError>(metadata_item())
                        }),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
