// src/key_cache.rs

use crate::cache::{CachedItem, MetadataStore};
use crate::client::JwksClient;
use crate::discovery::{well_known_url, DiscoveryMethod, OAuth};
use crate::error::{NilaJwtError, Result};
use crate::model::{KeySet, Metadata};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument};

const METADATA_KEY_PREFIX: &str = "jwt_cached_metadata_";
const KEYS_KEY_PREFIX: &str = "jwt_cached_key_";

/// Cache key under which the discovery document for `well_known_url` is stored.
pub fn metadata_cache_key(well_known_url: &str) -> String {
    format!("{}{}", METADATA_KEY_PREFIX, digest(well_known_url))
}

/// Cache key under which the key set for `well_known_url` is stored.
pub fn keys_cache_key(well_known_url: &str) -> String {
    format!("{}{}", KEYS_KEY_PREFIX, digest(well_known_url))
}

fn digest(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// Discovery metadata and signing keys for one authorization server, read
/// through a [`MetadataStore`].
///
/// The well-known URL is derived from the first issuer and discovery method
/// this cache sees and is reused for every later call, whatever those calls pass.
#[derive(Clone)]
pub struct KeyCache {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn MetadataStore>,
    fetcher: JwksClient,
    well_known: OnceCell<String>,
}

impl KeyCache {
    pub fn new(store: Arc<dyn MetadataStore>, fetcher: JwksClient) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                fetcher,
                well_known: OnceCell::new(),
            }),
        }
    }

    /// The memoized well-known URL, once one has been derived.
    pub fn well_known_url(&self) -> Option<&str> {
        self.inner.well_known.get().map(String::as_str)
    }

    /// The metadata cache key for the memoized well-known URL.
    pub fn metadata_cache_key(&self) -> Option<String> {
        self.well_known_url().map(metadata_cache_key)
    }

    /// The key-set cache key for the memoized well-known URL.
    pub fn keys_cache_key(&self) -> Option<String> {
        self.well_known_url().map(keys_cache_key)
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.inner.store
    }

    fn resolve_well_known(&self, issuer: Option<&str>, discovery: Option<&dyn DiscoveryMethod>) -> Result<&str> {
        if let Some(url) = self.inner.well_known.get() {
            return Ok(url);
        }
        let issuer = issuer.filter(|i| !i.is_empty()).ok_or_else(|| {
            NilaJwtError::Configuration("Metadata can't be fetched because no issuer was provided".to_string())
        })?;
        let discovery = discovery.unwrap_or(&OAuth);
        let url = self.inner.well_known.get_or_init(|| well_known_url(issuer, discovery));
        debug!("Using well-known URL: {}", url);
        Ok(url)
    }

    /// Returns the discovery document, fetching it on a cache miss.
    ///
    /// `issuer` may be omitted once a well-known URL has been memoized.
    #[instrument(skip(self, discovery), err)]
    pub async fn get_metadata(
        &self,
        issuer: Option<&str>,
        discovery: Option<&dyn DiscoveryMethod>,
    ) -> Result<Arc<Metadata>> {
        let url = self.resolve_well_known(issuer, discovery)?;
        self.metadata_for(url).await
    }

    async fn metadata_for(&self, url: &str) -> Result<Arc<Metadata>> {
        let key = metadata_cache_key(url);
        let item = self.inner.store.get_with(&key, Box::pin(self.fetch_metadata_item(url))).await?;

        match item {
            CachedItem::Metadata(metadata) => Ok(metadata),
            CachedItem::Keys(_) => Err(NilaJwtError::Configuration(format!(
                "cache entry {key} holds a key set, expected discovery metadata"
            ))),
        }
    }

    async fn fetch_metadata_item(&self, url: &str) -> Result<CachedItem> {
        debug!("Metadata cache miss for {}", url);
        let metadata = self.inner.fetcher.fetch_metadata(url).await?;
        Ok(CachedItem::Metadata(Arc::new(metadata)))
    }

    // Runs on a key cache miss; the metadata still goes through the cache.
    async fn fetch_keys_item(&self, url: &str) -> Result<CachedItem> {
        debug!("Key cache miss for {}", url);
        let metadata = self.metadata_for(url).await?;
        let keys = self.inner.fetcher.fetch_keys(&metadata).await?;
        Ok(CachedItem::Keys(Arc::new(keys)))
    }

    /// Returns the signing keys, fetching metadata and the JWKS on a cache miss.
    ///
    /// With `force_reload`, both cached entries are removed first so the whole
    /// fetch chain runs again.
    #[instrument(skip(self, discovery), err)]
    pub async fn get_keys(
        &self,
        issuer: &str,
        discovery: Option<&dyn DiscoveryMethod>,
        force_reload: bool,
    ) -> Result<Arc<KeySet>> {
        let url = self.resolve_well_known(Some(issuer), discovery)?;
        let key = keys_cache_key(url);

        if force_reload {
            debug!("Forcing reload of metadata and keys for {}", url);
            self.inner.store.delete(&metadata_cache_key(url)).await;
            self.inner.store.delete(&key).await;
        }

        let item = self.inner.store.get_with(&key, Box::pin(self.fetch_keys_item(url))).await?;

        match item {
            CachedItem::Keys(keys) => Ok(keys),
            CachedItem::Metadata(_) => Err(NilaJwtError::Configuration(format!(
                "cache entry {key} holds discovery metadata, expected a key set"
            ))),
        }
    }
}
