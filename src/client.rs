// src/client.rs

use crate::decoder::TokenDecoder;
use crate::error::{NilaJwtError, Result};
use crate::model::{KeySet, Metadata};
use async_trait::async_trait;
use bytes::Bytes;
use jsonwebtoken::jwk::Jwk;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// The transport used to fetch discovery documents and key sets.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issues a single `GET` and returns the response body.
    async fn get(&self, url: &Url) -> Result<Bytes>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client whose requests fail after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &Url) -> Result<Bytes> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NilaJwtError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?)
    }
}

// Entries are parsed one by one so a key type the decoder does not know
// about does not poison the whole set.
#[derive(Debug, Deserialize)]
struct RawKeySet {
    keys: Vec<serde_json::Value>,
}

/// Fetches discovery metadata and JSON Web Key Sets from an authorization server.
#[derive(Clone)]
pub struct JwksClient {
    // The client is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

struct Inner {
    http_client: Arc<dyn HttpClient>,
    decoder: Arc<dyn TokenDecoder>,
}

impl JwksClient {
    /// Creates a new `JwksClient`. Keys are imported with `decoder`.
    pub fn new(http_client: Arc<dyn HttpClient>, decoder: Arc<dyn TokenDecoder>) -> Self {
        Self {
            inner: Arc::new(Inner { http_client, decoder }),
        }
    }

    /// Fetches and parses the discovery document at `well_known_url`.
    #[instrument(skip(self), err)]
    pub async fn fetch_metadata(&self, well_known_url: &str) -> Result<Metadata> {
        let url = parse_url(well_known_url)?;
        debug!("Performing discovery at: {}", url);
        let body = self.inner.http_client.get(&url).await?;
        let document: serde_json::Value = serde_json::from_slice(&body)?;
        if !document.is_object() {
            return Err(NilaJwtError::InvalidMetadata(format!(
                "discovery document at {url} is not a JSON object"
            )));
        }
        Ok(Metadata::new(document))
    }

    /// Fetches the key set referenced by `metadata.jwks_uri` and imports every key.
    #[instrument(skip(self, metadata), err)]
    pub async fn fetch_keys(&self, metadata: &Metadata) -> Result<KeySet> {
        let jwks_uri = metadata.jwks_uri().ok_or_else(|| {
            NilaJwtError::InvalidMetadata("'jwks_uri' attribute not found in discovery metadata".to_string())
        })?;
        let url = parse_url(jwks_uri)?;
        debug!("Fetching JWKS from: {}", url);

        let body = self.inner.http_client.get(&url).await?;
        let raw: RawKeySet = serde_json::from_slice(&body)?;
        let keys = self.import_key_set(raw)?;

        info!("Successfully fetched {} keys from {}", keys.len(), url);
        Ok(keys)
    }

    fn import_key_set(&self, raw: RawKeySet) -> Result<KeySet> {
        let mut keys = KeySet::new();
        for entry in raw.keys {
            let jwk: Jwk = match serde_json::from_value(entry) {
                Ok(jwk) => jwk,
                Err(e) => {
                    warn!("Skipping unsupported JWK: {}", e);
                    continue;
                }
            };
            let kid = jwk
                .common
                .key_id
                .clone()
                .ok_or_else(|| NilaJwtError::InvalidKeyFormat("JWK must contain a 'kid' parameter".to_string()))?;
            let key = self.inner.decoder.import_key(&jwk)?;
            if keys.insert(kid.clone(), key).is_some() {
                warn!("Duplicate kid '{}' in JWKS, keeping the last entry", kid);
            }
        }
        Ok(keys)
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| NilaJwtError::InvalidUrl(format!("{raw}: {e}")))
}
