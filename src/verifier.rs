// src/verifier.rs

use crate::claims::validate_claims;
use crate::decoder::TokenDecoder;
use crate::discovery::DiscoveryMethod;
use crate::error::{NilaJwtError, Result};
use crate::key_cache::KeyCache;
use crate::model::{ClaimsToValidate, Jwt, KeySet, Metadata};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Verifies access and ID tokens issued by one authorization server.
///
/// A verifier should be built once (see [`crate::config::VerifierBuilder`])
/// and shared; clones share the same key cache.
///
/// When a signature does not verify, the cached metadata and keys are
/// dropped and refetched once before the failure is returned, so tokens
/// signed with a freshly rotated key are accepted.
#[derive(Clone)]
pub struct JwtVerifier {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("issuer", &self.inner.issuer)
            .finish_non_exhaustive()
    }
}

struct Inner {
    issuer: String,
    discovery: Arc<dyn DiscoveryMethod>,
    key_cache: KeyCache,
    decoder: Arc<dyn TokenDecoder>,
    claims_to_validate: ClaimsToValidate,
}

enum VerifyState {
    FetchingKeys { force_reload: bool },
    Decoding(Arc<KeySet>),
    ValidatingClaims(Jwt),
}

impl JwtVerifier {
    pub fn new(
        issuer: impl Into<String>,
        discovery: Arc<dyn DiscoveryMethod>,
        key_cache: KeyCache,
        decoder: Arc<dyn TokenDecoder>,
        claims_to_validate: ClaimsToValidate,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                issuer: issuer.into(),
                discovery,
                key_cache,
                decoder,
                claims_to_validate,
            }),
        }
    }

    /// Verifies the token's signature and the configured claims.
    #[instrument(skip(self, token), err)]
    pub async fn verify(&self, token: &str) -> Result<Jwt> {
        let mut reloaded = false;
        let mut state = VerifyState::FetchingKeys { force_reload: false };

        loop {
            state = match state {
                VerifyState::FetchingKeys { force_reload } => {
                    let keys = self
                        .inner
                        .key_cache
                        .get_keys(&self.inner.issuer, Some(self.inner.discovery.as_ref()), force_reload)
                        .await?;
                    VerifyState::Decoding(keys)
                }
                VerifyState::Decoding(keys) => match self.inner.decoder.decode(token, &keys) {
                    Ok(jwt) => VerifyState::ValidatingClaims(jwt),
                    Err(e) if e.is_signature_invalid() && !reloaded => {
                        warn!("Token signature did not verify, reloading keys for {}", self.inner.issuer);
                        reloaded = true;
                        VerifyState::FetchingKeys { force_reload: true }
                    }
                    Err(e) => return Err(e),
                },
                VerifyState::ValidatingClaims(jwt) => {
                    validate_claims(jwt.claims(), &self.inner.claims_to_validate)?;
                    debug!("Token verified for issuer {}", self.inner.issuer);
                    return Ok(jwt);
                }
            };
        }
    }

    /// Returns the issuer's discovery document.
    pub async fn get_metadata(&self) -> Result<Arc<Metadata>> {
        if self.inner.issuer.is_empty() {
            return Err(NilaJwtError::Configuration(
                "Metadata can't be fetched because no issuer was provided".to_string(),
            ));
        }
        self.inner
            .key_cache
            .get_metadata(Some(&self.inner.issuer), Some(self.inner.discovery.as_ref()))
            .await
    }

    pub fn issuer(&self) -> &str {
        &self.inner.issuer
    }

    pub fn discovery(&self) -> &dyn DiscoveryMethod {
        self.inner.discovery.as_ref()
    }

    pub fn claims_to_validate(&self) -> &ClaimsToValidate {
        &self.inner.claims_to_validate
    }

    pub fn key_cache(&self) -> &KeyCache {
        &self.inner.key_cache
    }
}
