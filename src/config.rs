// src/config.rs

use crate::cache::{MetadataStore, MokaStore};
use crate::client::{HttpClient, JwksClient, ReqwestHttpClient};
use crate::decoder::{JsonWebTokenDecoder, TokenDecoder};
use crate::discovery::{normalize_issuer, DiscoveryMethod, OAuth, OpenIdConnect};
use crate::error::{NilaJwtError, Result};
use crate::key_cache::KeyCache;
use crate::model::ClaimsToValidate;
use crate::verifier::JwtVerifier;
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Leeway applied when none is configured, as an ISO 8601 duration.
pub const DEFAULT_LEEWAY: &str = "PT2M";

/// Default timeout for discovery and JWKS requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const ISSUER_PLACEHOLDER: &str = "{yourOktaDomain}";
const CLIENT_ID_PLACEHOLDER: &str = "{clientId}";

/// Parses an ISO 8601 duration such as `PT2M`, `PT90S`, `PT1M30.5S`, `P1D` or `P2W`.
///
/// Years and months are rejected because their length is not fixed.
pub fn parse_leeway(value: &str) -> Result<Duration> {
    let invalid = || {
        NilaJwtError::Configuration(format!(
            "It appears that the leeway `{value}` is not in ISO 8601 duration format. Please provide a duration in the format of `PT(n)S`"
        ))
    };

    if !value.contains('P') {
        return Err(invalid());
    }
    let rest = value.trim().strip_prefix('P').ok_or_else(invalid)?;
    let (date, time) = match rest.split_once('T') {
        Some((_, "")) => return Err(invalid()),
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };

    let mut seconds = 0f64;
    let mut components = 0;
    for (number, unit) in components_of(date, &['W', 'D']).ok_or_else(invalid)? {
        seconds += number * if unit == 'W' { 604_800.0 } else { 86_400.0 };
        components += 1;
    }
    if let Some(time) = time {
        for (number, unit) in components_of(time, &['H', 'M', 'S']).ok_or_else(invalid)? {
            seconds += number
                * match unit {
                    'H' => 3_600.0,
                    'M' => 60.0,
                    _ => 1.0,
                };
            components += 1;
        }
    }
    if components == 0 {
        return Err(invalid());
    }

    Duration::try_from_secs_f64(seconds).map_err(|_| invalid())
}

// Splits `1H30M` into `[(1.0, 'H'), (30.0, 'M')]`. Units must come from
// `allowed`, in that order, each at most once.
fn components_of(part: &str, allowed: &[char]) -> Option<Vec<(f64, char)>> {
    let mut out = Vec::new();
    let mut number = String::new();
    let mut next_unit = 0;

    for c in part.chars() {
        match c {
            '0'..='9' | '.' => number.push(c),
            ',' => number.push('.'),
            unit => {
                let position = allowed[next_unit..].iter().position(|u| *u == unit)? + next_unit;
                next_unit = position + 1;
                out.push((number.parse::<f64>().ok()?, unit));
                number.clear();
            }
        }
    }

    if number.is_empty() {
        Some(out)
    } else {
        None
    }
}

fn validate_issuer(issuer: Option<&str>) -> Result<&str> {
    let issuer = issuer.filter(|i| !i.is_empty()).ok_or_else(|| {
        NilaJwtError::Configuration(
            "Your issuer is missing. You can find your issuer in your authorization server settings.".to_string(),
        )
    })?;

    if !issuer.starts_with("https://") {
        return Err(NilaJwtError::Configuration(format!(
            "Your issuer must start with https. Current value: {issuer}. You can copy your issuer from your authorization server settings."
        )));
    }

    if issuer.contains(ISSUER_PLACEHOLDER) {
        return Err(NilaJwtError::Configuration(format!(
            "Replace {ISSUER_PLACEHOLDER} with your Okta domain."
        )));
    }

    Ok(issuer)
}

fn validate_client_id(client_id: Option<&str>) -> Result<&str> {
    let client_id = client_id.filter(|c| !c.is_empty()).ok_or_else(|| {
        NilaJwtError::Configuration(
            "Your client ID is missing. You can copy it from the details of the application you registered.".to_string(),
        )
    })?;

    if client_id.contains(CLIENT_ID_PLACEHOLDER) {
        return Err(NilaJwtError::Configuration(format!(
            "Replace {CLIENT_ID_PLACEHOLDER} with the client ID of your application."
        )));
    }

    Ok(client_id)
}

/// A builder for creating a [`JwtVerifier`].
///
/// `issuer` and `client_id` are required; everything else has a default.
pub struct VerifierBuilder {
    issuer: Option<String>,
    discovery: Option<Arc<dyn DiscoveryMethod>>,
    client_id: Option<String>,
    audience: Option<String>,
    nonce: Option<String>,
    leeway: Duration,
    algorithms: Vec<Algorithm>,
    decoder: Option<Arc<dyn TokenDecoder>>,
    http_client: Option<Arc<dyn HttpClient>>,
    store: Option<Arc<dyn MetadataStore>>,
    cache_ttl: Option<Duration>,
    http_timeout: Duration,
}

impl Default for VerifierBuilder {
    fn default() -> Self {
        Self {
            issuer: None,
            discovery: None,
            client_id: None,
            audience: None,
            nonce: None,
            leeway: Duration::from_secs(120),
            algorithms: vec![Algorithm::RS256],
            decoder: None,
            http_client: None,
            store: None,
            cache_ttl: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl VerifierBuilder {
    /// Creates a new `VerifierBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the issuer URL. Trailing slashes are removed.
    pub fn issuer(mut self, issuer: &str) -> Self {
        self.issuer = Some(normalize_issuer(issuer));
        self
    }

    /// Sets how the metadata document is located. Defaults to [`OAuth`].
    pub fn discovery(mut self, discovery: Arc<dyn DiscoveryMethod>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Sets the client ID, which is also checked against the `cid` claim.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the value the `aud` claim must equal.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the value the `nonce` claim must equal.
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Sets the clock skew tolerance as an ISO 8601 duration. Defaults to `PT2M`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `leeway` is not a duration.
    pub fn leeway(mut self, leeway: &str) -> Result<Self> {
        self.leeway = parse_leeway(leeway)?;
        Ok(self)
    }

    /// Sets the allowed signing algorithms. Defaults to `[Algorithm::RS256]`.
    pub fn algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Uses a custom token decoder instead of [`JsonWebTokenDecoder`].
    /// Leeway and algorithms are then the decoder's own concern.
    pub fn decoder(mut self, decoder: Arc<dyn TokenDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Uses a custom HTTP client instead of `reqwest`.
    pub fn http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Uses a custom metadata store instead of an in-memory [`MokaStore`].
    pub fn store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Evicts cached metadata and keys this long after they were fetched.
    /// Ignored when a custom store is supplied.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Sets the timeout for discovery and JWKS requests. Ignored when a custom
    /// HTTP client is supplied.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Consumes the builder and returns a [`JwtVerifier`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the issuer or client ID is missing or
    /// invalid, or if the decoder reports that it is unavailable.
    pub fn build(self) -> Result<JwtVerifier> {
        let issuer = validate_issuer(self.issuer.as_deref())?.to_string();
        let client_id = validate_client_id(self.client_id.as_deref())?.to_string();

        let decoder: Arc<dyn TokenDecoder> = match self.decoder {
            Some(decoder) => decoder,
            None => Arc::new(JsonWebTokenDecoder::new(self.algorithms, self.leeway)),
        };
        if !decoder.is_available() {
            return Err(NilaJwtError::Configuration(
                "The configured token decoder is not available".to_string(),
            ));
        }

        let http_client: Arc<dyn HttpClient> = match self.http_client {
            Some(client) => client,
            None => Arc::new(ReqwestHttpClient::with_timeout(self.http_timeout)?),
        };
        let store: Arc<dyn MetadataStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MokaStore::new(MokaStore::DEFAULT_CAPACITY, self.cache_ttl)),
        };

        let key_cache = KeyCache::new(store, JwksClient::new(http_client, decoder.clone()));
        let discovery = self.discovery.unwrap_or_else(|| Arc::new(OAuth));

        Ok(JwtVerifier::new(
            issuer,
            discovery,
            key_cache,
            decoder,
            ClaimsToValidate {
                nonce: self.nonce,
                audience: self.audience,
                client_id: Some(client_id),
            },
        ))
    }
}

/// Which well-known document to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryKind {
    #[default]
    Oauth,
    Oidc,
}

impl DiscoveryKind {
    pub fn method(&self) -> Arc<dyn DiscoveryMethod> {
        match self {
            DiscoveryKind::Oauth => Arc::new(OAuth),
            DiscoveryKind::Oidc => Arc::new(OpenIdConnect),
        }
    }
}

fn default_leeway() -> String {
    DEFAULT_LEEWAY.to_string()
}

/// Verifier settings as read from a configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifierSettings {
    pub issuer: String,
    pub client_id: String,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default = "default_leeway")]
    pub leeway: String,
    #[serde(default)]
    pub discovery: DiscoveryKind,
    #[serde(default)]
    pub algorithms: Option<Vec<Algorithm>>,
    #[serde(default)]
    pub cache_ttl_seconds: Option<u64>,
    #[serde(default)]
    pub http_timeout_seconds: Option<u64>,
}

impl VerifierSettings {
    /// Converts the settings into a builder, validating the leeway.
    pub fn into_builder(self) -> Result<VerifierBuilder> {
        let mut builder = VerifierBuilder::new()
            .issuer(&self.issuer)
            .client_id(self.client_id)
            .discovery(self.discovery.method())
            .leeway(&self.leeway)?;

        if let Some(audience) = self.audience {
            builder = builder.audience(audience);
        }
        if let Some(nonce) = self.nonce {
            builder = builder.nonce(nonce);
        }
        if let Some(algorithms) = self.algorithms {
            builder = builder.algorithms(algorithms);
        }
        if let Some(ttl) = self.cache_ttl_seconds {
            builder = builder.cache_ttl(Duration::from_secs(ttl));
        }
        if let Some(timeout) = self.http_timeout_seconds {
            builder = builder.http_timeout(Duration::from_secs(timeout));
        }
        Ok(builder)
    }
}
