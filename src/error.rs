// src/error.rs

use jsonwebtoken::Algorithm;
use std::sync::Arc;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NilaJwtError>;

/// The claims the verifier checks against values supplied at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimName {
    Nonce,
    Audience,
    ClientId,
}

impl ClaimName {
    /// The claim key as it appears in the token payload.
    pub fn key(&self) -> &'static str {
        match self {
            ClaimName::Nonce => "nonce",
            ClaimName::Audience => "aud",
            ClaimName::ClientId => "cid",
        }
    }

    /// The `VerifierBuilder` setter that supplies the expected value.
    pub fn setter(&self) -> &'static str {
        match self {
            ClaimName::Nonce => "nonce()",
            ClaimName::Audience => "audience()",
            ClaimName::ClientId => "client_id()",
        }
    }
}

impl std::fmt::Display for ClaimName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClaimName::Nonce => "nonce",
            ClaimName::Audience => "audience",
            ClaimName::ClientId => "client id",
        };
        f.write_str(name)
    }
}

/// The primary error type for the `nila-jwt-verifier` library.
///
/// Failures raised while fetching metadata or keys go through the
/// single-flight cache and may reach the caller wrapped in
/// [`NilaJwtError::Shared`] when several callers waited on the same fetch.
/// Match on [`NilaJwtError::root`] (or use the `is_*` helpers) rather than on
/// the returned value itself:
///
/// ```
/// use nila_jwt_verifier::prelude::NilaJwtError;
/// use std::sync::Arc;
///
/// let err = NilaJwtError::Shared(Arc::new(NilaJwtError::InvalidMetadata("no jwks_uri".into())));
/// assert!(matches!(err.root(), NilaJwtError::InvalidMetadata(_)));
/// assert!(!matches!(err, NilaJwtError::InvalidMetadata(_)));
/// ```
#[derive(Debug, Error)]
pub enum NilaJwtError {
    /// The verifier is missing configuration or was given an invalid value.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The discovery document does not describe a usable key endpoint.
    #[error("Invalid discovery metadata: {0}")]
    InvalidMetadata(String),

    /// No key in the current key set validates the token signature.
    #[error("Signature verification failed: no key in the key set validates the token")]
    SignatureInvalid,

    /// A claim does not match the value configured on the builder.
    #[error("{claim} does not match what is expected (expected: {expected:?}, actual: {actual:?}). Make sure to provide the {claim} with `{setter}` from the VerifierBuilder.", setter = .claim.setter())]
    ClaimMismatch {
        claim: ClaimName,
        expected: Option<String>,
        actual: Option<serde_json::Value>,
    },

    /// An error occurred during an HTTP request.
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("HTTP GET {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    /// A response body could not be parsed as JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Errors originating from the `jsonwebtoken` crate during token decoding.
    #[error("JWT validation error: {0}")]
    JwtValidation(#[from] jsonwebtoken::errors::Error),

    /// The algorithm specified in the JWT header is not allowed by the configuration.
    #[error("Unsupported algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    /// A JSON Web Key is malformed or cannot be imported.
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// An error produced once by a cache computation and shared with every
    /// caller that was waiting on the same key.
    #[error(transparent)]
    Shared(Arc<NilaJwtError>),
}

impl NilaJwtError {
    /// Returns the underlying error, looking through shared cache failures.
    pub fn root(&self) -> &NilaJwtError {
        match self {
            NilaJwtError::Shared(inner) => inner.root(),
            other => other,
        }
    }

    /// Unwraps an error shared by a cache computation when this is the only
    /// remaining reference, otherwise keeps it shared.
    pub(crate) fn from_shared(err: Arc<NilaJwtError>) -> Self {
        match Arc::try_unwrap(err) {
            Ok(err) => err,
            Err(shared) => NilaJwtError::Shared(shared),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.root(), NilaJwtError::Configuration(_))
    }

    pub fn is_signature_invalid(&self) -> bool {
        matches!(self.root(), NilaJwtError::SignatureInvalid)
    }
}
