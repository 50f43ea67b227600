// src/lib.rs

//! Cache-aware verification of JWTs issued by OAuth2/OIDC authorization servers.
//!
//! The verifier discovers the issuer's signing keys through its well-known
//! metadata document, caches both, and on a signature failure reloads them
//! once before giving up.

pub mod cache;
pub mod claims;
pub mod client;
pub mod config;
pub mod decoder;
pub mod discovery;
pub mod error;
pub mod key_cache;
pub mod model;
pub mod verifier;

/// The public prelude for the `nila-jwt-verifier` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::cache::{MetadataStore, MokaStore};
    pub use crate::client::{HttpClient, ReqwestHttpClient};
    pub use crate::config::{VerifierBuilder, VerifierSettings};
    pub use crate::decoder::{JsonWebTokenDecoder, TokenDecoder};
    pub use crate::discovery::{DiscoveryMethod, OAuth, OpenIdConnect};
    pub use crate::error::{ClaimName, NilaJwtError};
    pub use crate::model::{Claims, ClaimsToValidate, Jwt, KeySet, Metadata};
    pub use crate::verifier::JwtVerifier;
    pub use jsonwebtoken::Algorithm;
}
