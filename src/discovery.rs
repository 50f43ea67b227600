// src/discovery.rs

use std::fmt::Debug;

/// Produces the well-known path suffix used to locate an authorization
/// server's metadata document.
pub trait DiscoveryMethod: Debug + Send + Sync {
    /// The path appended to the issuer, e.g. `/.well-known/openid-configuration`.
    fn well_known_suffix(&self) -> &str;
}

/// OAuth 2.0 Authorization Server Metadata (RFC 8414). This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct OAuth;

impl DiscoveryMethod for OAuth {
    fn well_known_suffix(&self) -> &str {
        "/.well-known/oauth-authorization-server"
    }
}

/// OpenID Connect Discovery 1.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenIdConnect;

impl DiscoveryMethod for OpenIdConnect {
    fn well_known_suffix(&self) -> &str {
        "/.well-known/openid-configuration"
    }
}

/// Joins an issuer and a discovery suffix into the metadata document URL.
///
/// The issuer is expected to already be normalized (no trailing slash).
pub fn well_known_url(issuer: &str, discovery: &dyn DiscoveryMethod) -> String {
    format!("{}{}", issuer, discovery.well_known_suffix())
}

/// Trims every trailing `/` from an issuer.
pub fn normalize_issuer(issuer: &str) -> String {
    issuer.trim_end_matches('/').to_string()
}
