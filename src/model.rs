// src/model.rs

use jsonwebtoken::{DecodingKey, Header};
use serde::Deserialize;
use std::fmt;

/// The parsed discovery document published at the issuer's well-known URL.
///
/// Only `jwks_uri` is interpreted; everything else is kept as-is for callers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Metadata(serde_json::Value);

impl Metadata {
    pub fn new(document: serde_json::Value) -> Self {
        Self(document)
    }

    /// The location of the JSON Web Key Set, if the document declares one.
    pub fn jwks_uri(&self) -> Option<&str> {
        self.0.get("jwks_uri").and_then(|v| v.as_str())
    }

    pub fn issuer(&self) -> Option<&str> {
        self.0.get("issuer").and_then(|v| v.as_str())
    }

    /// Looks up an arbitrary top-level field of the document.
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Imported public keys indexed by key id, in document order.
#[derive(Clone, Default)]
pub struct KeySet {
    keys: Vec<(String, DecodingKey)>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key. A repeated key id replaces the earlier key in place and
    /// returns it.
    pub fn insert(&mut self, kid: impl Into<String>, key: DecodingKey) -> Option<DecodingKey> {
        let kid = kid.into();
        match self.keys.iter_mut().find(|(existing, _)| *existing == kid) {
            Some((_, slot)) => Some(std::mem::replace(slot, key)),
            None => {
                self.keys.push((kid, key));
                None
            }
        }
    }

    pub fn get(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.iter().find(|(k, _)| k == kid).map(|(_, key)| key)
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.get(kid).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DecodingKey)> {
        self.keys.iter().map(|(kid, key)| (kid.as_str(), key))
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(kid, _)| kid.as_str())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySet")
            .field("key_ids", &self.key_ids().collect::<Vec<_>>())
            .finish()
    }
}

/// The decoded token payload.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// A verified token: the raw string paired with its decoded parts.
#[derive(Debug, Clone)]
pub struct Jwt {
    token: String,
    header: Header,
    claims: Claims,
}

impl Jwt {
    pub fn new(token: impl Into<String>, header: Header, claims: Claims) -> Self {
        Self {
            token: token.into(),
            header,
            claims,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn into_claims(self) -> Claims {
        self.claims
    }
}

/// Expected claim values fixed when the verifier is built. `None` means the
/// caller did not ask for the claim to be checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimsToValidate {
    pub nonce: Option<String>,
    pub audience: Option<String>,
    pub client_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(secret: &str) -> DecodingKey {
        DecodingKey::from_secret(secret.as_bytes())
    }

    #[test]
    fn metadata_exposes_jwks_uri() {
        let metadata = Metadata::new(serde_json::json!({
            "issuer": "https://example.com",
            "jwks_uri": "https://example.com/keys",
        }));
        assert_eq!(metadata.jwks_uri(), Some("https://example.com/keys"));
        assert_eq!(metadata.issuer(), Some("https://example.com"));

        let without = Metadata::new(serde_json::json!({ "issuer": "https://example.com" }));
        assert_eq!(without.jwks_uri(), None);
    }

    #[test]
    fn key_set_duplicate_kid_replaces_in_place() {
        let mut keys = KeySet::new();
        assert!(keys.insert("a", key("one")).is_none());
        assert!(keys.insert("b", key("two")).is_none());
        assert!(keys.insert("a", key("three")).is_some());

        assert_eq!(keys.len(), 2);
        assert_eq!(keys.key_ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(keys.contains("b"));
        assert!(!keys.contains("c"));
    }
}
