// src/decoder.rs

use crate::error::{NilaJwtError, Result};
use crate::model::{Claims, Jwt, KeySet};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use std::time::Duration;
use tracing::{debug, instrument};

/// The boundary between the verifier and the library that actually checks
/// signatures.
///
/// `decode` must return [`NilaJwtError::SignatureInvalid`] when no key in the
/// set validates the token; the verifier keys its one-shot key reload off
/// that variant. Every other failure is passed through untouched.
pub trait TokenDecoder: Send + Sync {
    /// Verifies `token` against `keys` and returns the decoded token.
    fn decode(&self, token: &str, keys: &KeySet) -> Result<Jwt>;

    /// Converts one entry of a JSON Web Key Set into a verification key.
    fn import_key(&self, jwk: &Jwk) -> Result<DecodingKey>;

    /// Reports whether the underlying cryptography backend can be used.
    fn is_available(&self) -> bool {
        true
    }
}

/// [`TokenDecoder`] backed by the `jsonwebtoken` crate.
#[derive(Debug, Clone)]
pub struct JsonWebTokenDecoder {
    algorithms: Vec<Algorithm>,
    leeway: Duration,
    required_claims: Vec<String>,
}

impl Default for JsonWebTokenDecoder {
    fn default() -> Self {
        Self::new(vec![Algorithm::RS256], Duration::from_secs(120))
    }
}

impl JsonWebTokenDecoder {
    pub fn new(algorithms: Vec<Algorithm>, leeway: Duration) -> Self {
        Self {
            algorithms,
            leeway,
            required_claims: vec!["exp".to_string()],
        }
    }

    /// Replaces the registered claims that must be present (default: `exp`).
    pub fn with_required_claims<I, S>(mut self, claims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_claims = claims.into_iter().map(Into::into).collect();
        self
    }

    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway.as_secs();
        // Audience is checked by the verifier's own claim validators.
        validation.validate_aud = false;
        let required: Vec<&str> = self.required_claims.iter().map(String::as_str).collect();
        validation.set_required_spec_claims(&required);
        validation
    }

    fn decode_with(&self, token: &str, key: &DecodingKey, validation: &Validation) -> Result<Jwt> {
        match decode::<Claims>(token, key, validation) {
            Ok(data) => Ok(Jwt::new(token, data.header, data.claims)),
            Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => Err(NilaJwtError::SignatureInvalid),
            Err(e) => Err(NilaJwtError::JwtValidation(e)),
        }
    }
}

// A key that cannot be used with the token's algorithm is skipped when
// searching a key set without a `kid`.
fn is_incompatible_key(err: &NilaJwtError) -> bool {
    match err {
        NilaJwtError::JwtValidation(e) => matches!(
            e.kind(),
            ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidKeyFormat
                | ErrorKind::InvalidRsaKey(_)
                | ErrorKind::InvalidEcdsaKey
        ),
        _ => false,
    }
}

impl TokenDecoder for JsonWebTokenDecoder {
    #[instrument(skip(self, token, keys), err)]
    fn decode(&self, token: &str, keys: &KeySet) -> Result<Jwt> {
        let header = decode_header(token)?;

        if !self.algorithms.contains(&header.alg) {
            return Err(NilaJwtError::UnsupportedAlgorithm(header.alg));
        }

        let validation = self.validation(header.alg);

        match header.kid.as_deref() {
            Some(kid) => {
                // An unknown kid usually means the issuer rotated its keys.
                let key = keys.get(kid).ok_or_else(|| {
                    debug!("No key with kid '{}' in the current key set", kid);
                    NilaJwtError::SignatureInvalid
                })?;
                self.decode_with(token, key, &validation)
            }
            None => {
                for (kid, key) in keys.iter() {
                    match self.decode_with(token, key, &validation) {
                        Err(NilaJwtError::SignatureInvalid) => continue,
                        Err(e) if is_incompatible_key(&e) => {
                            debug!("Skipping key '{}': {}", kid, e);
                            continue;
                        }
                        other => return other,
                    }
                }
                Err(NilaJwtError::SignatureInvalid)
            }
        }
    }

    fn import_key(&self, jwk: &Jwk) -> Result<DecodingKey> {
        DecodingKey::from_jwk(jwk).map_err(|e| NilaJwtError::InvalidKeyFormat(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }

    fn hs256_token(secret: &[u8], kid: Option<&str>, claims: serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = kid.map(String::from);
        encode(&header, &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    fn decoder() -> JsonWebTokenDecoder {
        JsonWebTokenDecoder::new(vec![Algorithm::HS256], Duration::from_secs(120))
    }

    fn keys(entries: &[(&str, &str)]) -> KeySet {
        let mut set = KeySet::new();
        for (kid, secret) in entries {
            set.insert(*kid, DecodingKey::from_secret(secret.as_bytes()));
        }
        set
    }

    #[test]
    fn decodes_with_matching_kid() {
        let token = hs256_token(b"secret-a", Some("a"), serde_json::json!({ "exp": now() + 60, "cid": "client" }));
        let jwt = decoder().decode(&token, &keys(&[("a", "secret-a")])).unwrap();
        assert_eq!(jwt.token(), token);
        assert_eq!(jwt.claims().get("cid"), Some(&serde_json::json!("client")));
        assert_eq!(jwt.header().kid.as_deref(), Some("a"));
    }

    #[test]
    fn unknown_kid_is_a_signature_failure() {
        let token = hs256_token(b"secret-a", Some("rotated"), serde_json::json!({ "exp": now() + 60 }));
        let err = decoder().decode(&token, &keys(&[("a", "secret-a")])).unwrap_err();
        assert!(matches!(err, NilaJwtError::SignatureInvalid));
    }

    #[test]
    fn wrong_key_is_a_signature_failure() {
        let token = hs256_token(b"secret-a", Some("a"), serde_json::json!({ "exp": now() + 60 }));
        let err = decoder().decode(&token, &keys(&[("a", "other")])).unwrap_err();
        assert!(matches!(err, NilaJwtError::SignatureInvalid));
    }

    #[test]
    fn without_kid_every_key_is_tried() {
        let token = hs256_token(b"secret-b", None, serde_json::json!({ "exp": now() + 60 }));
        let set = keys(&[("a", "secret-a"), ("b", "secret-b")]);
        assert!(decoder().decode(&token, &set).is_ok());

        let err = decoder().decode(&token, &keys(&[("a", "secret-a")])).unwrap_err();
        assert!(matches!(err, NilaJwtError::SignatureInvalid));
    }

    #[test]
    fn empty_key_set_is_a_signature_failure() {
        let token = hs256_token(b"secret-a", None, serde_json::json!({ "exp": now() + 60 }));
        let err = decoder().decode(&token, &KeySet::new()).unwrap_err();
        assert!(matches!(err, NilaJwtError::SignatureInvalid));
    }

    #[test]
    fn expired_token_is_passed_through() {
        let token = hs256_token(b"secret-a", Some("a"), serde_json::json!({ "exp": now() - 3600 }));
        let err = decoder().decode(&token, &keys(&[("a", "secret-a")])).unwrap_err();
        match err {
            NilaJwtError::JwtValidation(e) => assert_eq!(*e.kind(), ErrorKind::ExpiredSignature),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn leeway_tolerates_clock_skew() {
        let token = hs256_token(b"secret-a", Some("a"), serde_json::json!({ "exp": now() - 30 }));
        assert!(decoder().decode(&token, &keys(&[("a", "secret-a")])).is_ok());
    }

    #[test]
    fn rejects_disallowed_algorithm() {
        let token = hs256_token(b"secret-a", Some("a"), serde_json::json!({ "exp": now() + 60 }));
        let rs_only = JsonWebTokenDecoder::default();
        let err = rs_only.decode(&token, &keys(&[("a", "secret-a")])).unwrap_err();
        assert!(matches!(err, NilaJwtError::UnsupportedAlgorithm(Algorithm::HS256)));
    }

    #[test]
    fn audience_is_left_to_the_verifier() {
        let token = hs256_token(b"secret-a", Some("a"), serde_json::json!({ "exp": now() + 60, "aud": "api://default" }));
        assert!(decoder().decode(&token, &keys(&[("a", "secret-a")])).is_ok());
    }

    #[test]
    fn imports_octet_jwk() {
        let jwk: Jwk = serde_json::from_value(serde_json::json!({
            "kty": "oct",
            "kid": "a",
            "k": "c2VjcmV0LWFi",
        }))
        .unwrap();
        let key = decoder().import_key(&jwk).unwrap();
        let token = hs256_token(b"secret-ab", Some("a"), serde_json::json!({ "exp": now() + 60 }));
        let mut set = KeySet::new();
        set.insert("a", key);
        assert!(decoder().decode(&token, &set).is_ok());
    }
}
