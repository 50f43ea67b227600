// src/claims.rs

use crate::error::{ClaimName, NilaJwtError, Result};
use crate::model::{Claims, ClaimsToValidate};
use serde_json::Value;

/// Runs the nonce, audience and client id checks in that order.
pub fn validate_claims(claims: &Claims, expected: &ClaimsToValidate) -> Result<()> {
    validate_claim(claims, ClaimName::Nonce, expected.nonce.as_deref())?;
    validate_claim(claims, ClaimName::Audience, expected.audience.as_deref())?;
    validate_claim(claims, ClaimName::ClientId, expected.client_id.as_deref())?;
    Ok(())
}

/// Compares one claim with its expected value.
///
/// Nothing expected and nothing present passes. Otherwise the claim must be a
/// string exactly equal to the expected value. A `null` or empty-string claim
/// counts as absent.
pub fn validate_claim(claims: &Claims, claim: ClaimName, expected: Option<&str>) -> Result<()> {
    let expected = expected.filter(|v| !v.is_empty());
    let actual = claims.get(claim.key()).filter(|v| !is_blank(v));

    match (expected, actual) {
        (None, None) => Ok(()),
        (Some(expected), Some(Value::String(actual))) if actual == expected => Ok(()),
        (expected, actual) => Err(NilaJwtError::ClaimMismatch {
            claim,
            expected: expected.map(String::from),
            actual: actual.cloned(),
        }),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Claims {
        match value {
            Value::Object(map) => map,
            _ => panic!("claims must be an object"),
        }
    }

    fn expect_mismatch(result: Result<()>, name: ClaimName) {
        match result {
            Err(NilaJwtError::ClaimMismatch { claim, .. }) => assert_eq!(claim, name),
            other => panic!("expected a {name} mismatch, got {other:?}"),
        }
    }

    #[test]
    fn absent_and_unset_is_skipped() {
        assert!(validate_claims(&claims(json!({})), &ClaimsToValidate::default()).is_ok());
    }

    #[test]
    fn empty_expected_value_counts_as_unset() {
        let expected = ClaimsToValidate {
            nonce: Some(String::new()),
            ..Default::default()
        };
        assert!(validate_claims(&claims(json!({})), &expected).is_ok());
    }

    #[test]
    fn null_claim_counts_as_absent() {
        assert!(validate_claim(&claims(json!({ "nonce": null })), ClaimName::Nonce, None).is_ok());
    }

    #[test]
    fn empty_claim_counts_as_absent() {
        assert!(validate_claim(&claims(json!({ "nonce": "" })), ClaimName::Nonce, None).is_ok());
        assert!(validate_claims(&claims(json!({ "nonce": "", "aud": "" })), &ClaimsToValidate::default()).is_ok());

        expect_mismatch(
            validate_claim(&claims(json!({ "nonce": "" })), ClaimName::Nonce, Some("n-0S6")),
            ClaimName::Nonce,
        );
    }

    #[test]
    fn matching_values_pass() {
        let expected = ClaimsToValidate {
            nonce: Some("n-0S6_WzA2Mj".to_string()),
            audience: Some("api://default".to_string()),
            client_id: Some("0oa1abc".to_string()),
        };
        let token = claims(json!({ "nonce": "n-0S6_WzA2Mj", "aud": "api://default", "cid": "0oa1abc" }));
        assert!(validate_claims(&token, &expected).is_ok());
    }

    #[test]
    fn audience_mismatch_is_reported() {
        let expected = ClaimsToValidate {
            audience: Some("Y".to_string()),
            ..Default::default()
        };
        let result = validate_claims(&claims(json!({ "aud": "X" })), &expected);
        match result {
            Err(NilaJwtError::ClaimMismatch { claim, expected, actual }) => {
                assert_eq!(claim, ClaimName::Audience);
                assert_eq!(expected.as_deref(), Some("Y"));
                assert_eq!(actual, Some(json!("X")));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn expected_but_absent_fails() {
        expect_mismatch(
            validate_claim(&claims(json!({})), ClaimName::Nonce, Some("abc")),
            ClaimName::Nonce,
        );
    }

    #[test]
    fn present_but_not_expected_fails() {
        expect_mismatch(
            validate_claim(&claims(json!({ "cid": "someone" })), ClaimName::ClientId, None),
            ClaimName::ClientId,
        );
    }

    #[test]
    fn comparison_is_exact() {
        expect_mismatch(
            validate_claim(&claims(json!({ "aud": "API://default" })), ClaimName::Audience, Some("api://default")),
            ClaimName::Audience,
        );
        expect_mismatch(
            validate_claim(&claims(json!({ "aud": ["api://default"] })), ClaimName::Audience, Some("api://default")),
            ClaimName::Audience,
        );
    }

    #[test]
    fn checks_run_in_order() {
        let expected = ClaimsToValidate {
            nonce: Some("n".to_string()),
            audience: Some("a".to_string()),
            client_id: Some("c".to_string()),
        };
        let token = claims(json!({ "nonce": "n", "aud": "wrong", "cid": "also-wrong" }));
        expect_mismatch(validate_claims(&token, &expected), ClaimName::Audience);
    }
}
