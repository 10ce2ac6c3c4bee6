//! Tolerant, unverified token claims decoding
//!
//! Splits a compact token on `.`, base64url-decodes the middle segment, and
//! reads the JSON claims out of it. No signature verification happens here
//! and none is implied: the output is only suitable for display and expiry
//! estimation, never for an authorization decision.
//!
//! Every malformation — wrong segment count, invalid base64, invalid JSON,
//! non-object payload — yields `None` rather than an error. Callers treat a
//! failed decode as "expiry unknown".

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Claims read from a token payload, without verification.
#[derive(Debug, Clone, Default)]
pub struct Claims {
    /// Expiry as seconds since the Unix epoch.
    pub exp: Option<i64>,
    /// Issued-at as seconds since the Unix epoch.
    pub iat: Option<i64>,
    /// Subject identifier.
    pub sub: Option<String>,
    /// Issuer.
    pub iss: Option<String>,
    /// The full decoded payload, for claims not modeled above.
    pub raw: Map<String, Value>,
}

impl Claims {
    /// The expiry instant, when an `exp` claim is present.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    /// Look up an arbitrary string claim.
    #[must_use]
    pub fn string_claim(&self, name: &str) -> Option<&str> {
        self.raw.get(name).and_then(Value::as_str)
    }
}

/// Decode the claims segment of a compact token.
///
/// Returns `None` for anything that is not a three-segment token with a
/// base64url-encoded JSON object in the middle.
#[must_use]
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return None,
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: Value = serde_json::from_slice(&bytes).ok()?;
    let object = value.as_object()?;

    Some(Claims {
        exp: object.get("exp").and_then(Value::as_i64),
        iat: object.get("iat").and_then(Value::as_i64),
        sub: object.get("sub").and_then(Value::as_str).map(str::to_owned),
        iss: object.get("iss").and_then(Value::as_str).map(str::to_owned),
        raw: object.clone(),
    })
}

/// Decode a token and return its expiry instant, or `None` when the token is
/// malformed or carries no `exp` claim.
#[must_use]
pub fn expiry_of(token: &str) -> Option<DateTime<Utc>> {
    decode(token).and_then(|claims| claims.expires_at())
}

#[cfg(test)]
mod tests {
    //! Unit tests for claims.
    use serde_json::json;

    use super::*;
    use crate::testing::encode_token;

    #[test]
    fn exp_claim_round_trips_exactly() {
        let exp = Utc::now().timestamp() + 3600;
        let token = encode_token(&json!({ "exp": exp, "sub": "admin" }));

        let claims = decode(&token).unwrap();
        assert_eq!(claims.exp, Some(exp));
        assert_eq!(claims.sub.as_deref(), Some("admin"));
        assert_eq!(claims.expires_at().unwrap().timestamp(), exp);
    }

    #[test]
    fn arbitrary_claims_are_preserved() {
        let token = encode_token(&json!({ "exp": 1, "preferred_username": "root" }));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.string_claim("preferred_username"), Some("root"));
    }

    #[test]
    fn malformed_tokens_decode_to_none() {
        let cases = [
            "",
            "only-one-segment",
            "two.segments",
            "a.b.c.d",
            "head.!!!not-base64!!!.sig",
            // valid base64, invalid JSON
            "head.bm90LWpzb24.sig",
            // valid JSON, but not an object
            "head.WzEsMiwzXQ.sig",
        ];
        for case in cases {
            assert!(decode(case).is_none(), "expected None for {case:?}");
        }
    }

    #[test]
    fn missing_exp_claim_means_unknown_expiry() {
        let token = encode_token(&json!({ "sub": "admin" }));
        let claims = decode(&token).unwrap();
        assert!(claims.exp.is_none());
        assert!(claims.expires_at().is_none());
        assert!(expiry_of(&token).is_none());
    }

    #[test]
    fn expiry_of_malformed_token_is_none() {
        assert!(expiry_of("garbage").is_none());
    }
}
