//! Local decoding of access credential claims.
//!
//! Decoding never touches the network and never verifies a signature: the
//! backend stays the source of truth. The expiry check only lets the client
//! skip a round trip for a token that is obviously dead.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("token is not in header.payload.signature form")]
    Malformed,

    #[error("token payload is not valid base64url: {0}")]
    InvalidEncoding(String),

    #[error("token payload is not a JSON claims object: {0}")]
    InvalidClaims(String),
}

/// Largest clock-skew allowance honoured; larger settings are capped.
pub const MAX_CLOCK_SKEW_SECS: u64 = 24 * 60 * 60;

/// Claims carried inside an access credential.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry as a NumericDate (seconds since the epoch, fractions allowed).
    pub exp: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Expiry as a timestamp. `None` if the token carries no `exp`, or one
    /// outside the representable date range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let millis = self.exp? * 1000.0;
        if !millis.is_finite() || millis < i64::MIN as f64 || millis > i64::MAX as f64 {
            return None;
        }
        DateTime::from_timestamp_millis(millis as i64)
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}

/// Decodes claims and evaluates expiry against a caller supplied clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCodec {
    skew: Duration,
}

impl TokenCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `skew_secs` of clock drift before treating a token as expired,
    /// capped at `MAX_CLOCK_SKEW_SECS`.
    pub fn with_skew_secs(skew_secs: u64) -> Self {
        let secs = i64::try_from(skew_secs.min(MAX_CLOCK_SKEW_SECS)).unwrap_or_default();
        Self {
            skew: Duration::try_seconds(secs).unwrap_or_else(Duration::zero),
        }
    }

    pub fn decode(&self, token: &str) -> Result<Claims, DecodeError> {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(header), Some(payload), Some(_), None)
                if !header.is_empty() && !payload.is_empty() =>
            {
                payload
            }
            _ => return Err(DecodeError::Malformed),
        };

        // Some issuers pad the segments; base64url in JWTs is unpadded.
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;

        let claims = serde_json::from_slice::<Claims>(&bytes)
            .map_err(|e| DecodeError::InvalidClaims(e.to_string()))?;
        if claims.exp.is_some() && claims.expires_at().is_none() {
            return Err(DecodeError::InvalidClaims("exp is out of range".to_string()));
        }
        Ok(claims)
    }

    /// A token without an `exp` claim is never reported as expired.
    pub fn is_expired(&self, claims: &Claims, now: DateTime<Utc>) -> bool {
        match claims.expires_at() {
            // Past the end of the calendar with the allowance added: not expired
            Some(expires_at) => expires_at
                .checked_add_signed(self.skew)
                .is_some_and(|deadline| deadline < now),
            None => false,
        }
    }
}

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_with(claims: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn test_decode_reads_exp_and_extra_claims() {
        let token = token_with(json!({"exp": 1_700_000_000, "sub": "42", "role": "student"}));
        let claims = TokenCodec::new().decode(&token).unwrap();

        assert_eq!(claims.exp, Some(1_700_000_000.0));
        assert_eq!(claims.claim("sub"), Some(&json!("42")));
        assert_eq!(claims.claim("role"), Some(&json!("student")));
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        let codec = TokenCodec::new();
        assert_eq!(codec.decode("").unwrap_err(), DecodeError::Malformed);
        assert_eq!(codec.decode("not-a-token").unwrap_err(), DecodeError::Malformed);
        assert_eq!(codec.decode("a.b").unwrap_err(), DecodeError::Malformed);
        assert_eq!(codec.decode("a.b.c.d").unwrap_err(), DecodeError::Malformed);
        assert!(matches!(
            codec.decode("aaa.!!!.sig"),
            Err(DecodeError::InvalidEncoding(_))
        ));

        let not_json = format!("aaa.{}.sig", URL_SAFE_NO_PAD.encode("plain text"));
        assert!(matches!(codec.decode(&not_json), Err(DecodeError::InvalidClaims(_))));
    }

    #[test]
    fn test_decode_accepts_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":10}"#);
        assert!(payload.ends_with('='));
        let claims = TokenCodec::new().decode(&format!("h.{}.s", payload)).unwrap();
        assert_eq!(claims.exp, Some(10.0));
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        let codec = TokenCodec::new();

        let past = codec
            .decode(&token_with(json!({"exp": (now - Duration::seconds(10)).timestamp()})))
            .unwrap();
        let future = codec
            .decode(&token_with(json!({"exp": (now + Duration::minutes(15)).timestamp()})))
            .unwrap();
        let no_exp = codec.decode(&token_with(json!({"sub": "1"}))).unwrap();

        assert!(codec.is_expired(&past, now));
        assert!(!codec.is_expired(&future, now));
        assert!(!codec.is_expired(&no_exp, now));
    }

    #[test]
    fn test_decode_rejects_unrepresentable_exp() {
        let codec = TokenCodec::new();
        for exp in [json!(-1e30), json!(1e30), json!(8_210_266_876_800_i64)] {
            let token = token_with(json!({ "exp": exp }));
            assert!(
                matches!(codec.decode(&token), Err(DecodeError::InvalidClaims(_))),
                "exp {} should be rejected",
                exp
            );
        }
    }

    #[test]
    fn test_skew_near_max_date_does_not_overflow() {
        let now = Utc::now();
        let claims = TokenCodec::new()
            .decode(&token_with(json!({"exp": 253_402_300_799_i64})))
            .unwrap();
        assert!(!TokenCodec::with_skew_secs(60).is_expired(&claims, now));

        let latest = DateTime::<Utc>::MAX_UTC.timestamp();
        let claims = TokenCodec::new()
            .decode(&token_with(json!({ "exp": latest })))
            .unwrap();
        assert!(!TokenCodec::with_skew_secs(60).is_expired(&claims, now));
    }

    #[test]
    fn test_large_skew_is_capped() {
        let now = Utc::now();
        let claims = TokenCodec::new()
            .decode(&token_with(json!({"exp": (now - Duration::days(2)).timestamp()})))
            .unwrap();

        for skew in [u64::MAX, u64::MAX / 2, i64::MAX as u64 + 1] {
            assert!(TokenCodec::with_skew_secs(skew).is_expired(&claims, now));
        }
        assert_eq!(
            TokenCodec::with_skew_secs(u64::MAX).skew,
            Duration::seconds(MAX_CLOCK_SKEW_SECS as i64)
        );
    }

    #[test]
    fn test_skew_allowance() {
        let now = Utc::now();
        let claims = TokenCodec::new()
            .decode(&token_with(json!({"exp": (now - Duration::seconds(10)).timestamp()})))
            .unwrap();

        assert!(!TokenCodec::with_skew_secs(30).is_expired(&claims, now));
        assert!(TokenCodec::with_skew_secs(5).is_expired(&claims, now));
    }
}
