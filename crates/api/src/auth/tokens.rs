//! Signed, timestamped tokens for email links
//!
//! Used for email verification and password reset links. These tokens are
//! independent of the bearer tokens: they have their own secret, a purpose
//! salt for domain separation, and a max-age measured from issuance.
//!
//! Wire format (all segments URL-safe base64 without padding):
//!
//! ```text
//! <json payload>.<issued-at, i64 big-endian>.<HMAC-SHA256 signature>
//! ```
//!
//! The signing key is `HMAC-SHA256(secret, purpose_salt)`, so a token issued
//! for one purpose never verifies under another.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};

type HmacSha256 = Hmac<Sha256>;

/// What a token may be used for. Each purpose signs under its own derived key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    pub fn salt(&self) -> &'static str {
        match self {
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }
}

/// Payload carried by verification and reset links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub email: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token is malformed")]
    Malformed,
    #[error("Token signature does not match")]
    BadSignature,
    #[error("Token has expired")]
    Expired,
    #[error("Token payload could not be serialized: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("Invalid signing key")]
    Key,
}

/// Issues and verifies link tokens
#[derive(Clone)]
pub struct TokenManager {
    secret: Vec<u8>,
    max_age: Duration,
}

impl TokenManager {
    pub fn new(secret: &str, max_age: Duration) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn signer(&self, purpose: TokenPurpose) -> Result<HmacSha256, TokenError> {
        let mut derive = HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::Key)?;
        derive.update(purpose.salt().as_bytes());
        let derived_key = derive.finalize().into_bytes();

        HmacSha256::new_from_slice(&derived_key).map_err(|_| TokenError::Key)
    }

    fn sign(&self, purpose: TokenPurpose, signed_part: &str) -> Result<Vec<u8>, TokenError> {
        let mut mac = self.signer(purpose)?;
        mac.update(signed_part.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    pub fn issue_at<T: Serialize>(
        &self,
        payload: &T,
        purpose: TokenPurpose,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload)?);
        let timestamp = URL_SAFE_NO_PAD.encode(now.unix_timestamp().to_be_bytes());
        let signed_part = format!("{}.{}", body, timestamp);

        let signature = URL_SAFE_NO_PAD.encode(self.sign(purpose, &signed_part)?);
        Ok(format!("{}.{}", signed_part, signature))
    }

    pub fn issue<T: Serialize>(&self, payload: &T, purpose: TokenPurpose) -> Result<String, TokenError> {
        self.issue_at(payload, purpose, OffsetDateTime::now_utc())
    }

    /// Verify signature and age, then deserialize the payload
    pub fn decode_at<T: DeserializeOwned>(
        &self,
        token: &str,
        purpose: TokenPurpose,
        max_age: Duration,
        now: OffsetDateTime,
    ) -> Result<T, TokenError> {
        let mut parts = token.split('.');
        let (body, timestamp, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(b), Some(t), Some(s), None) => (b, t, s),
            _ => return Err(TokenError::Malformed),
        };

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        let expected = self.sign(purpose, &format!("{}.{}", body, timestamp))?;

        if !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            return Err(TokenError::BadSignature);
        }

        let ts_bytes: [u8; 8] = URL_SAFE_NO_PAD
            .decode(timestamp)
            .map_err(|_| TokenError::Malformed)?
            .try_into()
            .map_err(|_| TokenError::Malformed)?;
        let issued_at = i64::from_be_bytes(ts_bytes);

        let age = now.unix_timestamp() - issued_at;
        if age < 0 || age > max_age.whole_seconds() {
            return Err(TokenError::Expired);
        }

        let raw = URL_SAFE_NO_PAD.decode(body).map_err(|_| TokenError::Malformed)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Decode with the configured max-age and the current time
    pub fn decode<T: DeserializeOwned>(&self, token: &str, purpose: TokenPurpose) -> Result<T, TokenError> {
        self.decode_at(token, purpose, self.max_age, OffsetDateTime::now_utc())
    }

    /// Decode a link token, logging the failure reason and collapsing it to `None`
    pub fn decode_logged<T: DeserializeOwned>(&self, token: &str, purpose: TokenPurpose) -> Option<T> {
        match self.decode(token, purpose) {
            Ok(payload) => Some(payload),
            Err(TokenError::Expired) => {
                tracing::info!(purpose = purpose.salt(), "Link token expired");
                None
            }
            Err(e) => {
                tracing::warn!(purpose = purpose.salt(), error = %e, "Link token rejected");
                None
            }
        }
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn manager() -> TokenManager {
        TokenManager::new("link-token-secret", Duration::days(1))
    }

    fn payload() -> EmailPayload {
        EmailPayload {
            email: "alice@example.com".to_string(),
        }
    }

    #[test]
    fn test_round_trip() {
        let tokens = manager();
        let now = datetime!(2024-10-02 12:00 UTC);

        let token = tokens
            .issue_at(&payload(), TokenPurpose::EmailVerification, now)
            .unwrap();
        let decoded: EmailPayload = tokens
            .decode_at(&token, TokenPurpose::EmailVerification, Duration::hours(1), now)
            .unwrap();

        assert_eq!(decoded, payload());
    }

    #[test]
    fn test_token_is_url_safe() {
        let token = manager()
            .issue(&payload(), TokenPurpose::PasswordReset)
            .unwrap();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'));
    }

    #[test]
    fn test_purpose_mismatch_is_bad_signature() {
        let tokens = manager();
        let now = datetime!(2024-10-02 12:00 UTC);

        let token = tokens
            .issue_at(&payload(), TokenPurpose::EmailVerification, now)
            .unwrap();
        let result = tokens.decode_at::<EmailPayload>(
            &token,
            TokenPurpose::PasswordReset,
            Duration::hours(1),
            now,
        );

        assert!(matches!(result, Err(TokenError::BadSignature)));
    }

    #[test]
    fn test_expires_after_max_age() {
        let tokens = manager();
        let issued = datetime!(2024-10-02 12:00 UTC);

        let token = tokens
            .issue_at(&payload(), TokenPurpose::EmailVerification, issued)
            .unwrap();

        let at_limit = tokens.decode_at::<EmailPayload>(
            &token,
            TokenPurpose::EmailVerification,
            Duration::hours(1),
            issued + Duration::hours(1),
        );
        assert!(at_limit.is_ok());

        let past_limit = tokens.decode_at::<EmailPayload>(
            &token,
            TokenPurpose::EmailVerification,
            Duration::hours(1),
            issued + Duration::hours(1) + Duration::seconds(1),
        );
        assert!(matches!(past_limit, Err(TokenError::Expired)));
    }

    #[test]
    fn test_different_secret_rejects() {
        let now = datetime!(2024-10-02 12:00 UTC);
        let token = manager()
            .issue_at(&payload(), TokenPurpose::EmailVerification, now)
            .unwrap();

        let other = TokenManager::new("another-secret", Duration::days(1));
        let result = other.decode_at::<EmailPayload>(
            &token,
            TokenPurpose::EmailVerification,
            Duration::hours(1),
            now,
        );
        assert!(matches!(result, Err(TokenError::BadSignature)));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let tokens = manager();
        let now = datetime!(2024-10-02 12:00 UTC);
        let token = tokens
            .issue_at(&payload(), TokenPurpose::PasswordReset, now)
            .unwrap();

        let forged_body = URL_SAFE_NO_PAD.encode(br#"{"email":"mallory@example.com"}"#);
        let rest = token.split_once('.').map(|(_, rest)| rest).unwrap();
        let forged = format!("{}.{}", forged_body, rest);

        let result =
            tokens.decode_at::<EmailPayload>(&forged, TokenPurpose::PasswordReset, Duration::hours(1), now);
        assert!(matches!(result, Err(TokenError::BadSignature)));
    }

    #[test]
    fn test_malformed_tokens() {
        let tokens = manager();
        for bad in ["", "abc", "a.b", "a.b.c.d", "!!.??.**"] {
            let result = tokens.decode::<EmailPayload>(bad, TokenPurpose::PasswordReset);
            assert!(result.is_err(), "{:?} should not decode", bad);
        }
    }

    #[test]
    fn test_decode_logged_collapses_failures() {
        let tokens = manager();
        assert!(tokens
            .decode_logged::<EmailPayload>("garbage", TokenPurpose::EmailVerification)
            .is_none());

        let token = tokens
            .issue(&payload(), TokenPurpose::EmailVerification)
            .unwrap();
        assert_eq!(
            tokens.decode_logged::<EmailPayload>(&token, TokenPurpose::EmailVerification),
            Some(payload())
        );
    }
}
