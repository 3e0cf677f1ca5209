//! Bearer token (JWT) issuance and validation
//!
//! Access and refresh tokens share one payload shape and one signing key; the
//! `refresh` flag in the payload tells them apart. Expiry is carried twice:
//! as the registered `exp` claim, which the JWT library enforces with zero
//! leeway, and as the human-readable `expiry` timestamp derived from the same
//! instant.

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Lifetime of an access token
pub const ACCESS_TOKEN_LIFETIME: Duration = Duration::minutes(60);

/// Lifetime of a refresh token
pub const REFRESH_TOKEN_LIFETIME: Duration = Duration::days(7);

/// User summary embedded in every bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    pub email: String,
    pub user_uid: Uuid,
    pub role: String,
}

/// Decoded bearer token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Unique token id, used as the revocation key
    pub jti: String,
    pub user: UserClaims,
    /// Absolute expiry, second precision
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
    pub refresh: bool,
    /// Registered expiry claim (unix seconds), same instant as `expiry`
    pub exp: i64,
    /// Issued-at (unix seconds)
    pub iat: i64,
}

impl Claims {
    pub fn token_type(&self) -> TokenType {
        if self.refresh {
            TokenType::Refresh
        } else {
            TokenType::Access
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// Access + refresh token pair returned at login
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("Token has expired")]
    Expired,
    #[error("Token is invalid")]
    Invalid,
    #[error("Wrong token type")]
    WrongTokenType,
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Issues and validates bearer tokens with a shared HMAC secret
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
}

impl JwtManager {
    pub fn new(secret: &str, algorithm: Algorithm) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
        }
    }

    /// Build from a configured algorithm name. Only the HMAC family works
    /// with a shared secret.
    pub fn from_algorithm_name(secret: &str, algorithm: &str) -> Result<Self, JwtError> {
        let algorithm: Algorithm = algorithm
            .parse()
            .map_err(|_| JwtError::UnsupportedAlgorithm(algorithm.to_string()))?;

        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                Ok(Self::new(secret, algorithm))
            }
            other => Err(JwtError::UnsupportedAlgorithm(format!("{:?}", other))),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Issue a token valid for `lifetime` from `now`.
    ///
    /// A negative lifetime yields an already-expired token.
    pub fn issue_at(
        &self,
        user: &UserClaims,
        lifetime: Duration,
        refresh: bool,
        now: OffsetDateTime,
    ) -> Result<(String, Claims), JwtError> {
        let issued_at = now.replace_nanosecond(0).unwrap_or(now);
        let expiry = issued_at + lifetime;

        let claims = Claims {
            jti: Uuid::new_v4().to_string(),
            user: user.clone(),
            expiry,
            refresh,
            exp: expiry.unix_timestamp(),
            iat: issued_at.unix_timestamp(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok((token, claims))
    }

    pub fn issue(
        &self,
        user: &UserClaims,
        lifetime: Duration,
        refresh: bool,
    ) -> Result<String, JwtError> {
        self.issue_at(user, lifetime, refresh, OffsetDateTime::now_utc())
            .map(|(token, _)| token)
    }

    pub fn issue_access_token(&self, user: &UserClaims) -> Result<String, JwtError> {
        self.issue(user, ACCESS_TOKEN_LIFETIME, false)
    }

    pub fn issue_refresh_token(&self, user: &UserClaims) -> Result<String, JwtError> {
        self.issue(user, REFRESH_TOKEN_LIFETIME, true)
    }

    /// Issue the access/refresh pair handed out at login
    pub fn issue_pair(&self, user: &UserClaims) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user)?,
            refresh_token: self.issue_refresh_token(user)?,
        })
    }

    /// Verify signature, structure and expiry of any bearer token
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => {
                    tracing::debug!(error = %e, "Bearer token rejected");
                    JwtError::Invalid
                }
            })
    }

    /// Decode and require a specific token type
    pub fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let claims = self.decode(token)?;
        if claims.token_type() != expected {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtManager")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
