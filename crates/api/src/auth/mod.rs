//! Authentication module for Bookly

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod revocation;
pub mod roles;
pub mod tokens;

pub use jwt::{Claims, JwtError, JwtManager, TokenPair, TokenType, UserClaims};
pub use middleware::{
    authenticate, require_access_token, require_refresh_token, require_role, AuthError,
    AuthState, AuthUser, CurrentUser,
};
pub use password::{hash_password, verify_password, MIN_PASSWORD_LENGTH};
pub use revocation::{InMemoryRevocationStore, RedisRevocationStore, RevocationStore, JTI_EXPIRY};
pub use roles::{RoleChecker, ADMIN_ONLY, USER_OR_ADMIN};
pub use tokens::{EmailPayload, TokenError, TokenManager, TokenPurpose};
