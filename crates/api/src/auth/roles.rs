//! Role-based access control

use super::middleware::AuthError;

/// Routes only administrators may reach
pub const ADMIN_ONLY: RoleChecker = RoleChecker::new(&["admin"]);

/// Routes open to any signed-up account
pub const USER_OR_ADMIN: RoleChecker = RoleChecker::new(&["user", "admin"]);

/// Fixed allow-list of role names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleChecker {
    allowed_roles: &'static [&'static str],
}

impl RoleChecker {
    pub const fn new(allowed_roles: &'static [&'static str]) -> Self {
        Self { allowed_roles }
    }

    pub fn allowed_roles(&self) -> &'static [&'static str] {
        self.allowed_roles
    }

    pub fn permits(&self, role: &str) -> bool {
        self.allowed_roles.contains(&role)
    }

    pub fn check(&self, role: &str) -> Result<(), AuthError> {
        if self.permits(role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}
