//! Authentication identity types.

use super::errors::AuthError;
use crate::jwt::{Principal, Role};

/// Identity attached to a request once its access credential verifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    /// Handler-local role check.
    pub fn require_role(&self, role: Role) -> Result<(), AuthError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AuthError::RoleDenied)
        }
    }
}

impl From<Principal> for Identity {
    fn from(principal: Principal) -> Self {
        Self {
            user_id: principal.user_id,
            role: principal.role,
        }
    }
}
