//! The authenticated caller of a workflow operation.

use oms_core::{Role, UserId};
use serde::{Deserialize, Serialize};

/// Who is performing an operation.
///
/// Built from a verified bearer token by
/// [`RequireUser`](crate::middleware::RequireUser); services never look at
/// raw tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    #[must_use]
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Whether this actor has admin privileges.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_privileged()
    }

    /// Whether this actor owns a resource belonging to `owner`.
    #[must_use]
    pub fn owns(&self, owner: UserId) -> bool {
        self.user_id == owner
    }
}
