//! Authorization policy.
//!
//! Every workflow operation asks [`authorize`] before it reads or writes
//! anything on behalf of the caller. Keeping the rules in one table makes the
//! role model auditable.
//!
//! | Action              | admin | seller | customer |
//! |---------------------|-------|--------|----------|
//! | `CreateOrder`       | yes   | yes    | yes      |
//! | `ViewOrder`         | yes   | yes    | owner    |
//! | `EditOrderItems`    | yes   | owner  | owner    |
//! | `UpdateOrderStatus` | yes   | no     | no       |
//! | `PayOrder`          | yes   | owner  | owner    |
//! | `ViewPayment`       | yes   | owner  | owner    |
//! | `AdjustStock`       | yes   | yes    | no       |

use oms_core::{Role, UserId};

use super::WorkflowError;
use crate::models::Actor;

/// What the actor wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateOrder,
    ViewOrder,
    EditOrderItems,
    UpdateOrderStatus,
    PayOrder,
    ViewPayment,
    AdjustStock,
}

/// What the action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// An existing order (or a payment of it), owned by a user.
    Order { owner: UserId },
    /// Resources with no owner (a new order, the catalogue).
    Unowned,
}

/// Check whether `actor` may perform `action` on `resource`.
///
/// # Errors
///
/// Returns `WorkflowError::PermissionDenied` when the policy forbids it.
pub fn authorize(actor: &Actor, action: Action, resource: Resource) -> Result<(), WorkflowError> {
    let owns = match resource {
        Resource::Order { owner } => actor.owns(owner),
        Resource::Unowned => false,
    };

    let allowed = match action {
        Action::CreateOrder => true,
        Action::UpdateOrderStatus => actor.is_admin(),
        Action::AdjustStock => matches!(actor.role, Role::Admin | Role::Seller),
        Action::ViewOrder => matches!(actor.role, Role::Admin | Role::Seller) || owns,
        Action::EditOrderItems | Action::PayOrder | Action::ViewPayment => {
            actor.is_admin() || owns
        }
    };

    if allowed {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %actor.user_id,
            role = %actor.role,
            ?action,
            ?resource,
            "Permission denied"
        );
        Err(WorkflowError::PermissionDenied)
    }
}

/// Whether listings for this actor span every user.
#[must_use]
pub const fn sees_all_orders(actor: &Actor) -> bool {
    matches!(actor.role, Role::Admin | Role::Seller)
}

/// Whether payment listings for this actor span every user.
#[must_use]
pub const fn sees_all_payments(actor: &Actor) -> bool {
    actor.is_admin()
}
