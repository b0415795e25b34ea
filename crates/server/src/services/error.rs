//! Workflow error types.

use oms_core::{AmountError, OrderId, OrderStatus, ProductId};
use thiserror::Error;

use crate::db::RepositoryError;

/// Errors returned by the order, payment and inventory services.
///
/// Any error inside an operation aborts its transaction, so callers never
/// observe partial writes.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed input (empty items, blank receiver, bad quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The actor may not perform this action on this resource.
    #[error("permission denied")]
    PermissionDenied,

    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The order is not in a state that allows this operation.
    #[error("order {order_id} is {status}: {reason}")]
    InvalidOrderState {
        order_id: OrderId,
        status: OrderStatus,
        reason: &'static str,
    },

    /// Items can only be edited while the order is pending.
    #[error("order {order_id} is {status} and can no longer be edited")]
    OrderLocked {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// The requested status is unknown or not reachable from the current one.
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: String },

    /// Not enough stock (inactive products report zero available).
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    /// Vendor signature missing or wrong.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// Could not find an unused serial or trade number.
    #[error("could not generate a unique {0}")]
    SerialGenerationExhausted(&'static str),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl WorkflowError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<AmountError> for WorkflowError {
    fn from(err: AmountError) -> Self {
        Self::Validation(err.to_string())
    }
}
