//! Business logic services.
//!
//! # Services
//!
//! - `orders` - Order creation, status workflow and item edits
//! - `payments` - Direct payment, vendor checkout and callback reconciliation
//! - `inventory` - Stock deduction and restoration
//!
//! Services take an [`Actor`](crate::models::Actor), check it against the
//! [`authz`] policy and run each operation in a single store transaction.

pub mod authz;
pub mod error;
pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod serial;

pub use error::WorkflowError;
pub use inventory::InventoryService;
pub use notifications::{LogNotifier, Notifier, OrderEvent};
pub use orders::OrderService;
pub use payments::{CheckoutForm, PaymentService};
