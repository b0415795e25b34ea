//! Status enums and the order state machine.
//!
//! Order status values arrive as free-form strings on the wire; they are
//! parsed into [`OrderStatus`] and every change is checked against
//! [`OrderStatus::can_transition_to`] before anything is written.
//!
//! ```text
//! pending ──► paid ──► shipped ──► completed
//!    │  └──────┼──────────┘ ▲          ▲
//!    │         └────────────┼──────────┘   (forward skips allowed)
//!    └───────► cancelled ◄──┴── paid / shipped
//! ```

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Wire/database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether `self → next` is an allowed status change.
    ///
    /// Same-status requests are not transitions and return `false`; callers
    /// treat them as no-ops before consulting this.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending,
                Self::Paid | Self::Shipped | Self::Completed | Self::Cancelled
            ) | (Self::Paid, Self::Shipped | Self::Completed | Self::Cancelled)
                | (Self::Shipped, Self::Completed | Self::Cancelled)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("invalid order status: {other}")),
        }
    }
}

/// Whether an order has been paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unpaid => write!(f, "unpaid"),
            Self::Paid => write!(f, "paid"),
        }
    }
}

/// Status of a single payment attempt row.
///
/// Rows only move forward: `initiated → pending → success | failed`, with
/// `initiated → success | failed` allowed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_record_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
    #[default]
    Initiated,
    Pending,
    Success,
    Failed,
}

impl PaymentRecordStatus {
    /// Whether a payment row may move from `self` to `next`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initiated, Self::Pending | Self::Success | Self::Failed)
                | (Self::Pending, Self::Success | Self::Failed)
        )
    }
}

impl std::fmt::Display for PaymentRecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initiated => write!(f, "initiated"),
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Settled immediately by the backend (no vendor involved).
    Direct,
    /// ECPay all-in-one checkout.
    Ecpay,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Ecpay => write!(f, "ecpay"),
        }
    }
}

/// User role with different permission levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access, including order status changes.
    Admin,
    /// Store staff: catalogue and stock management, read access to orders.
    Seller,
    /// Buyer: own orders and payments only.
    Customer,
}

impl Role {
    /// Admin-equivalent privilege.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Seller => write!(f, "seller"),
            Self::Customer => write!(f, "customer"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "seller" => Ok(Self::Seller),
            "customer" => Ok(Self::Customer),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}
