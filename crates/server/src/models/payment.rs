//! Payment attempts and settlements.

use chrono::{DateTime, Utc};
use oms_core::{OrderId, PaymentId, PaymentMethod, PaymentRecordStatus};
use rust_decimal::Decimal;
use serde::Serialize;

/// One payment attempt against an order.
///
/// Vendor checkouts start as `initiated` and are settled by the vendor
/// callback; direct payments are written as `success` immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub status: PaymentRecordStatus,
    pub payment_method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a payment row.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub status: PaymentRecordStatus,
    pub payment_method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}
