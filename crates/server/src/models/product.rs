//! Catalogue product as seen by the order workflow.

use chrono::{DateTime, Utc};
use oms_core::ProductId;
use rust_decimal::Decimal;
use serde::Serialize;

/// A sellable product with its current stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}
