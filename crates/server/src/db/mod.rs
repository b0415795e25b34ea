//! Persistence for orders, items, history, payments and stock.
//!
//! # Tables
//!
//! - `products` - Catalogue with stock levels
//! - `customers` - Referenced by orders (existence only)
//! - `orders` - Order headers (`order_sn` and `trade_no` are UNIQUE)
//! - `order_items` - Line items with name/price snapshots
//! - `order_history` - Append-only status trail
//! - `payments` - One row per payment attempt
//!
//! # Transactions
//!
//! Every workflow operation runs inside one [`StoreTx`] obtained from
//! [`Store::begin`]. Work is only persisted by [`StoreTx::commit`]; dropping
//! the transaction rolls it back, so any early `?` return discards partial
//! writes.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p oms-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub mod racing;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use oms_core::{
    CustomerId, OrderId, OrderStatus, PaymentId, PaymentRecordStatus, PaymentStatus, ProductId,
    UserId,
};

use crate::models::{
    NewHistory, NewOrder, NewOrderItem, NewPayment, Order, OrderHistory, Payment, Product,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate `order_sn`).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Outcome of a guarded stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    /// Applied; carries the new stock level.
    Applied(i32),
    /// Not applied because stock would go negative.
    Insufficient { available: i32 },
    /// No such product.
    Missing,
}

/// Row locking for order reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    /// Plain read, for queries that change nothing.
    None,
    /// Lock the header row until the transaction ends.
    ForUpdate,
}

/// Entry point to the persistent store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, RepositoryError>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// A unit of work against the store.
///
/// Product reads and [`RowLock::ForUpdate`] order reads take row locks for
/// the remainder of the transaction so that concurrent workflows on the same
/// order or product are serialized.
#[async_trait]
pub trait StoreTx: Send {
    // Products -------------------------------------------------------------

    /// Read a product and lock its row.
    async fn product_for_update(
        &mut self,
        id: ProductId,
    ) -> Result<Option<Product>, RepositoryError>;

    /// Add `delta` to a product's stock unless the result would be negative.
    async fn adjust_stock(
        &mut self,
        id: ProductId,
        delta: i32,
    ) -> Result<StockChange, RepositoryError>;

    // Customers ------------------------------------------------------------

    async fn customer_exists(&mut self, id: CustomerId) -> Result<bool, RepositoryError>;

    // Orders ---------------------------------------------------------------

    async fn order_sn_exists(&mut self, order_sn: &str) -> Result<bool, RepositoryError>;

    async fn trade_no_exists(&mut self, trade_no: &str) -> Result<bool, RepositoryError>;

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderId, RepositoryError>;

    async fn insert_order_items(
        &mut self,
        order_id: OrderId,
        items: &[NewOrderItem],
    ) -> Result<(), RepositoryError>;

    async fn delete_order_items(&mut self, order_id: OrderId) -> Result<(), RepositoryError>;

    /// Load a full order (items and history).
    async fn get_order(
        &mut self,
        id: OrderId,
        lock: RowLock,
    ) -> Result<Option<Order>, RepositoryError>;

    async fn get_order_by_sn(
        &mut self,
        order_sn: &str,
        lock: RowLock,
    ) -> Result<Option<Order>, RepositoryError>;

    async fn get_order_by_trade_no(
        &mut self,
        trade_no: &str,
        lock: RowLock,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Orders newest first, with items but without history.
    /// `owner = None` lists every order.
    async fn list_orders(&mut self, owner: Option<UserId>) -> Result<Vec<Order>, RepositoryError>;

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        payment_status: PaymentStatus,
    ) -> Result<(), RepositoryError>;

    async fn update_order_total(
        &mut self,
        id: OrderId,
        total_amount: Decimal,
    ) -> Result<(), RepositoryError>;

    async fn set_trade_no(&mut self, id: OrderId, trade_no: &str) -> Result<(), RepositoryError>;

    // History --------------------------------------------------------------

    async fn insert_history(&mut self, entry: &NewHistory) -> Result<(), RepositoryError>;

    /// History rows in insertion order.
    async fn list_history(&mut self, order_id: OrderId)
    -> Result<Vec<OrderHistory>, RepositoryError>;

    // Payments -------------------------------------------------------------

    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<Payment, RepositoryError>;

    /// Latest attempt for an order that is still `initiated` or `pending`.
    async fn open_payment_attempt(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<Payment>, RepositoryError>;

    async fn update_payment(
        &mut self,
        id: PaymentId,
        status: PaymentRecordStatus,
        transaction_id: Option<&str>,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Payment, RepositoryError>;

    async fn get_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, RepositoryError>;

    /// Payments newest first. `owner = None` lists every payment.
    async fn list_payments(
        &mut self,
        owner: Option<UserId>,
    ) -> Result<Vec<Payment>, RepositoryError>;

    /// Persist everything done in this transaction.
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Payment rows only move forward: `initiated` → `pending` → `success`/`failed`.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` for any other move.
pub fn check_payment_move(
    id: PaymentId,
    from: PaymentRecordStatus,
    to: PaymentRecordStatus,
) -> Result<(), RepositoryError> {
    if from.can_advance_to(to) {
        Ok(())
    } else {
        Err(RepositoryError::Conflict(format!(
            "payment {id} cannot move from {from} to {to}"
        )))
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
