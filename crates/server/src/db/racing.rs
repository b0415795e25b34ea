//! A [`MemoryStore`] wrapper that loses unique-value races on demand.
//!
//! The first `conflicts` calls to `insert_order` or `set_trade_no` fail with
//! [`RepositoryError::Conflict`], as they would when a concurrent transaction
//! committed the same serial first. Everything else is passed through.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use oms_core::{
    CustomerId, OrderId, OrderStatus, PaymentId, PaymentRecordStatus, PaymentStatus, ProductId,
    UserId,
};

use super::{MemoryStore, RepositoryError, RowLock, StockChange, Store, StoreTx};
use crate::models::{
    NewHistory, NewOrder, NewOrderItem, NewPayment, Order, OrderHistory, Payment, Product,
};

#[derive(Clone)]
pub struct RacingStore {
    inner: MemoryStore,
    conflicts: Arc<AtomicUsize>,
}

impl RacingStore {
    #[must_use]
    pub fn new(inner: MemoryStore, conflicts: usize) -> Self {
        Self {
            inner,
            conflicts: Arc::new(AtomicUsize::new(conflicts)),
        }
    }

    /// Conflicts not yet raised.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for RacingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, RepositoryError> {
        Ok(Box::new(RacingTx {
            inner: self.inner.begin().await?,
            conflicts: Arc::clone(&self.conflicts),
        }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.inner.ping().await
    }
}

struct RacingTx {
    inner: Box<dyn StoreTx>,
    conflicts: Arc<AtomicUsize>,
}

impl RacingTx {
    fn lose_race(&self, what: &str) -> Result<(), RepositoryError> {
        let raced = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if raced {
            Err(RepositoryError::Conflict(format!("{what} already exists")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StoreTx for RacingTx {
    async fn product_for_update(
        &mut self,
        id: ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        self.inner.product_for_update(id).await
    }

    async fn adjust_stock(
        &mut self,
        id: ProductId,
        delta: i32,
    ) -> Result<StockChange, RepositoryError> {
        self.inner.adjust_stock(id, delta).await
    }

    async fn customer_exists(&mut self, id: CustomerId) -> Result<bool, RepositoryError> {
        self.inner.customer_exists(id).await
    }

    async fn order_sn_exists(&mut self, order_sn: &str) -> Result<bool, RepositoryError> {
        self.inner.order_sn_exists(order_sn).await
    }

    async fn trade_no_exists(&mut self, trade_no: &str) -> Result<bool, RepositoryError> {
        self.inner.trade_no_exists(trade_no).await
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        self.lose_race("order_sn")?;
        self.inner.insert_order(order).await
    }

    async fn insert_order_items(
        &mut self,
        order_id: OrderId,
        items: &[NewOrderItem],
    ) -> Result<(), RepositoryError> {
        self.inner.insert_order_items(order_id, items).await
    }

    async fn delete_order_items(&mut self, order_id: OrderId) -> Result<(), RepositoryError> {
        self.inner.delete_order_items(order_id).await
    }

    async fn get_order(
        &mut self,
        id: OrderId,
        lock: RowLock,
    ) -> Result<Option<Order>, RepositoryError> {
        self.inner.get_order(id, lock).await
    }

    async fn get_order_by_sn(
        &mut self,
        order_sn: &str,
        lock: RowLock,
    ) -> Result<Option<Order>, RepositoryError> {
        self.inner.get_order_by_sn(order_sn, lock).await
    }

    async fn get_order_by_trade_no(
        &mut self,
        trade_no: &str,
        lock: RowLock,
    ) -> Result<Option<Order>, RepositoryError> {
        self.inner.get_order_by_trade_no(trade_no, lock).await
    }

    async fn list_orders(&mut self, owner: Option<UserId>) -> Result<Vec<Order>, RepositoryError> {
        self.inner.list_orders(owner).await
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        payment_status: PaymentStatus,
    ) -> Result<(), RepositoryError> {
        self.inner
            .update_order_status(id, status, payment_status)
            .await
    }

    async fn update_order_total(
        &mut self,
        id: OrderId,
        total_amount: Decimal,
    ) -> Result<(), RepositoryError> {
        self.inner.update_order_total(id, total_amount).await
    }

    async fn set_trade_no(&mut self, id: OrderId, trade_no: &str) -> Result<(), RepositoryError> {
        self.lose_race("trade_no")?;
        self.inner.set_trade_no(id, trade_no).await
    }

    async fn insert_history(&mut self, entry: &NewHistory) -> Result<(), RepositoryError> {
        self.inner.insert_history(entry).await
    }

    async fn list_history(
        &mut self,
        order_id: OrderId,
    ) -> Result<Vec<OrderHistory>, RepositoryError> {
        self.inner.list_history(order_id).await
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<Payment, RepositoryError> {
        self.inner.insert_payment(payment).await
    }

    async fn open_payment_attempt(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<Payment>, RepositoryError> {
        self.inner.open_payment_attempt(order_id).await
    }

    async fn update_payment(
        &mut self,
        id: PaymentId,
        status: PaymentRecordStatus,
        transaction_id: Option<&str>,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Payment, RepositoryError> {
        self.inner
            .update_payment(id, status, transaction_id, paid_at)
            .await
    }

    async fn get_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        self.inner.get_payment(id).await
    }

    async fn list_payments(
        &mut self,
        owner: Option<UserId>,
    ) -> Result<Vec<Payment>, RepositoryError> {
        self.inner.list_payments(owner).await
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.inner.commit().await
    }
}
