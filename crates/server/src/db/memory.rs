//! In-memory implementation of [`Store`] for tests and local demos.
//!
//! A transaction takes the store-wide lock and works on a copy of the data,
//! which is swapped in on commit. Transactions are therefore fully
//! serialized, and dropping one without committing discards its writes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use oms_core::{
    CustomerId, OrderHistoryId, OrderId, OrderItemId, OrderStatus, PaymentId,
    PaymentRecordStatus, PaymentStatus, ProductId, UserId,
};

use super::{RepositoryError, RowLock, StockChange, Store, StoreTx, check_payment_move};
use crate::models::{
    NewHistory, NewOrder, NewOrderItem, NewPayment, Order, OrderHistory, OrderItem, Payment,
    Product,
};

#[derive(Debug, Clone, Default)]
struct MemoryData {
    next_id: i32,
    products: BTreeMap<ProductId, Product>,
    customers: BTreeSet<CustomerId>,
    /// Order headers; `items` and `history` are kept in the tables below.
    orders: BTreeMap<OrderId, Order>,
    items: Vec<OrderItem>,
    history: Vec<OrderHistory>,
    payments: BTreeMap<PaymentId, Payment>,
}

impl MemoryData {
    const fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn assemble(&self, header: &Order, with_history: bool) -> Order {
        let mut order = header.clone();
        order.items = self
            .items
            .iter()
            .filter(|item| item.order_id == header.id)
            .cloned()
            .collect();
        if with_history {
            order.history = self
                .history
                .iter()
                .filter(|entry| entry.order_id == header.id)
                .cloned()
                .collect();
        }
        order
    }

    fn order_mut(&mut self, id: OrderId) -> Result<&mut Order, RepositoryError> {
        self.orders.get_mut(&id).ok_or(RepositoryError::NotFound)
    }
}

/// Store that keeps everything in process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<MemoryData>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product to the catalogue.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> ProductId {
        let mut data = self.data.lock().await;
        let id = ProductId::new(data.next_id());
        data.products.insert(
            id,
            Product {
                id,
                name: name.to_owned(),
                price,
                stock,
                is_active: true,
                updated_at: Utc::now(),
            },
        );
        id
    }

    /// Register a customer id that orders may reference.
    pub async fn seed_customer(&self) -> CustomerId {
        let mut data = self.data.lock().await;
        let id = CustomerId::new(data.next_id());
        data.customers.insert(id);
        id
    }

    /// Mutate a product in place (price changes, deactivation).
    pub async fn update_product(&self, id: ProductId, change: impl FnOnce(&mut Product) + Send) {
        let mut data = self.data.lock().await;
        if let Some(product) = data.products.get_mut(&id) {
            change(product);
            product.updated_at = Utc::now();
        }
    }

    /// Current state of a product.
    pub async fn product(&self, id: ProductId) -> Option<Product> {
        self.data.lock().await.products.get(&id).cloned()
    }

    /// Number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.data.lock().await.orders.len()
    }

    /// Number of stored order items across all orders.
    pub async fn item_count(&self) -> usize {
        self.data.lock().await.items.len()
    }

    /// All payments recorded for an order, oldest first.
    pub async fn payments_of(&self, order_id: OrderId) -> Vec<Payment> {
        self.data
            .lock()
            .await
            .payments
            .values()
            .filter(|payment| payment.order_id == order_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, RepositoryError> {
        let guard = Arc::clone(&self.data).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// An in-memory transaction holding the store lock.
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryData>,
    work: MemoryData,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn product_for_update(
        &mut self,
        id: ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        Ok(self.work.products.get(&id).cloned())
    }

    async fn adjust_stock(
        &mut self,
        id: ProductId,
        delta: i32,
    ) -> Result<StockChange, RepositoryError> {
        let Some(product) = self.work.products.get_mut(&id) else {
            return Ok(StockChange::Missing);
        };
        match product.stock.checked_add(delta) {
            Some(stock) if stock >= 0 => {
                product.stock = stock;
                product.updated_at = Utc::now();
                Ok(StockChange::Applied(stock))
            }
            _ => Ok(StockChange::Insufficient {
                available: product.stock,
            }),
        }
    }

    async fn customer_exists(&mut self, id: CustomerId) -> Result<bool, RepositoryError> {
        Ok(self.work.customers.contains(&id))
    }

    async fn order_sn_exists(&mut self, order_sn: &str) -> Result<bool, RepositoryError> {
        Ok(self
            .work
            .orders
            .values()
            .any(|order| order.order_sn == order_sn))
    }

    async fn trade_no_exists(&mut self, trade_no: &str) -> Result<bool, RepositoryError> {
        Ok(self
            .work
            .orders
            .values()
            .any(|order| order.trade_no.as_deref() == Some(trade_no)))
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        if self.order_sn_exists(&order.order_sn).await? {
            return Err(RepositoryError::Conflict("order_sn already exists".to_owned()));
        }
        let id = OrderId::new(self.work.next_id());
        let now = Utc::now();
        self.work.orders.insert(
            id,
            Order {
                id,
                order_sn: order.order_sn.clone(),
                user_id: order.user_id,
                customer_id: order.customer_id,
                total_amount: order.total_amount,
                status: OrderStatus::Pending,
                payment_status: PaymentStatus::Unpaid,
                shipping_fee: order.shipping_fee,
                receiver_name: order.receiver_name.clone(),
                receiver_phone: order.receiver_phone.clone(),
                shipping_address: order.shipping_address.clone(),
                remark: order.remark.clone(),
                trade_no: None,
                created_at: now,
                updated_at: now,
                items: Vec::new(),
                history: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn insert_order_items(
        &mut self,
        order_id: OrderId,
        items: &[NewOrderItem],
    ) -> Result<(), RepositoryError> {
        for item in items {
            let id = OrderItemId::new(self.work.next_id());
            self.work.items.push(OrderItem {
                id,
                order_id,
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
            });
        }
        Ok(())
    }

    async fn delete_order_items(&mut self, order_id: OrderId) -> Result<(), RepositoryError> {
        self.work.items.retain(|item| item.order_id != order_id);
        Ok(())
    }

    async fn get_order(
        &mut self,
        id: OrderId,
        _lock: RowLock,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .work
            .orders
            .get(&id)
            .map(|header| self.work.assemble(header, true)))
    }

    async fn get_order_by_sn(
        &mut self,
        order_sn: &str,
        _lock: RowLock,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .work
            .orders
            .values()
            .find(|order| order.order_sn == order_sn)
            .map(|header| self.work.assemble(header, true)))
    }

    async fn get_order_by_trade_no(
        &mut self,
        trade_no: &str,
        _lock: RowLock,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .work
            .orders
            .values()
            .find(|order| order.trade_no.as_deref() == Some(trade_no))
            .map(|header| self.work.assemble(header, true)))
    }

    async fn list_orders(&mut self, owner: Option<UserId>) -> Result<Vec<Order>, RepositoryError> {
        // Ids are allocated in creation order, so reverse id order is newest first.
        Ok(self
            .work
            .orders
            .values()
            .rev()
            .filter(|order| owner.is_none_or(|owner| order.user_id == owner))
            .map(|header| self.work.assemble(header, false))
            .collect())
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        payment_status: PaymentStatus,
    ) -> Result<(), RepositoryError> {
        let order = self.work.order_mut(id)?;
        order.status = status;
        order.payment_status = payment_status;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn update_order_total(
        &mut self,
        id: OrderId,
        total_amount: Decimal,
    ) -> Result<(), RepositoryError> {
        let order = self.work.order_mut(id)?;
        order.total_amount = total_amount;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn set_trade_no(&mut self, id: OrderId, trade_no: &str) -> Result<(), RepositoryError> {
        if self.trade_no_exists(trade_no).await? {
            return Err(RepositoryError::Conflict("trade_no already exists".to_owned()));
        }
        let order = self.work.order_mut(id)?;
        order.trade_no = Some(trade_no.to_owned());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_history(&mut self, entry: &NewHistory) -> Result<(), RepositoryError> {
        let id = OrderHistoryId::new(self.work.next_id());
        self.work.history.push(OrderHistory {
            id,
            order_id: entry.order_id,
            status: entry.status,
            operator_id: entry.operator_id,
            operated_at: Utc::now(),
            remark: entry.remark.clone(),
        });
        Ok(())
    }

    async fn list_history(
        &mut self,
        order_id: OrderId,
    ) -> Result<Vec<OrderHistory>, RepositoryError> {
        Ok(self
            .work
            .history
            .iter()
            .filter(|entry| entry.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<Payment, RepositoryError> {
        if payment.status == PaymentRecordStatus::Success
            && payment.transaction_id.is_some()
            && self.work.payments.values().any(|existing| {
                existing.order_id == payment.order_id
                    && existing.status == PaymentRecordStatus::Success
                    && existing.transaction_id == payment.transaction_id
            })
        {
            return Err(RepositoryError::Conflict(
                "successful payment for this trade already exists".to_owned(),
            ));
        }
        let id = PaymentId::new(self.work.next_id());
        let now = Utc::now();
        let row = Payment {
            id,
            order_id: payment.order_id,
            amount: payment.amount,
            status: payment.status,
            payment_method: payment.payment_method,
            transaction_id: payment.transaction_id.clone(),
            paid_at: payment.paid_at,
            created_at: now,
            updated_at: now,
        };
        self.work.payments.insert(id, row.clone());
        Ok(row)
    }

    async fn open_payment_attempt(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<Payment>, RepositoryError> {
        Ok(self
            .work
            .payments
            .values()
            .rev()
            .find(|payment| {
                payment.order_id == order_id
                    && matches!(
                        payment.status,
                        PaymentRecordStatus::Initiated | PaymentRecordStatus::Pending
                    )
            })
            .cloned())
    }

    async fn update_payment(
        &mut self,
        id: PaymentId,
        status: PaymentRecordStatus,
        transaction_id: Option<&str>,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Payment, RepositoryError> {
        let payment = self
            .work
            .payments
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        check_payment_move(id, payment.status, status)?;
        payment.status = status;
        if let Some(transaction_id) = transaction_id {
            payment.transaction_id = Some(transaction_id.to_owned());
        }
        if paid_at.is_some() {
            payment.paid_at = paid_at;
        }
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    async fn get_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        Ok(self.work.payments.get(&id).cloned())
    }

    async fn list_payments(
        &mut self,
        owner: Option<UserId>,
    ) -> Result<Vec<Payment>, RepositoryError> {
        let orders = &self.work.orders;
        Ok(self
            .work
            .payments
            .values()
            .rev()
            .filter(|payment| {
                owner.is_none_or(|owner| {
                    orders
                        .get(&payment.order_id)
                        .is_some_and(|order| order.user_id == owner)
                })
            })
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
