//! `PostgreSQL` implementation of [`Store`].
//!
//! Queries are built at runtime (`query_as` + `FromRow` row structs), so the
//! crate compiles without a live database. Row structs are converted into the
//! models in `crate::models` at the boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use oms_core::{
    CustomerId, OrderHistoryId, OrderId, OrderItemId, OrderStatus, PaymentId, PaymentMethod,
    PaymentRecordStatus, PaymentStatus, ProductId, UserId,
};

use super::{RepositoryError, RowLock, StockChange, Store, StoreTx, check_payment_move};
use crate::models::{
    NewHistory, NewOrder, NewOrderItem, NewPayment, Order, OrderHistory, OrderItem, Payment,
    Product,
};

const ORDER_COLUMNS: &str = "id, order_sn, user_id, customer_id, total_amount, status, \
     payment_status, shipping_fee, receiver_name, receiver_phone, shipping_address, remark, \
     trade_no, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "p.id, p.order_id, p.amount, p.status, p.payment_method, \
     p.transaction_id, p.paid_at, p.created_at, p.updated_at";

/// Store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// An open `PostgreSQL` transaction. Rolled back on drop unless committed.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    price: Decimal,
    stock: i32,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            price: row.price,
            stock: row.stock,
            is_active: row.is_active,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_sn: String,
    user_id: UserId,
    customer_id: Option<CustomerId>,
    total_amount: Decimal,
    status: OrderStatus,
    payment_status: PaymentStatus,
    shipping_fee: Decimal,
    receiver_name: String,
    receiver_phone: String,
    shipping_address: String,
    remark: Option<String>,
    trade_no: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>, history: Vec<OrderHistory>) -> Order {
        Order {
            id: self.id,
            order_sn: self.order_sn,
            user_id: self.user_id,
            customer_id: self.customer_id,
            total_amount: self.total_amount,
            status: self.status,
            payment_status: self.payment_status,
            shipping_fee: self.shipping_fee,
            receiver_name: self.receiver_name,
            receiver_phone: self.receiver_phone,
            shipping_address: self.shipping_address,
            remark: self.remark,
            trade_no: self.trade_no,
            created_at: self.created_at,
            updated_at: self.updated_at,
            items,
            history,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
        }
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: OrderHistoryId,
    order_id: OrderId,
    status: OrderStatus,
    operator_id: UserId,
    operated_at: DateTime<Utc>,
    remark: Option<String>,
}

impl From<HistoryRow> for OrderHistory {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            status: row.status,
            operator_id: row.operator_id,
            operated_at: row.operated_at,
            remark: row.remark,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: PaymentId,
    order_id: OrderId,
    amount: Decimal,
    status: PaymentRecordStatus,
    payment_method: PaymentMethod,
    transaction_id: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            amount: row.amount,
            status: row.status,
            payment_method: row.payment_method,
            transaction_id: row.transaction_id,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl RowLock {
    const fn clause(self) -> &'static str {
        match self {
            Self::None => "",
            Self::ForUpdate => " FOR UPDATE",
        }
    }
}

/// Map unique violations to `Conflict`, everything else to `Database`.
fn map_unique(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(err)
}

impl PgTx {
    async fn load_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, order_id, product_id, product_name, quantity, unit_price
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn load_full(&mut self, row: Option<OrderRow>) -> Result<Option<Order>, RepositoryError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let items = self.load_items(row.id).await?;
        let history = self.list_history(row.id).await?;
        Ok(Some(row.into_order(items, history)))
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn product_for_update(
        &mut self,
        id: ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, price, stock, is_active, updated_at
            FROM products
            WHERE id = $1
            FOR UPDATE
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Product::from))
    }

    async fn adjust_stock(
        &mut self,
        id: ProductId,
        delta: i32,
    ) -> Result<StockChange, RepositoryError> {
        let updated: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE products
            SET stock = stock + $2, updated_at = now()
            WHERE id = $1 AND stock + $2 >= 0
            RETURNING stock
            ",
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(stock) = updated {
            return Ok(StockChange::Applied(stock));
        }

        let available: Option<i32> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(available.map_or(StockChange::Missing, |available| {
            StockChange::Insufficient { available }
        }))
    }

    async fn customer_exists(&mut self, id: CustomerId) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM customers WHERE id = $1)")
                .bind(id)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn order_sn_exists(&mut self, order_sn: &str) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE order_sn = $1)")
                .bind(order_sn)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn trade_no_exists(&mut self, trade_no: &str) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE trade_no = $1)")
                .bind(trade_no)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        sqlx::query_scalar(
            r"
            INSERT INTO orders (order_sn, user_id, customer_id, total_amount, shipping_fee,
                                receiver_name, receiver_phone, shipping_address, remark)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            ",
        )
        .bind(&order.order_sn)
        .bind(order.user_id)
        .bind(order.customer_id)
        .bind(order.total_amount)
        .bind(order.shipping_fee)
        .bind(&order.receiver_name)
        .bind(&order.receiver_phone)
        .bind(&order.shipping_address)
        .bind(&order.remark)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_unique(e, "order_sn"))
    }

    async fn insert_order_items(
        &mut self,
        order_id: OrderId,
        items: &[NewOrderItem],
    ) -> Result<(), RepositoryError> {
        for item in items {
            sqlx::query(
                r"
                INSERT INTO order_items (order_id, product_id, product_name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(order_id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn delete_order_items(&mut self, order_id: OrderId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn get_order(
        &mut self,
        id: OrderId,
        lock: RowLock,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{}",
            lock.clause()
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        self.load_full(row).await
    }

    async fn get_order_by_sn(
        &mut self,
        order_sn: &str,
        lock: RowLock,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_sn = $1{}",
            lock.clause()
        ))
        .bind(order_sn)
        .fetch_optional(&mut *self.tx)
        .await?;

        self.load_full(row).await
    }

    async fn get_order_by_trade_no(
        &mut self,
        trade_no: &str,
        lock: RowLock,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE trade_no = $1{}",
            lock.clause()
        ))
        .bind(trade_no)
        .fetch_optional(&mut *self.tx)
        .await?;

        self.load_full(row).await
    }

    async fn list_orders(&mut self, owner: Option<UserId>) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::int IS NULL OR user_id = $1) \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner)
        .fetch_all(&mut *self.tx)
        .await?;

        let ids: Vec<i32> = rows.iter().map(|row| row.id.as_i32()).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, order_id, product_id, product_name, quantity, unit_price
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, id
            ",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut items_by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            items_by_order
                .entry(row.order_id)
                .or_default()
                .push(OrderItem::from(row));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let items = items_by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items, Vec::new())
            })
            .collect())
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        payment_status: PaymentStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET status = $2, payment_status = $3, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(status)
        .bind(payment_status)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_order_total(
        &mut self,
        id: OrderId,
        total_amount: Decimal,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE orders SET total_amount = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(total_amount)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn set_trade_no(&mut self, id: OrderId, trade_no: &str) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE orders SET trade_no = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(trade_no)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_unique(e, "trade_no"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn insert_history(&mut self, entry: &NewHistory) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO order_history (order_id, status, operator_id, remark)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(entry.order_id)
        .bind(entry.status)
        .bind(entry.operator_id)
        .bind(&entry.remark)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_history(
        &mut self,
        order_id: OrderId,
    ) -> Result<Vec<OrderHistory>, RepositoryError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r"
            SELECT id, order_id, status, operator_id, operated_at, remark
            FROM order_history
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(OrderHistory::from).collect())
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<Payment, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r"
            INSERT INTO payments AS p (order_id, amount, status, payment_method,
                                       transaction_id, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING p.id, p.order_id, p.amount, p.status, p.payment_method,
                      p.transaction_id, p.paid_at, p.created_at, p.updated_at
            ",
        )
        .bind(payment.order_id)
        .bind(payment.amount)
        .bind(payment.status)
        .bind(payment.payment_method)
        .bind(&payment.transaction_id)
        .bind(payment.paid_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_unique(e, "successful payment for this trade"))?;

        Ok(row.into())
    }

    async fn open_payment_attempt(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<Payment>, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments p \
             WHERE p.order_id = $1 AND p.status IN ('initiated', 'pending') \
             ORDER BY p.id DESC \
             LIMIT 1 \
             FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Payment::from))
    }

    async fn update_payment(
        &mut self,
        id: PaymentId,
        status: PaymentRecordStatus,
        transaction_id: Option<&str>,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Payment, RepositoryError> {
        let current: Option<PaymentRecordStatus> =
            sqlx::query_scalar("SELECT status FROM payments WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        let current = current.ok_or(RepositoryError::NotFound)?;
        check_payment_move(id, current, status)?;

        let row = sqlx::query_as::<_, PaymentRow>(
            r"
            UPDATE payments AS p
            SET status = $2,
                transaction_id = COALESCE($3, p.transaction_id),
                paid_at = COALESCE($4, p.paid_at),
                updated_at = now()
            WHERE p.id = $1
            RETURNING p.id, p.order_id, p.amount, p.status, p.payment_method,
                      p.transaction_id, p.paid_at, p.created_at, p.updated_at
            ",
        )
        .bind(id)
        .bind(status)
        .bind(transaction_id)
        .bind(paid_at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_unique(e, "successful payment for this trade"))?;

        row.map(Payment::from).ok_or(RepositoryError::NotFound)
    }

    async fn get_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Payment::from))
    }

    async fn list_payments(
        &mut self,
        owner: Option<UserId>,
    ) -> Result<Vec<Payment>, RepositoryError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments p \
             JOIN orders o ON o.id = p.order_id \
             WHERE ($1::int IS NULL OR o.user_id = $1) \
             ORDER BY p.created_at DESC, p.id DESC"
        ))
        .bind(owner)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Payment::from).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
