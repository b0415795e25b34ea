//! Order workflow: creation, status changes, item edits and queries.

use std::sync::Arc;

use oms_core::{OrderId, OrderStatus, PaymentStatus, order_total};
use rust_decimal::Decimal;
use tracing::instrument;

use super::authz::{Action, Resource, authorize, sees_all_orders};
use super::inventory::{self, restock_items};
use super::notifications::{Notifier, OrderEvent};
use super::{WorkflowError, serial};
use crate::db::{RowLock, Store, StoreTx};
use crate::models::order::validate_items;
use crate::models::{
    Actor, CreateOrder, NewHistory, NewOrder, NewOrderItem, Order, OrderHistory, OrderItemInput,
};

const CREATED_REMARK: &str = "order created";

/// Result of applying a status change to one order.
enum StatusOutcome {
    Changed { order: Order, from: OrderStatus },
    Unchanged(Order),
}

/// Order lifecycle operations.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl OrderService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Create an order owned by `actor`, deducting stock for every line.
    ///
    /// Order header, items, the initial history row and the stock deductions
    /// are written in one transaction.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::Validation` for malformed input
    /// - `WorkflowError::NotFound` for an unknown customer or product
    /// - `WorkflowError::InsufficientStock` for inactive or short products
    /// - `WorkflowError::SerialGenerationExhausted` if no free serial was found
    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id, items = input.items.len()))]
    pub async fn create_order(
        &self,
        actor: &Actor,
        input: CreateOrder,
    ) -> Result<Order, WorkflowError> {
        authorize(actor, Action::CreateOrder, Resource::Unowned)?;
        input.validate().map_err(WorkflowError::Validation)?;

        let input = &input;
        let order =
            serial::retry_on_conflict("order serial", move || self.insert_new_order(actor, input))
                .await?;

        tracing::info!(order_id = %order.id, order_sn = %order.order_sn, total = %order.total_amount, "Order created");
        self.notifier
            .notify(&OrderEvent::Created {
                order_id: order.id,
                order_sn: order.order_sn.clone(),
                user_id: order.user_id,
                total_amount: order.total_amount,
            })
            .await;

        Ok(order)
    }

    /// Move an order to `new_status`, recording history.
    ///
    /// Requesting the current status is a no-op. Entering `paid` marks the
    /// order as paid; entering `cancelled` puts the stock back.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::PermissionDenied` unless the actor is an admin
    /// - `WorkflowError::NotFound` for an unknown order
    /// - `WorkflowError::InvalidTransition` for an unknown or unreachable status
    #[instrument(skip(self, actor, remark), fields(user_id = %actor.user_id))]
    pub async fn update_order_status(
        &self,
        actor: &Actor,
        order_id: OrderId,
        new_status: &str,
        remark: Option<String>,
    ) -> Result<Order, WorkflowError> {
        authorize(actor, Action::UpdateOrderStatus, Resource::Unowned)?;

        match self.apply_status(actor, order_id, new_status, remark).await? {
            StatusOutcome::Changed { order, from } => {
                self.notify_status_change(&order, from).await;
                Ok(order)
            }
            StatusOutcome::Unchanged(order) => Ok(order),
        }
    }

    /// Apply a status change to many orders, one transaction each.
    ///
    /// Orders that fail permission, lookup or transition checks are skipped.
    /// Only orders whose status actually changed are counted.
    #[instrument(skip(self, actor, order_ids, remark), fields(user_id = %actor.user_id, requested = order_ids.len()))]
    pub async fn batch_update_status(
        &self,
        actor: &Actor,
        order_ids: &[OrderId],
        new_status: &str,
        remark: Option<String>,
    ) -> usize {
        let mut updated = 0;
        for &order_id in order_ids {
            if let Err(err) = authorize(actor, Action::UpdateOrderStatus, Resource::Unowned) {
                tracing::debug!(%order_id, error = %err, "Skipping order in batch");
                continue;
            }
            match self
                .apply_status(actor, order_id, new_status, remark.clone())
                .await
            {
                Ok(StatusOutcome::Changed { order, from }) => {
                    updated += 1;
                    self.notify_status_change(&order, from).await;
                }
                Ok(StatusOutcome::Unchanged(_)) => {}
                Err(err) => {
                    tracing::debug!(%order_id, error = %err, "Skipping order in batch");
                }
            }
        }
        tracing::info!(updated, "Batch status update finished");
        updated
    }

    /// Replace the items of a pending order.
    ///
    /// Prices are snapshotted again and the total recomputed. Stock levels
    /// are left as they are.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::PermissionDenied` unless owner or admin
    /// - `WorkflowError::OrderLocked` once the order has left `pending`
    /// - `WorkflowError::Validation`, `NotFound`, `InsufficientStock` as for creation
    #[instrument(skip(self, actor, items), fields(user_id = %actor.user_id, items = items.len()))]
    pub async fn update_order_items(
        &self,
        actor: &Actor,
        order_id: OrderId,
        items: Vec<OrderItemInput>,
    ) -> Result<Order, WorkflowError> {
        validate_items(&items).map_err(WorkflowError::Validation)?;

        let mut tx = self.store.begin().await?;
        let order = tx
            .get_order(order_id, RowLock::ForUpdate)
            .await?
            .ok_or_else(|| WorkflowError::not_found("order", order_id))?;
        authorize(
            actor,
            Action::EditOrderItems,
            Resource::Order {
                owner: order.user_id,
            },
        )?;
        if order.status != OrderStatus::Pending {
            return Err(WorkflowError::OrderLocked {
                order_id,
                status: order.status,
            });
        }

        let lines = snapshot_lines(tx.as_mut(), &items, false).await?;
        let total_amount = order_total(lines.iter().map(|line| (line.unit_price, line.quantity)))?;

        tx.delete_order_items(order_id).await?;
        tx.insert_order_items(order_id, &lines).await?;
        tx.update_order_total(order_id, total_amount).await?;

        let order = reload(tx.as_mut(), order_id).await?;
        tx.commit().await?;

        tracing::info!(%order_id, total = %order.total_amount, "Order items replaced");
        Ok(order)
    }

    /// Fetch one order with items and history.
    ///
    /// # Errors
    ///
    /// `NotFound` or `PermissionDenied`.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get_order(&self, actor: &Actor, order_id: OrderId) -> Result<Order, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .get_order(order_id, RowLock::None)
            .await?
            .ok_or_else(|| WorkflowError::not_found("order", order_id))?;
        authorize(actor, Action::ViewOrder, Resource::Order { owner: order.user_id })?;
        Ok(order)
    }

    /// Fetch one order by its serial.
    ///
    /// # Errors
    ///
    /// `NotFound` or `PermissionDenied`.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get_order_by_sn(
        &self,
        actor: &Actor,
        order_sn: &str,
    ) -> Result<Order, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .get_order_by_sn(order_sn, RowLock::None)
            .await?
            .ok_or_else(|| WorkflowError::not_found("order", order_sn))?;
        authorize(actor, Action::ViewOrder, Resource::Order { owner: order.user_id })?;
        Ok(order)
    }

    /// Orders visible to `actor`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Repository` if the store fails.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn list_orders(&self, actor: &Actor) -> Result<Vec<Order>, WorkflowError> {
        let owner = (!sees_all_orders(actor)).then_some(actor.user_id);
        let mut tx = self.store.begin().await?;
        Ok(tx.list_orders(owner).await?)
    }

    /// History of one order, oldest first.
    ///
    /// # Errors
    ///
    /// `NotFound` or `PermissionDenied`.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn order_history(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<Vec<OrderHistory>, WorkflowError> {
        Ok(self.get_order(actor, order_id).await?.history)
    }

    /// One attempt at writing a new order. A serial taken by a concurrent
    /// commit surfaces as `RepositoryError::Conflict` from `insert_order`.
    async fn insert_new_order(
        &self,
        actor: &Actor,
        input: &CreateOrder,
    ) -> Result<Order, WorkflowError> {
        let mut tx = self.store.begin().await?;

        if let Some(customer_id) = input.customer_id
            && !tx.customer_exists(customer_id).await?
        {
            return Err(WorkflowError::not_found("customer", customer_id));
        }

        let lines = snapshot_lines(tx.as_mut(), &input.items, true).await?;
        let total_amount = order_total(lines.iter().map(|line| (line.unit_price, line.quantity)))?;
        let order_sn = serial::unique_order_sn(tx.as_mut()).await?;

        let order_id = tx
            .insert_order(&NewOrder {
                order_sn,
                user_id: actor.user_id,
                customer_id: input.customer_id,
                total_amount,
                shipping_fee: input.shipping_fee.unwrap_or(Decimal::ZERO),
                receiver_name: input.receiver_name.trim().to_owned(),
                receiver_phone: input.receiver_phone.trim().to_owned(),
                shipping_address: input.shipping_address.trim().to_owned(),
                remark: input.remark.clone(),
            })
            .await?;
        tx.insert_order_items(order_id, &lines).await?;
        tx.insert_history(&NewHistory {
            order_id,
            status: OrderStatus::Pending,
            operator_id: actor.user_id,
            remark: Some(CREATED_REMARK.to_owned()),
        })
        .await?;

        for line in &lines {
            inventory::adjust_stock(tx.as_mut(), line.product_id, -line.quantity).await?;
        }

        let order = reload(tx.as_mut(), order_id).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn apply_status(
        &self,
        actor: &Actor,
        order_id: OrderId,
        new_status: &str,
        remark: Option<String>,
    ) -> Result<StatusOutcome, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .get_order(order_id, RowLock::ForUpdate)
            .await?
            .ok_or_else(|| WorkflowError::not_found("order", order_id))?;

        let target: OrderStatus =
            new_status
                .parse()
                .map_err(|_| WorkflowError::InvalidTransition {
                    from: order.status,
                    to: new_status.to_owned(),
                })?;

        if target == order.status {
            return Ok(StatusOutcome::Unchanged(order));
        }
        if !order.status.can_transition_to(target) {
            return Err(WorkflowError::InvalidTransition {
                from: order.status,
                to: target.to_string(),
            });
        }

        let payment_status = if target == OrderStatus::Paid {
            PaymentStatus::Paid
        } else {
            order.payment_status
        };
        tx.update_order_status(order_id, target, payment_status)
            .await?;

        if target == OrderStatus::Cancelled {
            restock_items(tx.as_mut(), &order.items).await?;
        }

        tx.insert_history(&NewHistory {
            order_id,
            status: target,
            operator_id: actor.user_id,
            remark,
        })
        .await?;

        let updated = reload(tx.as_mut(), order_id).await?;
        tx.commit().await?;

        tracing::info!(%order_id, from = %order.status, to = %target, "Order status changed");
        Ok(StatusOutcome::Changed {
            order: updated,
            from: order.status,
        })
    }

    async fn notify_status_change(&self, order: &Order, from: OrderStatus) {
        self.notifier
            .notify(&OrderEvent::StatusChanged {
                order_id: order.id,
                order_sn: order.order_sn.clone(),
                from,
                to: order.status,
            })
            .await;
    }
}

/// Look up every requested product and freeze its name and price.
///
/// Inactive products are reported as having no stock. With
/// `require_stock`, lines asking for more than is on hand fail too.
async fn snapshot_lines(
    tx: &mut dyn StoreTx,
    items: &[OrderItemInput],
    require_stock: bool,
) -> Result<Vec<NewOrderItem>, WorkflowError> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let product = tx
            .product_for_update(item.product_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("product", item.product_id))?;

        let available = if product.is_active { product.stock } else { 0 };
        if !product.is_active || (require_stock && available < item.quantity) {
            return Err(WorkflowError::InsufficientStock {
                product_id: product.id,
                requested: item.quantity,
                available,
            });
        }

        lines.push(NewOrderItem {
            product_id: product.id,
            product_name: product.name,
            quantity: item.quantity,
            unit_price: product.price,
        });
    }
    Ok(lines)
}

/// Read back an order written in this transaction.
async fn reload(tx: &mut dyn StoreTx, order_id: OrderId) -> Result<Order, WorkflowError> {
    tx.get_order(order_id, RowLock::None)
        .await?
        .ok_or_else(|| WorkflowError::not_found("order", order_id))
}
