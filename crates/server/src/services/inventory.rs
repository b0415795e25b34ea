//! Stock adjustments tied to the order lifecycle.
//!
//! Inside workflows the adjuster runs on the caller's transaction, so a
//! failed deduction rolls back the whole operation. [`InventoryService`]
//! exposes the same adjustment as a stand-alone operation for staff.

use std::sync::Arc;

use oms_core::ProductId;
use tracing::instrument;

use super::WorkflowError;
use super::authz::{Action, Resource, authorize};
use crate::db::{StockChange, Store, StoreTx};
use crate::models::{Actor, OrderItem};

/// Apply `delta` to a product's stock and return the new level.
///
/// Negative deltas deduct, positive deltas restore.
///
/// # Errors
///
/// - `WorkflowError::NotFound` if the product does not exist
/// - `WorkflowError::InsufficientStock` if the result would be negative
pub async fn adjust_stock(
    tx: &mut dyn StoreTx,
    product_id: ProductId,
    delta: i32,
) -> Result<i32, WorkflowError> {
    match tx.adjust_stock(product_id, delta).await? {
        StockChange::Applied(stock) => Ok(stock),
        StockChange::Insufficient { available } => Err(WorkflowError::InsufficientStock {
            product_id,
            requested: delta.saturating_neg(),
            available,
        }),
        StockChange::Missing => Err(WorkflowError::not_found("product", product_id)),
    }
}

/// Put the stock of every item back, once per cancellation.
///
/// Products deleted since the order was placed are skipped.
///
/// # Errors
///
/// Returns `WorkflowError::Repository` if the store fails.
pub async fn restock_items(
    tx: &mut dyn StoreTx,
    items: &[OrderItem],
) -> Result<(), WorkflowError> {
    for item in items {
        match tx.adjust_stock(item.product_id, item.quantity).await? {
            StockChange::Applied(stock) => {
                tracing::debug!(product_id = %item.product_id, stock, "Stock restored");
            }
            StockChange::Missing => {
                tracing::warn!(
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    "Product no longer exists, skipping restock"
                );
            }
            // Unreachable for positive quantities.
            StockChange::Insufficient { .. } => {}
        }
    }
    Ok(())
}

/// Stand-alone stock adjustments.
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn Store>,
}

impl InventoryService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Adjust stock in its own transaction.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::PermissionDenied` for customers
    /// - `WorkflowError::Validation` for a zero delta
    /// - see [`adjust_stock`]
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn adjust(
        &self,
        actor: &Actor,
        product_id: ProductId,
        delta: i32,
    ) -> Result<i32, WorkflowError> {
        authorize(actor, Action::AdjustStock, Resource::Unowned)?;
        if delta == 0 {
            return Err(WorkflowError::Validation("delta must not be zero".to_owned()));
        }

        let mut tx = self.store.begin().await?;
        let stock = adjust_stock(tx.as_mut(), product_id, delta).await?;
        tx.commit().await?;

        tracing::info!(%product_id, delta, stock, "Stock adjusted");
        Ok(stock)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use oms_core::{Role, UserId};
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::MemoryStore;

    fn seller() -> Actor {
        Actor::new(UserId::new(10), Role::Seller)
    }

    #[tokio::test]
    async fn test_adjust_deducts_and_restores() {
        let store = MemoryStore::new();
        let product = store.seed_product("Mug", Decimal::new(250, 0), 10).await;
        let service = InventoryService::new(Arc::new(store.clone()));

        assert_eq!(service.adjust(&seller(), product, -4).await.unwrap(), 6);
        assert_eq!(service.adjust(&seller(), product, 3).await.unwrap(), 9);
        assert_eq!(store.product(product).await.unwrap().stock, 9);
    }

    #[tokio::test]
    async fn test_adjust_rejects_negative_result() {
        let store = MemoryStore::new();
        let product = store.seed_product("Mug", Decimal::new(250, 0), 2).await;
        let service = InventoryService::new(Arc::new(store.clone()));

        let err = service.adjust(&seller(), product, -3).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));
        assert_eq!(store.product(product).await.unwrap().stock, 2);
    }

    #[tokio::test]
    async fn test_adjust_unknown_product() {
        let service = InventoryService::new(Arc::new(MemoryStore::new()));
        let err = service
            .adjust(&seller(), ProductId::new(404), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_customer_cannot_adjust() {
        let store = MemoryStore::new();
        let product = store.seed_product("Mug", Decimal::new(250, 0), 2).await;
        let service = InventoryService::new(Arc::new(store));
        let customer = Actor::new(UserId::new(1), Role::Customer);

        assert!(matches!(
            service.adjust(&customer, product, 1).await,
            Err(WorkflowError::PermissionDenied)
        ));
    }
}
