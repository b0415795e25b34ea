//! Product route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use oms_core::ProductId;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::state::AppState;

/// Body of a stock adjustment.
#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    /// Negative to deduct, positive to restock.
    pub delta: i32,
}

/// Stock level after an adjustment.
#[derive(Debug, Serialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub stock: i32,
}

/// Adjust a product's stock.
///
/// PATCH /products/{id}/stock
///
/// # Errors
///
/// Returns 403 for customers, 404 for unknown products and 409 when the
/// stock would go negative.
#[instrument(skip(state))]
pub async fn adjust_stock(
    State(state): State<AppState>,
    RequireUser(actor): RequireUser,
    Path(product_id): Path<ProductId>,
    Json(body): Json<StockAdjustment>,
) -> Result<Json<StockLevel>> {
    let stock = state
        .inventory()
        .adjust(&actor, product_id, body.delta)
        .await?;
    Ok(Json(StockLevel { product_id, stock }))
}
