//! Order route handlers.
//!
//! JSON endpoints over [`OrderService`](crate::services::OrderService). All
//! of them require a bearer token; the service decides what the caller may
//! see or change.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use oms_core::OrderId;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::{CreateOrder, Order, OrderHistory, OrderItemInput};
use crate::state::AppState;

/// Body of a single status change.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    pub remark: Option<String>,
}

/// Body of a batch status change.
#[derive(Debug, Deserialize)]
pub struct BatchStatusUpdate {
    pub order_ids: Vec<OrderId>,
    pub status: String,
    pub remark: Option<String>,
}

/// Result of a batch status change.
#[derive(Debug, Serialize)]
pub struct BatchStatusResult {
    pub updated: usize,
}

/// Body of an item replacement.
#[derive(Debug, Deserialize)]
pub struct ItemsUpdate {
    pub items: Vec<OrderItemInput>,
}

/// Create an order.
///
/// POST /orders
///
/// # Errors
///
/// Returns 400 for invalid input, 404 for unknown products and 409 when
/// stock is short.
#[instrument(skip(state, input))]
pub async fn create(
    State(state): State<AppState>,
    RequireUser(actor): RequireUser,
    Json(input): Json<CreateOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state.orders().create_order(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// List orders visible to the caller.
///
/// GET /orders
///
/// # Errors
///
/// Returns 500 if the store fails.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    RequireUser(actor): RequireUser,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.orders().list_orders(&actor).await?))
}

/// Fetch one order with items and history.
///
/// GET /orders/{id}
///
/// # Errors
///
/// Returns 404 or 403.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    RequireUser(actor): RequireUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().get_order(&actor, order_id).await?))
}

/// Fetch one order by serial.
///
/// GET /orders/sn/{order_sn}
///
/// # Errors
///
/// Returns 404 or 403.
#[instrument(skip(state))]
pub async fn show_by_sn(
    State(state): State<AppState>,
    RequireUser(actor): RequireUser,
    Path(order_sn): Path<String>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().get_order_by_sn(&actor, &order_sn).await?))
}

/// Status history of an order.
///
/// GET /orders/{id}/history
///
/// # Errors
///
/// Returns 404 or 403.
#[instrument(skip(state))]
pub async fn history(
    State(state): State<AppState>,
    RequireUser(actor): RequireUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Vec<OrderHistory>>> {
    Ok(Json(state.orders().order_history(&actor, order_id).await?))
}

/// Change the status of one order.
///
/// PUT /orders/{id}
///
/// # Errors
///
/// Returns 403 for non-admins and 409 for disallowed transitions.
#[instrument(skip(state, body), fields(status = %body.status))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireUser(actor): RequireUser,
    Path(order_id): Path<OrderId>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<Order>> {
    let order = state
        .orders()
        .update_order_status(&actor, order_id, &body.status, body.remark)
        .await?;
    Ok(Json(order))
}

/// Change the status of many orders.
///
/// PUT /orders/status
///
/// Orders that cannot be changed are skipped; the response counts the ones
/// that were.
#[instrument(skip(state, body), fields(status = %body.status))]
pub async fn batch_update_status(
    State(state): State<AppState>,
    RequireUser(actor): RequireUser,
    Json(body): Json<BatchStatusUpdate>,
) -> Json<BatchStatusResult> {
    let updated = state
        .orders()
        .batch_update_status(&actor, &body.order_ids, &body.status, body.remark)
        .await;
    Json(BatchStatusResult { updated })
}

/// Replace the items of a pending order.
///
/// PUT /orders/{id}/items
///
/// # Errors
///
/// Returns 409 once the order has left `pending`.
#[instrument(skip(state, body))]
pub async fn update_items(
    State(state): State<AppState>,
    RequireUser(actor): RequireUser,
    Path(order_id): Path<OrderId>,
    Json(body): Json<ItemsUpdate>,
) -> Result<Json<Order>> {
    let order = state
        .orders()
        .update_order_items(&actor, order_id, body.items)
        .await?;
    Ok(Json(order))
}
