//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                      - Liveness check
//! GET  /health/ready                - Readiness check (store reachable)
//!
//! # Orders (bearer token)
//! POST /orders                      - Create order
//! GET  /orders                      - List visible orders
//! PUT  /orders/status               - Batch status change (admin)
//! GET  /orders/{id}                 - Order detail with items and history
//! PUT  /orders/{id}                 - Status change (admin)
//! PUT  /orders/{id}/items           - Replace items (pending only)
//! GET  /orders/{id}/history         - Status history
//! GET  /orders/sn/{order_sn}        - Order by serial
//!
//! # Payments
//! GET  /payments                    - List visible payments
//! GET  /payments/{id}               - Payment detail
//! POST /payments/{order_id}         - Direct payment
//! POST /payments/ecpay/{order_id}   - Signed ECPay checkout form
//! POST /payments/ecpay/callback     - ECPay notification (CheckMacValue)
//! POST /payments/ecpay/return       - Browser return, redirects to frontend
//!
//! # Products
//! PATCH /products/{id}/stock        - Stock adjustment (admin, seller)
//! ```

pub mod orders;
pub mod payments;
pub mod products;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, patch, post, put},
};

use crate::state::AppState;

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(orders::create).get(orders::index))
        .route("/status", put(orders::batch_update_status))
        .route("/sn/{order_sn}", get(orders::show_by_sn))
        .route("/{id}", get(orders::show).put(orders::update_status))
        .route("/{id}/items", put(orders::update_items))
        .route("/{id}/history", get(orders::history))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(payments::index))
        // Same segment: a payment id for GET, an order id for POST
        .route("/{id}", get(payments::show).post(payments::pay_direct))
        .route("/ecpay/callback", post(payments::ecpay_callback))
        .route("/ecpay/return", post(payments::ecpay_return))
        .route("/ecpay/{order_id}", post(payments::ecpay_checkout))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new().route("/{id}/stock", patch(products::adjust_stock))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/orders", order_routes())
        .nest("/payments", payment_routes())
        .nest("/products", product_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies store connectivity before returning OK.
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
