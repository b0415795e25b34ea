//! OMS server library.
//!
//! Order workflow and payment reconciliation over HTTP. The binary in
//! `main.rs` wires this library to `PostgreSQL`; tests wire it to the
//! in-memory store.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod ecpay;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, extract::Request, middleware as axum_middleware};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router with tracing and request IDs.
///
/// Sentry layers are added by the binary so tests run without a client.
pub fn app(state: AppState) -> Router {
    routes::routes()
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
                user_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
}
