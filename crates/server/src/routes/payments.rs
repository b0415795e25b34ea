//! Payment route handlers.
//!
//! The checkout, listing and direct payment endpoints take a bearer token.
//! The two vendor endpoints are called by ECPay and by the shopper's browser
//! and are authenticated by `CheckMacValue` (callback) or not at all (return).

use std::collections::BTreeMap;

use axum::{
    Form, Json,
    extract::{Path, State},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use oms_core::{OrderId, PaymentId};
use tracing::instrument;

use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireUser;
use crate::models::Payment;
use crate::services::CheckoutForm;
use crate::state::AppState;

/// Pay an order directly.
///
/// POST /payments/{order_id}
///
/// # Errors
///
/// Returns 403 unless owner or admin and 409 unless the order is pending.
#[instrument(skip(state))]
pub async fn pay_direct(
    State(state): State<AppState>,
    RequireUser(actor): RequireUser,
    Path(order_id): Path<OrderId>,
) -> Result<(StatusCode, Json<Payment>)> {
    let payment = state.payments().pay_order_direct(&actor, order_id).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// List payments visible to the caller.
///
/// GET /payments
///
/// # Errors
///
/// Returns 500 if the store fails.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    RequireUser(actor): RequireUser,
) -> Result<Json<Vec<Payment>>> {
    Ok(Json(state.payments().list_payments(&actor).await?))
}

/// Fetch one payment.
///
/// GET /payments/{id}
///
/// # Errors
///
/// Returns 404 or 403.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    RequireUser(actor): RequireUser,
    Path(payment_id): Path<PaymentId>,
) -> Result<Json<Payment>> {
    Ok(Json(state.payments().get_payment(&actor, payment_id).await?))
}

/// Build the signed ECPay checkout form for an order.
///
/// POST /payments/ecpay/{order_id}
///
/// # Errors
///
/// Returns 403 unless owner or admin and 409 unless the order is pending
/// and unpaid.
#[instrument(skip(state))]
pub async fn ecpay_checkout(
    State(state): State<AppState>,
    RequireUser(actor): RequireUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<CheckoutForm>> {
    let form = state
        .payments()
        .initiate_vendor_checkout(&actor, order_id)
        .await?;
    Ok(Json(form))
}

/// Server-to-server payment notification from ECPay.
///
/// POST /payments/ecpay/callback
///
/// Always answers 200 with the vendor's ack string; failures are encoded in
/// the body so the vendor knows whether to retry.
#[instrument(skip(state, params))]
pub async fn ecpay_callback(
    State(state): State<AppState>,
    Form(params): Form<BTreeMap<String, String>>,
) -> &'static str {
    let trade_no = params.get("MerchantTradeNo").map_or("", String::as_str);
    let rtn_code = params.get("RtnCode").map_or("", String::as_str);
    add_breadcrumb(
        "payment",
        "ECPay callback received",
        Some(&[("trade_no", trade_no), ("rtn_code", rtn_code)]),
    );

    state.payments().handle_vendor_callback(&params).await.as_str()
}

/// Browser redirect back from the ECPay payment page.
///
/// POST /payments/ecpay/return
///
/// # Errors
///
/// Returns 500 if the order lookup fails.
#[instrument(skip(state, form))]
pub async fn ecpay_return(
    State(state): State<AppState>,
    Form(form): Form<BTreeMap<String, String>>,
) -> Result<Response> {
    let location = state.payments().vendor_return_redirect(&form).await?;
    Ok((StatusCode::FOUND, [(LOCATION, location)]).into_response())
}
