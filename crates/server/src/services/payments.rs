//! Payment reconciliation: direct payment, vendor checkout and the vendor's
//! server-to-server notification.
//!
//! An order is settled at most once. The callback path checks the order's
//! `payment_status` under the order row lock, and the store rejects a second
//! successful payment for the same trade number.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use oms_core::{
    OrderId, OrderStatus, PaymentId, PaymentMethod, PaymentRecordStatus, PaymentStatus,
    to_whole_units,
};
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::instrument;

use super::authz::{Action, Resource, authorize, sees_all_payments};
use super::notifications::{Notifier, OrderEvent};
use super::{WorkflowError, serial};
use crate::config::EcpayConfig;
use crate::db::{RepositoryError, RowLock, Store, StoreTx};
use crate::ecpay::{self, CallbackAck, CheckoutRequest};
use crate::models::{Actor, NewHistory, NewPayment, Order, Payment};

const RTN_CODE: &str = "RtnCode";
const MERCHANT_TRADE_NO: &str = "MerchantTradeNo";
const TRADE_AMT: &str = "TradeAmt";
const RTN_CODE_PAID: &str = "1";

/// Everything the browser needs to post the vendor checkout form.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutForm {
    pub ecpay_url: String,
    pub params: BTreeMap<String, String>,
}

/// Payment operations.
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    ecpay: EcpayConfig,
    frontend_url: String,
}

impl PaymentService {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        ecpay: EcpayConfig,
        frontend_url: String,
    ) -> Self {
        Self {
            store,
            notifier,
            ecpay,
            frontend_url,
        }
    }

    /// Settle a pending order without a vendor.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::NotFound` for an unknown order
    /// - `WorkflowError::PermissionDenied` unless owner or admin
    /// - `WorkflowError::InvalidOrderState` unless the order is pending
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn pay_order_direct(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<Payment, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let order = payable_order(tx.as_mut(), actor, order_id).await?;

        let payment = tx
            .insert_payment(&NewPayment {
                order_id,
                amount: order.total_amount,
                status: PaymentRecordStatus::Success,
                payment_method: PaymentMethod::Direct,
                transaction_id: None,
                paid_at: Some(Utc::now()),
            })
            .await?;
        tx.update_order_status(order_id, OrderStatus::Paid, PaymentStatus::Paid)
            .await?;
        tx.insert_history(&NewHistory {
            order_id,
            status: OrderStatus::Paid,
            operator_id: actor.user_id,
            remark: Some("direct payment".to_owned()),
        })
        .await?;
        tx.commit().await?;

        tracing::info!(%order_id, payment_id = %payment.id, amount = %payment.amount, "Order paid directly");
        self.notify_paid(&order, PaymentMethod::Direct).await;
        Ok(payment)
    }

    /// Prepare a signed vendor checkout form for a pending, unpaid order.
    ///
    /// While a payment attempt is open, repeated calls reuse its trade number.
    /// Once the last attempt has failed, a fresh trade number and attempt are
    /// issued, since the vendor refuses a trade number it has already seen.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::NotFound`, `PermissionDenied`, `InvalidOrderState`
    ///   as for [`Self::pay_order_direct`]
    /// - `WorkflowError::SerialGenerationExhausted` if no trade number was free
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn initiate_vendor_checkout(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<CheckoutForm, WorkflowError> {
        let (trade_no, params) = serial::retry_on_conflict("trade number", move || {
            self.open_checkout(actor, order_id)
        })
        .await?;

        tracing::info!(%order_id, %trade_no, "Vendor checkout initiated");
        Ok(CheckoutForm {
            ecpay_url: self.ecpay.checkout_url.clone(),
            params,
        })
    }

    /// Reconcile a vendor payment notification and return the vendor's ack.
    ///
    /// Never fails: internal errors are logged and answered with
    /// [`CallbackAck::InternalError`] so the vendor retries.
    #[instrument(skip_all, fields(trade_no = params.get(MERCHANT_TRADE_NO).map(String::as_str)))]
    pub async fn handle_vendor_callback(&self, params: &BTreeMap<String, String>) -> CallbackAck {
        match self.reconcile(params).await {
            Ok(ack) => ack,
            Err(err) => {
                tracing::error!(error = %err, "Vendor callback failed");
                CallbackAck::InternalError
            }
        }
    }

    /// Where to send the shopper's browser after the vendor page.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Repository` if the order lookup fails.
    #[instrument(skip_all)]
    pub async fn vendor_return_redirect(
        &self,
        form: &BTreeMap<String, String>,
    ) -> Result<String, WorkflowError> {
        let trade_no = form.get(MERCHANT_TRADE_NO).map_or("", String::as_str);
        let rtn_code = form.get(RTN_CODE).map_or("", String::as_str);

        let order_sn = if trade_no.is_empty() {
            String::new()
        } else {
            let mut tx = self.store.begin().await?;
            tx.get_order_by_trade_no(trade_no, RowLock::None)
                .await?
                .map(|order| order.order_sn)
                .unwrap_or_default()
        };

        Ok(format!(
            "{}/payment_result?order_sn={}&trade_no={}&RtnCode={}",
            self.frontend_url,
            urlencoding::encode(&order_sn),
            urlencoding::encode(trade_no),
            urlencoding::encode(rtn_code),
        ))
    }

    /// Payments visible to `actor`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Repository` if the store fails.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn list_payments(&self, actor: &Actor) -> Result<Vec<Payment>, WorkflowError> {
        let owner = (!sees_all_payments(actor)).then_some(actor.user_id);
        let mut tx = self.store.begin().await?;
        Ok(tx.list_payments(owner).await?)
    }

    /// One payment, visible to the order owner and admins.
    ///
    /// # Errors
    ///
    /// `NotFound` or `PermissionDenied`.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get_payment(
        &self,
        actor: &Actor,
        payment_id: PaymentId,
    ) -> Result<Payment, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let payment = tx
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("payment", payment_id))?;
        let order = tx
            .get_order(payment.order_id, RowLock::None)
            .await?
            .ok_or_else(|| WorkflowError::not_found("order", payment.order_id))?;
        authorize(actor, Action::ViewPayment, Resource::Order { owner: order.user_id })?;
        Ok(payment)
    }

    /// One attempt at assigning a trade number and signing the form. A trade
    /// number taken by a concurrent commit surfaces as
    /// `RepositoryError::Conflict` from `set_trade_no`.
    async fn open_checkout(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<(String, BTreeMap<String, String>), WorkflowError> {
        let mut tx = self.store.begin().await?;
        let order = payable_order(tx.as_mut(), actor, order_id).await?;
        let open_attempt = tx.open_payment_attempt(order_id).await?;

        let trade_no = match (order.trade_no.clone(), open_attempt) {
            (Some(existing), Some(_)) => existing,
            (previous, _) => {
                let trade_no = serial::unique_trade_no(tx.as_mut()).await?;
                tx.set_trade_no(order_id, &trade_no).await?;
                tx.insert_payment(&NewPayment {
                    order_id,
                    amount: order.total_amount,
                    status: PaymentRecordStatus::Initiated,
                    payment_method: PaymentMethod::Ecpay,
                    transaction_id: None,
                    paid_at: None,
                })
                .await?;
                if let Some(previous) = previous {
                    tracing::info!(%order_id, %previous, %trade_no, "Replacing trade number after failed attempt");
                }
                trade_no
            }
        };

        let params = ecpay::checkout_params(
            &self.ecpay,
            &CheckoutRequest {
                merchant_trade_no: &trade_no,
                trade_date: Utc::now(),
                total_amount: to_whole_units(order.total_amount)?,
                items: &order.items,
            },
        );
        tx.commit().await?;
        Ok((trade_no, params))
    }

    async fn reconcile(&self, params: &BTreeMap<String, String>) -> Result<CallbackAck, WorkflowError> {
        if let Err(err) = self.verify(params) {
            tracing::warn!(error = %err, "Rejected vendor callback");
            return Ok(CallbackAck::MacError);
        }

        let trade_no = params.get(MERCHANT_TRADE_NO).map_or("", String::as_str);
        let rtn_code = params.get(RTN_CODE).map_or("", String::as_str);

        let mut tx = self.store.begin().await?;
        let Some(order) = tx.get_order_by_trade_no(trade_no, RowLock::ForUpdate).await? else {
            tracing::warn!(%trade_no, %rtn_code, "Callback for unknown trade number");
            return Ok(if rtn_code == RTN_CODE_PAID {
                CallbackAck::OrderNotFound
            } else {
                CallbackAck::Fail
            });
        };

        if rtn_code != RTN_CODE_PAID {
            if let Some(attempt) = tx.open_payment_attempt(order.id).await? {
                tx.update_payment(attempt.id, PaymentRecordStatus::Failed, None, None)
                    .await?;
                tx.commit().await?;
            }
            tracing::info!(order_id = %order.id, %rtn_code, "Vendor reported failed payment");
            return Ok(CallbackAck::Fail);
        }

        if order.payment_status == PaymentStatus::Paid {
            tracing::info!(order_id = %order.id, "Duplicate paid callback ignored");
            return Ok(CallbackAck::Ok);
        }

        match self.settle(tx, &order, trade_no, params).await {
            Ok(()) => {}
            Err(WorkflowError::Repository(RepositoryError::Conflict(reason))) => {
                tracing::info!(order_id = %order.id, %reason, "Trade already settled");
                return Ok(CallbackAck::Ok);
            }
            Err(err) => return Err(err),
        }

        self.notify_paid(&order, PaymentMethod::Ecpay).await;
        Ok(CallbackAck::Ok)
    }

    fn verify(&self, params: &BTreeMap<String, String>) -> Result<(), WorkflowError> {
        if ecpay::verify_check_mac_value(
            params,
            self.ecpay.hash_key.expose_secret(),
            self.ecpay.hash_iv.expose_secret(),
        ) {
            Ok(())
        } else {
            Err(WorkflowError::SignatureInvalid)
        }
    }

    async fn settle(
        &self,
        mut tx: Box<dyn StoreTx>,
        order: &Order,
        trade_no: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<(), WorkflowError> {
        let now = Utc::now();

        if let Some(amount) = params.get(TRADE_AMT)
            && to_whole_units(order.total_amount)
                .map(|expected| expected.to_string() != *amount)
                .unwrap_or(true)
        {
            tracing::warn!(order_id = %order.id, %amount, expected = %order.total_amount, "Trade amount mismatch");
        }

        match tx.open_payment_attempt(order.id).await? {
            Some(attempt) => {
                tx.update_payment(
                    attempt.id,
                    PaymentRecordStatus::Success,
                    Some(trade_no),
                    Some(now),
                )
                .await?;
            }
            None => {
                tx.insert_payment(&NewPayment {
                    order_id: order.id,
                    amount: order.total_amount,
                    status: PaymentRecordStatus::Success,
                    payment_method: PaymentMethod::Ecpay,
                    transaction_id: Some(trade_no.to_owned()),
                    paid_at: Some(now),
                })
                .await?;
            }
        }

        if order.status.can_transition_to(OrderStatus::Paid) {
            tx.update_order_status(order.id, OrderStatus::Paid, PaymentStatus::Paid)
                .await?;
            tx.insert_history(&NewHistory {
                order_id: order.id,
                status: OrderStatus::Paid,
                operator_id: order.user_id,
                remark: Some(format!("ECPay payment {trade_no}")),
            })
            .await?;
        } else {
            tracing::warn!(
                order_id = %order.id,
                status = %order.status,
                "Payment received for an order that cannot become paid"
            );
            tx.update_order_status(order.id, order.status, PaymentStatus::Paid)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(order_id = %order.id, %trade_no, "Vendor payment settled");
        Ok(())
    }

    async fn notify_paid(&self, order: &Order, method: PaymentMethod) {
        self.notifier
            .notify(&OrderEvent::Paid {
                order_id: order.id,
                order_sn: order.order_sn.clone(),
                amount: order.total_amount,
                method,
            })
            .await;
    }
}

/// Load an order the actor may pay and that is still awaiting payment.
async fn payable_order(
    tx: &mut dyn StoreTx,
    actor: &Actor,
    order_id: OrderId,
) -> Result<Order, WorkflowError> {
    let order = tx
        .get_order(order_id, RowLock::ForUpdate)
        .await?
        .ok_or_else(|| WorkflowError::not_found("order", order_id))?;
    authorize(actor, Action::PayOrder, Resource::Order { owner: order.user_id })?;

    if order.status != OrderStatus::Pending {
        return Err(WorkflowError::InvalidOrderState {
            order_id,
            status: order.status,
            reason: "only pending orders can be paid",
        });
    }
    if order.payment_status != PaymentStatus::Unpaid {
        return Err(WorkflowError::InvalidOrderState {
            order_id,
            status: order.status,
            reason: "order is already paid",
        });
    }
    Ok(order)
}
