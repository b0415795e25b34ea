//! Order event notifications.
//!
//! Notifications are emitted after the owning transaction commits and are
//! fire-and-forget: a failing notifier never undoes a committed change.

use async_trait::async_trait;
use oms_core::{OrderId, OrderStatus, PaymentMethod, UserId};
use rust_decimal::Decimal;

/// Something that happened to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    Created {
        order_id: OrderId,
        order_sn: String,
        user_id: UserId,
        total_amount: Decimal,
    },
    StatusChanged {
        order_id: OrderId,
        order_sn: String,
        from: OrderStatus,
        to: OrderStatus,
    },
    Paid {
        order_id: OrderId,
        order_sn: String,
        amount: Decimal,
        method: PaymentMethod,
    },
}

/// Receives order events (email, chat, webhooks...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &OrderEvent);
}

/// Notifier that writes events to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &OrderEvent) {
        match event {
            OrderEvent::Created {
                order_id,
                order_sn,
                user_id,
                total_amount,
            } => tracing::info!(
                %order_id,
                %order_sn,
                %user_id,
                %total_amount,
                "Order created"
            ),
            OrderEvent::StatusChanged {
                order_id,
                order_sn,
                from,
                to,
            } => tracing::info!(%order_id, %order_sn, %from, %to, "Order status changed"),
            OrderEvent::Paid {
                order_id,
                order_sn,
                amount,
                method,
            } => tracing::info!(%order_id, %order_sn, %amount, %method, "Order paid"),
        }
    }
}
