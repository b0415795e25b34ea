//! Orders, their line items and status history.

use chrono::{DateTime, Utc};
use oms_core::{
    CustomerId, OrderHistoryId, OrderId, OrderItemId, OrderStatus, PaymentStatus, ProductId,
    UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A customer order with its items and history.
///
/// `total_amount` is the exact sum of the item snapshots taken when the item
/// set was last written; it never follows later product price changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub order_sn: String,
    pub user_id: UserId,
    pub customer_id: Option<CustomerId>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub shipping_fee: Decimal,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub shipping_address: String,
    pub remark: Option<String>,
    pub trade_no: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<OrderHistory>,
}

/// One line of an order, with the product name and price frozen at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Append-only record of a status the order entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderHistory {
    pub id: OrderHistoryId,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub operator_id: UserId,
    pub operated_at: DateTime<Utc>,
    pub remark: Option<String>,
}

// =============================================================================
// Write payloads
// =============================================================================

/// Insert payload for an order header.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_sn: String,
    pub user_id: UserId,
    pub customer_id: Option<CustomerId>,
    pub total_amount: Decimal,
    pub shipping_fee: Decimal,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub shipping_address: String,
    pub remark: Option<String>,
}

/// Insert payload for an order line, already priced from the catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Insert payload for a history row.
#[derive(Debug, Clone)]
pub struct NewHistory {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub operator_id: UserId,
    pub remark: Option<String>,
}

// =============================================================================
// Request inputs
// =============================================================================

/// Requested product and quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OrderItemInput {
    pub product_id: ProductId,
    #[serde(alias = "qty")]
    pub quantity: i32,
}

/// Input for creating an order. The owner is always the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    pub items: Vec<OrderItemInput>,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub shipping_address: String,
    #[serde(default)]
    pub shipping_fee: Option<Decimal>,
    #[serde(default)]
    pub remark: Option<String>,
}

impl CreateOrder {
    /// Check the shape of the request before touching the store.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        validate_items(&self.items)?;
        for (field, value) in [
            ("receiver_name", &self.receiver_name),
            ("receiver_phone", &self.receiver_phone),
            ("shipping_address", &self.shipping_address),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} must not be blank"));
            }
        }
        if let Some(fee) = self.shipping_fee
            && fee.is_sign_negative()
            && !fee.is_zero()
        {
            return Err("shipping_fee must not be negative".to_owned());
        }
        Ok(())
    }
}

/// Items must be non-empty with strictly positive quantities.
///
/// # Errors
///
/// Returns a message describing the offending item.
pub fn validate_items(items: &[OrderItemInput]) -> Result<(), String> {
    if items.is_empty() {
        return Err("order must contain at least one item".to_owned());
    }
    if let Some(bad) = items.iter().find(|item| item.quantity < 1) {
        return Err(format!(
            "quantity for product {} must be at least 1 (got {})",
            bad.product_id, bad.quantity
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input() -> CreateOrder {
        CreateOrder {
            customer_id: None,
            items: vec![OrderItemInput {
                product_id: ProductId::new(1),
                quantity: 2,
            }],
            receiver_name: "Lin".to_owned(),
            receiver_phone: "0912345678".to_owned(),
            shipping_address: "Taipei".to_owned(),
            shipping_fee: None,
            remark: None,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_input() {
        assert!(input().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_items() {
        let mut order = input();
        order.items.clear();
        assert!(order.validate().unwrap_err().contains("at least one item"));
    }

    #[test]
    fn test_validate_rejects_zero_quantity() {
        let mut order = input();
        order.items[0].quantity = 0;
        assert!(order.validate().unwrap_err().contains("quantity"));
    }

    #[test]
    fn test_validate_rejects_blank_receiver() {
        let mut order = input();
        order.receiver_phone = "   ".to_owned();
        assert_eq!(
            order.validate().unwrap_err(),
            "receiver_phone must not be blank"
        );
    }

    #[test]
    fn test_validate_rejects_negative_shipping_fee() {
        let mut order = input();
        order.shipping_fee = Some(Decimal::new(-5, 0));
        assert!(order.validate().is_err());
    }

    #[test]
    fn test_create_order_deserializes_without_optionals() {
        let json = r#"{
            "items": [{"product_id": 3, "quantity": 1}],
            "receiver_name": "A",
            "receiver_phone": "B",
            "shipping_address": "C"
        }"#;
        let parsed: CreateOrder = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.items[0].product_id, ProductId::new(3));
        assert!(parsed.customer_id.is_none());
        assert!(parsed.shipping_fee.is_none());
    }
}
