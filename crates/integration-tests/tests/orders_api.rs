//! Integration tests for the order endpoints.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;

use axum::http::{Method, StatusCode};
use oms_core::Role;
use oms_integration_tests::{TestApp, decimal};
use rust_decimal::Decimal;
use serde_json::json;
use tokio::task::JoinSet;

// =============================================================================
// Creation
// =============================================================================

#[tokio::test]
async fn test_create_order_sums_snapshot_prices() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(5000, 2), 10).await;
    let cup = app.product("Cup", Decimal::new(2500, 2), 5).await;
    let token = app.token(1, Role::Customer);

    let response = app.create_order(&token, &[(tea, 2), (cup, 4)]).await;
    assert_eq!(response.status, StatusCode::CREATED);

    let order = response.json();
    assert_eq!(decimal(&order["total_amount"]), Decimal::new(200, 0));
    assert_eq!(order["status"], "pending");
    assert_eq!(order["payment_status"], "unpaid");
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
    assert_eq!(order["history"][0]["status"], "pending");
    assert_eq!(app.stock(tea).await, 8);
    assert_eq!(app.stock(cup).await, 1);
}

#[tokio::test]
async fn test_insufficient_stock_leaves_no_rows() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let cup = app.product("Cup", Decimal::new(30, 0), 1).await;
    let token = app.token(1, Role::Customer);

    let response = app.create_order(&token, &[(tea, 2), (cup, 3)]).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert!(response.text.contains("insufficient stock"));

    assert_eq!(app.store.order_count().await, 0);
    assert_eq!(app.store.item_count().await, 0);
    assert_eq!(app.stock(tea).await, 10);
    assert_eq!(app.stock(cup).await, 1);
}

#[tokio::test]
async fn test_create_order_rejects_bad_input() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let token = app.token(1, Role::Customer);

    let empty = app.create_order(&token, &[]).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let zero = app.create_order(&token, &[(tea, 0)]).await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    let unknown = app
        .create_order(&token, &[(oms_core::ProductId::new(9999), 1)])
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_create_order_accepts_qty_field() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let token = app.token(1, Role::Customer);

    let response = app
        .send(
            Method::POST,
            "/orders",
            Some(&token),
            Some(json!({
                "items": [{ "product_id": tea.as_i32(), "qty": 3 }],
                "receiver_name": "Wang",
                "receiver_phone": "0912345678",
                "shipping_address": "No. 7, Xinyi Rd., Taipei",
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.json()["items"][0]["quantity"], 3);
    assert_eq!(app.stock(tea).await, 7);
}

#[tokio::test]
async fn test_create_order_for_existing_customer() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let customer = app.store.seed_customer().await;
    let token = app.token(3, Role::Seller);

    let body = |customer_id: i32| {
        json!({
            "customer_id": customer_id,
            "items": [{ "product_id": tea.as_i32(), "quantity": 1 }],
            "receiver_name": "Wang",
            "receiver_phone": "0912345678",
            "shipping_address": "No. 7, Xinyi Rd., Taipei",
        })
    };

    let response = app
        .send(Method::POST, "/orders", Some(&token), Some(body(customer.as_i32())))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.json()["customer_id"], customer.as_i32());

    let unknown = app
        .send(Method::POST, "/orders", Some(&token), Some(body(customer.as_i32() + 1000)))
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(app.store.order_count().await, 1);
}

#[tokio::test]
async fn test_requests_without_token_are_unauthorized() {
    let app = TestApp::new();

    let response = app.send(Method::GET, "/orders", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app
        .send(Method::GET, "/orders", Some("garbage"), None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_parallel_creations_get_distinct_serials() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 100).await;

    let mut tasks = JoinSet::new();
    for user in 1..=20 {
        let app = app.clone();
        tasks.spawn(async move {
            let token = app.token(user, Role::Customer);
            let response = app.create_order(&token, &[(tea, 1)]).await;
            assert_eq!(response.status, StatusCode::CREATED);
            response.json()["order_sn"].as_str().unwrap().to_owned()
        });
    }

    let mut serials = HashSet::new();
    while let Some(serial) = tasks.join_next().await {
        assert!(serials.insert(serial.unwrap()));
    }
    assert_eq!(serials.len(), 20);
    assert_eq!(app.stock(tea).await, 80);
}

#[tokio::test]
async fn test_total_unaffected_by_later_price_change() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let token = app.token(1, Role::Customer);

    let order = app.create_order(&token, &[(tea, 2)]).await.json();
    app.store
        .update_product(tea, |product| product.price = Decimal::new(500, 0))
        .await;

    let id = order["id"].as_i64().unwrap();
    let reloaded = app
        .send(Method::GET, &format!("/orders/{id}"), Some(&token), None)
        .await
        .json();
    assert_eq!(decimal(&reloaded["total_amount"]), Decimal::new(200, 0));
    assert_eq!(decimal(&reloaded["items"][0]["unit_price"]), Decimal::new(100, 0));
}

// =============================================================================
// Status workflow
// =============================================================================

#[tokio::test]
async fn test_cancel_restores_stock_exactly_once() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let customer = app.token(1, Role::Customer);
    let admin = app.token(99, Role::Admin);

    let order = app.create_order(&customer, &[(tea, 2)]).await.json();
    let id = order["id"].as_i64().unwrap();
    assert_eq!(app.stock(tea).await, 8);

    let uri = format!("/orders/{id}");
    let cancelled = app
        .send(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({ "status": "cancelled", "remark": "customer request" })),
        )
        .await;
    assert_eq!(cancelled.status, StatusCode::OK);
    assert_eq!(cancelled.json()["status"], "cancelled");
    assert_eq!(app.stock(tea).await, 10);

    let again = app
        .send(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(app.stock(tea).await, 10);

    let history = app
        .send(Method::GET, &format!("{uri}/history"), Some(&customer), None)
        .await
        .json();
    let statuses: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, ["pending", "cancelled"]);
    assert_eq!(history[1]["remark"], "customer request");
}

#[tokio::test]
async fn test_cancel_after_payment_or_shipping_restores_stock() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let customer = app.token(1, Role::Customer);
    let admin = app.token(99, Role::Admin);

    let paid = app.create_order(&customer, &[(tea, 2)]).await.json()["id"]
        .as_i64()
        .unwrap();
    let response = app
        .send(Method::POST, &format!("/payments/{paid}"), Some(&customer), None)
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let shipped = app.create_order(&customer, &[(tea, 3)]).await.json()["id"]
        .as_i64()
        .unwrap();
    let response = app
        .send(
            Method::PUT,
            &format!("/orders/{shipped}"),
            Some(&admin),
            Some(json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.stock(tea).await, 5);

    for (id, restored) in [(paid, 7), (shipped, 10)] {
        let cancelled = app
            .send(
                Method::PUT,
                &format!("/orders/{id}"),
                Some(&admin),
                Some(json!({ "status": "cancelled" })),
            )
            .await;
        assert_eq!(cancelled.status, StatusCode::OK);
        assert_eq!(cancelled.json()["status"], "cancelled");
        assert_eq!(app.stock(tea).await, restored);
    }
}

#[tokio::test]
async fn test_status_changes_are_admin_only_and_follow_the_workflow() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let customer = app.token(1, Role::Customer);
    let seller = app.token(2, Role::Seller);
    let admin = app.token(99, Role::Admin);

    let id = app.create_order(&customer, &[(tea, 1)]).await.json()["id"]
        .as_i64()
        .unwrap();
    let uri = format!("/orders/{id}");

    for token in [&customer, &seller] {
        let denied = app
            .send(Method::PUT, &uri, Some(token), Some(json!({ "status": "shipped" })))
            .await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
    }

    let unknown = app
        .send(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "lost" })))
        .await;
    assert_eq!(unknown.status, StatusCode::CONFLICT);

    for status in ["shipped", "completed"] {
        let ok = app
            .send(Method::PUT, &uri, Some(&admin), Some(json!({ "status": status })))
            .await;
        assert_eq!(ok.status, StatusCode::OK);
        assert_eq!(ok.json()["status"], status);
    }

    let back = app
        .send(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(back.status, StatusCode::CONFLICT);

    let missing = app
        .send(
            Method::PUT,
            "/orders/424242",
            Some(&admin),
            Some(json!({ "status": "paid" })),
        )
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_batch_status_update_counts_changed_orders() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let customer = app.token(1, Role::Customer);
    let admin = app.token(99, Role::Admin);

    let a = app.create_order(&customer, &[(tea, 1)]).await.json()["id"]
        .as_i64()
        .unwrap();
    let b = app.create_order(&customer, &[(tea, 1)]).await.json()["id"]
        .as_i64()
        .unwrap();

    let response = app
        .send(
            Method::PUT,
            "/orders/status",
            Some(&admin),
            Some(json!({ "order_ids": [a, b, 424_242], "status": "shipped" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["updated"], 2);

    let denied = app
        .send(
            Method::PUT,
            "/orders/status",
            Some(&customer),
            Some(json!({ "order_ids": [a], "status": "completed" })),
        )
        .await;
    assert_eq!(denied.json()["updated"], 0);
}

// =============================================================================
// Items and visibility
// =============================================================================

#[tokio::test]
async fn test_items_editable_only_while_pending() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let cup = app.product("Cup", Decimal::new(30, 0), 10).await;
    let customer = app.token(1, Role::Customer);
    let stranger = app.token(2, Role::Customer);

    let id = app.create_order(&customer, &[(tea, 1)]).await.json()["id"]
        .as_i64()
        .unwrap();
    let uri = format!("/orders/{id}/items");
    let body = json!({ "items": [{ "product_id": cup.as_i32(), "quantity": 3 }] });

    let denied = app
        .send(Method::PUT, &uri, Some(&stranger), Some(body.clone()))
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let edited = app
        .send(Method::PUT, &uri, Some(&customer), Some(body.clone()))
        .await;
    assert_eq!(edited.status, StatusCode::OK);
    assert_eq!(decimal(&edited.json()["total_amount"]), Decimal::new(90, 0));

    let paid = app
        .send(Method::POST, &format!("/payments/{id}"), Some(&customer), None)
        .await;
    assert_eq!(paid.status, StatusCode::CREATED);

    let locked = app.send(Method::PUT, &uri, Some(&customer), Some(body)).await;
    assert_eq!(locked.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_order_visibility_by_role() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let alice = app.token(1, Role::Customer);
    let bob = app.token(2, Role::Customer);
    let seller = app.token(3, Role::Seller);

    let order = app.create_order(&alice, &[(tea, 1)]).await.json();
    app.create_order(&bob, &[(tea, 1)]).await;

    let mine = app.send(Method::GET, "/orders", Some(&alice), None).await.json();
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let all = app.send(Method::GET, "/orders", Some(&seller), None).await.json();
    assert_eq!(all.as_array().unwrap().len(), 2);

    let id = order["id"].as_i64().unwrap();
    let forbidden = app
        .send(Method::GET, &format!("/orders/{id}"), Some(&bob), None)
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let sn = order["order_sn"].as_str().unwrap();
    let by_sn = app
        .send(Method::GET, &format!("/orders/sn/{sn}"), Some(&alice), None)
        .await;
    assert_eq!(by_sn.status, StatusCode::OK);
    assert_eq!(by_sn.json()["id"], order["id"]);
}
