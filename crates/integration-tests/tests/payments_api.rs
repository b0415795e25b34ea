//! Integration tests for payment endpoints and ECPay reconciliation.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;

use axum::http::{Method, StatusCode, header};
use oms_core::{OrderId, PaymentRecordStatus, Role};
use oms_integration_tests::{FRONTEND_URL, HASH_IV, HASH_KEY, TestApp, decimal, signed_callback};
use oms_server::ecpay;
use rust_decimal::Decimal;
use serde_json::Value;

const CALLBACK: &str = "/payments/ecpay/callback";

/// Create an order worth 100 and open an ECPay checkout for it.
async fn checkout(app: &TestApp, token: &str) -> (i64, String, Value) {
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let order = app.create_order(token, &[(tea, 1)]).await.json();
    let id = order["id"].as_i64().unwrap();

    let form = app
        .send(Method::POST, &format!("/payments/ecpay/{id}"), Some(token), None)
        .await;
    assert_eq!(form.status, StatusCode::OK);
    let form = form.json();
    let trade_no = form["params"]["MerchantTradeNo"].as_str().unwrap().to_owned();
    (id, trade_no, order)
}

async fn order_json(app: &TestApp, token: &str, id: i64) -> Value {
    app.send(Method::GET, &format!("/orders/{id}"), Some(token), None)
        .await
        .json()
}

#[tokio::test]
async fn test_direct_payment_marks_order_paid() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let token = app.token(1, Role::Customer);
    let id = app.create_order(&token, &[(tea, 2)]).await.json()["id"]
        .as_i64()
        .unwrap();

    let response = app
        .send(Method::POST, &format!("/payments/{id}"), Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let payment = response.json();
    assert_eq!(payment["status"], "success");
    assert_eq!(payment["payment_method"], "direct");
    assert_eq!(decimal(&payment["amount"]), Decimal::new(200, 0));

    let order = order_json(&app, &token, id).await;
    assert_eq!(order["status"], "paid");
    assert_eq!(order["payment_status"], "paid");

    let again = app
        .send(Method::POST, &format!("/payments/{id}"), Some(&token), None)
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_checkout_form_is_signed_and_stable() {
    let app = TestApp::new();
    let token = app.token(1, Role::Customer);
    let (id, trade_no, _) = checkout(&app, &token).await;

    let second = app
        .send(Method::POST, &format!("/payments/ecpay/{id}"), Some(&token), None)
        .await
        .json();
    assert_eq!(second["params"]["MerchantTradeNo"], trade_no.as_str());
    assert_eq!(second["params"]["TotalAmount"], "100");
    assert_eq!(second["params"]["ChoosePayment"], "ALL");
    assert!(second["ecpay_url"].as_str().unwrap().starts_with("https://"));

    let params: BTreeMap<String, String> = second["params"]
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.as_str().unwrap().to_owned()))
        .collect();
    assert!(ecpay::verify_check_mac_value(&params, HASH_KEY, HASH_IV));

    let other = app.token(2, Role::Customer);
    let denied = app
        .send(Method::POST, &format!("/payments/ecpay/{id}"), Some(&other), None)
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_valid_callback_settles_order() {
    let app = TestApp::new();
    let token = app.token(1, Role::Customer);
    let (id, trade_no, _) = checkout(&app, &token).await;

    let response = app
        .post_form(CALLBACK, &signed_callback(&trade_no, "1", "100"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text, "1|OK");

    let order = order_json(&app, &token, id).await;
    assert_eq!(order["status"], "paid");
    assert_eq!(order["payment_status"], "paid");

    let payments = app.store.payments_of(OrderId::new(i32::try_from(id).unwrap())).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentRecordStatus::Success);
    assert_eq!(payments[0].transaction_id.as_deref(), Some(trade_no.as_str()));
}

#[tokio::test]
async fn test_duplicate_callback_is_idempotent() {
    let app = TestApp::new();
    let token = app.token(1, Role::Customer);
    let (id, trade_no, _) = checkout(&app, &token).await;
    let callback = signed_callback(&trade_no, "1", "100");

    for _ in 0..3 {
        assert_eq!(app.post_form(CALLBACK, &callback).await.text, "1|OK");
    }

    let payments = app.store.payments_of(OrderId::new(i32::try_from(id).unwrap())).await;
    let successes = payments
        .iter()
        .filter(|p| p.status == PaymentRecordStatus::Success)
        .count();
    assert_eq!(successes, 1);

    let history = order_json(&app, &token, id).await["history"]
        .as_array()
        .unwrap()
        .len();
    assert_eq!(history, 2);
}

#[tokio::test]
async fn test_tampered_callback_changes_nothing() {
    let app = TestApp::new();
    let token = app.token(1, Role::Customer);
    let (id, trade_no, _) = checkout(&app, &token).await;

    let mut callback = signed_callback(&trade_no, "1", "100");
    callback.insert("CheckMacValue".to_owned(), "0".repeat(64));

    let response = app.post_form(CALLBACK, &callback).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text, "0|CheckMacValue Error");

    let order = order_json(&app, &token, id).await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["payment_status"], "unpaid");
    let payments = app.store.payments_of(OrderId::new(i32::try_from(id).unwrap())).await;
    assert!(payments
        .iter()
        .all(|p| p.status == PaymentRecordStatus::Initiated));
}

#[tokio::test]
async fn test_failed_callback_marks_attempt_failed() {
    let app = TestApp::new();
    let token = app.token(1, Role::Customer);
    let (id, trade_no, _) = checkout(&app, &token).await;

    let response = app
        .post_form(CALLBACK, &signed_callback(&trade_no, "10100058", "100"))
        .await;
    assert_eq!(response.text, "0|FAIL");

    let order = order_json(&app, &token, id).await;
    assert_eq!(order["status"], "pending");
    let payments = app.store.payments_of(OrderId::new(i32::try_from(id).unwrap())).await;
    assert_eq!(payments[0].status, PaymentRecordStatus::Failed);
}

#[tokio::test]
async fn test_callback_for_unknown_trade() {
    let app = TestApp::new();
    let response = app
        .post_form(CALLBACK, &signed_callback("OMS261018000000ABCDE", "1", "100"))
        .await;
    assert_eq!(response.text, "0|Order Not Found");
}

#[tokio::test]
async fn test_return_redirects_to_frontend() {
    let app = TestApp::new();
    let token = app.token(1, Role::Customer);
    let (_, trade_no, order) = checkout(&app, &token).await;

    let form: BTreeMap<String, String> = [
        ("MerchantTradeNo".to_owned(), trade_no.clone()),
        ("RtnCode".to_owned(), "1".to_owned()),
    ]
    .into_iter()
    .collect();
    let response = app.post_form("/payments/ecpay/return", &form).await;

    assert_eq!(response.status, StatusCode::FOUND);
    let location = response.headers[header::LOCATION].to_str().unwrap();
    assert_eq!(
        location,
        format!(
            "{FRONTEND_URL}/payment_result?order_sn={}&trade_no={trade_no}&RtnCode=1",
            order["order_sn"].as_str().unwrap()
        )
    );
}

#[tokio::test]
async fn test_payment_listing_and_detail() {
    let app = TestApp::new();
    let tea = app.product("Oolong", Decimal::new(100, 0), 10).await;
    let alice = app.token(1, Role::Customer);
    let bob = app.token(2, Role::Customer);
    let admin = app.token(99, Role::Admin);

    let id = app.create_order(&alice, &[(tea, 1)]).await.json()["id"]
        .as_i64()
        .unwrap();
    let payment = app
        .send(Method::POST, &format!("/payments/{id}"), Some(&alice), None)
        .await
        .json();
    let payment_id = payment["id"].as_i64().unwrap();

    let mine = app.send(Method::GET, "/payments", Some(&alice), None).await.json();
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let theirs = app.send(Method::GET, "/payments", Some(&bob), None).await.json();
    assert!(theirs.as_array().unwrap().is_empty());
    let all = app.send(Method::GET, "/payments", Some(&admin), None).await.json();
    assert_eq!(all.as_array().unwrap().len(), 1);

    let uri = format!("/payments/{payment_id}");
    assert_eq!(
        app.send(Method::GET, &uri, Some(&alice), None).await.status,
        StatusCode::OK
    );
    assert_eq!(
        app.send(Method::GET, &uri, Some(&bob), None).await.status,
        StatusCode::FORBIDDEN
    );
}
