//! Integration tests for OMS.
//!
//! Tests drive the real axum router with `tower::ServiceExt::oneshot`
//! against the in-memory store, so they need no database.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p oms-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `orders_api` - Order creation, status workflow, item edits
//! - `payments_api` - Direct payment, ECPay checkout and callbacks
//! - `products_api` - Stock adjustments and health checks

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use oms_core::{ProductId, Role, UserId};
use oms_server::config::{EcpayConfig, OmsConfig};
use oms_server::db::MemoryStore;
use oms_server::ecpay;
use oms_server::middleware::TokenVerifier;
use oms_server::models::Actor;
use oms_server::services::LogNotifier;
use oms_server::state::AppState;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "t3Qz8Lw1Nc6Vr0Hk5Jp2Xm9Bd4Fs7Gy1";
pub const HASH_KEY: &str = "5294y06JbISpM5x9";
pub const HASH_IV: &str = "v77hoKGq4kWxNNIS";
pub const FRONTEND_URL: &str = "http://localhost:5173";

/// A response with its body decoded.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub text: String,
}

impl TestResponse {
    /// Body parsed as JSON.
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.text).unwrap()
    }
}

/// The router wired to an in-memory store.
#[derive(Clone)]
pub struct TestApp {
    pub store: MemoryStore,
    router: Router,
    tokens: TokenVerifier,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        let config = test_config();
        let tokens = TokenVerifier::new(&config.jwt_secret);
        let store = MemoryStore::new();
        let state = AppState::new(config, Arc::new(store.clone()), Arc::new(LogNotifier));
        Self {
            store,
            router: oms_server::app(state),
            tokens,
        }
    }

    /// Bearer token for a user.
    #[must_use]
    pub fn token(&self, user_id: i32, role: Role) -> String {
        self.tokens
            .issue(
                &Actor::new(UserId::new(user_id), role),
                chrono::Duration::minutes(5),
            )
            .unwrap()
    }

    /// Seed a product and return its id.
    pub async fn product(&self, name: &str, price: Decimal, stock: i32) -> ProductId {
        self.store.seed_product(name, price, stock).await
    }

    /// Current stock of a product.
    pub async fn stock(&self, id: ProductId) -> i32 {
        self.store.product(id).await.unwrap().stock
    }

    /// Send a JSON request.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.dispatch(builder.body(body).unwrap()).await
    }

    /// Send a url-encoded form, as the payment vendor does.
    pub async fn post_form(&self, uri: &str, form: &BTreeMap<String, String>) -> TestResponse {
        let body = form
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.dispatch(request).await
    }

    /// Create an order for `user_id` and return its JSON.
    pub async fn create_order(&self, token: &str, items: &[(ProductId, i32)]) -> TestResponse {
        let items: Vec<Value> = items
            .iter()
            .map(|(id, qty)| serde_json::json!({ "product_id": id.as_i32(), "quantity": qty }))
            .collect();
        self.send(
            Method::POST,
            "/orders",
            Some(token),
            Some(serde_json::json!({
                "items": items,
                "receiver_name": "Wang",
                "receiver_phone": "0912345678",
                "shipping_address": "No. 7, Xinyi Rd., Taipei",
            })),
        )
        .await
    }

    async fn dispatch(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            headers,
            text: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }
}

/// Configuration pointing at the vendor's staging credentials.
#[must_use]
pub fn test_config() -> OmsConfig {
    OmsConfig {
        database_url: SecretString::from("postgres://unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 5000,
        base_url: "http://localhost:5000".to_owned(),
        frontend_url: FRONTEND_URL.to_owned(),
        jwt_secret: SecretString::from(JWT_SECRET),
        ecpay: EcpayConfig {
            merchant_id: "2000132".to_owned(),
            hash_key: SecretString::from(HASH_KEY),
            hash_iv: SecretString::from(HASH_IV),
            checkout_url: "https://payment-stage.ecpay.com.tw/Cashier/AioCheckOut/V5".to_owned(),
            notify_url: "http://localhost:5000/payments/ecpay/callback".to_owned(),
            order_result_url: "http://localhost:5000/payments/ecpay/return".to_owned(),
            client_back_url: FRONTEND_URL.to_owned(),
        },
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// A vendor notification for `trade_no`, signed with the test keys.
#[must_use]
pub fn signed_callback(trade_no: &str, rtn_code: &str, trade_amt: &str) -> BTreeMap<String, String> {
    let mut params: BTreeMap<String, String> = [
        ("CustomField1", ""),
        ("MerchantID", "2000132"),
        ("MerchantTradeNo", trade_no),
        ("PaymentDate", "2026/10/18 15:30:45"),
        ("PaymentType", "Credit_CreditCard"),
        ("PaymentTypeChargeFee", "5"),
        ("RtnCode", rtn_code),
        ("RtnMsg", "Succeeded"),
        ("SimulatePaid", "0"),
        ("TradeAmt", trade_amt),
        ("TradeDate", "2026/10/18 15:29:10"),
        ("TradeNo", "2610181529101234"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();
    let config = test_config();
    let mac = ecpay::check_mac_value(
        &params,
        config.ecpay.hash_key.expose_secret(),
        config.ecpay.hash_iv.expose_secret(),
    );
    params.insert(ecpay::CHECK_MAC_VALUE.to_owned(), mac);
    params
}

/// Parse a JSON decimal, whether serialized as a string or a number.
#[must_use]
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}
