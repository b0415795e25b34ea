//! ECPay all-in-one checkout: request signing and callback verification.
//!
//! Both directions are authenticated with `CheckMacValue`:
//!
//! 1. Drop `CheckMacValue`, sort the remaining keys (byte order)
//! 2. Join as `key=value` with `&` and wrap in `HashKey=…&…&HashIV=…`
//! 3. URL-encode (space as `+`), lowercase, restore `-_.!*()`
//! 4. SHA-256, upper-case hex
//!
//! Field names and the acknowledgement strings are fixed by the vendor.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};

use crate::config::EcpayConfig;
use crate::models::OrderItem;

/// Signature field name.
pub const CHECK_MAC_VALUE: &str = "CheckMacValue";

/// Maximum length of `ItemName`.
const ITEM_NAME_MAX_CHARS: usize = 200;

/// Sequences the vendor expects unescaped after lowercasing.
const RESTORED: [(&str, &str); 7] = [
    ("%2d", "-"),
    ("%5f", "_"),
    ("%2e", "."),
    ("%21", "!"),
    ("%2a", "*"),
    ("%28", "("),
    ("%29", ")"),
];

/// Compute `CheckMacValue` over `params`.
///
/// Any `CheckMacValue` entry already present is ignored.
#[must_use]
pub fn check_mac_value(params: &BTreeMap<String, String>, hash_key: &str, hash_iv: &str) -> String {
    let joined = params
        .iter()
        .filter(|(key, _)| key.as_str() != CHECK_MAC_VALUE)
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    let raw = format!("HashKey={hash_key}&{joined}&HashIV={hash_iv}");

    let encoded = urlencoding::encode(&raw).replace("%20", "+").to_lowercase();
    let normalized = RESTORED
        .iter()
        .fold(encoded, |acc, &(escaped, plain)| acc.replace(escaped, plain));

    hex::encode_upper(Sha256::digest(normalized.as_bytes()))
}

/// Check the `CheckMacValue` a vendor request carries.
///
/// Returns `false` when the field is missing or does not match.
#[must_use]
pub fn verify_check_mac_value(
    params: &BTreeMap<String, String>,
    hash_key: &str,
    hash_iv: &str,
) -> bool {
    let Some(received) = params.get(CHECK_MAC_VALUE) else {
        return false;
    };
    let expected = check_mac_value(params, hash_key, hash_iv);
    constant_time_compare(&expected, &received.to_ascii_uppercase())
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

/// What the checkout form is for.
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub merchant_trade_no: &'a str,
    pub trade_date: DateTime<Utc>,
    pub total_amount: i64,
    pub items: &'a [OrderItem],
}

/// Build the signed parameter set the browser posts to the vendor.
#[must_use]
pub fn checkout_params(config: &EcpayConfig, request: &CheckoutRequest<'_>) -> BTreeMap<String, String> {
    let mut params: BTreeMap<String, String> = [
        ("MerchantID", config.merchant_id.clone()),
        ("MerchantTradeNo", request.merchant_trade_no.to_owned()),
        ("MerchantTradeDate", merchant_trade_date(request.trade_date)),
        ("PaymentType", "aio".to_owned()),
        ("TotalAmount", request.total_amount.to_string()),
        ("TradeDesc", "OMS order payment".to_owned()),
        ("ItemName", item_name(request.items)),
        ("ReturnURL", config.notify_url.clone()),
        ("ClientBackURL", config.client_back_url.clone()),
        ("OrderResultURL", config.order_result_url.clone()),
        ("ChoosePayment", "ALL".to_owned()),
        ("EncryptType", "1".to_owned()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_owned(), value))
    .collect();

    let mac = check_mac_value(
        &params,
        config.hash_key.expose_secret(),
        config.hash_iv.expose_secret(),
    );
    params.insert(CHECK_MAC_VALUE.to_owned(), mac);
    params
}

/// `YYYY/MM/DD hh:mm:ss` in Taiwan time (UTC+8), as the vendor expects.
#[must_use]
pub fn merchant_trade_date(at: DateTime<Utc>) -> String {
    let local = at.naive_utc();
    local
        .checked_add_signed(TimeDelta::hours(8))
        .unwrap_or(local)
        .format("%Y/%m/%d %H:%M:%S")
        .to_string()
}

/// `name x qty` per line joined with `#`, capped at the vendor limit.
fn item_name(items: &[OrderItem]) -> String {
    let joined = items
        .iter()
        .map(|item| format!("{} x {}", item.product_name, item.quantity))
        .collect::<Vec<_>>()
        .join("#");
    if joined.is_empty() {
        return "OMS order".to_owned();
    }
    joined.chars().take(ITEM_NAME_MAX_CHARS).collect()
}

/// Body the vendor expects in reply to a payment notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAck {
    /// Accepted (also for duplicates of an already-settled trade).
    Ok,
    /// Vendor reported a failed payment.
    Fail,
    /// Signature missing or wrong.
    MacError,
    /// No order carries this trade number.
    OrderNotFound,
    /// Something broke on our side; the vendor will retry.
    InternalError,
}

impl CallbackAck {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "1|OK",
            Self::Fail => "0|FAIL",
            Self::MacError => "0|CheckMacValue Error",
            Self::OrderNotFound => "0|Order Not Found",
            Self::InternalError => "0|Internal Error",
        }
    }
}

impl std::fmt::Display for CallbackAck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
