//! Order serial and vendor trade number generation.
//!
//! Both are generate-then-verify: a candidate is built from the current time
//! plus random characters, checked against the store, and retried a bounded
//! number of times. The store's UNIQUE constraints back this up; a concurrent
//! transaction that commits the same value first surfaces as a `Conflict` on
//! insert, and [`retry_on_conflict`] reruns the whole operation.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;

use super::WorkflowError;
use crate::db::{RepositoryError, StoreTx};

/// Attempts before giving up on a unique value.
pub const MAX_SERIAL_ATTEMPTS: usize = 5;

/// Prefix of every vendor trade number.
pub const TRADE_NO_PREFIX: &str = "OMS";

/// The vendor accepts at most 20 characters.
pub const TRADE_NO_LEN: usize = 20;

/// `YYYYMMDDhhmmss` (UTC) followed by 6 random digits.
#[must_use]
pub fn order_sn_candidate(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::rng().random_range(0..1_000_000);
    format!("{}{suffix:06}", now.format("%Y%m%d%H%M%S"))
}

/// `OMS` + `yyMMddhhmmss` + 5 random upper-case alphanumerics (20 chars).
#[must_use]
pub fn trade_no_candidate(now: DateTime<Utc>) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TRADE_NO_LEN - TRADE_NO_PREFIX.len() - 12)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{TRADE_NO_PREFIX}{}{suffix}", now.format("%y%m%d%H%M%S"))
}

/// Find an order serial not used by any order.
///
/// # Errors
///
/// Returns `WorkflowError::SerialGenerationExhausted` after
/// [`MAX_SERIAL_ATTEMPTS`] collisions.
pub async fn unique_order_sn(tx: &mut dyn StoreTx) -> Result<String, WorkflowError> {
    for attempt in 1..=MAX_SERIAL_ATTEMPTS {
        let candidate = order_sn_candidate(Utc::now());
        if !tx.order_sn_exists(&candidate).await? {
            return Ok(candidate);
        }
        tracing::debug!(attempt, %candidate, "Order serial collision, retrying");
    }
    tracing::error!("Exhausted order serial attempts");
    Err(WorkflowError::SerialGenerationExhausted("order serial"))
}

/// Find a trade number not used by any order.
///
/// # Errors
///
/// Returns `WorkflowError::SerialGenerationExhausted` after
/// [`MAX_SERIAL_ATTEMPTS`] collisions.
pub async fn unique_trade_no(tx: &mut dyn StoreTx) -> Result<String, WorkflowError> {
    for attempt in 1..=MAX_SERIAL_ATTEMPTS {
        let candidate = trade_no_candidate(Utc::now());
        if !tx.trade_no_exists(&candidate).await? {
            return Ok(candidate);
        }
        tracing::debug!(attempt, %candidate, "Trade number collision, retrying");
    }
    tracing::error!("Exhausted trade number attempts");
    Err(WorkflowError::SerialGenerationExhausted("trade number"))
}

/// Run `op` until it stops losing unique-value races.
///
/// Each call must open its own transaction. Only
/// `RepositoryError::Conflict` is retried; every other result is returned as is.
///
/// # Errors
///
/// Returns the error of `op`, or `WorkflowError::SerialGenerationExhausted`
/// after [`MAX_SERIAL_ATTEMPTS`] conflicts.
pub async fn retry_on_conflict<T, F, Fut>(what: &'static str, mut op: F) -> Result<T, WorkflowError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, WorkflowError>>,
{
    for attempt in 1..=MAX_SERIAL_ATTEMPTS {
        match op().await {
            Err(WorkflowError::Repository(RepositoryError::Conflict(reason))) => {
                tracing::debug!(attempt, %reason, "Lost {what} race, retrying");
            }
            result => return result,
        }
    }
    tracing::error!("Exhausted {what} attempts after conflicts");
    Err(WorkflowError::SerialGenerationExhausted(what))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 15, 30, 45).unwrap()
    }

    #[test]
    fn test_order_sn_format() {
        let sn = order_sn_candidate(fixed_time());
        assert_eq!(sn.len(), 20);
        assert!(sn.starts_with("20261018153045"));
        assert!(sn.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_trade_no_format() {
        let trade_no = trade_no_candidate(fixed_time());
        assert_eq!(trade_no.len(), TRADE_NO_LEN);
        assert!(trade_no.starts_with("OMS261018153045"));
        assert!(
            trade_no
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[tokio::test]
    async fn test_conflict_is_retried() {
        let mut calls = 0;
        let result = retry_on_conflict("order serial", || {
            calls += 1;
            let outcome = if calls == 1 {
                Err(WorkflowError::Repository(RepositoryError::Conflict(
                    "order_sn already exists".to_owned(),
                )))
            } else {
                Ok(calls)
            };
            async move { outcome }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = retry_on_conflict("order serial", || {
            calls += 1;
            async { Err(WorkflowError::PermissionDenied) }
        })
        .await;

        assert!(matches!(result, Err(WorkflowError::PermissionDenied)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_endless_conflicts_exhaust() {
        let mut calls = 0;
        let result: Result<(), _> = retry_on_conflict("trade number", || {
            calls += 1;
            async { Err(WorkflowError::Repository(RepositoryError::Conflict("taken".to_owned()))) }
        })
        .await;

        assert!(matches!(
            result,
            Err(WorkflowError::SerialGenerationExhausted("trade number"))
        ));
        assert_eq!(calls, MAX_SERIAL_ATTEMPTS);
    }
}
