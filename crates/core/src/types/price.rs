//! Exact money arithmetic for order totals.
//!
//! Amounts are `rust_decimal::Decimal` in the currency's standard unit (the
//! store sells in TWD, which the payment vendor only accepts as whole units).
//! Nothing here ever goes through `f64`.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;

/// Errors from amount arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// A multiplication or sum exceeded `Decimal`'s range.
    #[error("amount overflow")]
    Overflow,
    /// Negative amounts cannot be charged.
    #[error("amount must not be negative: {0}")]
    Negative(Decimal),
}

/// Price of one order line: `unit_price × quantity`.
///
/// # Errors
///
/// Returns `AmountError::Overflow` if the product does not fit in a `Decimal`.
pub fn line_total(unit_price: Decimal, quantity: i32) -> Result<Decimal, AmountError> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .ok_or(AmountError::Overflow)
}

/// Exact sum of `unit_price × quantity` over all lines.
///
/// # Errors
///
/// Returns `AmountError::Overflow` if any line or the running sum overflows.
pub fn order_total<I>(lines: I) -> Result<Decimal, AmountError>
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    lines.into_iter().try_fold(Decimal::ZERO, |acc, (price, qty)| {
        acc.checked_add(line_total(price, qty)?)
            .ok_or(AmountError::Overflow)
    })
}

/// Whole currency units for vendors that only take integers.
///
/// The fractional part is truncated, not rounded.
///
/// # Errors
///
/// Returns `AmountError::Negative` for negative amounts and
/// `AmountError::Overflow` when the value does not fit in an `i64`.
pub fn to_whole_units(amount: Decimal) -> Result<i64, AmountError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AmountError::Negative(amount));
    }
    amount.trunc().to_i64().ok_or(AmountError::Overflow)
}
