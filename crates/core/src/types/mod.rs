//! Core types for OMS.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod price;
pub mod status;

pub use id::*;
pub use price::{AmountError, line_total, order_total, to_whole_units};
pub use status::*;
