//! OMS Core - Shared types library.
//!
//! This crate provides common types used across all OMS components:
//! - `server` - Order workflow and payment reconciliation HTTP backend
//! - `cli` - Command-line tools for migrations and seed data
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, order/payment statuses, roles and money helpers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
