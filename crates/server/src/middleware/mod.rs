//! HTTP middleware and extractors.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//!
//! Authentication is an extractor ([`RequireUser`]) rather than a layer so
//! that the vendor endpoints stay unauthenticated.

pub mod auth;
pub mod request_id;

pub use auth::{RequireUser, TokenVerifier};
pub use request_id::request_id_middleware;
