//! Bearer token issuance for operators and local testing.
//!
//! # Usage
//!
//! ```bash
//! oms-cli token -u 1 -r admin --ttl-minutes 60
//! ```
//!
//! # Environment Variables
//!
//! - `OMS_JWT_SECRET` - Same secret the server verifies with

use chrono::Duration;
use oms_core::{Role, UserId};
use oms_server::middleware::TokenVerifier;
use oms_server::models::Actor;
use secrecy::SecretString;

/// Print a signed token for `user_id` with `role`.
///
/// # Errors
///
/// Returns an error if the secret is missing, the role is unknown or the
/// lifetime is not positive.
pub fn issue(user_id: i32, role: &str, ttl_minutes: i64) -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let secret = std::env::var("OMS_JWT_SECRET")
        .map(SecretString::from)
        .map_err(|_| "OMS_JWT_SECRET not set")?;
    let role: Role = role.parse()?;
    if ttl_minutes <= 0 {
        return Err("ttl must be positive".into());
    }

    let actor = Actor::new(UserId::new(user_id), role);
    let token = TokenVerifier::new(&secret).issue(&actor, Duration::minutes(ttl_minutes))?;

    tracing::info!(user_id, %role, ttl_minutes, "Token issued");
    #[allow(clippy::print_stdout)]
    {
        println!("{token}");
    }
    Ok(())
}
