//! CLI command implementations.

pub mod migrate;
pub mod seed;
pub mod token;
pub mod user;

use secrecy::SecretString;

/// Read the database URL the same way the server does.
///
/// # Errors
///
/// Returns an error naming the variable if neither is set.
pub fn database_url() -> Result<SecretString, &'static str> {
    dotenvy::dotenv().ok();

    std::env::var("OMS_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| "OMS_DATABASE_URL not set")
}
