//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! oms-cli user create -u alice -r seller
//! ```

use oms_core::Role;
use oms_server::db;
use thiserror::Error;

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UserError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: admin, seller, customer")]
    InvalidRole(String),

    /// Invalid username.
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// User already exists.
    #[error("User already exists: {0}")]
    UserExists(String),
}

/// Parse and validate user input before touching the database.
fn validate(username: &str, role: &str) -> Result<(String, Role), UserError> {
    let role: Role = role
        .parse()
        .map_err(|_| UserError::InvalidRole(role.to_owned()))?;

    let username = username.trim();
    if username.is_empty() || username.len() > 64 || username.contains(char::is_whitespace) {
        return Err(UserError::InvalidUsername(username.to_owned()));
    }

    Ok((username.to_owned(), role))
}

/// Create a new user.
///
/// # Returns
///
/// The ID of the created user.
///
/// # Errors
///
/// Returns `UserError` for invalid input, an existing username or a database
/// failure.
pub async fn create_user(username: &str, role: &str) -> Result<i32, UserError> {
    let (username, role) = validate(username, role)?;

    let database_url = super::database_url().map_err(UserError::MissingEnvVar)?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;

    let existing: Option<i32> = sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(&username)
        .fetch_optional(&pool)
        .await?;
    if existing.is_some() {
        return Err(UserError::UserExists(username));
    }

    let user_id: i32 =
        sqlx::query_scalar("INSERT INTO users (username, role) VALUES ($1, $2) RETURNING id")
            .bind(&username)
            .bind(role)
            .fetch_one(&pool)
            .await?;

    tracing::info!(user_id, %username, %role, "User created");
    Ok(user_id)
}
