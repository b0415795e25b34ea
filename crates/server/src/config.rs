//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `OMS_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `OMS_JWT_SECRET` - HS256 signing secret for bearer tokens (min 32 chars, high entropy)
//! - `ECPAY_MERCHANT_ID` - ECPay merchant id
//! - `ECPAY_HASH_KEY` - ECPay `HashKey`
//! - `ECPAY_HASH_IV` - ECPay `HashIV`
//!
//! ## Optional
//! - `OMS_HOST` - Bind address (default: 127.0.0.1)
//! - `OMS_PORT` - Listen port (default: 5000)
//! - `OMS_BASE_URL` - Public URL of this server (default: `http://localhost:5000`)
//! - `FRONTEND_URL` - Frontend origin for redirects (default: `http://localhost:5173`)
//! - `ECPAY_CHECKOUT_URL` - Checkout endpoint (default: ECPay staging)
//! - `ECPAY_NOTIFY_URL` - Server callback URL (default: `{OMS_BASE_URL}/payments/ecpay/callback`)
//! - `ECPAY_ORDER_RETURN_URL` - Browser return URL (default: `{OMS_BASE_URL}/payments/ecpay/return`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// ECPay staging checkout endpoint.
pub const ECPAY_STAGE_CHECKOUT_URL: &str =
    "https://payment-stage.ecpay.com.tw/Cashier/AioCheckOut/V5";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct OmsConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of this server
    pub base_url: String,
    /// Frontend origin used for payment result redirects
    pub frontend_url: String,
    /// Bearer token verification secret
    pub jwt_secret: SecretString,
    /// Payment vendor configuration
    pub ecpay: EcpayConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. production, staging)
    pub sentry_environment: Option<String>,
}

/// ECPay merchant configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct EcpayConfig {
    /// Merchant id issued by ECPay
    pub merchant_id: String,
    /// `HashKey` for `CheckMacValue`
    pub hash_key: SecretString,
    /// `HashIV` for `CheckMacValue`
    pub hash_iv: SecretString,
    /// Endpoint the browser form posts to
    pub checkout_url: String,
    /// Server-to-server payment notification URL (`ReturnURL`)
    pub notify_url: String,
    /// Browser redirect after payment (`OrderResultURL`)
    pub order_result_url: String,
    /// "Back to shop" link on the vendor page (`ClientBackURL`)
    pub client_back_url: String,
}

impl std::fmt::Debug for EcpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcpayConfig")
            .field("merchant_id", &self.merchant_id)
            .field("hash_key", &"[REDACTED]")
            .field("hash_iv", &"[REDACTED]")
            .field("checkout_url", &self.checkout_url)
            .field("notify_url", &self.notify_url)
            .field("order_result_url", &self.order_result_url)
            .field("client_back_url", &self.client_back_url)
            .finish()
    }
}

impl OmsConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("OMS_DATABASE_URL")?;
        let host = get_env_or_default("OMS_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("OMS_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("OMS_PORT", "5000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("OMS_PORT".to_string(), e.to_string()))?;
        let base_url = get_url("OMS_BASE_URL", "http://localhost:5000")?;
        let frontend_url = get_url("FRONTEND_URL", "http://localhost:5173")?;
        let jwt_secret = get_validated_secret("OMS_JWT_SECRET")?;
        validate_secret_length(&jwt_secret, "OMS_JWT_SECRET")?;

        let ecpay = EcpayConfig::from_env(&base_url, &frontend_url)?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            frontend_url,
            jwt_secret,
            ecpay,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl EcpayConfig {
    fn from_env(base_url: &str, frontend_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            merchant_id: get_required_env("ECPAY_MERCHANT_ID")?,
            hash_key: get_required_secret("ECPAY_HASH_KEY")?,
            hash_iv: get_required_secret("ECPAY_HASH_IV")?,
            checkout_url: get_url("ECPAY_CHECKOUT_URL", ECPAY_STAGE_CHECKOUT_URL)?,
            notify_url: get_url(
                "ECPAY_NOTIFY_URL",
                &format!("{base_url}/payments/ecpay/callback"),
            )?,
            order_result_url: get_url(
                "ECPAY_ORDER_RETURN_URL",
                &format!("{base_url}/payments/ecpay/return"),
            )?,
            client_back_url: frontend_url.to_owned(),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an absolute URL, without a trailing slash.
fn get_url(key: &str, default: &str) -> Result<String, ConfigError> {
    let value = get_env_or_default(key, default);
    parse_url(key, &value)
}

fn parse_url(key: &str, value: &str) -> Result<String, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    Ok(value.trim_end_matches('/').to_owned())
}

/// Validate that a signing secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_JWT_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
