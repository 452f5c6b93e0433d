//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MERCATO_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `MERCATO_BASE_URL` - Public URL for the storefront
//! - `STRIPE_SECRET_KEY` - Stripe API secret key
//! - `STRIPE_WEBHOOK_SECRET` - Signing secret of the webhook endpoint
//!
//! ## Optional
//! - `MERCATO_HOST` - Bind address (default: 127.0.0.1)
//! - `MERCATO_PORT` - Listen port (default: 8000)
//! - `STRIPE_CURRENCY` - Checkout currency (default: usd)
//! - `STRIPE_API_BASE` - Stripe API base URL (default: <https://api.stripe.com>)
//! - `USE_S3` - Store media and static files in S3 (default: false)
//! - `AWS_STORAGE_BUCKET_NAME`, `AWS_S3_REGION_NAME`, `AWS_ACCESS_KEY_ID`,
//!   `AWS_SECRET_ACCESS_KEY`, `AWS_S3_ENDPOINT_URL`, `AWS_CLOUDFRONT_DOMAIN`
//! - `MEDIA_LOCATION` / `STATIC_LOCATION` - Key prefixes in the bucket
//! - `MEDIA_ROOT` / `STATIC_ROOT` - Local directories (default: media, staticfiles)
//! - `MEDIA_URL` / `STATIC_URL` - Local URL prefixes (default: /media, /static)
//! - `VITE_MANIFEST_PATH` - Vite build manifest
//! - `VITE_DEV_SERVER_URL` - Vite dev server; when set, assets load from it
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `DEFAULT_FROM_EMAIL`
//! - `FREE_DELIVERY_THRESHOLD` (default: 50), `STANDARD_DELIVERY_PERCENTAGE` (default: 10)
//! - `STAFF_API_TOKEN` - Bearer token for staff routes (disabled when unset)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT` - Sentry error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use mercato_core::{CurrencyCode, DeliveryPricing};

use crate::storage::sanitize_region;

const MIN_STAFF_TOKEN_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
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

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Stripe API configuration
    pub stripe: StripeConfig,
    /// Media and static file storage
    pub storage: StorageConfig,
    /// Vite asset manifest configuration
    pub assets: AssetConfig,
    /// SMTP configuration; mail is only logged when absent
    pub email: Option<EmailConfig>,
    /// Delivery charge rules
    pub pricing: DeliveryPricing,
    /// Bearer token guarding staff routes
    pub staff_api_token: Option<SecretString>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Stripe API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_live_...` / `sk_test_...`)
    pub secret_key: SecretString,
    /// Webhook endpoint signing secret (`whsec_...`)
    pub webhook_secret: SecretString,
    /// Currency charged at checkout
    pub currency: CurrencyCode,
    /// API base URL, overridable for stripe-mock
    pub api_base: String,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("currency", &self.currency)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Media and static file storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Whether S3 is the primary backend
    pub use_s3: bool,
    /// S3 bucket settings, present when a bucket name is configured
    pub s3: Option<S3Config>,
    /// Key prefix for uploaded media
    pub media_location: String,
    /// Key prefix for collected static files
    pub static_location: String,
    /// Local media directory (also the S3 fallback)
    pub media_root: PathBuf,
    /// Local directory static files are collected into
    pub static_root: PathBuf,
    /// URL prefix for locally served media
    pub media_url: String,
    /// URL prefix for locally served static files
    pub static_url: String,
}

/// S3 bucket configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct S3Config {
    pub bucket: String,
    /// Region with any inline comment stripped
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<SecretString>,
    /// Custom endpoint for S3-compatible services
    pub endpoint_url: Option<String>,
    /// CloudFront distribution domain serving the bucket
    pub cloudfront_domain: Option<String>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("endpoint_url", &self.endpoint_url)
            .field("cloudfront_domain", &self.cloudfront_domain)
            .finish()
    }
}

/// Vite asset configuration.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Path to the Vite build manifest
    pub manifest_path: PathBuf,
    /// Vite dev server URL; bypasses the manifest when set
    pub dev_server_url: Option<String>,
}

/// SMTP configuration for transactional email.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl StorefrontConfig {
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

        let database_url = get_database_url("MERCATO_DATABASE_URL")?;
        let host = get_env_or_default("MERCATO_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("MERCATO_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("MERCATO_PORT", "8000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("MERCATO_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("MERCATO_BASE_URL")?;
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("MERCATO_BASE_URL".to_string(), e.to_string())
        })?;

        let staff_api_token = match get_optional_env("STAFF_API_TOKEN") {
            Some(token) => {
                validate_staff_token(&token, "STAFF_API_TOKEN")?;
                Some(SecretString::from(token))
            }
            None => None,
        };

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            stripe: StripeConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            assets: AssetConfig::from_env(),
            email: EmailConfig::from_env()?,
            pricing: pricing_from_env()?,
            staff_api_token,
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

/// Load only the database URL (`MERCATO_DATABASE_URL`, falling back to
/// `DATABASE_URL`), for tools that need nothing else.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if neither variable is set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    let _ = dotenvy::dotenv();
    get_database_url("MERCATO_DATABASE_URL")
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let currency = get_env_or_default("STRIPE_CURRENCY", "usd")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("STRIPE_CURRENCY".to_string(), e))?;
        Ok(Self {
            secret_key: get_validated_secret("STRIPE_SECRET_KEY")?,
            webhook_secret: get_validated_secret("STRIPE_WEBHOOK_SECRET")?,
            currency,
            api_base: get_env_or_default("STRIPE_API_BASE", "https://api.stripe.com")
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

impl StorageConfig {
    /// Load storage configuration on its own.
    ///
    /// Used by the management CLI, which needs storage settings but not the
    /// database or Stripe keys.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `USE_S3` is set without a bucket name or a
    /// boolean variable is unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let use_s3 = get_bool_env("USE_S3")?;
        let s3 = S3Config::from_env();
        if use_s3 && s3.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "AWS_STORAGE_BUCKET_NAME".to_string(),
            ));
        }

        Ok(Self {
            use_s3,
            s3,
            media_location: trim_slashes(&get_env_or_default("MEDIA_LOCATION", "media")),
            static_location: trim_slashes(&get_env_or_default("STATIC_LOCATION", "static")),
            media_root: PathBuf::from(get_env_or_default("MEDIA_ROOT", "media")),
            static_root: PathBuf::from(get_env_or_default("STATIC_ROOT", "staticfiles")),
            media_url: get_env_or_default("MEDIA_URL", "/media"),
            static_url: get_env_or_default("STATIC_URL", "/static"),
        })
    }

    /// Base URL static assets are served from.
    ///
    /// The CDN (or bucket) URL when S3 is enabled, the local prefix otherwise.
    #[must_use]
    pub fn public_static_url(&self) -> String {
        match (&self.s3, self.use_s3) {
            (Some(s3), true) => format!("{}/{}", s3.public_base_url(), self.static_location),
            _ => self.static_url.trim_end_matches('/').to_string(),
        }
    }
}

impl S3Config {
    fn from_env() -> Option<Self> {
        let bucket = get_optional_env("AWS_STORAGE_BUCKET_NAME")?;
        Some(Self {
            bucket,
            region: sanitize_region(&get_env_or_default("AWS_S3_REGION_NAME", "")),
            access_key_id: get_optional_env("AWS_ACCESS_KEY_ID"),
            secret_access_key: get_optional_env("AWS_SECRET_ACCESS_KEY").map(SecretString::from),
            endpoint_url: get_optional_env("AWS_S3_ENDPOINT_URL")
                .map(|e| e.trim_end_matches('/').to_string()),
            cloudfront_domain: get_optional_env("AWS_CLOUDFRONT_DOMAIN")
                .map(|d| trim_slashes(d.trim_start_matches("https://"))),
        })
    }

    /// Whether both halves of a static key pair are configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.access_key_id.as_deref().is_some_and(|k| !k.is_empty())
            && self
                .secret_access_key
                .as_ref()
                .is_some_and(|s| !s.expose_secret().is_empty())
    }

    /// Public URL of the bucket root, preferring the CloudFront domain.
    #[must_use]
    pub fn public_base_url(&self) -> String {
        if let Some(domain) = &self.cloudfront_domain {
            return format!("https://{domain}");
        }
        if let Some(endpoint) = &self.endpoint_url {
            return format!("{endpoint}/{}", self.bucket);
        }
        format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region)
    }
}

impl AssetConfig {
    fn from_env() -> Self {
        Self {
            manifest_path: PathBuf::from(get_env_or_default(
                "VITE_MANIFEST_PATH",
                "staticfiles/dist/.vite/manifest.json",
            )),
            dev_server_url: get_optional_env("VITE_DEV_SERVER_URL")
                .map(|u| u.trim_end_matches('/').to_string()),
        }
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };
        let smtp_port = get_env_or_default("SMTP_PORT", "587")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string()))?;
        Ok(Some(Self {
            smtp_host,
            smtp_port,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("DEFAULT_FROM_EMAIL")?,
        }))
    }
}

fn pricing_from_env() -> Result<DeliveryPricing, ConfigError> {
    let defaults = DeliveryPricing::default();
    Ok(DeliveryPricing {
        free_delivery_threshold: get_decimal_env(
            "FREE_DELIVERY_THRESHOLD",
            defaults.free_delivery_threshold,
        )?,
        standard_delivery_percentage: get_decimal_env(
            "STANDARD_DELIVERY_PERCENTAGE",
            defaults.standard_delivery_percentage,
        )?,
    })
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

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

fn get_bool_env(key: &str) -> Result<bool, ConfigError> {
    get_optional_env(key).map_or(Ok(false), |v| {
        parse_bool(&v).ok_or_else(|| {
            ConfigError::InvalidEnvVar(key.to_string(), format!("not a boolean: {v}"))
        })
    })
}

fn get_decimal_env(key: &str, default: Decimal) -> Result<Decimal, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |v| {
        v.trim()
            .parse::<Decimal>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse the boolean spellings accepted in environment files.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn trim_slashes(value: &str) -> String {
    value.trim().trim_matches('/').to_string()
}

/// Validate that a staff token meets minimum length requirements.
fn validate_staff_token(token: &str, var_name: &str) -> Result<(), ConfigError> {
    if token.len() < MIN_STAFF_TOKEN_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_STAFF_TOKEN_LENGTH,
                token.len()
            ),
        ));
    }
    validate_secret_strength(token, var_name)
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
