//! Application configuration loaded from environment variables.

use std::time::Duration;

use checkout::{CheckoutConfig, RedirectTargets};
use lifecycle::LifecycleConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `json` for JSON log lines, anything else for text
/// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`: PostgreSQL; in-memory store when unset
/// - `STRIPE_SECRET_KEY`, `STRIPE_API_BASE`: Stripe; in-memory checkout when unset
/// - `CHECKOUT_CURRENCY`, `CHECKOUT_ALLOWED_COUNTRIES`, `CHECKOUT_TIMEOUT_SECS`
/// - `PUBLIC_BASE_URL`: base of the payment redirect URLs
/// - `SWEEP_INTERVAL_SECS`, `ORDER_STALE_AFTER_SECS`
/// - `ADMIN_EMAIL`, `ADMIN_NAME`: admin account created at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
    pub checkout_currency: String,
    pub checkout_allowed_countries: Vec<String>,
    pub checkout_timeout: Duration,
    pub public_base_url: String,
    pub sweep_interval: Duration,
    pub order_stale_after: Duration,
    pub admin_email: Option<String>,
    pub admin_name: String,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    var(name).and_then(|v| v.trim().parse().ok())
}

fn parse_countries(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_json: var("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: var("DATABASE_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            stripe_api_base: var("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            checkout_currency: var("CHECKOUT_CURRENCY")
                .map(|c| c.to_ascii_lowercase())
                .unwrap_or(defaults.checkout_currency),
            checkout_allowed_countries: var("CHECKOUT_ALLOWED_COUNTRIES")
                .map(|raw| parse_countries(&raw))
                .unwrap_or(defaults.checkout_allowed_countries),
            checkout_timeout: parsed("CHECKOUT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.checkout_timeout),
            public_base_url: var("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            sweep_interval: parsed("SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            order_stale_after: parsed("ORDER_STALE_AFTER_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.order_stale_after),
            admin_email: var("ADMIN_EMAIL"),
            admin_name: var("ADMIN_NAME").unwrap_or(defaults.admin_name),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings for the Stripe provider.
    pub fn checkout_config(&self) -> CheckoutConfig {
        CheckoutConfig {
            currency: self.checkout_currency.clone(),
            allowed_countries: self.checkout_allowed_countries.clone(),
            api_base: self.stripe_api_base.clone(),
            timeout: self.checkout_timeout,
        }
    }

    /// Settings for the order lifecycle.
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            redirects: RedirectTargets::from_base_url(&self.public_base_url),
            checkout_timeout: self.checkout_timeout,
            stale_after: chrono::Duration::from_std(self.order_stale_after)
                .unwrap_or(chrono::Duration::hours(12)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            database_url: None,
            database_max_connections: 10,
            stripe_secret_key: None,
            stripe_api_base: "https://api.stripe.com".to_string(),
            checkout_currency: "usd".to_string(),
            checkout_allowed_countries: vec!["US".to_string(), "CA".to_string()],
            checkout_timeout: Duration::from_secs(10),
            public_base_url: "http://localhost:3000".to_string(),
            sweep_interval: Duration::from_secs(12 * 60 * 60),
            order_stale_after: Duration::from_secs(12 * 60 * 60),
            admin_email: None,
            admin_name: "Administrator".to_string(),
        }
    }
}
