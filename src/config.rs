use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_ERP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

/// ERP (directory) endpoint configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ErpConfig {
    /// Base URL of the ERP OData API (collections live under this root)
    #[validate(custom = "validate_endpoint_url")]
    pub base_url: String,

    /// OAuth2 token endpoint for client-credentials grants
    #[validate(custom = "validate_endpoint_url")]
    pub token_url: String,

    /// OAuth2 client id
    #[validate(length(min = 1))]
    pub client_id: String,

    /// OAuth2 client secret (no default; must be provided via config or env)
    #[validate(length(min = 1))]
    pub client_secret: String,

    /// OAuth2 scope requested with the token
    #[serde(default)]
    pub scope: Option<String>,

    /// Per-request timeout for ERP calls (seconds)
    #[serde(default = "default_erp_timeout_secs")]
    #[validate(custom = "validate_nonzero_secs")]
    pub request_timeout_secs: u64,

    /// Safety margin subtracted from token lifetimes before refresh (seconds)
    #[serde(default = "default_token_refresh_margin_secs")]
    pub token_refresh_margin_secs: u64,
}

impl ErpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.token_refresh_margin_secs)
    }
}

impl Default for ErpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7048/bc/api/v2.0".to_string(),
            token_url: "http://localhost:7048/bc/oauth/token".to_string(),
            client_id: "salesdesk-dev".to_string(),
            client_secret: String::new(),
            scope: None,
            request_timeout_secs: default_erp_timeout_secs(),
            token_refresh_margin_secs: default_token_refresh_margin_secs(),
        }
    }
}

/// Policy switches for the variant order behaviors
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderPolicyConfig {
    /// Enforce the credit-limit arithmetic (balance + order total vs limit)
    /// on top of the always-on credit-allowed gate
    #[serde(default = "default_true_bool")]
    pub enforce_credit_limit: bool,

    /// Reject order lines whose quantity exceeds the available balance
    /// (the item-at-location presence check is always on)
    #[serde(default = "default_true_bool")]
    pub enforce_stock_levels: bool,

    /// When an all-orders viewer lists Pending, also include Processing
    #[serde(default = "default_false_bool")]
    pub admin_merges_open_statuses: bool,
}

impl Default for OrderPolicyConfig {
    fn default() -> Self {
        Self {
            enforce_credit_limit: true,
            enforce_stock_levels: true,
            admin_merges_open_statuses: false,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    #[validate(length(min = 1))]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default = "default_false_bool")]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// ERP endpoint configuration
    #[validate]
    pub erp: ErpConfig,

    /// Order policy switches
    #[serde(default)]
    pub order_policy: OrderPolicyConfig,
}

impl AppConfig {
    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Creates a new configuration with defaults for the optional knobs
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            erp: ErpConfig::default(),
            order_policy: OrderPolicyConfig::default(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_erp_timeout_secs() -> u64 {
    DEFAULT_ERP_TIMEOUT_SECS
}

fn default_token_refresh_margin_secs() -> u64 {
    DEFAULT_TOKEN_REFRESH_MARGIN_SECS
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_false_bool() -> bool {
    false
}

fn default_true_bool() -> bool {
    true
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_endpoint_url(raw: &str) -> Result<(), ValidationError> {
    match url::Url::parse(raw) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Ok(()),
        _ => {
            let mut err = ValidationError::new("endpoint_url");
            err.message = Some("Must be an absolute http(s) URL".into());
            Err(err)
        }
    }
}

fn validate_nonzero_secs(value: u64) -> Result<(), ValidationError> {
    if value == 0 {
        let mut err = ValidationError::new("nonzero_secs");
        err.message = Some("Must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("salesdesk_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // NOTE: erp.client_secret has no default - it MUST be provided via environment
    // variable or config file so orders are never pushed with a placeholder identity.
    let config = Config::builder()
        .set_default("database_url", "sqlite://salesdesk.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("erp.base_url", "http://localhost:7048/bc/api/v2.0")?
        .set_default("erp.token_url", "http://localhost:7048/bc/oauth/token")?
        .set_default("erp.client_id", "salesdesk-dev")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // Check for the ERP secret before deserialization to provide a clear error message
    if config.get_string("erp.client_secret").is_err() {
        error!("ERP client secret is not configured. Set APP__ERP__CLIENT_SECRET or add erp.client_secret to the config file.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "erp.client_secret is required but not configured. Set APP__ERP__CLIENT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}


#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn erp_urls_must_be_absolute() {
        let mut cfg = AppConfig::new(
            "sqlite://salesdesk.db?mode=memory".into(),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        cfg.erp.client_secret = "test-secret".into();
        cfg.erp.base_url = "not a url".into();

        let errors = cfg.validate().unwrap_err();
        assert!(errors.errors().contains_key("erp"));
    }

    #[test]
    fn zero_request_timeout_is_rejected() {
        let mut cfg = AppConfig::new(
            "sqlite://salesdesk.db?mode=memory".into(),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        cfg.erp.client_secret = "test-secret".into();
        cfg.erp.request_timeout_secs = 0;

        assert!(cfg.validate().is_err());
    }

    #[test]
    fn policy_defaults_are_strict_checks_no_merging() {
        let policy = OrderPolicyConfig::default();
        assert!(policy.enforce_credit_limit);
        assert!(policy.enforce_stock_levels);
        assert!(!policy.admin_merges_open_statuses);
    }

    #[test]
    fn log_level_must_be_known() {
        let mut cfg = AppConfig::new(
            "sqlite://salesdesk.db?mode=memory".into(),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        cfg.erp.client_secret = "test-secret".into();
        cfg.log_level = "verbose".into();

        assert!(cfg.validate().is_err());
    }
}
