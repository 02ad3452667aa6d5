use serde::Deserialize;
use std::collections::HashMap;

use shared::crypto::SecretCipher;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub database: DatabaseConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    pub vault: VaultConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Pool settings in the persistence layer's shape.
    pub fn pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Default per-call timeout when the caller does not set one.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub timeout_ms: u64,

    /// User-Agent header applied unless the caller overrides it.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Idle connections kept per downstream host.
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    /// Seconds an idle pooled connection survives.
    #[serde(default = "default_pool_idle_timeout_secs")]
    pub pool_idle_timeout_secs: u64,

    /// Named host-classes with dedicated pool sizing; hosts not covered
    /// by any class use the global settings above.
    #[serde(default)]
    pub pools: HashMap<String, PoolClassConfig>,
}

/// Pool sizing for one named class of downstream hosts.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolClassConfig {
    /// Host entries; each matches its host exactly or as a domain suffix
    /// ("stripe.com" covers "api.stripe.com").
    pub hosts: Vec<String>,

    pub max_idle_per_host: Option<usize>,

    pub idle_timeout_secs: Option<u64>,
}

impl DispatchConfig {
    /// Effective `(max_idle_per_host, idle_timeout_secs)` for a downstream
    /// host. When several classes match, the one with the longest matching
    /// host entry wins.
    pub fn pool_for(&self, host: &str) -> (usize, u64) {
        let class = self
            .pools
            .values()
            .filter_map(|class| {
                class
                    .hosts
                    .iter()
                    .filter(|entry| host_matches(host, entry))
                    .map(|entry| entry.len())
                    .max()
                    .map(|len| (len, class))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, class)| class);

        (
            class
                .and_then(|c| c.max_idle_per_host)
                .unwrap_or(self.pool_max_idle_per_host),
            class
                .and_then(|c| c.idle_timeout_secs)
                .unwrap_or(self.pool_idle_timeout_secs),
        )
    }
}

fn host_matches(host: &str, entry: &str) -> bool {
    host == entry
        || host
            .strip_suffix(entry)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_dispatch_timeout_ms(),
            user_agent: default_user_agent(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            pool_idle_timeout_secs: default_pool_idle_timeout_secs(),
            pools: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the breaker stays open before allowing a probe.
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: i64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_timeout_secs: default_open_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    /// 32-byte master key, hex or base64 encoded. Never logged.
    pub master_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_dispatch_timeout_ms() -> u64 {
    15_000
}
fn default_user_agent() -> String {
    format!("outbound-gateway/{}", env!("CARGO_PKG_VERSION"))
}
fn default_pool_max_idle_per_host() -> usize {
    8
}
fn default_pool_idle_timeout_secs() -> u64 {
    90
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_open_timeout_secs() -> i64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl GatewayConfig {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with GATEWAY__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("GATEWAY").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration from embedded defaults plus overrides, without
    /// touching the file system or process environment.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [database]
            url = ""
            max_connections = 20
            min_connections = 5
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [dispatch]
            timeout_ms = 15000
            pool_max_idle_per_host = 8
            pool_idle_timeout_secs = 90

            [circuit_breaker]
            failure_threshold = 5
            open_timeout_secs = 60

            [vault]
            master_key = "0000000000000000000000000000000000000000000000000000000000000000"

            [logging]
            level = "info"
            format = "json"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "GATEWAY__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.dispatch.timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatch timeout_ms cannot be 0".to_string(),
            ));
        }

        for (name, class) in &self.dispatch.pools {
            if class.hosts.is_empty() {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "dispatch pool class '{}' has no hosts",
                    name
                )));
            }
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "failure_threshold cannot be 0".to_string(),
            ));
        }

        if self.circuit_breaker.open_timeout_secs <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "open_timeout_secs must be positive".to_string(),
            ));
        }

        // Fail at startup on a bad master key, not on first vault access.
        SecretCipher::from_encoded(&self.vault.master_key)
            .map_err(|e| ConfigValidationError::InvalidValue(e.to_string()))?;

        Ok(())
    }
}
