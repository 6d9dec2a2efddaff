//! Configuration for Alpaca clients and discovery.
//!
//! This module provides a configuration system that supports:
//! - Loading from YAML files
//! - Environment variable overrides (`ALPACA__SECTION__FIELD`)
//! - Validation of all settings
//! - Timeout tiers, discovery timing and logging configuration

use crate::error::ConfigError;
use crate::types::{ServiceType, TimeoutTier};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Conventional Alpaca discovery port.
pub const DEFAULT_DISCOVERY_PORT: u16 = 32227;

/// Root configuration.
///
/// # Examples
///
/// ```
/// use alpaca_core::config::AlpacaConfig;
///
/// let config = AlpacaConfig::from_yaml(
///     "client:\n  standard_timeout_ms: 1000\ndiscovery:\n  discovery_duration_ms: 500\n",
/// )
/// .unwrap();
/// assert!(config.validate().is_ok());
/// assert_eq!(config.client.standard_timeout_ms, 1000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlpacaConfig {
    /// Transaction dispatcher settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Discovery engine settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AlpacaConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::InvalidFormat {
            reason: e.to_string(),
        })
    }

    /// Loads configuration using the `config` crate: the YAML file first,
    /// then `ALPACA__*` environment variables on top.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix("ALPACA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config
            .try_deserialize()
            .map_err(|e| ConfigError::InvalidFormat {
                reason: e.to_string(),
            })
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.client.validate()?;
        self.discovery.validate()?;
        self.logging.env_filter()?;
        Ok(())
    }
}

/// Settings for the transaction dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for the first contact with a server (milliseconds)
    #[serde(default = "default_establish_timeout")]
    pub establish_timeout_ms: u64,

    /// Timeout for calls expected to return quickly (milliseconds)
    #[serde(default = "default_standard_timeout")]
    pub standard_timeout_ms: u64,

    /// Timeout for calls expected to block (milliseconds)
    #[serde(default = "default_long_timeout")]
    pub long_timeout_ms: u64,

    /// Reject responses whose JSON keys are not cased exactly
    #[serde(default)]
    pub strict_casing: bool,

    /// HTTP basic auth user name
    #[serde(default)]
    pub user_name: Option<String>,

    /// HTTP basic auth password
    #[serde(default)]
    pub password: Option<String>,

    /// User-Agent header value
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_establish_timeout() -> u64 {
    3_000
}

fn default_standard_timeout() -> u64 {
    3_000
}

fn default_long_timeout() -> u64 {
    100_000
}

fn default_user_agent() -> String {
    concat!("alpaca-net/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            establish_timeout_ms: default_establish_timeout(),
            standard_timeout_ms: default_standard_timeout(),
            long_timeout_ms: default_long_timeout(),
            strict_casing: false,
            user_name: None,
            password: None,
            user_agent: default_user_agent(),
        }
    }
}

impl ClientConfig {
    /// Returns the tier durations.
    pub fn timeout_tiers(&self) -> Result<TimeoutTiers, ConfigError> {
        TimeoutTiers::new(
            Duration::from_millis(self.establish_timeout_ms),
            Duration::from_millis(self.standard_timeout_ms),
            Duration::from_millis(self.long_timeout_ms),
        )
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timeout_tiers()?;
        if self.password.is_some() && self.user_name.is_none() {
            return Err(ConfigError::invalid_value(
                "client.password",
                "a password requires a user_name",
            ));
        }
        Ok(())
    }
}

/// Tier-to-duration mapping used by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutTiers {
    establish: Duration,
    standard: Duration,
    long: Duration,
}

impl TimeoutTiers {
    /// Creates a mapping; every duration must be non-zero.
    pub fn new(establish: Duration, standard: Duration, long: Duration) -> Result<Self, ConfigError> {
        for (field, value) in [
            ("establish", establish),
            ("standard", standard),
            ("long", long),
        ] {
            if value.is_zero() {
                return Err(ConfigError::invalid_value(
                    format!("timeout.{}", field),
                    "timeout cannot be 0",
                ));
            }
        }
        Ok(Self {
            establish,
            standard,
            long,
        })
    }

    /// Returns the duration for a tier.
    pub fn get(&self, tier: TimeoutTier) -> Duration {
        match tier {
            TimeoutTier::Establish => self.establish,
            TimeoutTier::Standard => self.standard,
            TimeoutTier::Long => self.long,
        }
    }
}

impl Default for TimeoutTiers {
    fn default() -> Self {
        Self {
            establish: Duration::from_millis(default_establish_timeout()),
            standard: Duration::from_millis(default_standard_timeout()),
            long: Duration::from_millis(default_long_timeout()),
        }
    }
}

/// Configuration for the UDP discovery engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// UDP port the probe is sent to
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    /// Number of probes sent per interface
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Delay between repeated probes (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long to listen for replies (milliseconds)
    #[serde(default = "default_discovery_duration")]
    pub discovery_duration_ms: u64,

    /// Upper bound on the management-API aggregation phase (milliseconds)
    #[serde(default = "default_aggregation_timeout")]
    pub aggregation_timeout_ms: u64,

    /// Extra attempts for a failed management call before the server is
    /// recorded as failed
    #[serde(default)]
    pub management_retries: u32,

    /// Probe IPv4 broadcast addresses
    #[serde(default = "default_true")]
    pub use_ipv4: bool,

    /// Probe the Alpaca IPv6 multicast group
    #[serde(default)]
    pub use_ipv6: bool,

    /// Transport assumed for discovered servers
    #[serde(default)]
    pub service_type: ServiceType,

    /// Let the loopback interface take part in discovery
    #[serde(default)]
    pub include_loopback: bool,

    /// Additional addresses probed directly
    #[serde(default)]
    pub extra_targets: Vec<IpAddr>,

    /// Skip interface enumeration and probe only `extra_targets`
    #[serde(default)]
    pub targets_only: bool,
}

fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}

fn default_retry_count() -> u32 {
    1
}

fn default_poll_interval() -> u64 {
    100
}

fn default_discovery_duration() -> u64 {
    2_000
}

fn default_aggregation_timeout() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            discovery_port: default_discovery_port(),
            retry_count: default_retry_count(),
            poll_interval_ms: default_poll_interval(),
            discovery_duration_ms: default_discovery_duration(),
            aggregation_timeout_ms: default_aggregation_timeout(),
            management_retries: 0,
            use_ipv4: true,
            use_ipv6: false,
            service_type: ServiceType::Http,
            include_loopback: false,
            extra_targets: Vec::new(),
            targets_only: false,
        }
    }
}

impl DiscoveryConfig {
    /// Returns the delay between repeated probes.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the listening window.
    pub fn discovery_duration(&self) -> Duration {
        Duration::from_millis(self.discovery_duration_ms)
    }

    /// Returns the aggregation deadline.
    pub fn aggregation_timeout(&self) -> Duration {
        Duration::from_millis(self.aggregation_timeout_ms)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery_port == 0 {
            return Err(ConfigError::invalid_value(
                "discovery.discovery_port",
                "discovery_port cannot be 0",
            ));
        }

        if self.retry_count == 0 {
            return Err(ConfigError::invalid_value(
                "discovery.retry_count",
                "at least one probe must be sent",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                "discovery.poll_interval_ms",
                "poll_interval_ms cannot be 0",
            ));
        }

        if self.discovery_duration_ms == 0 {
            return Err(ConfigError::invalid_value(
                "discovery.discovery_duration_ms",
                "discovery_duration_ms cannot be 0",
            ));
        }

        if self.aggregation_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "discovery.aggregation_timeout_ms",
                "aggregation_timeout_ms cannot be 0",
            ));
        }

        if !self.use_ipv4 && !self.use_ipv6 {
            return Err(ConfigError::invalid_value(
                "discovery.use_ipv4",
                "at least one of use_ipv4 and use_ipv6 must be enabled",
            ));
        }

        if self.targets_only && self.extra_targets.is_empty() {
            return Err(ConfigError::invalid_value(
                "discovery.extra_targets",
                "targets_only requires at least one extra target",
            ));
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default)]
    pub format: LogFormat,

    /// Whether to include file/line info
    #[serde(default)]
    pub file_line: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            file_line: false,
        }
    }
}

impl LoggingConfig {
    /// Builds the filter for `level`, a bare level ("debug") or a full
    /// directive list ("alpaca_discovery=trace,info").
    pub fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        EnvFilter::try_new(&self.level).map_err(|e| ConfigError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("Invalid log filter '{}': {}", self.level, e),
        })
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
}
