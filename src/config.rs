//! # Configuration Management
//!
//! Centralized configuration for the Boson protocol.
//!
//! This module provides structured configuration for servers and clients,
//! codec size limits, the dispatch strategy and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides (`BOSON_*`)
//!
//! ## Security Considerations
//! - Every variable-length wire element is bounded by `CodecConfig`
//! - The frame limit is checked before any payload is buffered

use crate::error::{BosonError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Current supported protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Max allowed frame payload size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BosonConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Wire codec limits
    #[serde(default)]
    pub codec: CodecConfig,

    /// Dispatch concurrency policy
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BosonConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| BosonError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| BosonError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| BosonError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BOSON_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("BOSON_CLIENT_ADDRESS") {
            config.client.address = addr;
        }

        if let Ok(timeout) = std::env::var("BOSON_CONNECTION_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.connection_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(timeout) = std::env::var("BOSON_CALL_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.call_timeout = Some(Duration::from_millis(val));
            }
        }

        if let Ok(timeout) = std::env::var("BOSON_SERVER_CALL_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.server.call_timeout = Some(Duration::from_millis(val));
            }
        }

        if let Ok(size) = std::env::var("BOSON_MAX_FRAME_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.codec.max_frame_size = val;
            }
        }

        if let Ok(strategy) = std::env::var("BOSON_DISPATCH_STRATEGY") {
            config.dispatch.strategy = match strategy.to_ascii_lowercase().as_str() {
                "inline" => StrategyKind::Inline,
                "pooled" => StrategyKind::Pooled,
                other => {
                    return Err(BosonError::ConfigError(format!(
                        "Unknown dispatch strategy: {other}"
                    )))
                }
            };
        }

        if let Ok(workers) = std::env::var("BOSON_DISPATCH_WORKERS") {
            if let Ok(val) = workers.parse::<usize>() {
                config.dispatch.workers = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BosonError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| BosonError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.codec.validate());
        errors.extend(self.dispatch.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BosonError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server listen address (e.g., "127.0.0.1:7070")
    pub address: String,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Default deadline for calls the server makes back to its peers
    #[serde(
        default,
        with = "option_duration_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub call_timeout: Option<Duration>,

    /// Outbound buffering for every accepted connection
    #[serde(default)]
    pub outbound: OutboundConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:7070"),
            max_connections: 1000,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            call_timeout: None,
            outbound: OutboundConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:7070')",
                self.address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.call_timeout.is_some_and(|t| t.is_zero()) {
            errors.push("Call timeout must be greater than 0 when set".to_string());
        }

        errors.extend(self.outbound.validate());
        errors
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Target server address
    pub address: String,

    /// Timeout for connection attempts
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Default deadline for calls; `None` means calls never time out
    #[serde(
        default,
        with = "option_duration_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub call_timeout: Option<Duration>,

    /// Outbound buffering policy
    #[serde(default)]
    pub outbound: OutboundConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:7070"),
            connection_timeout: timeout::DEFAULT_TIMEOUT,
            call_timeout: None,
            outbound: OutboundConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Client address cannot be empty".to_string());
        }

        if self.connection_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        }

        if let Some(call_timeout) = self.call_timeout {
            if call_timeout.is_zero() {
                errors.push("Call timeout must be greater than 0 when set".to_string());
            }
        }

        errors.extend(self.outbound.validate());
        errors
    }
}

/// What happens when the outbound buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutboundPolicy {
    /// Never full
    #[default]
    Unbounded,
    /// Evict the oldest buffered frame to make room
    DropOldest,
    /// Fail the new call with `BufferFull`
    RejectNew,
}

/// Outbound buffer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutboundConfig {
    pub policy: OutboundPolicy,

    /// Capacity in frames; ignored for `Unbounded`
    pub capacity: usize,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            policy: OutboundPolicy::Unbounded,
            capacity: 1024,
        }
    }
}

impl OutboundConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.policy != OutboundPolicy::Unbounded && self.capacity == 0 {
            errors.push("Outbound capacity must be greater than 0 for bounded policies".to_string());
        }
        errors
    }
}

/// Value codec limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodecConfig {
    /// Maximum frame payload size in bytes
    pub max_frame_size: usize,

    /// Maximum UTF-8 string length in bytes (values, type names, field names)
    pub max_string_len: usize,

    /// Maximum byte-array length
    pub max_bytes_len: usize,

    /// Maximum element count for arrays, maps and parameter lists
    pub max_collection_len: usize,

    /// Maximum number of fields per object
    pub max_fields: usize,

    /// Maximum nesting depth
    pub max_depth: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            max_string_len: 1024 * 1024,
            max_bytes_len: 8 * 1024 * 1024,
            max_collection_len: 65_536,
            max_fields: 1024,
            max_depth: 64,
        }
    }
}

impl CodecConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_size < 16 {
            errors.push("Max frame size too small (minimum: 16 bytes)".to_string());
        } else if self.max_frame_size > u32::MAX as usize {
            errors.push(format!(
                "Max frame size too large: {} bytes (length prefix is 32 bits)",
                self.max_frame_size
            ));
        }

        if self.max_string_len == 0 {
            errors.push("Max string length must be greater than 0".to_string());
        }

        if self.max_collection_len == 0 {
            errors.push("Max collection length must be greater than 0".to_string());
        }

        if self.max_depth == 0 {
            errors.push("Max depth must be greater than 0".to_string());
        } else if self.max_depth > 1024 {
            errors.push(format!(
                "Max depth too large: {} (maximum: 1024)",
                self.max_depth
            ));
        }

        errors
    }
}

/// Dispatch strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Hand entries to blocking worker lanes
    #[default]
    Pooled,
    /// Dispatch on the network task
    Inline,
}

/// Dispatch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    pub strategy: StrategyKind,

    /// Number of drain lanes for the pooled strategy
    pub workers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Pooled,
            workers: 1,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.strategy == StrategyKind::Pooled {
            if self.workers == 0 {
                errors.push("Pooled strategy needs at least 1 worker".to_string());
            } else if self.workers > 512 {
                errors.push(format!(
                    "Worker count too large: {} (maximum: 512)",
                    self.workers
                ));
            }
        }
        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("boson-rpc"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Optional durations; TOML has no null, so `None` is simply omitted
mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
