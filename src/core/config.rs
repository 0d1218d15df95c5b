//! Configuration management for the tool server.
//!
//! This module provides a centralized configuration structure that can be
//! populated from environment variables or defaults. The library itself only
//! ever receives a [`Config`] value; reading the environment is left to the
//! binary.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::transport::TransportConfig;

/// Main configuration structure for the tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Transport configuration.
    pub transport: TransportConfig,

    /// Request dispatch configuration.
    pub dispatch: DispatchConfig,

    /// Message framing configuration.
    pub framing: FramingConfig,

    /// Send the capability announcement when a connection opens.
    pub announce_capabilities: bool,
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The name of the server as reported to clients.
    pub name: String,

    /// The version of the server.
    pub version: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,

    /// Whether to include timestamps in log output.
    pub with_timestamps: bool,
}

/// Request dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Per-call handler timeout in milliseconds. `0` disables the timeout.
    pub call_timeout_ms: u64,

    /// Maximum number of requests executing at once on one connection.
    pub max_in_flight: usize,

    /// Reject properties that a tool's schema does not declare.
    pub strict_schemas: bool,

    /// Time in-flight requests get to finish once the inbound stream closes.
    pub shutdown_grace_ms: u64,

    /// Log every tool call and its outcome through an interceptor.
    pub log_tool_calls: bool,
}

/// Message framing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramingConfig {
    /// Largest accepted inbound frame, in bytes.
    pub max_frame_bytes: usize,

    /// Capacity of the outbound message queue.
    pub outbound_queue: usize,
}

impl DispatchConfig {
    /// The per-call timeout, if any.
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 30_000,
            max_in_flight: 64,
            strict_schemas: false,
            shutdown_grace_ms: 5_000,
            log_tool_calls: true,
        }
    }
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 4 * 1024 * 1024,
            outbound_queue: 256,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "mcp-tool-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                with_timestamps: true,
            },
            transport: TransportConfig::default(),
            dispatch: DispatchConfig::default(),
            framing: FramingConfig::default(),
            announce_capabilities: true,
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables are expected to be prefixed with `MCP_`.
    /// For example: `MCP_SERVER_NAME`, `MCP_LOG_LEVEL`, `MCP_CALL_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(name) = std::env::var("MCP_SERVER_NAME") {
            config.server.name = name;
        }

        if let Ok(level) = std::env::var("MCP_LOG_LEVEL") {
            config.logging.level = level;
        }

        // Load transport configuration from environment
        config.transport = TransportConfig::from_env();

        env_override("MCP_CALL_TIMEOUT_MS", &mut config.dispatch.call_timeout_ms);
        env_override("MCP_MAX_IN_FLIGHT", &mut config.dispatch.max_in_flight);
        env_override("MCP_STRICT_SCHEMAS", &mut config.dispatch.strict_schemas);
        env_override("MCP_SHUTDOWN_GRACE_MS", &mut config.dispatch.shutdown_grace_ms);
        env_override("MCP_LOG_TOOL_CALLS", &mut config.dispatch.log_tool_calls);
        env_override("MCP_MAX_FRAME_BYTES", &mut config.framing.max_frame_bytes);
        env_override("MCP_ANNOUNCE_CAPABILITIES", &mut config.announce_capabilities);

        if config.dispatch.max_in_flight == 0 {
            warn!("MCP_MAX_IN_FLIGHT must be at least 1, using 1");
            config.dispatch.max_in_flight = 1;
        }

        if config.dispatch.strict_schemas {
            info!("Strict schema validation enabled");
        }

        config
    }
}

// Mutex to ensure env var tests run serially
#[cfg(test)]
pub(crate) static ENV_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Overwrite `target` with a parsed environment value, keeping the current
/// value when the variable is unset or unparseable.
pub(crate) fn env_override<T>(key: &str, target: &mut T)
where
    T: FromStr + std::fmt::Debug,
{
    let Ok(raw) = std::env::var(key) else {
        return;
    };

    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => warn!("Ignoring invalid {}={:?}, keeping {:?}", key, raw, target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.dispatch.call_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.dispatch.max_in_flight, 64);
        assert!(!config.dispatch.strict_schemas);
        assert!(config.announce_capabilities);
        assert_eq!(config.framing.max_frame_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let dispatch = DispatchConfig {
            call_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(dispatch.call_timeout(), None);
    }

    #[test]
    fn test_dispatch_from_env() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("MCP_CALL_TIMEOUT_MS", "1500");
            std::env::set_var("MCP_STRICT_SCHEMAS", "true");
            std::env::set_var("MCP_MAX_IN_FLIGHT", "0");
            std::env::set_var("MCP_LOG_TOOL_CALLS", "false");
        }
        let config = Config::from_env();
        assert_eq!(config.dispatch.call_timeout_ms, 1500);
        assert!(config.dispatch.strict_schemas);
        assert_eq!(config.dispatch.max_in_flight, 1);
        assert!(!config.dispatch.log_tool_calls);
        unsafe {
            std::env::remove_var("MCP_CALL_TIMEOUT_MS");
            std::env::remove_var("MCP_STRICT_SCHEMAS");
            std::env::remove_var("MCP_MAX_IN_FLIGHT");
            std::env::remove_var("MCP_LOG_TOOL_CALLS");
        }
    }

    #[test]
    fn test_invalid_env_value_keeps_default() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("MCP_SHUTDOWN_GRACE_MS", "soon");
        }
        let config = Config::from_env();
        assert_eq!(config.dispatch.shutdown_grace_ms, 5_000);
        unsafe {
            std::env::remove_var("MCP_SHUTDOWN_GRACE_MS");
        }
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.server.name, config.server.name);
        assert_eq!(back.dispatch.shutdown_grace_ms, config.dispatch.shutdown_grace_ms);
    }
}
