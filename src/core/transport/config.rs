//! Transport configuration types.
//!
//! Selected with `MCP_TRANSPORT` (`stdio`, `tcp` or `http`); each listening
//! transport reads its own `MCP_<KIND>_*` variables on top of its defaults.

use serde::{Deserialize, Serialize};
use tracing::warn;

#[cfg(any(feature = "tcp", feature = "http"))]
use crate::core::config::env_override;

/// Transport configuration options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Standard input/output transport (default).
    #[cfg(feature = "stdio")]
    Stdio,

    /// TCP socket transport, one session per connection.
    #[cfg(feature = "tcp")]
    Tcp(TcpConfig),

    /// HTTP transport with one request per POST.
    #[cfg(feature = "http")]
    Http(HttpConfig),
}

/// Where a listening transport binds.
#[cfg(any(feature = "tcp", feature = "http"))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port number to listen on.
    pub port: u16,
}

#[cfg(any(feature = "tcp", feature = "http"))]
impl ListenConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The `host:port` string handed to the listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Apply `MCP_<prefix>_HOST` and `MCP_<prefix>_PORT`.
    fn apply_env(&mut self, prefix: &str) {
        if let Ok(host) = std::env::var(format!("MCP_{}_HOST", prefix)) {
            self.host = host;
        }
        env_override(&format!("MCP_{}_PORT", prefix), &mut self.port);
    }
}

#[cfg(any(feature = "tcp", feature = "http"))]
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// TCP transport configuration.
#[cfg(feature = "tcp")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpConfig {
    #[serde(flatten)]
    pub listen: ListenConfig,
}

#[cfg(feature = "tcp")]
impl TcpConfig {
    pub const DEFAULT_PORT: u16 = 3000;

    /// Defaults overridden by `MCP_TCP_HOST` and `MCP_TCP_PORT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.listen.apply_env("TCP");
        config
    }
}

#[cfg(feature = "tcp")]
impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig::new(default_host(), Self::DEFAULT_PORT),
        }
    }
}

/// HTTP transport configuration.
#[cfg(feature = "http")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(flatten)]
    pub listen: ListenConfig,

    /// Path of the request endpoint.
    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,

    /// Enable CORS for browser clients.
    #[serde(default = "default_cors")]
    pub enable_cors: bool,
}

#[cfg(feature = "http")]
fn default_rpc_path() -> String {
    "/rpc".to_string()
}

#[cfg(feature = "http")]
fn default_cors() -> bool {
    true
}

#[cfg(feature = "http")]
impl HttpConfig {
    pub const DEFAULT_PORT: u16 = 8080;

    /// Defaults overridden by `MCP_HTTP_HOST`, `MCP_HTTP_PORT`,
    /// `MCP_HTTP_PATH` and `MCP_HTTP_CORS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.listen.apply_env("HTTP");
        if let Ok(path) = std::env::var("MCP_HTTP_PATH") {
            config.rpc_path = path;
        }
        env_override("MCP_HTTP_CORS", &mut config.enable_cors);

        if !config.rpc_path.starts_with('/') {
            warn!("MCP_HTTP_PATH must start with '/', using /{}", config.rpc_path);
            config.rpc_path.insert(0, '/');
        }
        config
    }
}

#[cfg(feature = "http")]
impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig::new(default_host(), Self::DEFAULT_PORT),
            rpc_path: default_rpc_path(),
            enable_cors: default_cors(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        #[cfg(feature = "stdio")]
        {
            return Self::Stdio;
        }

        #[cfg(all(not(feature = "stdio"), feature = "tcp"))]
        {
            return Self::Tcp(TcpConfig::default());
        }

        #[cfg(all(not(feature = "stdio"), not(feature = "tcp"), feature = "http"))]
        {
            return Self::Http(HttpConfig::default());
        }

        #[cfg(not(any(feature = "stdio", feature = "tcp", feature = "http")))]
        {
            compile_error!("At least one transport feature must be enabled: stdio, tcp, or http");
        }
    }
}

impl TransportConfig {
    /// Load transport config from environment variables.
    ///
    /// An unset `MCP_TRANSPORT` selects the default transport; a value naming
    /// a transport that is not compiled in is logged and ignored.
    pub fn from_env() -> Self {
        let Ok(requested) = std::env::var("MCP_TRANSPORT") else {
            return Self::default();
        };

        match requested.trim().to_lowercase().as_str() {
            #[cfg(feature = "stdio")]
            "stdio" => Self::Stdio,
            #[cfg(feature = "tcp")]
            "tcp" => Self::Tcp(TcpConfig::from_env()),
            #[cfg(feature = "http")]
            "http" => Self::Http(HttpConfig::from_env()),
            other => {
                let fallback = Self::default();
                warn!(
                    "Transport '{}' is not available in this build, using {}",
                    other,
                    fallback.description()
                );
                fallback
            }
        }
    }

    /// Get a description of this transport for logging.
    pub fn description(&self) -> String {
        match self {
            #[cfg(feature = "stdio")]
            Self::Stdio => "STDIO (newline-delimited JSON)".to_string(),
            #[cfg(feature = "tcp")]
            Self::Tcp(cfg) => format!("TCP on {}", cfg.listen.address()),
            #[cfg(feature = "http")]
            Self::Http(cfg) => format!("HTTP on {}{}", cfg.listen.address(), cfg.rpc_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ENV_TEST_LOCK;

    #[cfg(feature = "stdio")]
    #[test]
    fn test_default_is_stdio() {
        let config = TransportConfig::default();
        assert_eq!(config, TransportConfig::Stdio);
        assert!(config.description().contains("STDIO"));
    }

    #[test]
    fn test_unknown_transport_falls_back_to_default() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("MCP_TRANSPORT", "carrier-pigeon");
        }
        let config = TransportConfig::from_env();
        unsafe {
            std::env::remove_var("MCP_TRANSPORT");
        }
        assert_eq!(config, TransportConfig::default());
    }

    #[cfg(feature = "tcp")]
    #[test]
    fn test_tcp_config_serde() {
        let config = TransportConfig::Tcp(TcpConfig {
            listen: ListenConfig::new("0.0.0.0", 4000),
        });
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value, serde_json::json!({ "type": "tcp", "host": "0.0.0.0", "port": 4000 }));
        let back: TransportConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
        assert_eq!(config.description(), "TCP on 0.0.0.0:4000");

        let back: TransportConfig =
            serde_json::from_value(serde_json::json!({ "type": "tcp", "port": 9 })).unwrap();
        assert_eq!(back.description(), "TCP on 127.0.0.1:9");
    }

    #[cfg(feature = "tcp")]
    #[test]
    fn test_tcp_from_env() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("MCP_TRANSPORT", "TCP");
            std::env::set_var("MCP_TCP_HOST", "0.0.0.0");
            std::env::set_var("MCP_TCP_PORT", "not-a-port");
        }
        let config = TransportConfig::from_env();
        unsafe {
            std::env::remove_var("MCP_TRANSPORT");
            std::env::remove_var("MCP_TCP_HOST");
            std::env::remove_var("MCP_TCP_PORT");
        }
        assert_eq!(
            config,
            TransportConfig::Tcp(TcpConfig {
                listen: ListenConfig::new("0.0.0.0", TcpConfig::DEFAULT_PORT),
            })
        );
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_http_from_env() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("MCP_TRANSPORT", "http");
            std::env::set_var("MCP_HTTP_PORT", "9090");
            std::env::set_var("MCP_HTTP_PATH", "tools");
            std::env::set_var("MCP_HTTP_CORS", "false");
        }
        let config = TransportConfig::from_env();
        unsafe {
            std::env::remove_var("MCP_TRANSPORT");
            std::env::remove_var("MCP_HTTP_PORT");
            std::env::remove_var("MCP_HTTP_PATH");
            std::env::remove_var("MCP_HTTP_CORS");
        }

        let TransportConfig::Http(http) = config else {
            panic!("expected the HTTP transport");
        };
        assert_eq!(http.listen.address(), "127.0.0.1:9090");
        assert_eq!(http.rpc_path, "/tools");
        assert!(!http.enable_cors);
    }
}
