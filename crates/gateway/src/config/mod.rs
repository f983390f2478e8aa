use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GatewayError, Result};

/// Environment variable holding the listen port
pub const ENV_PORT: &str = "PORT";
/// Environment variable holding the listen host
pub const ENV_HOST: &str = "HOST";
/// Environment variable holding the user service base URL
pub const ENV_USER_SERVICE_URL: &str = "USER_SERVICE_URL";
/// Environment variable holding the chatbot service base URL
pub const ENV_CHATBOT_SERVICE_URL: &str = "CHATBOT_SERVICE_URL";
/// Environment variable holding the allowed cross-origin caller
pub const ENV_CORS_ORIGIN: &str = "CORS_ORIGIN";
/// Environment variable holding the upstream idle timeout in seconds
pub const ENV_IDLE_TIMEOUT_SECS: &str = "IDLE_TIMEOUT_SECS";

/// Main configuration structure for the gateway
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Listener and CORS configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Backend service locations
    #[serde(default)]
    pub services: ServicesConfig,
    /// Upstream forwarding and relay tuning
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind (e.g., "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origin allowed to call the gateway from a browser ("*" allows any)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_cors_origin() -> String {
    "http://localhost:8090".to_string()
}

/// Backend service base URLs. Both are required before the gateway starts.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServicesConfig {
    /// Base URL of the user service (authentication, profile)
    #[serde(default)]
    pub user_service_url: Option<String>,
    /// Base URL of the chatbot service (streamed chat replies)
    #[serde(default)]
    pub chatbot_service_url: Option<String>,
}

/// Upstream forwarding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Upstream connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Seconds without upstream bytes before the request is failed
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Chunks buffered between the upstream reader and the caller
    #[serde(default = "default_relay_buffer_chunks")]
    pub relay_buffer_chunks: usize,
    /// Largest inbound request body accepted, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            relay_buffer_chunks: default_relay_buffer_chunks(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_idle_timeout_secs() -> u64 {
    60
}

fn default_relay_buffer_chunks() -> usize {
    16
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Config {
    /// Load configuration from an explicit file, or from the first default
    /// location that exists. Falls back to defaults when no file is found.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            Some(PathBuf::from("gateway.toml")),
            dirs::config_dir().map(|c| c.join("chat-gateway").join("gateway.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults and environment");
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> Result<Self> {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Empty values are ignored so that `USER_SERVICE_URL=` behaves like an
    /// unset variable.
    pub fn with_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = var(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| GatewayError::Config(format!("Invalid {ENV_PORT} '{port}': {e}")))?;
        }
        if let Some(host) = var(ENV_HOST) {
            self.server.host = host;
        }
        if let Some(origin) = var(ENV_CORS_ORIGIN) {
            self.server.cors_origin = origin;
        }
        if let Some(url) = var(ENV_USER_SERVICE_URL) {
            self.services.user_service_url = Some(url);
        }
        if let Some(url) = var(ENV_CHATBOT_SERVICE_URL) {
            self.services.chatbot_service_url = Some(url);
        }
        if let Some(secs) = var(ENV_IDLE_TIMEOUT_SECS) {
            self.proxy.idle_timeout_secs = secs.trim().parse().map_err(|e| {
                GatewayError::Config(format!("Invalid {ENV_IDLE_TIMEOUT_SECS} '{secs}': {e}"))
            })?;
        }

        Ok(self)
    }

    /// Check that the configuration can start a gateway.
    ///
    /// Must be called before binding the listener: a missing service URL is
    /// fatal at startup, never at request time.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            (ENV_USER_SERVICE_URL, &self.services.user_service_url),
            (ENV_CHATBOT_SERVICE_URL, &self.services.chatbot_service_url),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().is_none_or(|v| v.trim().is_empty()))
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(GatewayError::Config(format!(
                "Service URLs are not defined: {}",
                missing.join(", ")
            )));
        }

        if self.proxy.connect_timeout_secs == 0 || self.proxy.idle_timeout_secs == 0 {
            return Err(GatewayError::Config(
                "Timeouts must be greater than zero".to_string(),
            ));
        }

        if self.proxy.relay_buffer_chunks == 0 {
            return Err(GatewayError::Config(
                "relay_buffer_chunks must be greater than zero".to_string(),
            ));
        }

        if self.server.cors_origin.trim().is_empty() {
            return Err(GatewayError::Config("cors_origin cannot be empty".to_string()));
        }

        self.listen_addr()?;
        Ok(())
    }

    /// Socket address the gateway binds to
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse()
            .map_err(|e| GatewayError::Config(format!("Invalid listen address '{addr}': {e}")))
    }
}
