//! Configuration management for slidegate.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SlidegateError};
use crate::http::{KeyKind, OverrideRules, ResponseHeaders};

/// Main configuration for the slidegate server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlidegateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Response header names shared by all layers
    #[serde(default)]
    pub headers: ResponseHeaders,

    /// Deadline for each counter backend call, in milliseconds
    #[serde(default)]
    pub backend_timeout_ms: Option<u64>,

    /// Admit requests when the counter backend fails
    #[serde(default)]
    pub fail_open: bool,

    /// Limiter layers, outermost first
    #[serde(default = "default_layers")]
    pub layers: Vec<LimiterConfig>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            headers: ResponseHeaders::default(),
            backend_timeout_ms: None,
            fail_open: false,
            layers: default_layers(),
        }
    }
}

fn default_layers() -> Vec<LimiterConfig> {
    vec![LimiterConfig::default()]
}

/// One limiter layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Name used in logs
    #[serde(default = "default_limiter_name")]
    pub name: String,

    /// Requests allowed per window
    #[serde(default = "default_requests_limit")]
    pub requests_limit: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Components of the client key, joined in order
    #[serde(default = "default_keys")]
    pub keys: Vec<KeyKind>,

    /// Only limit requests under this path
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Per-request overrides
    #[serde(default)]
    pub rules: OverrideRules,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            name: default_limiter_name(),
            requests_limit: default_requests_limit(),
            window_secs: default_window_secs(),
            keys: default_keys(),
            path_prefix: None,
            rules: OverrideRules::default(),
        }
    }
}

fn default_limiter_name() -> String {
    "global".to_string()
}

fn default_requests_limit() -> u64 {
    1000
}

fn default_window_secs() -> u64 {
    60
}

fn default_keys() -> Vec<KeyKind> {
    vec![KeyKind::Ip]
}

impl SlidegateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| SlidegateError::Config(e.to_string()))
    }

    /// Load configuration from an optional YAML file, then apply
    /// `SLIDEGATE__`-prefixed environment variables on top
    /// (e.g. `SLIDEGATE__SERVER__HTTP_ADDR=0.0.0.0:8080`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix("SLIDEGATE")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| SlidegateError::Config(e.to_string()))
    }
}
