//! Configuration data structures for Warden.
//!
//! These types map directly to YAML (also TOML / JSON) configuration files. They are
//! intentionally serde‑friendly and include defaults so that minimal configs only need
//! a listen address and an upstream URL.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 10 MiB, applied to both directions unless overridden
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_upstream_timeout() -> String {
    "30s".to_string()
}

/// The single backend every inspected request is forwarded to
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// Upstream base URL, e.g. `http://127.0.0.1:8000`
    pub url: String,
    /// Per-request deadline for the upstream exchange, parsed by humantime ("30s", "2m")
    #[serde(default = "default_upstream_timeout")]
    pub timeout: String,
}

impl UpstreamConfig {
    /// Parsed timeout; falls back to 30 seconds when the value does not parse
    pub fn timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.timeout).unwrap_or(Duration::from_secs(30))
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000".to_string(),
            timeout: default_upstream_timeout(),
        }
    }
}

/// Buffering bounds for bodies materialized for inspection
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct BodyLimitConfig {
    pub max_request_body_bytes: usize,
    pub max_response_body_bytes: usize,
}

impl Default for BodyLimitConfig {
    fn default() -> Self {
        Self {
            max_request_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_response_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Rule configuration handed to the inspection engine at startup
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct InspectionConfig {
    /// Load the bundled signature set before any directive file
    pub builtin_signatures: bool,
    /// Ordered list of rule files; rules are evaluated in load order
    pub directives: Vec<String>,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self {
            builtin_signatures: true,
            directives: Vec::new(),
        }
    }
}

/// How upstream response headers that repeat a name are relayed to the client
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseHeaderPolicy {
    /// Only the first value of each name is copied
    #[default]
    FirstValue,
    /// Every value is copied (keeps repeated `Set-Cookie`)
    AllValues,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MetricsConfig {
    /// OTLP gRPC collector endpoint; metrics stay in-process when unset
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Origin clients use to reach the proxy; header values embedding it are
    /// rewritten to the upstream origin. Defaults to `http://{listen_addr}`.
    #[serde(default)]
    pub public_origin: Option<String>,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub limits: BodyLimitConfig,
    #[serde(default)]
    pub inspection: InspectionConfig,
    #[serde(default)]
    pub response_header_policy: ResponseHeaderPolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Advertised origin of the proxy itself
    pub fn effective_public_origin(&self) -> String {
        self.public_origin
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.listen_addr))
    }

    /// True when the derived public origin names a wildcard bind address.
    ///
    /// Clients never send `http://0.0.0.0:...` or `http://[::]:...`, so origin
    /// rewriting has nothing to match until `public_origin` is set.
    pub fn public_origin_is_wildcard(&self) -> bool {
        self.public_origin.is_none()
            && self
                .listen_addr
                .parse::<std::net::SocketAddr>()
                .is_ok_and(|addr| addr.ip().is_unspecified())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            public_origin: None,
            upstream: UpstreamConfig::default(),
            limits: BodyLimitConfig::default(),
            inspection: InspectionConfig::default(),
            response_header_policy: ResponseHeaderPolicy::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Builder for ServerConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ServerConfigBuilder {
    listen_addr: Option<String>,
    public_origin: Option<String>,
    upstream: Option<UpstreamConfig>,
    limits: Option<BodyLimitConfig>,
    inspection: Option<InspectionConfig>,
    response_header_policy: ResponseHeaderPolicy,
    logging: Option<LoggingConfig>,
}

impl ServerConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Set the origin clients use to reach the proxy
    pub fn public_origin(mut self, origin: impl Into<String>) -> Self {
        self.public_origin = Some(origin.into());
        self
    }

    /// Set the upstream URL, keeping the default timeout
    pub fn upstream(mut self, url: impl Into<String>) -> Self {
        let timeout = self
            .upstream
            .take()
            .map(|u| u.timeout)
            .unwrap_or_else(default_upstream_timeout);
        self.upstream = Some(UpstreamConfig {
            url: url.into(),
            timeout,
        });
        self
    }

    /// Set the upstream timeout (humantime format)
    pub fn upstream_timeout(mut self, timeout: impl Into<String>) -> Self {
        let mut upstream = self.upstream.take().unwrap_or_default();
        upstream.timeout = timeout.into();
        self.upstream = Some(upstream);
        self
    }

    /// Set both body buffering bounds
    pub fn body_limits(mut self, max_request: usize, max_response: usize) -> Self {
        self.limits = Some(BodyLimitConfig {
            max_request_body_bytes: max_request,
            max_response_body_bytes: max_response,
        });
        self
    }

    pub fn inspection(mut self, config: InspectionConfig) -> Self {
        self.inspection = Some(config);
        self
    }

    /// Append a directive source to the inspection configuration
    pub fn directive(mut self, path: impl Into<String>) -> Self {
        self.inspection
            .get_or_insert_with(InspectionConfig::default)
            .directives
            .push(path.into());
        self
    }

    pub fn response_header_policy(mut self, policy: ResponseHeaderPolicy) -> Self {
        self.response_header_policy = policy;
        self
    }

    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> Result<ServerConfig, String> {
        let upstream = self
            .upstream
            .ok_or_else(|| "upstream is required".to_string())?;

        Ok(ServerConfig {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            public_origin: self.public_origin,
            upstream,
            limits: self.limits.unwrap_or_default(),
            inspection: self.inspection.unwrap_or_default(),
            response_header_policy: self.response_header_policy,
            logging: self.logging.unwrap_or_default(),
            metrics: MetricsConfig::default(),
        })
    }
}
