//! Relay configuration
//!
//! Configuration is loaded once at process start and is read-only
//! afterwards. Two layouts are accepted:
//!
//! - a single YAML (or JSON) file holding every section of [`RelayConfig`]
//! - the legacy pair `global.json` (`{"voto": {"api": "<base url>"}}`) and
//!   `keys.json` (`{"default": "<api key>"}`) in one directory
//!
//! Command-line flags and environment variables are applied on top through
//! [`ConfigOverrides`]. Every loader validates before returning, so an
//! invalid configuration never reaches the URL builder.

use crate::error::{Error, Result, ResultExt};
use crate::types::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use url::Url;

/// Request type served by the default route
pub const DEFAULT_REQUEST_TYPE: &str = "get-campaigns";

/// Placeholder printed instead of the API key
const REDACTED: &str = "********";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Upstream API location and credential
    #[serde(default)]
    pub api: ApiConfig,

    /// Listener settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Pagination settings
    #[serde(default)]
    pub stream: StreamSettings,

    /// Upstream HTTP client settings
    #[serde(default)]
    pub http: HttpSettings,

    /// Channel relay settings
    #[serde(default)]
    pub relay: RelaySettings,

    /// Default log level (overridden by `RUST_LOG`)
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Upstream API location and static credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API, e.g. `https://go.votomobile.org/api/v1/`
    #[serde(default)]
    pub base_url: String,

    /// Static API key sent as the `api_key` query parameter
    #[serde(default)]
    pub api_key: String,
}

impl ApiConfig {
    /// Create an API config
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Validate the base URL and the credential
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::missing_field("api.base_url"));
        }
        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::invalid_value("api.base_url", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid_value(
                "api.base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(Error::missing_field("api.api_key"));
        }
        Ok(())
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8780
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// Resolve the socket address to bind
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::invalid_value("server.host", format!("{e}")))
    }
}

/// Pagination settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Records requested per page (`limit`)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Upper bound on pages fetched by one stream
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_chunk_size() -> u32 {
    20
}

fn default_max_pages() -> u32 {
    1000
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_pages: default_max_pages(),
        }
    }
}

/// Upstream HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent override
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Optional throttle on upstream requests
    #[serde(default)]
    pub requests_per_second: Option<u32>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: None,
            requests_per_second: None,
        }
    }
}

/// Channel relay settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Send `stream-end` / `stream-error` frames when a session finishes
    #[serde(default)]
    pub announce_completion: bool,

    /// Request types the relay answers
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteDefinition>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            announce_completion: false,
            routes: default_routes(),
        }
    }
}

/// Maps an inbound request type onto an upstream endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefinition {
    /// Inbound message type, e.g. `get-campaigns`
    pub request: String,

    /// Upstream endpoint path, e.g. `trees`
    pub endpoint: String,

    /// Key of the record array under the response `data` object
    pub record_key: String,

    /// Outbound message type; defaults to `record_key`
    #[serde(default)]
    pub response: Option<String>,
}

impl RouteDefinition {
    /// Outbound message type for this route
    pub fn response_type(&self) -> &str {
        self.response.as_deref().unwrap_or(&self.record_key)
    }
}

fn default_routes() -> Vec<RouteDefinition> {
    vec![RouteDefinition {
        request: DEFAULT_REQUEST_TYPE.to_string(),
        endpoint: "trees".to_string(),
        record_key: "trees".to_string(),
        response: None,
    }]
}

// ============================================================================
// Overrides
// ============================================================================

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Replaces `api.base_url`
    pub base_url: Option<String>,
    /// Replaces `api.api_key`
    pub api_key: Option<String>,
    /// Replaces `server.port`
    pub port: Option<u16>,
    /// Replaces `stream.chunk_size`
    pub chunk_size: Option<u32>,
    /// Replaces `relay.announce_completion`
    pub announce_completion: Option<bool>,
}

/// Where configuration is read from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in defaults only; API location and key must come from overrides
    #[default]
    Defaults,
    /// A YAML or JSON file
    File(PathBuf),
    /// A directory with legacy `global.json` and `keys.json`
    LegacyDir(PathBuf),
}

// ============================================================================
// Loading
// ============================================================================

#[derive(Deserialize)]
struct LegacyGlobal {
    voto: LegacyVoto,
}

#[derive(Deserialize)]
struct LegacyVoto {
    api: String,
}

#[derive(Deserialize)]
struct LegacyKeys {
    default: String,
}

impl RelayConfig {
    /// Build a config with default sections around an API location
    pub fn from_api(api: ApiConfig) -> Self {
        Self {
            api,
            server: ServerSettings::default(),
            stream: StreamSettings::default(),
            http: HttpSettings::default(),
            relay: RelaySettings::default(),
            log_level: LogLevel::default(),
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config = Self::parse_yaml(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config = Self::parse_json(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; `.json` files are read as JSON, anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Load the legacy `global.json` + `keys.json` pair from a directory
    pub fn from_legacy_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let config = Self::read_legacy_dir(dir.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Read `source`, apply `overrides`, then validate once
    ///
    /// Overrides land before validation, so a file without a key is fine
    /// when `VOTO_API_KEY` supplies one.
    pub fn load(source: &ConfigSource, overrides: ConfigOverrides) -> Result<Self> {
        Self::read(source)?.with_overrides(overrides)
    }

    /// Read `source` without validating it
    pub fn read(source: &ConfigSource) -> Result<Self> {
        match source {
            ConfigSource::Defaults => Ok(Self::from_api(ApiConfig::default())),
            ConfigSource::File(path) => Self::read_file(path),
            ConfigSource::LegacyDir(dir) => Self::read_legacy_dir(dir),
        }
    }

    fn parse_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse config YAML: {e}")))
    }

    fn parse_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Failed to parse config JSON: {e}")))
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            Self::parse_json(&content)
        } else {
            Self::parse_yaml(&content)
        }
    }

    fn read_legacy_dir(dir: &Path) -> Result<Self> {
        let global_path = dir.join("global.json");
        let global = std::fs::read_to_string(&global_path)
            .with_context(|| format!("Failed to read '{}'", global_path.display()))?;
        let global: LegacyGlobal = serde_json::from_str(&global)
            .with_context(|| format!("Invalid '{}'", global_path.display()))?;

        let keys_path = dir.join("keys.json");
        let keys = std::fs::read_to_string(&keys_path)
            .with_context(|| format!("Failed to read '{}'", keys_path.display()))?;
        let keys: LegacyKeys = serde_json::from_str(&keys)
            .with_context(|| format!("Invalid '{}'", keys_path.display()))?;

        Ok(Self::from_api(ApiConfig::new(global.voto.api, keys.default)))
    }

    /// Apply command-line / environment overrides and re-validate
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Result<Self> {
        if let Some(base_url) = overrides.base_url {
            self.api.base_url = base_url;
        }
        if let Some(api_key) = overrides.api_key {
            self.api.api_key = api_key;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(chunk_size) = overrides.chunk_size {
            self.stream.chunk_size = chunk_size;
        }
        if let Some(announce) = overrides.announce_completion {
            self.relay.announce_completion = announce;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;

        if self.stream.chunk_size == 0 {
            return Err(Error::invalid_value("stream.chunk_size", "must be greater than 0"));
        }
        if self.stream.max_pages == 0 {
            return Err(Error::invalid_value("stream.max_pages", "must be greater than 0"));
        }
        if self.http.timeout_secs == 0 {
            return Err(Error::invalid_value("http.timeout_secs", "must be greater than 0"));
        }
        if self.http.requests_per_second == Some(0) {
            return Err(Error::invalid_value(
                "http.requests_per_second",
                "must be greater than 0 when set",
            ));
        }

        let mut seen = HashSet::new();
        for route in &self.relay.routes {
            if route.request.is_empty() {
                return Err(Error::invalid_value("relay.routes", "request type cannot be empty"));
            }
            if route.endpoint.trim_matches('/').is_empty() {
                return Err(Error::invalid_value(
                    "relay.routes",
                    format!("route '{}' has an empty endpoint", route.request),
                ));
            }
            if route.record_key.is_empty() || route.response_type().is_empty() {
                return Err(Error::invalid_value(
                    "relay.routes",
                    format!("route '{}' needs a record key and response type", route.request),
                ));
            }
            if !seen.insert(route.request.as_str()) {
                return Err(Error::invalid_value(
                    "relay.routes",
                    format!("duplicate request type '{}'", route.request),
                ));
            }
        }

        Ok(())
    }

    /// Copy of this config with the API key masked, for display
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.api.api_key = REDACTED.to_string();
        copy
    }
}
