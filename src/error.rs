//! Error types for voto-relay
//!
//! This module defines the error hierarchy for the whole crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for voto-relay
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    /// Configuration is unusable as a whole
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong
        message: String,
    },

    /// A required setting is absent
    #[error("Missing required config field: {field}")]
    MissingConfigField {
        /// Dotted path of the setting
        field: String,
    },

    /// A setting is present but out of range or unparseable
    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue {
        /// Dotted path of the setting
        field: String,
        /// Why the value was rejected
        message: String,
    },

    /// Config file is not valid YAML
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// A config file, upstream body or channel frame is not valid JSON
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Upstream Errors
    // ============================================================================
    /// Request never produced a response; the URL is stripped
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// A URL could not be built or parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Upstream body does not have the expected shape
    #[error("Malformed response: {message}")]
    MalformedResponse {
        /// What was missing or invalid
        message: String,
    },

    // ============================================================================
    // Pagination Errors
    // ============================================================================
    /// A continuation cursor appeared twice in one chain
    #[error("Cursor {cursor} repeated; the page chain is not advancing")]
    CursorNotAdvancing {
        /// The repeated cursor value
        cursor: i64,
    },

    /// More pages than `stream.max_pages` were requested
    #[error("Page limit of {max_pages} reached before the cursor chain ended")]
    PageLimitExceeded {
        /// Configured cap
        max_pages: u32,
    },

    // ============================================================================
    // Channel Errors
    // ============================================================================
    /// Channel frame is well-formed JSON but not a valid message
    #[error("Protocol error: {message}")]
    Protocol {
        /// What was wrong with the frame
        message: String,
    },

    /// The consumer's connection went away
    #[error("Channel closed")]
    ChannelClosed,

    // ============================================================================
    // I/O Errors
    // ============================================================================
    /// Filesystem or socket failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    /// Free-form error
    #[error("{0}")]
    Other(String),

    /// Wrapped `anyhow` error
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration is missing or invalid; fatal at startup
    Config,
    /// The upstream could not be reached or answered with a failure status
    Transport,
    /// The upstream answered with a body we could not interpret
    MalformedResponse,
    /// The cursor chain misbehaved
    Pagination,
    /// A channel frame was malformed or the channel went away
    Protocol,
    /// Everything else
    Internal,
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a malformed response error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. }
            | Error::MissingConfigField { .. }
            | Error::InvalidConfigValue { .. }
            | Error::YamlParse(_)
            | Error::JsonParse(_) => ErrorKind::Config,
            Error::Transport(_) | Error::HttpStatus { .. } => ErrorKind::Transport,
            Error::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Error::CursorNotAdvancing { .. } | Error::PageLimitExceeded { .. } => {
                ErrorKind::Pagination
            }
            Error::Protocol { .. } | Error::ChannelClosed => ErrorKind::Protocol,
            Error::InvalidUrl(_)
            | Error::Io(_)
            | Error::Other(_)
            | Error::Anyhow(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error came from talking to the upstream
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Check if this error should abort process startup
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Config
    }
}

/// Result type alias for voto-relay
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::config(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::config(format!("{}: {}", f(), inner))
        })
    }
}
