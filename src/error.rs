//! Error types for the magnet crawler
//!
//! This module defines the error taxonomy shared by the crawl core and
//! the collaborators around it (store, torrent parser, download manager).

use std::fmt;

/// Error type for crawler operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    /// Malformed bencode, truncated buffer, unterminated structure
    DecodeError {
        message: String,
        source: Option<String>,
    },

    /// A decoded value that does not have the shape the protocol requires
    ValidationError {
        message: String,
        field: Option<String>,
    },

    /// Send/receive failures on the UDP endpoint
    TransportError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// Magnet store and record store failures
    StoreError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Torrent metadata parsing errors
    ParseError {
        message: String,
        source: Option<String>,
    },

    /// Download manager RPC errors
    RpcError {
        message: String,
        method: Option<String>,
        source: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },
}

impl CrawlError {
    /// Create a new DecodeError
    pub fn decode_error(message: impl Into<String>) -> Self {
        CrawlError::DecodeError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new DecodeError with source
    pub fn decode_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        CrawlError::DecodeError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new ValidationError
    pub fn validation_error(message: impl Into<String>) -> Self {
        CrawlError::ValidationError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ValidationError with field
    pub fn validation_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        CrawlError::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new TransportError
    pub fn transport_error(message: impl Into<String>) -> Self {
        CrawlError::TransportError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new TransportError with address and source
    pub fn transport_error_full(message: impl Into<String>, address: impl Into<String>, source: impl Into<String>) -> Self {
        CrawlError::TransportError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new StoreError
    pub fn store_error(message: impl Into<String>) -> Self {
        CrawlError::StoreError {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a new StoreError with path and source
    pub fn store_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        CrawlError::StoreError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ParseError
    pub fn parse_error(message: impl Into<String>) -> Self {
        CrawlError::ParseError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new ParseError with source
    pub fn parse_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        CrawlError::ParseError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new RpcError with method and source
    pub fn rpc_error_full(message: impl Into<String>, method: impl Into<String>, source: impl Into<String>) -> Self {
        CrawlError::RpcError {
            message: message.into(),
            method: Some(method.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        CrawlError::ConfigError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        CrawlError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Short label of the error class, used in per-datagram log lines
    pub fn kind(&self) -> &'static str {
        match self {
            CrawlError::DecodeError { .. } => "decode",
            CrawlError::ValidationError { .. } => "validation",
            CrawlError::TransportError { .. } => "transport",
            CrawlError::StoreError { .. } => "store",
            CrawlError::ParseError { .. } => "parse",
            CrawlError::RpcError { .. } => "rpc",
            CrawlError::ConfigError { .. } => "config",
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        let append = |source: &mut Option<String>| {
            *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
        };
        match &mut self {
            CrawlError::DecodeError { source, .. }
            | CrawlError::TransportError { source, .. }
            | CrawlError::StoreError { source, .. }
            | CrawlError::ParseError { source, .. }
            | CrawlError::RpcError { source, .. } => append(source),
            CrawlError::ValidationError { .. } | CrawlError::ConfigError { .. } => {}
        }
        self
    }
}

impl fmt::Display for CrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlError::DecodeError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Decode error: {} (source: {})", message, src)
                } else {
                    write!(f, "Decode error: {}", message)
                }
            }
            CrawlError::ValidationError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Validation error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Validation error: {}", message)
                }
            }
            CrawlError::TransportError { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => write!(f, "Transport error: {} (address: {}, source: {})", message, a, s),
                    (Some(a), None) => write!(f, "Transport error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Transport error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Transport error: {}", message),
                }
            }
            CrawlError::StoreError { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "Store error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Store error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "Store error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Store error: {}", message),
                }
            }
            CrawlError::ParseError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Parse error: {} (source: {})", message, src)
                } else {
                    write!(f, "Parse error: {}", message)
                }
            }
            CrawlError::RpcError { message, method, source } => {
                match (method, source) {
                    (Some(m), Some(s)) => write!(f, "RPC error: {} (method: {}, source: {})", message, m, s),
                    (Some(m), None) => write!(f, "RPC error: {} (method: {})", message, m),
                    (None, Some(s)) => write!(f, "RPC error: {} (source: {})", message, s),
                    (None, None) => write!(f, "RPC error: {}", message),
                }
            }
            CrawlError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for CrawlError {}

impl From<std::io::Error> for CrawlError {
    fn from(err: std::io::Error) -> Self {
        CrawlError::TransportError {
            message: err.to_string(),
            address: None,
            source: Some(err.kind().to_string()),
        }
    }
}

impl From<serde_json::Error> for CrawlError {
    fn from(err: serde_json::Error) -> Self {
        CrawlError::store_error_full("Failed to handle JSON data", "unknown".to_string(), err.to_string())
    }
}

impl From<std::net::AddrParseError> for CrawlError {
    fn from(err: std::net::AddrParseError) -> Self {
        CrawlError::config_error(format!("Failed to parse address: {}", err))
    }
}
