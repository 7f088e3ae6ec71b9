//! Error types and handling for the Energiinfo client
//!
//! Every failure the metering API can produce is mapped onto one of the
//! variants below, so callers of the `try_*` operations can tell a timeout
//! from a malformed body or a dropped connection.

use thiserror::Error;

/// Result type alias for Energiinfo operations
pub type Result<T> = std::result::Result<T, EnergiinfoError>;

/// Main error type for the Energiinfo client
#[derive(Debug, Error)]
pub enum EnergiinfoError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Configuration (YAML) serialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Request exceeded the bounded wait
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Response body was not JSON or lacked the expected fields
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Network/connection failure, including DNS resolution
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// API answered with a non-success HTTP status
    #[error("API error: {message}")]
    Api { message: String },

    /// No usable access token
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Anything else
    #[error("Unexpected error: {message}")]
    Unexpected { message: String },
}

impl EnergiinfoError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new unexpected error
    pub fn unexpected<S: Into<String>>(message: S) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Short machine-friendly label of the failure kind
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Validation { .. } => "validation",
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
            Self::Timeout { .. } => "timeout",
            Self::Parse { .. } => "parse",
            Self::Transport { .. } => "transport",
            Self::Api { .. } => "api",
            Self::Auth { .. } => "auth",
            Self::Unexpected { .. } => "unexpected",
        }
    }
}

impl From<std::io::Error> for EnergiinfoError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for EnergiinfoError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EnergiinfoError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse(err.to_string())
    }
}

impl From<reqwest::Error> for EnergiinfoError {
    fn from(err: reqwest::Error) -> Self {
        // The URL carries the query string, credentials included
        let err = err.without_url();
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else if err.is_decode() {
            Self::parse(err.to_string())
        } else if err.is_connect() || err.is_request() || err.is_body() {
            Self::transport(err.to_string())
        } else {
            Self::unexpected(err.to_string())
        }
    }
}
