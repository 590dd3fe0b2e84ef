use std::fmt;

use serde::Serialize;

use crate::bridge::BridgeError;
use crate::config::ConfigError;
use crate::parser::ParseError;
use crate::provider::ProviderError;
use crate::xmp::XmpError;

/// Structured error type for the front ends. Front ends match on the code
/// (HTTP status, MCP `isError`, CLI exit) and show the detail.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "code", content = "detail")]
pub enum AppError {
    NotFound { what: String },
    ValidationError { message: String },
    IoError { message: String },
    ParseError { kind: String, message: String },
    ProviderError { message: String },
    BridgeError { message: String },
    ConfigError { message: String },
    XmpError { message: String },
}

impl AppError {
    /// Machine-readable code, matching the serialized `code` tag.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NotFound",
            AppError::ValidationError { .. } => "ValidationError",
            AppError::IoError { .. } => "IoError",
            AppError::ParseError { .. } => "ParseError",
            AppError::ProviderError { .. } => "ProviderError",
            AppError::BridgeError { .. } => "BridgeError",
            AppError::ConfigError { .. } => "ConfigError",
            AppError::XmpError { .. } => "XmpError",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound { what } => write!(f, "{what} not found"),
            AppError::ValidationError { message } => write!(f, "{message}"),
            AppError::IoError { message } => write!(f, "I/O error: {message}"),
            AppError::ParseError { message, .. } => write!(f, "{message}"),
            AppError::ProviderError { message } => write!(f, "Provider error: {message}"),
            AppError::BridgeError { message } => write!(f, "Lightroom bridge error: {message}"),
            AppError::ConfigError { message } => write!(f, "Config error: {message}"),
            AppError::XmpError { message } => write!(f, "XMP error: {message}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::IoError {
            message: e.to_string(),
        }
    }
}

impl From<ParseError> for AppError {
    fn from(e: ParseError) -> Self {
        AppError::ParseError {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::ImageNotFound(path) => AppError::NotFound {
                what: format!("Image {}", path.display()),
            },
            ProviderError::Parse(parse) => parse.into(),
            other => AppError::ProviderError {
                message: other.to_string(),
            },
        }
    }
}

impl From<BridgeError> for AppError {
    fn from(e: BridgeError) -> Self {
        AppError::BridgeError {
            message: e.to_string(),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::ConfigError {
            message: e.to_string(),
        }
    }
}

impl From<XmpError> for AppError {
    fn from(e: XmpError) -> Self {
        AppError::XmpError {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::ValidationError {
            message: e.to_string(),
        }
    }
}

/// Allow converting AppError to String for tool-call results.
impl From<AppError> for String {
    fn from(e: AppError) -> String {
        e.to_string()
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::ValidationError { message: s }
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::ValidationError {
            message: s.to_string(),
        }
    }
}
