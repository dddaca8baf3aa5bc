use std::{fmt, io, path::StripPrefixError};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

/// Blocking failures. Recoverable anomalies are reported through
/// [`crate::study::Warning`] and [`crate::registry::Flag`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum RegistryError {
    #[error("Invalid Command: {0}")]
    Command(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Malformed document at '{key}': {message}")]
    MalformedDocument { key: String, message: String },
    #[error("Name '{name}' is already assigned to another object")]
    NameCollision { name: String },
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Operation was cancelled before completion")]
    OperationCancelled,
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl RegistryError {
    pub fn malformed(key: impl Into<String>, message: impl Into<String>) -> Self {
        RegistryError::MalformedDocument {
            key: key.into(),
            message: message.into(),
        }
    }

    /// True for failures caused by the input document rather than the environment.
    pub fn is_document_error(&self) -> bool {
        matches!(
            self,
            RegistryError::MalformedDocument { .. } | RegistryError::Serialization(_)
        )
    }
}

impl From<StripPrefixError> for RegistryError {
    fn from(src: StripPrefixError) -> RegistryError {
        RegistryError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for RegistryError {
    fn from(src: toml::de::Error) -> RegistryError {
        RegistryError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for RegistryError {
    fn from(src: toml::ser::Error) -> RegistryError {
        RegistryError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for RegistryError {
    fn from(src: JsonError) -> RegistryError {
        RegistryError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<chrono::ParseError> for RegistryError {
    fn from(src: chrono::ParseError) -> RegistryError {
        RegistryError::Serialization(format!("Timestamp parse failed: {src}"))
    }
}

impl From<io::Error> for RegistryError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => RegistryError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => RegistryError::PermissionDenied,
            _ => RegistryError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<walkdir::Error> for RegistryError {
    fn from(x: walkdir::Error) -> Self {
        let path = x.path().map(|p| p.display().to_string()).unwrap_or_default();
        match x.into_io_error() {
            Some(io_error) => match io_error.kind() {
                io::ErrorKind::NotFound => RegistryError::NotFound(format!("{path}: {io_error}")),
                io::ErrorKind::PermissionDenied => RegistryError::PermissionDenied,
                kind => RegistryError::Io(format!("IOError while walking {path}: {kind}")),
            },
            None => RegistryError::Io(format!("Filesystem loop detected at {path}")),
        }
    }
}

impl From<fmt::Error> for RegistryError {
    fn from(x: fmt::Error) -> Self {
        RegistryError::Serialization(format!("{x}"))
    }
}

impl From<RegexError> for RegistryError {
    fn from(x: RegexError) -> Self {
        RegistryError::Serialization(format!("Regex parse failed: {x}"))
    }
}
