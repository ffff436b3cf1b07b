use std::{fmt, io, path::PathBuf, sync::mpsc::SendError};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

use crate::event::Event;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum RideError {
    #[error("Parse error in {}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("Data error: {0}")]
    Data(String),
    #[error("File {} was modified on disk since it was last read", path.display())]
    ConcurrentModification { path: PathBuf },
    #[error("Cannot resolve '{0}'")]
    Resolve(String),
    #[error("'{name}' is ambiguous, candidates: {}", candidates.join(", "))]
    AmbiguousRef {
        name: String,
        candidates: Vec<String>,
    },
    #[error("Child process '{command}' failed ({status}): {stderr}")]
    ChildProcess {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("{what} did not finish within {seconds}s and was killed")]
    Timeout { what: String, seconds: f64 },
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid Command: {0}")]
    Command(String),
}

impl RideError {
    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        RideError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Whether the error should reach the user. `Internal` errors only go to the debug log.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, RideError::Internal(_))
    }
}

impl From<io::Error> for RideError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => RideError::NotFound(format!("{x}")),
            _ => RideError::Io(format!("IOError: {} ({x})", x.kind())),
        }
    }
}

impl From<toml::de::Error> for RideError {
    fn from(src: toml::de::Error) -> RideError {
        RideError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml_edit::TomlError> for RideError {
    fn from(src: toml_edit::TomlError) -> RideError {
        RideError::Serialization(format!("Toml parse error: {src}"))
    }
}

impl From<JsonError> for RideError {
    fn from(src: JsonError) -> RideError {
        RideError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<serde_yaml::Error> for RideError {
    fn from(src: serde_yaml::Error) -> RideError {
        RideError::Serialization(format!("YAML deserialization error: {src}"))
    }
}

impl From<fmt::Error> for RideError {
    fn from(x: fmt::Error) -> Self {
        RideError::Internal(format!("{x}"))
    }
}

impl From<RegexError> for RideError {
    fn from(x: RegexError) -> Self {
        RideError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<glob::PatternError> for RideError {
    fn from(x: glob::PatternError) -> Self {
        RideError::Serialization(format!("Invalid path pattern: {x}"))
    }
}

impl From<walkdir::Error> for RideError {
    fn from(x: walkdir::Error) -> Self {
        match x.into_io_error() {
            Some(io_error) => io_error.into(),
            None => RideError::Io("directory walk failed on a symlink loop".to_string()),
        }
    }
}

impl From<SendError<Event>> for RideError {
    fn from(x: SendError<Event>) -> Self {
        RideError::Io(format!(
            "Channel update send Error, could not transmit event {}",
            x.0.topic
        ))
    }
}
