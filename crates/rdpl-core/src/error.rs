use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::ValueType;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to service manager: {0}")]
    Connection(String),

    #[error("service {0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("access denied: {0}")]
    Permission(String),

    #[error("type mismatch for {location}: declared {declared}, value is {actual}")]
    TypeMismatch {
        location: String,
        declared: ValueType,
        actual: ValueType,
    },

    #[error("service {service} did not stop within {deadline:?}")]
    Timeout { service: String, deadline: Duration },

    /// Sub-failures collected by a multi-entry operation.
    #[error("encountered {} errors during {operation}", failures.len())]
    Aggregate {
        operation: &'static str,
        failures: Vec<Error>,
    },

    #[error("malformed backup file {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("failed to create service: {0}")]
    Creation(String),

    #[error("service manager call failed: {0}")]
    ServiceControl(String),

    #[error("registry call failed: {0}")]
    Registry(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0} requires a Windows host")]
    Unsupported(&'static str),
}

impl Error {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Folds collected failures into `Ok` when there are none.
    pub fn aggregate(operation: &'static str, failures: Vec<Error>) -> Result<()> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self::Aggregate {
                operation,
                failures,
            })
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Number of leaf failures, counting each aggregate member once.
    pub fn failure_count(&self) -> usize {
        match self {
            Self::Aggregate { failures, .. } => failures.len(),
            _ => 1,
        }
    }
}
