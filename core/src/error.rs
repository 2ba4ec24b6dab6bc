use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::ids::{EdgeId, HostId};

/// One field-level problem found while validating raw input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted location, e.g. `hosts.<id>.tailscale_ip` or `edges[2].to.port`.
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError { path: path.into(), message: message.into() }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Load-time failures. Any of these aborts construction of the model.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{} invalid field(s): {}", .0.len(), join_errors(.0))]
    Invalid(Vec<FieldError>),

    #[error("duplicate host id: {0}")]
    DuplicateHostId(HostId),
}

impl SchemaError {
    /// Field-level errors, if this is a validation failure.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            SchemaError::Invalid(errs) => errs,
            _ => &[],
        }
    }
}

fn join_errors(errs: &[FieldError]) -> String {
    errs.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

/// Query-time failures from the resolver's single-edge operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("edge not found: {0}")]
    EdgeNotFound(String),

    #[error("target host not found for edge {edge}: {host}")]
    TargetHostNotFound { edge: EdgeId, host: HostId },

    #[error("no IP address available for edge {edge} target: {host}")]
    NoAddressAvailable { edge: EdgeId, host: String },
}
