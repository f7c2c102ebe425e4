/// Error taxonomy shared by the extractor, the graph store, the chunk index
/// and the navigation facade.
use std::path::PathBuf;

use thiserror::Error;

/// Command that rebuilds the chunk index; quoted in "index missing" errors.
pub const INDEX_BUILD_COMMAND: &str = "codecompass index <repo> --output <index path>";

#[derive(Error, Debug)]
pub enum NavError {
    /// A single source file could not be parsed. Absorbed by batch callers.
    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("graph datastore unavailable at {endpoint}: {reason}\n{remediation}")]
    DatastoreUnavailable {
        endpoint: String,
        reason: String,
        remediation: String,
    },

    #[error("graph query failed: {0}")]
    Query(String),

    /// The backend lacks a primitive required by the requested load strategy.
    #[error("graph backend does not support {0}")]
    Unsupported(String),

    #[error("chunk index not found at {}. Build it with: {build_command}", path.display())]
    IndexNotFound {
        path: PathBuf,
        build_command: String,
    },

    #[error(
        "chunk index at {} is unreadable ({reason}). Rebuild it with: {build_command}",
        path.display()
    )]
    IndexMalformed {
        path: PathBuf,
        reason: String,
        build_command: String,
    },

    #[error("invalid edge list {}: {reason}", path.display())]
    EdgeList { path: PathBuf, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl NavError {
    pub fn index_not_found(path: impl Into<PathBuf>) -> Self {
        Self::IndexNotFound {
            path: path.into(),
            build_command: INDEX_BUILD_COMMAND.to_string(),
        }
    }

    pub fn index_malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::IndexMalformed {
            path: path.into(),
            reason: reason.into(),
            build_command: INDEX_BUILD_COMMAND.to_string(),
        }
    }

    /// Boundary failures (datastore, artifacts) that callers must surface as-is.
    #[must_use]
    pub fn is_boundary(&self) -> bool {
        matches!(
            self,
            Self::DatastoreUnavailable { .. }
                | Self::IndexNotFound { .. }
                | Self::IndexMalformed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, NavError>;
