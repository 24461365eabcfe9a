use std::path::PathBuf;

use thiserror::Error;

use crate::scenario::{EntityCategory, Network};

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("malformed path `{path}`: {reason}")]
    MalformedPath { path: String, reason: String },

    #[error("path `{path}` not found: no entry for `{segment}`")]
    PathNotFound { path: String, segment: String },

    #[error("type mismatch at `{segment}` in path `{path}`: expected a {expected}, found {found}")]
    TypeMismatch {
        path: String,
        segment: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("index {index} is out of range for path `{path}`: the list has {len} elements")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("`{name}` is a reserved scenario attribute and cannot be overwritten")]
    ReservedName { name: String },

    #[error("a {existing} named `{name}` already exists in the scenario")]
    DuplicateName {
        name: String,
        existing: EntityCategory,
    },

    #[error("invalid {kind} name `{name}`")]
    InvalidName { kind: &'static str, name: String },

    #[error("unknown network `{0}`")]
    UnknownNetwork(String),

    #[error("scenario `{scenario}` has no saved data on {network}")]
    UnknownScenario { network: Network, scenario: String },

    #[error("checkpoint `{checkpoint}` of scenario `{scenario}` does not exist on {network}")]
    UnknownCheckpoint {
        network: Network,
        scenario: String,
        checkpoint: String,
    },

    #[error("corrupted scenario file {}: {source}", path.display())]
    StorageCorruption {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode scenario `{scenario}`: {source}")]
    Encode {
        scenario: String,
        source: serde_json::Error,
    },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a read failed because the addressed data is absent or shaped
    /// differently than the path expects.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            StoreError::PathNotFound { .. } | StoreError::TypeMismatch { .. }
        )
    }
}
