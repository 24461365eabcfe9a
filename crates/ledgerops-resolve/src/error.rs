use std::path::PathBuf;

use ledgerops_formula::FormulaError;
use ledgerops_store::{Network, StoreError};
use thiserror::Error;

use crate::coerce::ValueType;

pub type Result<T, E = ResolveError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unresolved reference `{raw}`: {reason}")]
    UnresolvedReference { raw: String, reason: String },

    #[error("cannot convert the value of `{raw}` to {target}: {reason}")]
    TypeCoercion {
        raw: String,
        target: ValueType,
        reason: String,
    },

    #[error("malformed expression `{raw}`: {reason}")]
    MalformedExpression { raw: String, reason: String },

    #[error("unknown identifier `{name}` in `{raw}`")]
    UnknownIdentifier { raw: String, name: String },

    #[error("formula `{raw}` failed: {source}")]
    FormulaFailed {
        raw: String,
        #[source]
        source: FormulaError,
    },

    #[error("resolution of `{raw}` exceeded the maximum depth of {max_depth}; the references probably form a cycle")]
    ResolutionDepthExceeded { raw: String, max_depth: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("config file {} does not exist", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("cannot read config file {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cannot read scene file {}: {source}", path.display())]
    SceneIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse scene: {0}")]
    SceneParse(#[source] serde_yaml::Error),

    #[error("invalid scenario pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid {step_type} step: {reason}")]
    InvalidStep { step_type: String, reason: String },

    #[error("scene does not allow network {network} (allowed: {allowed:?})")]
    ForbiddenNetwork {
        network: Network,
        allowed: Vec<String>,
    },

    #[error("scene does not allow scenario `{scenario}` (allowed patterns: {allowed:?})")]
    ForbiddenScenario {
        scenario: String,
        allowed: Vec<String>,
    },

    #[error("{step_type} step failed: {source:#}")]
    StepFailed {
        step_type: String,
        #[source]
        source: anyhow::Error,
    },
}
