//! LedgerOps scenario storage.
//!
//! A scenario is the persisted state of one automation run on one network:
//! metadata, named entities (accounts, contracts, tokens) and a free-form
//! tree of saved values. This crate provides:
//!
//! - [`Value`]: the document tree (scalars, lists, ordered maps);
//! - [`DataPath`]: the `a.b[0].c` path grammar with get/set semantics;
//! - [`ScenarioData`]: path routing across attributes, entities and saved values;
//! - [`DocumentStore`]: JSON persistence with checkpoints and clones.
//!
//! ```text
//! scene step ──► smart value ──► DataPath ──► ScenarioData ──► DocumentStore
//!                                  get/set        routing         <network>/<scenario>.json
//! ```

pub mod error;
pub mod path;
pub mod scenario;
pub mod store;
pub mod value;

#[cfg(test)]
mod tests;

pub use error::{Result, StoreError};
pub use path::{get_path, set_path, DataPath, PathSegment};
pub use scenario::{EntityCategory, Network, ScenarioData, RESERVED_ATTRIBUTES};
pub use store::{DocumentStore, StoreConfig, CHECKPOINT_SEP};
pub use value::{Map, Value};
