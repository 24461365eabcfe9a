//! The scenario document: metadata, named entities and free-form saved values.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::path::{get_in, set_in, DataPath};
use crate::value::{Map, Value};

/// Scenario attributes that can be read through a path but never written.
pub const RESERVED_ATTRIBUTES: [&str; 4] = ["name", "network", "creation_time", "last_update_time"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Mainnet,
    Devnet,
    Testnet,
    Localnet,
    ChainSimulator,
}

impl Network {
    pub const ALL: [Network; 5] = [
        Network::Mainnet,
        Network::Devnet,
        Network::Testnet,
        Network::Localnet,
        Network::ChainSimulator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Devnet => "devnet",
            Network::Testnet => "testnet",
            Network::Localnet => "localnet",
            Network::ChainSimulator => "chain-simulator",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Network::ALL
            .into_iter()
            .find(|n| n.as_str() == normalized)
            .ok_or_else(|| StoreError::UnknownNetwork(s.to_string()))
    }
}

/// Category of a named entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityCategory {
    Account,
    Contract,
    Token,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 3] = [
        EntityCategory::Account,
        EntityCategory::Contract,
        EntityCategory::Token,
    ];

    /// Name of the reserved section holding this category in the document.
    pub fn section(&self) -> &'static str {
        match self {
            EntityCategory::Account => "accounts",
            EntityCategory::Contract => "contracts",
            EntityCategory::Token => "tokens",
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityCategory::Account => "account",
            EntityCategory::Contract => "contract",
            EntityCategory::Token => "token",
        })
    }
}

/// Persisted state of one (network, scenario) pair.
///
/// Paths are routed in this order:
/// 1. a single segment naming a reserved attribute reads that attribute;
/// 2. a multi-segment path whose root is a registered entity addresses the
///    entity's fields;
/// 3. anything else addresses `saved_values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioData {
    pub name: String,
    pub network: Network,
    /// Unix seconds.
    pub creation_time: i64,
    /// Unix seconds, refreshed on every save.
    pub last_update_time: i64,
    #[serde(default)]
    pub accounts: IndexMap<String, Map>,
    #[serde(default)]
    pub contracts: IndexMap<String, Map>,
    #[serde(default)]
    pub tokens: IndexMap<String, Map>,
    #[serde(default)]
    pub saved_values: Map,
}

impl ScenarioData {
    pub fn new(network: Network, name: impl Into<String>) -> Self {
        let now = Utc::now().timestamp();
        Self {
            name: name.into(),
            network,
            creation_time: now,
            last_update_time: now,
            accounts: IndexMap::new(),
            contracts: IndexMap::new(),
            tokens: IndexMap::new(),
            saved_values: Map::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_update_time = Utc::now().timestamp();
    }

    fn section(&self, category: EntityCategory) -> &IndexMap<String, Map> {
        match category {
            EntityCategory::Account => &self.accounts,
            EntityCategory::Contract => &self.contracts,
            EntityCategory::Token => &self.tokens,
        }
    }

    fn section_mut(&mut self, category: EntityCategory) -> &mut IndexMap<String, Map> {
        match category {
            EntityCategory::Account => &mut self.accounts,
            EntityCategory::Contract => &mut self.contracts,
            EntityCategory::Token => &mut self.tokens,
        }
    }

    /// Category of the entity registered under `name`, if any.
    pub fn entity_category(&self, name: &str) -> Option<EntityCategory> {
        EntityCategory::ALL
            .into_iter()
            .find(|c| self.section(*c).contains_key(name))
    }

    pub fn entity(&self, name: &str) -> Option<(EntityCategory, &Map)> {
        EntityCategory::ALL
            .into_iter()
            .find_map(|c| self.section(c).get(name).map(|fields| (c, fields)))
    }

    /// Register a named entity. Names are unique across all categories.
    pub fn register_entity(
        &mut self,
        category: EntityCategory,
        name: impl Into<String>,
        fields: Map,
    ) -> Result<()> {
        let name = name.into();
        if DataPath::parse(&name).map(|p| !p.is_single()).unwrap_or(true) {
            return Err(StoreError::InvalidName {
                kind: "entity",
                name,
            });
        }
        if RESERVED_ATTRIBUTES.contains(&name.as_str()) {
            return Err(StoreError::ReservedName { name });
        }
        if let Some(existing) = self.entity_category(&name) {
            return Err(StoreError::DuplicateName { name, existing });
        }
        tracing::debug!(scenario = %self.name, entity = %name, %category, "registered entity");
        self.section_mut(category).insert(name, fields);
        Ok(())
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::from(self.name.as_str())),
            "network" => Some(Value::from(self.network.as_str())),
            "creation_time" => Some(Value::from(self.creation_time)),
            "last_update_time" => Some(Value::from(self.last_update_time)),
            _ => None,
        }
    }

    /// Read the value addressed by `path`.
    pub fn get(&self, path: &DataPath) -> Result<Value> {
        if path.is_single() {
            if let Some(value) = self.attribute(path.root()) {
                return Ok(value);
            }
        } else if let (Some((_, fields)), Some(sub)) = (self.entity(path.root()), path.strip_root()) {
            return get_in(fields, &sub)
                .cloned()
                .map_err(|e| relabel(e, path));
        }
        get_in(&self.saved_values, path).cloned()
    }

    /// Write `value` at `path`, creating intermediate containers.
    pub fn set(&mut self, path: &DataPath, value: Value) -> Result<()> {
        if path.is_single() && RESERVED_ATTRIBUTES.contains(&path.root()) {
            return Err(StoreError::ReservedName {
                name: path.root().to_string(),
            });
        }
        if let (Some(category), Some(sub)) = (self.entity_category(path.root()), path.strip_root()) {
            let fields = self
                .section_mut(category)
                .get_mut(path.root())
                .ok_or_else(|| StoreError::PathNotFound {
                    path: path.to_string(),
                    segment: path.root().to_string(),
                })?;
            return set_in(fields, &sub, value).map_err(|e| relabel(e, path));
        }
        set_in(&mut self.saved_values, path, value)
    }

    /// Whether `path` currently resolves to a value.
    pub fn contains(&self, path: &DataPath) -> bool {
        self.get(path).is_ok()
    }
}

/// Report errors raised inside an entity against the full path.
fn relabel(err: StoreError, path: &DataPath) -> StoreError {
    match err {
        StoreError::PathNotFound { segment, .. } => StoreError::PathNotFound {
            path: path.to_string(),
            segment,
        },
        StoreError::TypeMismatch {
            segment,
            expected,
            found,
            ..
        } => StoreError::TypeMismatch {
            path: path.to_string(),
            segment,
            expected,
            found,
        },
        StoreError::IndexOutOfRange { index, len, .. } => StoreError::IndexOutOfRange {
            path: path.to_string(),
            index,
            len,
        },
        other => other,
    }
}
