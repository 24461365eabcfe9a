//! Static configuration served to `&KEY` smart values.
//!
//! A config file is YAML with one section per network plus an optional
//! `default` section shared by all networks:
//!
//! ```yaml
//! default:
//!   tx_timeout: 300
//! devnet:
//!   proxy: https://devnet-gateway.multiversx.com
//!   chain_id: D
//! ```
//!
//! Keys are case-insensitive and stored upper case. A loaded file is layered
//! over the built-in defaults, so a user file only needs the keys it changes.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use ledgerops_store::{Network, Value};

use crate::env::Environment;
use crate::error::{ResolveError, Result};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "LEDGEROPS_CONFIG";

/// Config file picked up from the working directory.
pub const LOCAL_CONFIG_FILE: &str = "ledgerops_config.yaml";

const DEFAULT_SECTION: &str = "default";

const BUILTIN_CONFIG: &str = include_str!("../resources/default_config.yaml");

type Sections = IndexMap<String, IndexMap<String, Value>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    network: Network,
    values: IndexMap<String, Value>,
    source: Option<PathBuf>,
}

impl Config {
    /// Built-in values for `network`.
    pub fn builtin(network: Network) -> Self {
        let mut config = Self {
            network,
            values: IndexMap::new(),
            source: None,
        };
        match serde_yaml::from_str::<Sections>(BUILTIN_CONFIG) {
            Ok(sections) => config.layer(&sections),
            Err(err) => tracing::warn!(error = %err, "built-in config does not parse"),
        }
        config
    }

    /// Built-in values overridden by the YAML document `text`.
    pub fn from_yaml_str(network: Network, text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        let sections: Sections = if text.trim().is_empty() {
            Sections::new()
        } else {
            serde_yaml::from_str(text)?
        };
        let mut config = Self::builtin(network);
        config.layer(&sections);
        Ok(config)
    }

    pub fn from_file(network: Network, path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| ResolveError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config =
            Self::from_yaml_str(network, &text).map_err(|source| ResolveError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.source = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), %network, "loaded config file");
        Ok(config)
    }

    /// Locate and load the configuration.
    ///
    /// Order: `explicit`, then the file named by `LEDGEROPS_CONFIG`, then
    /// `./ledgerops_config.yaml`, then the built-in values. A path given
    /// explicitly or through the environment must exist.
    pub fn discover(network: Network, explicit: Option<&Path>, env: &dyn Environment) -> Result<Self> {
        let required = explicit
            .map(Path::to_path_buf)
            .or_else(|| env.var(CONFIG_ENV).filter(|p| !p.is_empty()).map(PathBuf::from));
        if let Some(path) = required {
            if !path.is_file() {
                return Err(ResolveError::ConfigNotFound { path });
            }
            return Self::from_file(network, &path);
        }
        let local = Path::new(".").join(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Self::from_file(network, &local);
        }
        Ok(Self::builtin(network))
    }

    fn layer(&mut self, sections: &Sections) {
        let mut shared = None;
        let mut own = None;
        for (name, section) in sections {
            if name.eq_ignore_ascii_case(DEFAULT_SECTION) {
                shared = Some(section);
                continue;
            }
            match name.parse::<Network>() {
                Ok(network) if network == self.network => own = Some(section),
                Ok(_) => {}
                Err(_) => tracing::warn!(section = %name, "ignoring config section for an unknown network"),
            }
        }
        for section in [shared, own].into_iter().flatten() {
            for (key, value) in section {
                self.values.insert(key.to_uppercase(), value.clone());
            }
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// File the values were loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(&key.to_uppercase())
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_uppercase(), value.into());
    }

    /// Upper-case option names, in file order.
    pub fn options(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}
