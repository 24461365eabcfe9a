//! On-disk scenario store.
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/<network>/<scenario>.json
//! <data_dir>/<network>/<scenario>___CHECKPOINT___<checkpoint>.json
//! ```
//!
//! Documents are written pretty-printed to a `.json.tmp` sibling and renamed
//! over the target, so an interrupted save never leaves a half-written file.
//! A store assumes it is the only writer of its directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::scenario::{Network, ScenarioData};

/// Separator between a scenario name and a checkpoint name in file names.
pub const CHECKPOINT_SEP: &str = "___CHECKPOINT___";

const EXTENSION: &str = "json";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "LEDGEROPS_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory holding one sub-directory per network.
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./ledgerops_data"),
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Default configuration, with `LEDGEROPS_DATA_DIR` taking precedence.
    pub fn from_env() -> Self {
        match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::new(dir),
            _ => Self::default(),
        }
    }
}

/// Persistent store of scenario documents, keyed by (network, scenario).
#[derive(Debug, Clone)]
pub struct DocumentStore {
    config: StoreConfig,
}

impl DocumentStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn network_dir(&self, network: Network) -> PathBuf {
        self.config.data_dir.join(network.as_str())
    }

    pub fn scenario_path(&self, network: Network, scenario: &str) -> PathBuf {
        self.network_dir(network)
            .join(format!("{scenario}.{EXTENSION}"))
    }

    pub fn checkpoint_path(&self, network: Network, scenario: &str, checkpoint: &str) -> PathBuf {
        self.network_dir(network)
            .join(format!("{scenario}{CHECKPOINT_SEP}{checkpoint}.{EXTENSION}"))
    }

    pub fn exists(&self, network: Network, scenario: &str) -> bool {
        self.scenario_path(network, scenario).is_file()
    }

    /// Load a scenario, or a fresh empty document if nothing was saved yet.
    pub fn load(&self, network: Network, scenario: &str) -> Result<ScenarioData> {
        validate_name("scenario", scenario)?;
        let path = self.scenario_path(network, scenario);
        match read_document(&path)? {
            Some(data) => {
                tracing::debug!(%network, scenario, path = %path.display(), "loaded scenario");
                Ok(data)
            }
            None => {
                tracing::debug!(%network, scenario, "no saved data, starting an empty scenario");
                Ok(ScenarioData::new(network, scenario))
            }
        }
    }

    /// Persist `data`, refreshing its `last_update_time`.
    pub fn save(&self, data: &mut ScenarioData) -> Result<()> {
        validate_name("scenario", &data.name)?;
        data.touch();
        let path = self.scenario_path(data.network, &data.name);
        write_document(&path, data)?;
        tracing::debug!(
            network = %data.network,
            scenario = %data.name,
            path = %path.display(),
            "saved scenario"
        );
        Ok(())
    }

    /// Remove a scenario and all of its checkpoints. Missing data is not an error.
    pub fn delete(&self, network: Network, scenario: &str) -> Result<()> {
        validate_name("scenario", scenario)?;
        for checkpoint in self.list_checkpoints(network, scenario)? {
            remove_if_present(&self.checkpoint_path(network, scenario, &checkpoint))?;
        }
        remove_if_present(&self.scenario_path(network, scenario))?;
        tracing::info!(%network, scenario, "deleted scenario");
        Ok(())
    }

    /// Remove every scenario of `network`.
    pub fn delete_all(&self, network: Network) -> Result<()> {
        let dir = self.network_dir(network);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(%network, "deleted all scenarios");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(dir, err)),
        }
    }

    /// Snapshot the saved state of `scenario` under `checkpoint`.
    pub fn checkpoint_create(&self, network: Network, scenario: &str, checkpoint: &str) -> Result<()> {
        validate_name("scenario", scenario)?;
        validate_name("checkpoint", checkpoint)?;
        let data = read_document(&self.scenario_path(network, scenario))?.ok_or_else(|| {
            StoreError::UnknownScenario {
                network,
                scenario: scenario.to_string(),
            }
        })?;
        write_document(&self.checkpoint_path(network, scenario, checkpoint), &data)?;
        tracing::info!(%network, scenario, checkpoint, "created checkpoint");
        Ok(())
    }

    /// Replace the saved state of `scenario` with `checkpoint` and return it.
    pub fn checkpoint_load(
        &self,
        network: Network,
        scenario: &str,
        checkpoint: &str,
    ) -> Result<ScenarioData> {
        validate_name("scenario", scenario)?;
        validate_name("checkpoint", checkpoint)?;
        let mut data = read_document(&self.checkpoint_path(network, scenario, checkpoint))?
            .ok_or_else(|| StoreError::UnknownCheckpoint {
                network,
                scenario: scenario.to_string(),
                checkpoint: checkpoint.to_string(),
            })?;
        data.name = scenario.to_string();
        data.network = network;
        write_document(&self.scenario_path(network, scenario), &data)?;
        tracing::info!(%network, scenario, checkpoint, "restored checkpoint");
        Ok(data)
    }

    pub fn checkpoint_delete(&self, network: Network, scenario: &str, checkpoint: &str) -> Result<()> {
        validate_name("scenario", scenario)?;
        validate_name("checkpoint", checkpoint)?;
        remove_if_present(&self.checkpoint_path(network, scenario, checkpoint))?;
        tracing::info!(%network, scenario, checkpoint, "deleted checkpoint");
        Ok(())
    }

    /// Copy the saved state of `source` over `destination`. Checkpoints stay behind.
    pub fn clone_scenario(&self, network: Network, source: &str, destination: &str) -> Result<ScenarioData> {
        validate_name("scenario", source)?;
        validate_name("scenario", destination)?;
        let mut data = read_document(&self.scenario_path(network, source))?.ok_or_else(|| {
            StoreError::UnknownScenario {
                network,
                scenario: source.to_string(),
            }
        })?;
        data.name = destination.to_string();
        write_document(&self.scenario_path(network, destination), &data)?;
        tracing::info!(%network, source, destination, "cloned scenario");
        Ok(data)
    }

    /// Names of the saved scenarios of `network`, sorted.
    pub fn list_scenarios(&self, network: Network) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .document_stems(network)?
            .into_iter()
            .filter(|stem| !stem.contains(CHECKPOINT_SEP))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Names of the checkpoints of `scenario`, sorted.
    pub fn list_checkpoints(&self, network: Network, scenario: &str) -> Result<Vec<String>> {
        let prefix = format!("{scenario}{CHECKPOINT_SEP}");
        let mut names: Vec<String> = self
            .document_stems(network)?
            .into_iter()
            .filter_map(|stem| stem.strip_prefix(&prefix).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    fn document_stems(&self, network: Network) -> Result<Vec<String>> {
        let dir = self.network_dir(network);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(dir, err)),
        };
        let mut stems = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
        Ok(stems)
    }
}

/// Scenario and checkpoint names become file names.
fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(CHECKPOINT_SEP)
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

fn read_document(path: &Path) -> Result<Option<ScenarioData>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StoreError::io(path, err)),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| {
            tracing::warn!(path = %path.display(), error = %source, "scenario file does not parse");
            StoreError::StorageCorruption {
                path: path.to_path_buf(),
                source,
            }
        })
}

fn write_document(path: &Path, data: &ScenarioData) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(data).map_err(|source| StoreError::Encode {
        scenario: data.name.clone(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StoreError::io(path, err)),
    }
}
