//! Scene files and the step runner.
//!
//! A scene is a YAML document listing steps:
//!
//! ```yaml
//! allowed_networks: [devnet, localnet]
//! allowed_scenario: ["integration_.*"]
//! steps:
//!   - type: SetVars
//!     variables:
//!       amount: "=10**18"
//!   - type: Loop
//!     var_name: i
//!     var_start: 0
//!     var_end: 3
//!     steps:
//!       - type: SetVars
//!         variables:
//!           "ids[%{i}]": "=%{i} * 2"
//!   - type: ContractCall
//!     contract: "%my_contract.address"
//! ```
//!
//! `SetVars`, `SetSeed` and `Loop` run here. Any other step type goes to the
//! [`StepHandler`] with its fields already resolved; what it reports back is
//! written into the scenario. The scenario is saved after every step that is
//! not a loop, and the first error stops the run.

use std::fs;
use std::path::Path;

use anyhow::anyhow;
use ledgerops_formula::FormulaRng;
use ledgerops_store::{DataPath, DocumentStore, EntityCategory, Map, Network, ScenarioData, Value};
use regex::Regex;
use serde::Deserialize;

use crate::coerce::ValueType;
use crate::config::Config;
use crate::env::Environment;
use crate::error::{ResolveError, Result};
use crate::resolver::{ResolveContext, Resolver, ResolverOptions};

fn default_allowed_networks() -> Vec<String> {
    ["devnet", "testnet", "localnet", "chain-simulator"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_allowed_scenarios() -> Vec<String> {
    vec![".*".to_string()]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scene {
    /// Networks the scene may run on. Mainnet must be listed explicitly.
    #[serde(default = "default_allowed_networks")]
    pub allowed_networks: Vec<String>,
    /// Regexes matched against the start of the scenario name.
    #[serde(default = "default_allowed_scenarios")]
    pub allowed_scenario: Vec<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            allowed_networks: default_allowed_networks(),
            allowed_scenario: default_allowed_scenarios(),
            steps: Vec::new(),
        }
    }
}

impl Scene {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(ResolveError::SceneParse)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| ResolveError::SceneIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopStep {
    pub var_name: Value,
    pub var_start: Option<Value>,
    pub var_end: Option<Value>,
    pub var_list: Option<Value>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawStep")]
pub enum Step {
    /// Write each (resolved) value at its (resolved) path.
    SetVars { variables: Map },
    /// Reseed the formula generator.
    SetSeed { seed: Value },
    Loop(LoopStep),
    /// Anything the runner does not know, executed by the handler.
    External { step_type: String, fields: Map },
}

#[derive(Deserialize)]
struct RawStep {
    #[serde(rename = "type")]
    step_type: String,
    #[serde(flatten)]
    fields: Map,
}

impl TryFrom<RawStep> for Step {
    type Error = ResolveError;

    fn try_from(raw: RawStep) -> Result<Self> {
        Step::from_fields(&raw.step_type, raw.fields)
    }
}

impl Step {
    /// Build a step from its `type` and remaining fields. A trailing `Step`
    /// in the type name is ignored (`SetVarsStep` is `SetVars`).
    pub fn from_fields(step_type: &str, mut fields: Map) -> Result<Self> {
        let name = step_type.strip_suffix("Step").unwrap_or(step_type);
        let invalid = |reason: &str| ResolveError::InvalidStep {
            step_type: name.to_string(),
            reason: reason.to_string(),
        };
        match name {
            "SetVars" => match fields.shift_remove("variables") {
                Some(Value::Map(variables)) => Ok(Step::SetVars { variables }),
                Some(_) => Err(invalid("`variables` must be a mapping")),
                None => Err(invalid("missing `variables`")),
            },
            "SetSeed" => fields
                .shift_remove("seed")
                .map(|seed| Step::SetSeed { seed })
                .ok_or_else(|| invalid("missing `seed`")),
            "Loop" => {
                let var_name = fields
                    .shift_remove("var_name")
                    .ok_or_else(|| invalid("missing `var_name`"))?;
                let var_start = fields.shift_remove("var_start");
                let var_end = fields.shift_remove("var_end");
                let var_list = fields.shift_remove("var_list");
                if var_list.is_none() && (var_start.is_none() || var_end.is_none()) {
                    return Err(invalid("needs `var_start` and `var_end`, or `var_list`"));
                }
                let steps = match fields.shift_remove("steps") {
                    Some(Value::List(items)) => items
                        .into_iter()
                        .map(Step::from_value)
                        .collect::<Result<Vec<_>>>()?,
                    Some(_) => return Err(invalid("`steps` must be a list")),
                    None => Vec::new(),
                };
                Ok(Step::Loop(LoopStep {
                    var_name,
                    var_start,
                    var_end,
                    var_list,
                    steps,
                }))
            }
            _ => Ok(Step::External {
                step_type: name.to_string(),
                fields,
            }),
        }
    }

    /// Build a step from a `{type: ..., ...}` mapping.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut fields = match value {
            Value::Map(fields) => fields,
            other => {
                return Err(ResolveError::InvalidStep {
                    step_type: "unknown".to_string(),
                    reason: format!("a step must be a mapping, found {}", other.kind()),
                })
            }
        };
        match fields.shift_remove("type") {
            Some(Value::Str(step_type)) => Step::from_fields(&step_type, fields),
            _ => Err(ResolveError::InvalidStep {
                step_type: "unknown".to_string(),
                reason: "missing `type`".to_string(),
            }),
        }
    }

    pub fn step_type(&self) -> &str {
        match self {
            Step::SetVars { .. } => "SetVars",
            Step::SetSeed { .. } => "SetSeed",
            Step::Loop(_) => "Loop",
            Step::External { step_type, .. } => step_type,
        }
    }
}

/// Entity to register once a step completes.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    pub category: EntityCategory,
    pub name: String,
    pub fields: Map,
}

/// What an external step produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub saved_values: Vec<(DataPath, Value)>,
    pub entities: Vec<NewEntity>,
}

impl StepOutcome {
    pub fn save(mut self, path: DataPath, value: impl Into<Value>) -> Self {
        self.saved_values.push((path, value.into()));
        self
    }

    pub fn register(mut self, category: EntityCategory, name: impl Into<String>, fields: Map) -> Self {
        self.entities.push(NewEntity {
            category,
            name: name.into(),
            fields,
        });
        self
    }
}

/// Executes the steps the runner does not implement itself.
pub trait StepHandler {
    fn execute(&mut self, step_type: &str, fields: &Map) -> anyhow::Result<StepOutcome>;
}

/// Handler for runs that only use built-in steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinOnly;

impl StepHandler for BuiltinOnly {
    fn execute(&mut self, step_type: &str, _fields: &Map) -> anyhow::Result<StepOutcome> {
        Err(anyhow!("no handler is registered for {step_type} steps"))
    }
}

pub struct Runner<'a, H> {
    store: &'a DocumentStore,
    scenario: ScenarioData,
    config: &'a Config,
    env: &'a dyn Environment,
    rng: FormulaRng,
    handler: H,
    options: ResolverOptions,
}

impl<'a, H: StepHandler> Runner<'a, H> {
    pub fn new(
        store: &'a DocumentStore,
        scenario: ScenarioData,
        config: &'a Config,
        env: &'a dyn Environment,
        handler: H,
    ) -> Self {
        Self {
            store,
            scenario,
            config,
            env,
            rng: FormulaRng::from_entropy(),
            handler,
            options: ResolverOptions::default(),
        }
    }

    pub fn with_rng(mut self, rng: FormulaRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn scenario(&self) -> &ScenarioData {
        &self.scenario
    }

    pub fn into_scenario(self) -> ScenarioData {
        self.scenario
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn rng(&self) -> &FormulaRng {
        &self.rng
    }

    fn resolver(&mut self) -> Resolver<'_> {
        Resolver::new(ResolveContext {
            scenario: &self.scenario,
            config: self.config,
            env: self.env,
            rng: &mut self.rng,
        })
        .with_options(self.options)
    }

    /// Check the scene accepts this network and scenario, then run its steps.
    pub fn run_scene(&mut self, scene: &Scene) -> Result<()> {
        self.check_allowed(scene)?;
        tracing::info!(
            scenario = %self.scenario.name,
            network = %self.scenario.network,
            steps = scene.steps.len(),
            "running scene"
        );
        for step in &scene.steps {
            self.execute_step(step)?;
        }
        Ok(())
    }

    pub fn check_allowed(&self, scene: &Scene) -> Result<()> {
        let network = self.scenario.network;
        let network_allowed = scene.allowed_networks.iter().any(|entry| {
            entry
                .parse::<Network>()
                .map(|n| n == network)
                .unwrap_or(false)
        });
        if !network_allowed {
            return Err(ResolveError::ForbiddenNetwork {
                network,
                allowed: scene.allowed_networks.clone(),
            });
        }
        for pattern in &scene.allowed_scenario {
            let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|source| {
                ResolveError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                }
            })?;
            if regex.is_match(&self.scenario.name) {
                return Ok(());
            }
        }
        Err(ResolveError::ForbiddenScenario {
            scenario: self.scenario.name.clone(),
            allowed: scene.allowed_scenario.clone(),
        })
    }

    pub fn execute_step(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::Loop(looped) => return self.run_loop(looped),
            Step::SetVars { variables } => self.set_vars(variables)?,
            Step::SetSeed { seed } => {
                let seed = self.resolver().resolve(seed, ValueType::Int)?;
                let seed = seed
                    .as_int()
                    .and_then(|s| u64::try_from(s).ok())
                    .ok_or_else(|| ResolveError::InvalidStep {
                        step_type: "SetSeed".to_string(),
                        reason: format!("seed must be a non-negative 64-bit integer, got {seed}"),
                    })?;
                tracing::info!(seed, "setting formula seed");
                self.rng.reseed(seed);
            }
            Step::External { step_type, fields } => self.run_external(step_type, fields)?,
        }
        self.store.save(&mut self.scenario)?;
        Ok(())
    }

    fn set_vars(&mut self, variables: &Map) -> Result<()> {
        let mut resolver = self.resolver();
        let mut assignments = Vec::with_capacity(variables.len());
        for (key, raw) in variables {
            let path = resolver.resolve_path(key)?;
            let smart = resolver.resolve_smart(raw, ValueType::Any)?;
            assignments.push((path, smart));
        }
        for (path, smart) in assignments {
            tracing::info!(variable = %path, value = %smart.evaluation_string(), "setting variable");
            self.scenario.set(&path, smart.into_value())?;
        }
        Ok(())
    }

    fn run_loop(&mut self, looped: &LoopStep) -> Result<()> {
        let invalid = |reason: String| ResolveError::InvalidStep {
            step_type: "Loop".to_string(),
            reason,
        };
        let mut resolver = self.resolver();
        let var_name = match resolver.resolve(&looped.var_name, ValueType::Str)? {
            Value::Str(s) => s,
            other => other.to_string(),
        };
        let path = resolver.resolve_path(&var_name)?;
        let values: Vec<Value> = match (&looped.var_start, &looped.var_end, &looped.var_list) {
            (Some(start), Some(end), _) => {
                let start = resolver.resolve(start, ValueType::Int)?;
                let end = resolver.resolve(end, ValueType::Int)?;
                match (start.as_int(), end.as_int()) {
                    (Some(start), Some(end)) => (start..end).map(Value::Int).collect(),
                    _ => return Err(invalid("loop bounds must be integers".to_string())),
                }
            }
            (_, _, Some(list)) => match resolver.resolve(list, ValueType::Any)? {
                Value::List(items) => items,
                Value::Map(map) => map.into_keys().map(Value::Str).collect(),
                other => return Err(invalid(format!("`var_list` resolved to {}, not a list", other.kind()))),
            },
            _ => return Err(invalid("needs `var_start` and `var_end`, or `var_list`".to_string())),
        };

        tracing::info!(variable = %path, iterations = values.len(), "running loop");
        for value in values {
            tracing::debug!(variable = %path, value = %value.repr(), "loop iteration");
            self.scenario.set(&path, value)?;
            for step in &looped.steps {
                self.execute_step(step)?;
            }
        }
        Ok(())
    }

    fn run_external(&mut self, step_type: &str, fields: &Map) -> Result<()> {
        let mut resolver = self.resolver();
        let mut resolved = Map::with_capacity(fields.len());
        let mut trace = Vec::with_capacity(fields.len());
        for (key, raw) in fields {
            let smart = resolver.resolve_smart(raw, ValueType::Any)?;
            trace.push(format!("{key}: {}", smart.evaluation_string()));
            resolved.insert(key.clone(), smart.into_value());
        }
        tracing::info!(step = step_type, fields = %trace.join(", "), "executing step");

        let outcome = self
            .handler
            .execute(step_type, &resolved)
            .map_err(|source| ResolveError::StepFailed {
                step_type: step_type.to_string(),
                source,
            })?;
        // Applied to a copy so a rejected outcome leaves the scenario untouched.
        let mut updated = self.scenario.clone();
        for entity in outcome.entities {
            updated.register_entity(entity.category, entity.name, entity.fields)?;
        }
        for (path, value) in outcome.saved_values {
            tracing::debug!(path = %path, value = %value.repr(), "saving step result");
            updated.set(&path, value)?;
        }
        self.scenario = updated;
        Ok(())
    }
}
