//! Integration tests for the complete LedgerOps pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Scene YAML → Runner → smart values → ScenarioData
//! - ScenarioData → DocumentStore → reload, checkpoint, clone
//! - Formula seeding across runs
//!
//! Run with: cargo test --test integration_tests

use ledgerops_formula::FormulaRng;
use ledgerops_resolve::{
    BuiltinOnly, Config, MapEnv, ResolveContext, ResolveError, Resolver, Runner, Scene,
    StepHandler, StepOutcome, ValueType,
};
use ledgerops_store::{
    DataPath, DocumentStore, EntityCategory, Map, Network, ScenarioData, StoreConfig, StoreError,
    Value,
};
use tempfile::tempdir;

fn path(text: &str) -> DataPath {
    DataPath::parse(text).expect("valid path")
}

/// Records external steps and answers deploys with a new contract.
#[derive(Default)]
struct RecordingHandler {
    calls: Vec<(String, Map)>,
}

impl StepHandler for RecordingHandler {
    fn execute(&mut self, step_type: &str, fields: &Map) -> anyhow::Result<StepOutcome> {
        self.calls.push((step_type.to_string(), fields.clone()));
        match step_type {
            "ContractDeploy" => {
                let id = fields
                    .get("contract_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow::anyhow!("missing contract_id"))?;
                let mut entity = Map::new();
                entity.insert("address".to_string(), Value::from(format!("erd1{id}")));
                Ok(StepOutcome::default()
                    .register(EntityCategory::Contract, id, entity)
                    .save(path("last_deploy"), id))
            }
            "Fail" => anyhow::bail!("simulated network failure"),
            _ => Ok(StepOutcome::default()),
        }
    }
}

// ============================================================================
// Smart values against a scenario
// ============================================================================

#[test]
fn test_example_scenario_from_empty_document() {
    let mut scenario = ScenarioData::new(Network::Devnet, "example");
    scenario
        .set(&path("alice.address"), Value::from("erd1..."))
        .unwrap();
    let config = Config::builtin(Network::Devnet);
    let env = MapEnv::new();
    let mut rng = FormulaRng::with_seed(0);
    let mut resolver = Resolver::new(ResolveContext {
        scenario: &scenario,
        config: &config,
        env: &env,
        rng: &mut rng,
    });

    assert_eq!(
        resolver.resolve_str("%alice.address", ValueType::Any).unwrap(),
        Value::from("erd1...")
    );
    assert_eq!(
        resolver.resolve_str("=10**18", ValueType::Any).unwrap(),
        Value::Int(1_000_000_000_000_000_000)
    );
    assert_eq!(
        resolver.resolve_str("%{alice.address}_suffix", ValueType::Any).unwrap(),
        Value::from("erd1..._suffix")
    );
    assert!(matches!(
        resolver.resolve_str("=unknown_fn(1)", ValueType::Any),
        Err(ResolveError::UnknownIdentifier { .. })
    ));
    assert!(matches!(
        resolver.resolve_str("%nonexistent.path", ValueType::Any),
        Err(ResolveError::UnresolvedReference { .. })
    ));
    assert!(matches!(
        resolver.resolve_str("$UNSET_VAR", ValueType::Any),
        Err(ResolveError::UnresolvedReference { .. })
    ));

    assert!(matches!(
        scenario.get(&path("bob.address")),
        Err(StoreError::PathNotFound { .. })
    ));
    scenario
        .register_entity(EntityCategory::Account, "alice_wallet", Map::new())
        .unwrap();
    assert!(matches!(
        scenario.register_entity(EntityCategory::Token, "alice_wallet", Map::new()),
        Err(StoreError::DuplicateName { .. })
    ));
}

// ============================================================================
// Scene execution
// ============================================================================

const SCENE: &str = r#"
allowed_networks: [devnet, localnet]
allowed_scenario: ["integration"]
steps:
  - type: SetSeed
    seed: 42
  - type: SetVars
    variables:
      owner: "$OWNER"
      amount: "=10**18"
      ids: []
  - type: Loop
    var_name: i
    var_start: 0
    var_end: 3
    steps:
      - type: SetVars
        variables:
          "ids[={len(%{ids})}]": "=%{i} * %{amount}"
  - type: ContractDeploy
    contract_id: "%{owner}_vault"
    gas_limit: "&gas_limit:int"
  - type: ContractCall
    contract: "%alice_vault.address"
    value: "%ids[2]"
    roll: "=randint(0, 1000)"
"#;

#[test]
fn test_scene_runs_and_persists_every_step() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::new(StoreConfig::new(dir.path()));
    let config = Config::from_yaml_str(Network::Devnet, "devnet:\n  gas_limit: \"60000000\"\n").unwrap();
    let env = MapEnv::new().with("OWNER", "alice");
    let scene = Scene::from_yaml_str(SCENE).unwrap();

    let scenario = store.load(Network::Devnet, "integration").unwrap();
    let mut runner = Runner::new(&store, scenario, &config, &env, RecordingHandler::default());
    runner.run_scene(&scene).unwrap();

    let amount = 10i128.pow(18);
    let saved = store.load(Network::Devnet, "integration").unwrap();
    assert_eq!(saved.get(&path("owner")).unwrap(), Value::from("alice"));
    assert_eq!(
        saved.get(&path("ids")).unwrap(),
        Value::List(vec![Value::Int(0), Value::Int(amount), Value::Int(2 * amount)])
    );
    assert_eq!(saved.get(&path("i")).unwrap(), Value::Int(2));
    assert_eq!(saved.entity_category("alice_vault"), Some(EntityCategory::Contract));
    assert_eq!(saved.get(&path("last_deploy")).unwrap(), Value::from("alice_vault"));

    let calls = &runner.handler().calls;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1.get("gas_limit"), Some(&Value::Int(60_000_000)));
    assert_eq!(calls[1].1.get("contract"), Some(&Value::from("erd1alice_vault")));
    assert_eq!(calls[1].1.get("value"), Some(&Value::Int(2 * amount)));
    let roll = calls[1].1.get("roll").cloned().unwrap();

    // Same scene, same seed, fresh scenario: same draw.
    store.delete(Network::Devnet, "integration").unwrap();
    let scenario = store.load(Network::Devnet, "integration").unwrap();
    let mut rerun = Runner::new(&store, scenario, &config, &env, RecordingHandler::default());
    rerun.run_scene(&scene).unwrap();
    assert_eq!(rerun.handler().calls[1].1.get("roll"), Some(&roll));
}

#[test]
fn test_scene_guards_network_and_scenario() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::new(StoreConfig::new(dir.path()));
    let env = MapEnv::new();
    let scene = Scene::from_yaml_str(SCENE).unwrap();

    let mainnet = Config::builtin(Network::Mainnet);
    let scenario = ScenarioData::new(Network::Mainnet, "integration");
    let mut runner = Runner::new(&store, scenario, &mainnet, &env, BuiltinOnly);
    assert!(matches!(
        runner.run_scene(&scene),
        Err(ResolveError::ForbiddenNetwork { network: Network::Mainnet, .. })
    ));

    let devnet = Config::builtin(Network::Devnet);
    let scenario = ScenarioData::new(Network::Devnet, "other");
    let mut runner = Runner::new(&store, scenario, &devnet, &env, BuiltinOnly);
    assert!(matches!(
        runner.run_scene(&scene),
        Err(ResolveError::ForbiddenScenario { .. })
    ));
    assert!(store.list_scenarios(Network::Devnet).unwrap().is_empty());
}

#[test]
fn test_first_failure_aborts_the_run() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::new(StoreConfig::new(dir.path()));
    let config = Config::builtin(Network::Localnet);
    let env = MapEnv::new();
    let scene = Scene::from_yaml_str(
        r#"
steps:
  - type: SetVars
    variables:
      before: 1
  - type: Fail
  - type: SetVars
    variables:
      after: 2
"#,
    )
    .unwrap();

    let scenario = store.load(Network::Localnet, "abort").unwrap();
    let mut runner = Runner::new(&store, scenario, &config, &env, RecordingHandler::default());
    let err = runner.run_scene(&scene).unwrap_err();
    assert!(matches!(err, ResolveError::StepFailed { ref step_type, .. } if step_type == "Fail"));
    assert!(err.to_string().contains("simulated network failure"));

    let saved = store.load(Network::Localnet, "abort").unwrap();
    assert_eq!(saved.get(&path("before")).unwrap(), Value::Int(1));
    assert!(!saved.contains(&path("after")));
}

#[test]
fn test_unresolved_field_stops_before_the_handler() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::new(StoreConfig::new(dir.path()));
    let config = Config::builtin(Network::Devnet);
    let env = MapEnv::new();
    let scene = Scene::from_yaml_str("steps:\n  - type: Transfer\n    receiver: \"%bob.address\"\n").unwrap();

    let scenario = store.load(Network::Devnet, "missing").unwrap();
    let mut runner = Runner::new(&store, scenario, &config, &env, RecordingHandler::default());
    assert!(matches!(
        runner.run_scene(&scene),
        Err(ResolveError::UnresolvedReference { .. })
    ));
    assert!(runner.handler().calls.is_empty());
    assert!(!store.exists(Network::Devnet, "missing"));
}

#[test]
fn test_escaped_values_stay_literal_after_storage() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::new(StoreConfig::new(dir.path()));
    let config = Config::builtin(Network::Localnet);
    let env = MapEnv::new();
    let scene = Scene::from_yaml_str(
        r#"
steps:
  - type: SetVars
    variables:
      literal: "should not be read"
      note: '\%literal'
      discount: '50\% off'
  - type: SetVars
    variables:
      copy: "%note"
"#,
    )
    .unwrap();

    let scenario = store.load(Network::Localnet, "escapes").unwrap();
    let mut runner = Runner::new(&store, scenario, &config, &env, BuiltinOnly);
    runner.run_scene(&scene).unwrap();

    let saved = store.load(Network::Localnet, "escapes").unwrap();
    assert_eq!(saved.get(&path("note")).unwrap(), Value::from("\\%literal"));
    assert_eq!(saved.get(&path("copy")).unwrap(), Value::from("\\%literal"));
    assert_eq!(saved.get(&path("discount")).unwrap(), Value::from("50\\% off"));

    let mut rng = FormulaRng::with_seed(0);
    let mut resolver = Resolver::new(ResolveContext {
        scenario: &saved,
        config: &config,
        env: &env,
        rng: &mut rng,
    });
    let smart = resolver.resolve_smart(&Value::from("%copy"), ValueType::Any).unwrap();
    assert_eq!(smart.value(), &Value::from("\\%literal"));
    assert_eq!(smart.evaluation_string(), "%literal (%copy)");
}

#[test]
fn test_rejected_outcome_leaves_scenario_untouched() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::new(StoreConfig::new(dir.path()));
    let config = Config::builtin(Network::Devnet);
    let env = MapEnv::new();
    let scene = Scene::from_yaml_str(
        r#"
steps:
  - type: ContractDeploy
    contract_id: vault
  - type: SetVars
    variables:
      last_deploy: none
  - type: ContractDeploy
    contract_id: vault
"#,
    )
    .unwrap();

    let scenario = store.load(Network::Devnet, "duplicate").unwrap();
    let mut runner = Runner::new(&store, scenario, &config, &env, RecordingHandler::default());
    assert!(matches!(
        runner.run_scene(&scene),
        Err(ResolveError::Store(StoreError::DuplicateName { ref name, .. })) if name == "vault"
    ));
    assert_eq!(runner.handler().calls.len(), 2);
    assert_eq!(runner.scenario().get(&path("last_deploy")).unwrap(), Value::from("none"));
    assert_eq!(
        store.load(Network::Devnet, "duplicate").unwrap().get(&path("last_deploy")).unwrap(),
        Value::from("none")
    );
}

// ============================================================================
// Store lifecycle
// ============================================================================

#[test]
fn test_checkpoint_restore_after_scene() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::new(StoreConfig::new(dir.path()));
    let config = Config::builtin(Network::Testnet);
    let env = MapEnv::new();

    let first = Scene::from_yaml_str("steps:\n  - type: SetVars\n    variables:\n      counter: 1\n").unwrap();
    let bump = Scene::from_yaml_str("steps:\n  - type: SetVars\n    variables:\n      counter: \"=%{counter} + 1\"\n").unwrap();

    let scenario = store.load(Network::Testnet, "cp").unwrap();
    let mut runner = Runner::new(&store, scenario, &config, &env, BuiltinOnly);
    runner.run_scene(&first).unwrap();
    store.checkpoint_create(Network::Testnet, "cp", "start").unwrap();
    runner.run_scene(&bump).unwrap();
    runner.run_scene(&bump).unwrap();
    assert_eq!(runner.scenario().get(&path("counter")).unwrap(), Value::Int(3));

    let restored = store.checkpoint_load(Network::Testnet, "cp", "start").unwrap();
    assert_eq!(restored.get(&path("counter")).unwrap(), Value::Int(1));
    assert_eq!(
        store.load(Network::Testnet, "cp").unwrap().get(&path("counter")).unwrap(),
        Value::Int(1)
    );

    let clone = store.clone_scenario(Network::Testnet, "cp", "cp_copy").unwrap();
    assert_eq!(clone.name, "cp_copy");
    assert_eq!(
        store.list_scenarios(Network::Testnet).unwrap(),
        vec!["cp".to_string(), "cp_copy".to_string()]
    );
    assert_eq!(
        store.list_checkpoints(Network::Testnet, "cp").unwrap(),
        vec!["start".to_string()]
    );

    store.delete(Network::Testnet, "cp").unwrap();
    assert!(store.list_checkpoints(Network::Testnet, "cp").unwrap().is_empty());
    store.delete(Network::Testnet, "cp").unwrap();
}

#[test]
fn test_persisted_layout_is_plain_json() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::new(StoreConfig::new(dir.path()));
    let mut scenario = ScenarioData::new(Network::Devnet, "layout");
    scenario.set(&path("raw"), Value::Bytes(vec![0, 1, 2])).unwrap();
    scenario
        .set(&path("supply"), Value::Int(10i128.pow(24)))
        .unwrap();
    store.save(&mut scenario).unwrap();

    let text = std::fs::read_to_string(store.scenario_path(Network::Devnet, "layout")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    for field in [
        "name",
        "network",
        "creation_time",
        "last_update_time",
        "accounts",
        "contracts",
        "tokens",
        "saved_values",
    ] {
        assert!(json.get(field).is_some(), "missing {field}");
    }
    assert_eq!(json["network"], "devnet");
    assert_eq!(json["saved_values"]["raw"], "bytes:AAEC");
    assert!(text.contains("1000000000000000000000000"));
}
