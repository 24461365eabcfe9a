//! Store and scenario tests backed by a temporary data directory.

use super::*;
use tempfile::tempdir;

fn test_store() -> (DocumentStore, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let store = DocumentStore::new(StoreConfig::new(dir.path()));
    (store, dir)
}

fn path(text: &str) -> DataPath {
    DataPath::parse(text).unwrap()
}

#[test]
fn test_load_missing_scenario_is_empty() {
    let (store, _dir) = test_store();

    let data = store.load(Network::Devnet, "fresh").unwrap();
    assert_eq!(data.name, "fresh");
    assert_eq!(data.network, Network::Devnet);
    assert!(data.saved_values.is_empty());
    assert!(!store.exists(Network::Devnet, "fresh"));
}

#[test]
fn test_save_and_reload() {
    let (store, dir) = test_store();

    let mut data = store.load(Network::Devnet, "demo").unwrap();
    data.set(&path("alice.address"), Value::from("erd1alice")).unwrap();
    data.set(&path("amount"), Value::Int(10i128.pow(24))).unwrap();
    data.set(&path("raw"), Value::Bytes(vec![0, 1, 2])).unwrap();
    data.creation_time = 0;
    store.save(&mut data).unwrap();

    let file = dir.path().join("devnet").join("demo.json");
    assert!(file.exists(), "scenario file should exist");
    assert!(!dir.path().join("devnet").join("demo.json.tmp").exists());
    let text = std::fs::read_to_string(&file).unwrap();
    assert!(text.contains("\"saved_values\""));
    assert!(text.contains("bytes:AAEC"));

    let reloaded = store.load(Network::Devnet, "demo").unwrap();
    assert!(reloaded.last_update_time > 0);
    assert_eq!(reloaded, data);
    assert_eq!(
        reloaded.get(&path("amount")).unwrap(),
        Value::Int(10i128.pow(24))
    );
}

#[test]
fn test_bytes_prefix_round_trip_rules() {
    let (store, _dir) = test_store();

    let mut data = store.load(Network::Devnet, "prefixed").unwrap();
    data.set(&path("encoded"), Value::from("bytes:AAEC")).unwrap();
    data.set(&path("not_base64"), Value::from("bytes:not base64!")).unwrap();
    store.save(&mut data).unwrap();

    let reloaded = store.load(Network::Devnet, "prefixed").unwrap();
    assert_eq!(reloaded.get(&path("encoded")).unwrap(), Value::Bytes(vec![0, 1, 2]));
    assert_eq!(
        reloaded.get(&path("not_base64")).unwrap(),
        Value::from("bytes:not base64!")
    );
}

#[test]
fn test_non_finite_floats_are_not_saved() {
    let (store, dir) = test_store();

    for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let mut data = store.load(Network::Devnet, "floats").unwrap();
        data.set(&path("ratio"), Value::Float(bad)).unwrap();
        let err = store.save(&mut data).unwrap_err();
        assert!(matches!(err, StoreError::Encode { .. }), "{err:?}");
        assert!(err.to_string().contains("non-finite"), "{err}");
    }
    assert!(!dir.path().join("devnet").join("floats.json").exists());
}

#[test]
fn test_corrupted_file_is_reported() {
    let (store, dir) = test_store();
    let network_dir = dir.path().join("devnet");
    std::fs::create_dir_all(&network_dir).unwrap();
    std::fs::write(network_dir.join("broken.json"), "{ not json").unwrap();

    let err = store.load(Network::Devnet, "broken").unwrap_err();
    assert!(matches!(err, StoreError::StorageCorruption { .. }));
}

#[test]
fn test_delete_is_idempotent_and_removes_checkpoints() {
    let (store, _dir) = test_store();

    let mut data = store.load(Network::Localnet, "s").unwrap();
    store.save(&mut data).unwrap();
    store.checkpoint_create(Network::Localnet, "s", "c1").unwrap();

    store.delete(Network::Localnet, "s").unwrap();
    assert!(!store.exists(Network::Localnet, "s"));
    assert!(store.list_checkpoints(Network::Localnet, "s").unwrap().is_empty());

    store.delete(Network::Localnet, "s").unwrap();
    store.delete_all(Network::Localnet).unwrap();
    store.delete_all(Network::Localnet).unwrap();
}

#[test]
fn test_checkpoint_restores_wholesale() {
    let (store, _dir) = test_store();

    let mut data = store.load(Network::Devnet, "s").unwrap();
    data.set(&path("counter"), Value::Int(1)).unwrap();
    store.save(&mut data).unwrap();
    store.checkpoint_create(Network::Devnet, "s", "before").unwrap();

    data.set(&path("counter"), Value::Int(2)).unwrap();
    data.set(&path("extra"), Value::from("later")).unwrap();
    store.save(&mut data).unwrap();

    let restored = store.checkpoint_load(Network::Devnet, "s", "before").unwrap();
    assert_eq!(restored.name, "s");
    assert_eq!(restored.get(&path("counter")).unwrap(), Value::Int(1));
    assert!(matches!(
        restored.get(&path("extra")),
        Err(StoreError::PathNotFound { .. })
    ));

    let current = store.load(Network::Devnet, "s").unwrap();
    assert_eq!(current, restored);

    assert_eq!(
        store.list_checkpoints(Network::Devnet, "s").unwrap(),
        vec!["before".to_string()]
    );
    store.checkpoint_delete(Network::Devnet, "s", "before").unwrap();
    store.checkpoint_delete(Network::Devnet, "s", "before").unwrap();
    assert!(matches!(
        store.checkpoint_load(Network::Devnet, "s", "before"),
        Err(StoreError::UnknownCheckpoint { .. })
    ));
}

#[test]
fn test_checkpoint_of_unsaved_scenario_fails() {
    let (store, _dir) = test_store();
    assert!(matches!(
        store.checkpoint_create(Network::Devnet, "ghost", "c"),
        Err(StoreError::UnknownScenario { .. })
    ));
}

#[test]
fn test_clone_overwrites_destination() {
    let (store, _dir) = test_store();

    let mut source = store.load(Network::Testnet, "src").unwrap();
    source.set(&path("x"), Value::Int(1)).unwrap();
    store.save(&mut source).unwrap();
    store.checkpoint_create(Network::Testnet, "src", "cp").unwrap();

    let mut dest = store.load(Network::Testnet, "dst").unwrap();
    dest.set(&path("y"), Value::Int(2)).unwrap();
    store.save(&mut dest).unwrap();

    let cloned = store.clone_scenario(Network::Testnet, "src", "dst").unwrap();
    assert_eq!(cloned.name, "dst");

    let reloaded = store.load(Network::Testnet, "dst").unwrap();
    assert_eq!(reloaded.get(&path("x")).unwrap(), Value::Int(1));
    assert!(reloaded.get(&path("y")).is_err());
    assert!(store.list_checkpoints(Network::Testnet, "dst").unwrap().is_empty());

    assert_eq!(
        store.list_scenarios(Network::Testnet).unwrap(),
        vec!["dst".to_string(), "src".to_string()]
    );
}

#[test]
fn test_invalid_names_are_rejected() {
    let (store, _dir) = test_store();
    for bad in ["", "../escape", "a/b", ".hidden", "x___CHECKPOINT___y"] {
        assert!(
            matches!(
                store.load(Network::Devnet, bad),
                Err(StoreError::InvalidName { .. })
            ),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn test_entity_routing_and_uniqueness() {
    let mut data = ScenarioData::new(Network::Devnet, "entities");

    let mut fields = Map::new();
    fields.insert("address".to_string(), Value::from("erd1alice"));
    data.register_entity(EntityCategory::Account, "alice", fields)
        .unwrap();
    data.register_entity(EntityCategory::Token, "TKN", Map::new())
        .unwrap();

    assert_eq!(data.get(&path("alice.address")).unwrap(), Value::from("erd1alice"));

    data.set(&path("TKN.identifier"), Value::from("TKN-abcdef")).unwrap();
    assert_eq!(
        data.tokens.get("TKN").unwrap().get("identifier"),
        Some(&Value::from("TKN-abcdef"))
    );
    assert!(data.saved_values.is_empty());

    let err = data
        .register_entity(EntityCategory::Contract, "alice", Map::new())
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::DuplicateName { existing: EntityCategory::Account, .. }
    ));
}

#[test]
fn test_reserved_attributes_are_read_only() {
    let mut data = ScenarioData::new(Network::Mainnet, "attrs");
    assert_eq!(data.get(&path("name")).unwrap(), Value::from("attrs"));
    assert_eq!(data.get(&path("network")).unwrap(), Value::from("mainnet"));
    assert!(matches!(
        data.set(&path("name"), Value::from("other")),
        Err(StoreError::ReservedName { .. })
    ));
    assert!(matches!(
        data.register_entity(EntityCategory::Account, "network", Map::new()),
        Err(StoreError::ReservedName { .. })
    ));
}

#[test]
fn test_network_names() {
    assert_eq!("chain-simulator".parse::<Network>().unwrap(), Network::ChainSimulator);
    assert_eq!("DEVNET".parse::<Network>().unwrap(), Network::Devnet);
    assert!(matches!(
        "moonnet".parse::<Network>(),
        Err(StoreError::UnknownNetwork(_))
    ));
}
