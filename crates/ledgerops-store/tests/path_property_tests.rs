use ledgerops_store::{
    get_path, set_path, DataPath, Map, Network, ScenarioData, StoreError, Value,
    RESERVED_ATTRIBUTES,
};
use proptest::prelude::*;

fn ident() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z][a-z0-9_-]{0,8}")
        .unwrap()
        .prop_filter("reserved attribute", |s| !RESERVED_ATTRIBUTES.contains(&s.as_str()))
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
    ]
}

/// A path string mixing keys and small indices: `a.b[0].c`.
fn path_text() -> impl Strategy<Value = String> {
    (
        ident(),
        proptest::collection::vec(
            prop_oneof![ident().prop_map(|k| format!(".{k}")), Just("[0]".to_string())],
            0..5,
        ),
    )
        .prop_map(|(root, rest)| format!("{root}{}", rest.concat()))
}

proptest! {
    #[test]
    fn set_then_get_round_trips(text in path_text(), value in scalar()) {
        let path = DataPath::parse(&text).unwrap();
        let mut doc = Value::empty_map();
        set_path(&mut doc, &path, value.clone()).unwrap();
        prop_assert_eq!(get_path(&doc, &path).unwrap(), &value);
    }

    #[test]
    fn path_display_round_trips(text in path_text()) {
        let path = DataPath::parse(&text).unwrap();
        prop_assert_eq!(path.to_string(), text);
    }

    #[test]
    fn writing_at_len_appends(items in proptest::collection::vec(scalar(), 0..8), value in scalar()) {
        let n = items.len();
        let mut data = ScenarioData::new(Network::Devnet, "prop");
        data.set(&DataPath::parse("s").unwrap(), Value::List(items)).unwrap();

        let at_len = DataPath::parse(&format!("s[{n}]")).unwrap();
        data.set(&at_len, value.clone()).unwrap();
        prop_assert_eq!(data.get(&at_len).unwrap(), value.clone());
        let list = data.get(&DataPath::parse("s").unwrap()).unwrap();
        prop_assert_eq!(list.as_list().map(|l| l.len()), Some(n + 1));

        let beyond = DataPath::parse(&format!("s[{}]", n + 2)).unwrap();
        let is_out_of_range = matches!(
            data.set(&beyond, value),
            Err(StoreError::IndexOutOfRange { .. })
        );
        prop_assert!(is_out_of_range);
    }

    #[test]
    fn saved_values_survive_json(key in ident(), value in scalar()) {
        let mut data = ScenarioData::new(Network::Testnet, "json");
        data.set(&DataPath::key(key.clone()), value.clone()).unwrap();
        let text = serde_json::to_string(&data).unwrap();
        let back: ScenarioData = serde_json::from_str(&text).unwrap();
        let mut expected = Map::new();
        expected.insert(key, value);
        prop_assert_eq!(back.saved_values, expected);
    }
}
