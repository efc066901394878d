use graphbench::{
    BindingConfig, Connector, Db, FieldMap, FieldValue, GraphClient, SharedConnection, Status,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Operation {
    Insert { key: String, fields: FieldMap },
    Update { key: String, fields: FieldMap },
    Delete { key: String },
    Read { key: String },
}

fn arb_fields() -> impl Strategy<Value = FieldMap> {
    prop::collection::btree_map(
        "field[0-3]",
        prop::collection::vec(any::<u8>(), 0..16).prop_map(FieldValue::new),
        1..=3,
    )
}

fn arb_key() -> impl Strategy<Value = String> {
    "user[0-9]{1,2}"
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        (arb_key(), arb_fields()).prop_map(|(key, fields)| Operation::Insert { key, fields }),
        (arb_key(), arb_fields()).prop_map(|(key, fields)| Operation::Update { key, fields }),
        arb_key().prop_map(|key| Operation::Delete { key }),
        arb_key().prop_map(|key| Operation::Read { key }),
    ]
}

fn client(dir: &tempfile::TempDir) -> GraphClient {
    let mut client = GraphClient::with_connector(
        BindingConfig::embedded(dir.path()),
        Connector::with_registry(Arc::new(SharedConnection::new())),
    );
    client.init().unwrap();
    client
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_client_matches_model(ops in prop::collection::vec(arb_operation(), 1..60)) {
        let dir = tempfile::TempDir::new().unwrap();
        let mut client = client(&dir);
        // Duplicate keys queue up behind the oldest record.
        let mut model: BTreeMap<String, VecDeque<FieldMap>> = BTreeMap::new();

        for op in ops {
            match op {
                Operation::Insert { key, fields } => {
                    prop_assert_eq!(client.insert(&key, &fields), Status::Ok);
                    model.entry(key).or_default().push_back(fields);
                }
                Operation::Update { key, fields } => {
                    let status = client.update(&key, &fields);
                    match model.get_mut(&key).and_then(|records| records.front_mut()) {
                        Some(record) => {
                            prop_assert_eq!(status, Status::Ok);
                            record.extend(fields);
                        }
                        None => prop_assert_eq!(status, Status::NotFound),
                    }
                }
                Operation::Delete { key } => {
                    let status = client.delete(&key);
                    match model.get_mut(&key).and_then(|records| records.pop_front()) {
                        Some(_) => prop_assert_eq!(status, Status::Ok),
                        None => prop_assert_eq!(status, Status::NotFound),
                    }
                }
                Operation::Read { key } => {
                    let mut out = FieldMap::new();
                    let status = client.read(&key, None, &mut out);
                    match model.get(&key).and_then(|records| records.front()) {
                        Some(record) => {
                            prop_assert_eq!(status, Status::Ok);
                            prop_assert_eq!(&out, record);
                        }
                        None => prop_assert_eq!(status, Status::NotFound),
                    }
                }
            }
        }
        client.cleanup();
    }

    #[test]
    fn prop_scan_is_sorted_and_bounded(
        keys in prop::collection::btree_set("[a-z]{1,6}", 1..30),
        start in "[a-z]{0,3}",
        count in 0usize..40,
    ) {
        let dir = tempfile::TempDir::new().unwrap();
        let mut client = client(&dir);
        for key in &keys {
            let mut fields = FieldMap::new();
            fields.insert("k".into(), FieldValue::from(key.as_str()));
            prop_assert_eq!(client.insert(key, &fields), Status::Ok);
        }

        let mut out = Vec::new();
        prop_assert_eq!(client.scan(&start, count, None, &mut out), Status::Ok);
        let scanned: Vec<FieldValue> = out.iter().map(|record| record["k"].clone()).collect();
        let expected: Vec<FieldValue> = keys
            .iter()
            .filter(|key| key.as_str() >= start.as_str())
            .take(count)
            .map(|key| FieldValue::from(key.as_str()))
            .collect();
        prop_assert_eq!(scanned, expected);
        client.cleanup();
    }
}
