use graphbench::graph::{GraphConnection, GraphRead};
use graphbench::{
    BindingConfig, Connector, Db, FieldMap, FieldSet, FieldValue, GraphClient, Result,
    SharedConnection, Status,
};
use std::sync::Arc;
use tempfile::TempDir;

// Field order matters: the client closes the store before the directory goes.
struct Fixture {
    client: GraphClient,
    registry: Arc<SharedConnection>,
    _dir: TempDir,
}

fn fixture() -> Result<Fixture> {
    let dir = TempDir::new()?;
    let registry = Arc::new(SharedConnection::new());
    let mut client = GraphClient::with_connector(
        BindingConfig::embedded(dir.path()),
        Connector::with_registry(Arc::clone(&registry)),
    );
    client.init()?;
    Ok(Fixture {
        client,
        registry,
        _dir: dir,
    })
}

fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), FieldValue::from(*value)))
        .collect()
}

fn names(list: &[&str]) -> FieldSet {
    list.iter().map(|name| name.to_string()).collect()
}

#[test]
fn insert_then_read_round_trips() -> Result<()> {
    let mut fx = fixture()?;
    let values = fields(&[("field0", "alpha"), ("field1", "beta")]);
    assert_eq!(fx.client.insert("user1", &values), Status::Ok);

    let mut out = FieldMap::new();
    let wanted = names(&["field0", "field1"]);
    assert_eq!(fx.client.read("user1", Some(&wanted), &mut out), Status::Ok);
    assert_eq!(out, values);
    Ok(())
}

#[test]
fn read_without_fields_returns_whole_record() -> Result<()> {
    let mut fx = fixture()?;
    let values = fields(&[("field0", "a"), ("field1", "b"), ("field2", "c")]);
    assert_eq!(fx.client.insert("user1", &values), Status::Ok);

    let mut out = FieldMap::new();
    assert_eq!(fx.client.read("user1", None, &mut out), Status::Ok);
    assert_eq!(out, values);
    assert!(!out.contains_key("_id"));
    Ok(())
}

#[test]
fn read_subset_returns_only_requested() -> Result<()> {
    let mut fx = fixture()?;
    fx.client
        .insert("user1", &fields(&[("field0", "a"), ("field1", "b")]));

    let mut out = FieldMap::new();
    let wanted = names(&["field1"]);
    assert_eq!(fx.client.read("user1", Some(&wanted), &mut out), Status::Ok);
    assert_eq!(out, fields(&[("field1", "b")]));
    Ok(())
}

#[test]
fn read_of_unknown_field_is_an_error() -> Result<()> {
    let mut fx = fixture()?;
    fx.client.insert("user1", &fields(&[("field0", "a")]));

    let mut out = FieldMap::new();
    let wanted = names(&["field0", "field9"]);
    assert_eq!(fx.client.read("user1", Some(&wanted), &mut out), Status::Error);
    assert!(out.is_empty());
    Ok(())
}

#[test]
fn update_overwrites_and_keeps_other_fields() -> Result<()> {
    let mut fx = fixture()?;
    fx.client
        .insert("user1", &fields(&[("field0", "old"), ("field1", "kept")]));
    assert_eq!(
        fx.client.update("user1", &fields(&[("field0", "new")])),
        Status::Ok
    );

    let mut out = FieldMap::new();
    assert_eq!(fx.client.read("user1", None, &mut out), Status::Ok);
    assert_eq!(out, fields(&[("field0", "new"), ("field1", "kept")]));
    Ok(())
}

#[test]
fn delete_removes_record() -> Result<()> {
    let mut fx = fixture()?;
    fx.client.insert("user1", &fields(&[("field0", "a")]));
    assert_eq!(fx.client.delete("user1"), Status::Ok);

    let mut out = FieldMap::new();
    assert_eq!(fx.client.read("user1", None, &mut out), Status::NotFound);
    assert_eq!(fx.client.delete("user1"), Status::NotFound);
    Ok(())
}

#[test]
fn absent_keys_are_not_found() -> Result<()> {
    let mut fx = fixture()?;
    let mut out = FieldMap::new();
    assert_eq!(fx.client.read("ghost", None, &mut out), Status::NotFound);
    assert_eq!(
        fx.client.update("ghost", &fields(&[("field0", "a")])),
        Status::NotFound
    );
    assert_eq!(fx.client.delete("ghost"), Status::NotFound);
    Ok(())
}

#[test]
fn failed_insert_leaves_nothing_behind() -> Result<()> {
    let mut fx = fixture()?;
    // An empty field name is rejected by the engine after the node and
    // its index entry were staged.
    let status = fx.client.insert("broken", &fields(&[("", "x"), ("field0", "a")]));
    assert_eq!(status, Status::Error);

    let mut out = FieldMap::new();
    assert_eq!(fx.client.read("broken", None, &mut out), Status::NotFound);
    let connection = fx.registry.acquire(fx.client.config())?;
    assert_eq!(connection.node_count(), 0);
    fx.registry.release();
    Ok(())
}

#[test]
fn failed_update_leaves_record_untouched() -> Result<()> {
    let mut fx = fixture()?;
    fx.client.insert("user1", &fields(&[("field0", "a")]));
    let status = fx.client.update("user1", &fields(&[("field0", "b"), ("", "x")]));
    assert_eq!(status, Status::Error);

    let mut out = FieldMap::new();
    assert_eq!(fx.client.read("user1", None, &mut out), Status::Ok);
    assert_eq!(out, fields(&[("field0", "a")]));
    Ok(())
}

#[test]
fn duplicate_keys_resolve_to_first_insert() -> Result<()> {
    let mut fx = fixture()?;
    fx.client.insert("dup", &fields(&[("field0", "first")]));
    fx.client.insert("dup", &fields(&[("field0", "second")]));

    let mut out = FieldMap::new();
    assert_eq!(fx.client.read("dup", None, &mut out), Status::Ok);
    assert_eq!(out, fields(&[("field0", "first")]));
    Ok(())
}

#[test]
fn binary_field_values_survive() -> Result<()> {
    let mut fx = fixture()?;
    let mut values = FieldMap::new();
    values.insert("blob".into(), FieldValue::new(vec![0u8, 159, 146, 150, 255]));
    assert_eq!(fx.client.insert("bin", &values), Status::Ok);

    let mut out = FieldMap::new();
    assert_eq!(fx.client.read("bin", None, &mut out), Status::Ok);
    assert_eq!(out, values);
    Ok(())
}

#[test]
fn writes_land_in_the_configured_index() -> Result<()> {
    let fx = fixture()?;
    fx.client.try_insert("k", &fields(&[("f", "v")]))?;
    let graph = fx.registry.acquire(fx.client.config())?;
    let nodes = graph.index_get("node_index", "_id", "k")?;
    assert_eq!(nodes.len(), 1);
    assert!(graph.has_index("node_index"));
    assert!(graph.describe().starts_with("embedded:"));
    fx.registry.release();
    Ok(())
}
