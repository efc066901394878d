//! Field reads and writes on record nodes.

use crate::config::Mode;
use crate::error::{GraphBenchError, Result};
use crate::graph::{Batch, BatchOp, GraphRead, GraphWrite, NodeRef};
use crate::value::{FieldMap, FieldSet, FieldValue, NodeId, PropertyValue};

/// Which fields a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelection<'a> {
    /// Every stored field except the key.
    All,
    /// Exactly these fields; any missing one fails the read.
    Requested(&'a FieldSet),
    /// Nothing; the read only checks that the record exists.
    Nothing,
}

impl<'a> FieldSelection<'a> {
    /// Embedded reads without a field list return the whole record; remote
    /// reads return nothing, saving a round trip per property.
    pub fn resolve(mode: Mode, requested: Option<&'a FieldSet>) -> Self {
        match (requested, mode) {
            (Some(fields), _) => FieldSelection::Requested(fields),
            (None, Mode::Embedded) => FieldSelection::All,
            (None, Mode::Remote | Mode::RemoteBatch) => FieldSelection::Nothing,
        }
    }
}

/// Reads and writes record fields as node properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordAccessor {
    key_field: String,
}

impl RecordAccessor {
    /// Accessor for records keyed under the `key_field` property.
    pub fn new(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
        }
    }

    /// Reads one field of `node`.
    ///
    /// # Errors
    /// `GraphBenchError::MissingField` when the node lacks `name`.
    pub fn get_field<G>(&self, graph: &G, node: NodeId, name: &str) -> Result<FieldValue>
    where
        G: GraphRead + ?Sized,
    {
        graph
            .node_property(node, name)?
            .map(PropertyValue::into_field)
            .ok_or_else(|| GraphBenchError::MissingField(name.to_string()))
    }

    /// Stages a write of one field.
    pub fn set_field<W>(&self, tx: &mut W, node: NodeId, name: &str, value: &FieldValue) -> Result<()>
    where
        W: GraphWrite + ?Sized,
    {
        tx.set_property(node, name, PropertyValue::from(value))
    }

    /// Writes every entry of `fields`, stopping at the first failure.
    pub fn write_fields<W>(&self, tx: &mut W, node: NodeId, fields: &FieldMap) -> Result<()>
    where
        W: GraphWrite + ?Sized,
    {
        for (name, value) in fields {
            self.set_field(tx, node, name, value)?;
        }
        Ok(())
    }

    /// Appends one property write per field to `batch`.
    pub fn write_fields_in_batch(&self, batch: &mut Batch, node: NodeRef, fields: &FieldMap) {
        for (name, value) in fields {
            batch.push(BatchOp::SetProperty {
                node,
                name: name.clone(),
                value: PropertyValue::from(value),
            });
        }
    }

    /// Names of the node's fields, key excluded.
    pub fn field_names<G>(&self, graph: &G, node: NodeId) -> Result<FieldSet>
    where
        G: GraphRead + ?Sized,
    {
        Ok(graph
            .node_properties(node)?
            .into_keys()
            .filter(|name| *name != self.key_field)
            .collect())
    }

    /// Fetches the selected fields. A requested field that is missing fails
    /// the whole read.
    pub fn read_fields<G>(&self, graph: &G, node: NodeId, selection: FieldSelection<'_>) -> Result<FieldMap>
    where
        G: GraphRead + ?Sized,
    {
        match selection {
            FieldSelection::Nothing => Ok(FieldMap::new()),
            FieldSelection::All => Ok(graph
                .node_properties(node)?
                .into_iter()
                .filter(|(name, _)| *name != self.key_field)
                .map(|(name, value)| (name, value.into_field()))
                .collect()),
            FieldSelection::Requested(fields) => fields
                .iter()
                .map(|name| {
                    self.get_field(graph, node, name)
                        .map(|value| (name.clone(), value))
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EmbeddedGraph;

    fn record() -> (EmbeddedGraph, NodeId) {
        let graph = EmbeddedGraph::in_memory();
        let mut tx = graph.begin_transaction().unwrap();
        let node = tx.create_node().unwrap();
        tx.set_property(node, "_id", PropertyValue::Str("user1".into()))
            .unwrap();
        let accessor = RecordAccessor::new("_id");
        let mut fields = FieldMap::new();
        fields.insert("field0".into(), FieldValue::from("a"));
        fields.insert("field1".into(), FieldValue::from("b"));
        accessor.write_fields(&mut tx, node, &fields).unwrap();
        tx.commit().unwrap();
        (graph, node)
    }

    #[test]
    fn all_fields_skip_the_key() {
        let (graph, node) = record();
        let accessor = RecordAccessor::new("_id");
        let fields = accessor.read_fields(&graph, node, FieldSelection::All).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["field0"], FieldValue::from("a"));
        assert_eq!(
            accessor.field_names(&graph, node).unwrap(),
            ["field0", "field1"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn missing_requested_field_fails_read() {
        let (graph, node) = record();
        let accessor = RecordAccessor::new("_id");
        let wanted: FieldSet = ["field0", "nope"].iter().map(|s| s.to_string()).collect();
        assert!(matches!(
            accessor.read_fields(&graph, node, FieldSelection::Requested(&wanted)),
            Err(GraphBenchError::MissingField(name)) if name == "nope"
        ));
    }

    #[test]
    fn selection_depends_on_mode() {
        let wanted = FieldSet::new();
        assert_eq!(FieldSelection::resolve(Mode::Embedded, None), FieldSelection::All);
        assert_eq!(FieldSelection::resolve(Mode::Remote, None), FieldSelection::Nothing);
        assert_eq!(
            FieldSelection::resolve(Mode::RemoteBatch, Some(&wanted)),
            FieldSelection::Requested(&wanted)
        );
    }
}
