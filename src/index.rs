//! Key index: maps a record key to the graph node that stores it.

use crate::config::BindingConfig;
use crate::error::Result;
use crate::graph::{Batch, BatchOp, GraphRead, GraphWrite, IndexRange, NodeRef};
use crate::value::{NodeId, PropertyValue};

/// Named node index whose entries are `key_field = key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIndex {
    index: String,
    key_field: String,
}

impl KeyIndex {
    /// Key index stored in `index`, keyed on the `key_field` property.
    pub fn new(index: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            key_field: key_field.into(),
        }
    }

    /// Key index named by the binding config.
    pub fn from_config(config: &BindingConfig) -> Self {
        Self::new(config.index.clone(), config.key_field.clone())
    }

    /// Name of the backing node index.
    pub fn name(&self) -> &str {
        &self.index
    }

    /// Node registered under `key`. With duplicates the oldest node wins.
    pub fn lookup<G>(&self, graph: &G, key: &str) -> Result<Option<NodeId>>
    where
        G: GraphRead + ?Sized,
    {
        Ok(graph
            .index_get(&self.index, &self.key_field, key)?
            .into_iter()
            .next())
    }

    /// Stores `key` on `node` and adds the index entry.
    pub fn register<W>(&self, tx: &mut W, node: NodeId, key: &str) -> Result<()>
    where
        W: GraphWrite + ?Sized,
    {
        tx.set_property(node, &self.key_field, PropertyValue::Str(key.to_string()))?;
        tx.index_add(&self.index, node, &self.key_field, key)
    }

    /// Removes the entry for `node` under `key`.
    pub fn unregister<W>(&self, tx: &mut W, node: NodeId, key: &str) -> Result<()>
    where
        W: GraphWrite + ?Sized,
    {
        tx.index_remove(&self.index, node, &self.key_field, key)
    }

    /// Removes and re-adds the entry so the index reflects the node's
    /// latest write.
    pub fn refresh<W>(&self, tx: &mut W, node: NodeId, key: &str) -> Result<()>
    where
        W: GraphWrite + ?Sized,
    {
        self.unregister(tx, node, key)?;
        tx.index_add(&self.index, node, &self.key_field, key)
    }

    /// Appends the node creation and its index entry to `batch`.
    pub fn register_in_batch(&self, batch: &mut Batch, key: &str) -> NodeRef {
        let mut properties = std::collections::BTreeMap::new();
        properties.insert(self.key_field.clone(), PropertyValue::Str(key.to_string()));
        let node = batch.push(BatchOp::CreateNode { properties });
        batch.push(BatchOp::IndexAdd {
            index: self.index.clone(),
            node,
            key: self.key_field.clone(),
            value: key.to_string(),
        });
        node
    }

    /// Up to `limit` nodes whose key sorts at or after `start`, in key order.
    pub fn range<G>(&self, graph: &G, start: &str, limit: usize) -> Result<Vec<NodeId>>
    where
        G: GraphRead + ?Sized,
    {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let range = IndexRange::starting_at(self.key_field.clone(), start).with_limit(limit);
        graph.index_range(&self.index, &range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EmbeddedGraph;
    use crate::graph::GraphConnection;

    fn graph() -> EmbeddedGraph {
        let graph = EmbeddedGraph::in_memory();
        graph.create_index("node_index").unwrap();
        graph
    }

    fn insert(graph: &EmbeddedGraph, index: &KeyIndex, key: &str) -> NodeId {
        let mut tx = graph.begin_transaction().unwrap();
        let node = tx.create_node().unwrap();
        index.register(&mut tx, node, key).unwrap();
        tx.commit().unwrap();
        node
    }

    #[test]
    fn lookup_finds_registered_key() {
        let graph = graph();
        let index = KeyIndex::new("node_index", "_id");
        let node = insert(&graph, &index, "user7");
        assert_eq!(index.lookup(&graph, "user7").unwrap(), Some(node));
        assert_eq!(index.lookup(&graph, "user8").unwrap(), None);
        assert_eq!(
            graph.node_property(node, "_id").unwrap(),
            Some(PropertyValue::Str("user7".into()))
        );
    }

    #[test]
    fn duplicate_keys_resolve_to_oldest_node() {
        let graph = graph();
        let index = KeyIndex::new("node_index", "_id");
        let first = insert(&graph, &index, "dup");
        insert(&graph, &index, "dup");
        assert_eq!(index.lookup(&graph, "dup").unwrap(), Some(first));
    }

    #[test]
    fn unregister_hides_key() {
        let graph = graph();
        let index = KeyIndex::new("node_index", "_id");
        let node = insert(&graph, &index, "k");
        let mut tx = graph.begin_transaction().unwrap();
        index.unregister(&mut tx, node, "k").unwrap();
        tx.commit().unwrap();
        assert_eq!(index.lookup(&graph, "k").unwrap(), None);
    }

    #[test]
    fn refresh_keeps_entry() {
        let graph = graph();
        let index = KeyIndex::new("node_index", "_id");
        let node = insert(&graph, &index, "k");
        let mut tx = graph.begin_transaction().unwrap();
        index.refresh(&mut tx, node, "k").unwrap();
        tx.commit().unwrap();
        assert_eq!(index.lookup(&graph, "k").unwrap(), Some(node));
    }

    #[test]
    fn zero_limit_range_is_empty() {
        let graph = graph();
        let index = KeyIndex::new("node_index", "_id");
        insert(&graph, &index, "a");
        assert!(index.range(&graph, "a", 0).unwrap().is_empty());
        assert_eq!(index.range(&graph, "a", 5).unwrap().len(), 1);
    }
}
