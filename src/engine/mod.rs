//! In-process graph engine backing the embedded mode.
//!
//! Nodes carry string-keyed properties and are addressed only through
//! named node indexes. Writes are staged in an [`EngineTx`] and applied
//! atomically on commit; readers see committed state only. State lives in
//! memory and is persisted as a checksummed snapshot on shutdown.

mod snapshot;
mod transaction;

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GraphBenchError, Result};
use crate::graph::{Batch, BatchOp, GraphConnection, GraphRead, GraphTransaction, GraphWrite, IndexRange, NodeRef};
use crate::value::{NodeId, PropertyValue};

pub use transaction::EngineTx;

type Properties = BTreeMap<String, PropertyValue>;

/// Entries of one named node index: key, then value, then node ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct NodeIndex {
    entries: BTreeMap<String, BTreeMap<String, BTreeSet<NodeId>>>,
}

impl NodeIndex {
    fn add(&mut self, key: &str, value: &str, node: NodeId) {
        self.entries
            .entry(key.to_string())
            .or_default()
            .entry(value.to_string())
            .or_default()
            .insert(node);
    }

    fn remove(&mut self, key: &str, value: &str, node: NodeId) {
        let Some(values) = self.entries.get_mut(key) else {
            return;
        };
        if let Some(nodes) = values.get_mut(value) {
            nodes.remove(&node);
            if nodes.is_empty() {
                values.remove(value);
            }
        }
        if values.is_empty() {
            self.entries.remove(key);
        }
    }

    fn purge(&mut self, node: NodeId) {
        for values in self.entries.values_mut() {
            for nodes in values.values_mut() {
                nodes.remove(&node);
            }
            values.retain(|_, nodes| !nodes.is_empty());
        }
        self.entries.retain(|_, values| !values.is_empty());
    }

    fn get(&self, key: &str, value: &str) -> Vec<NodeId> {
        self.entries
            .get(key)
            .and_then(|values| values.get(value))
            .map(|nodes| nodes.iter().copied().collect())
            .unwrap_or_default()
    }

    fn range(&self, range: &IndexRange) -> Vec<NodeId> {
        if range.from > range.to {
            return Vec::new();
        }
        let Some(values) = self.entries.get(&range.key) else {
            return Vec::new();
        };
        let limit = range.limit.unwrap_or(usize::MAX);
        values
            .range::<str, _>((
                Bound::Included(range.from.as_str()),
                Bound::Included(range.to.as_str()),
            ))
            .flat_map(|(_, nodes)| nodes.iter().copied())
            .take(limit)
            .collect()
    }
}

/// Committed graph contents. Also the snapshot payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct GraphState {
    #[serde(default)]
    pub(crate) next_node_id: NodeId,
    pub(crate) nodes: BTreeMap<NodeId, Properties>,
    pub(crate) indexes: BTreeMap<String, NodeIndex>,
}

pub(crate) struct GraphInner {
    path: Option<PathBuf>,
    pub(crate) state: RwLock<GraphState>,
    next_node_id: AtomicU64,
    next_tx_id: AtomicU64,
    closed: AtomicBool,
}

impl GraphInner {
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GraphBenchError::Closed);
        }
        Ok(())
    }

    pub(crate) fn allocate_node_id(&self) -> NodeId {
        self.next_node_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Handle to an embedded graph. Clones share the same engine.
#[derive(Clone)]
pub struct EmbeddedGraph {
    inner: Arc<GraphInner>,
}

impl std::fmt::Debug for EmbeddedGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedGraph")
            .field("path", &self.inner.path)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl EmbeddedGraph {
    /// Opens the graph stored in directory `path`, creating it if missing.
    ///
    /// # Errors
    /// * `GraphBenchError::Io` - the directory cannot be created or read
    /// * `GraphBenchError::Corruption` - the snapshot fails validation
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let state = snapshot::load(path)?.unwrap_or_default();
        info!(
            path = %path.display(),
            nodes = state.nodes.len(),
            indexes = state.indexes.len(),
            "Embedded graph opened"
        );
        Ok(Self::from_state(Some(path.to_path_buf()), state))
    }

    /// A graph that is never persisted.
    pub fn in_memory() -> Self {
        Self::from_state(None, GraphState::default())
    }

    fn from_state(path: Option<PathBuf>, state: GraphState) -> Self {
        // Ids start at 1 so a zeroed id never names a live node.
        let next_node_id = state
            .nodes
            .keys()
            .next_back()
            .map_or(1, |last| last + 1)
            .max(state.next_node_id)
            .max(1);
        Self {
            inner: Arc::new(GraphInner {
                path,
                state: RwLock::new(state),
                next_node_id: AtomicU64::new(next_node_id),
                next_tx_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Store directory; `None` for in-memory engines.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Whether `shutdown` has run.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of committed nodes.
    pub fn node_count(&self) -> usize {
        self.inner.state.read().nodes.len()
    }

    /// Whether the named index exists.
    pub fn has_index(&self, name: &str) -> bool {
        self.inner.state.read().indexes.contains_key(name)
    }

    /// Starts a transaction that owns its handle on the engine, so it can
    /// outlive the borrow that created it.
    pub fn begin_transaction(&self) -> Result<EngineTx> {
        self.inner.ensure_open()?;
        let id = self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed);
        Ok(EngineTx::new(Arc::clone(&self.inner), id))
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = self.inner.path.as_deref() else {
            return Ok(());
        };
        let mut state = self.inner.state.write();
        state.next_node_id = self.inner.next_node_id.load(Ordering::Relaxed);
        snapshot::persist(path, &state)
    }

    fn run_batch(&self, batch: &Batch) -> Result<Vec<Option<NodeId>>> {
        let mut tx = self.begin_transaction()?;
        let mut created: Vec<Option<NodeId>> = Vec::with_capacity(batch.len());
        for op in batch.ops() {
            let resolve = |node: NodeRef| -> Result<NodeId> {
                match node {
                    NodeRef::Id(id) => Ok(id),
                    NodeRef::Job(job) => created.get(job).copied().flatten().ok_or_else(|| {
                        GraphBenchError::InvalidArgument(format!(
                            "batch job {job} did not create a node"
                        ))
                    }),
                }
            };
            let outcome = match op {
                BatchOp::CreateNode { properties } => {
                    let node = tx.create_node()?;
                    for (name, value) in properties {
                        tx.set_property(node, name, value.clone())?;
                    }
                    Some(node)
                }
                BatchOp::IndexAdd {
                    index,
                    node,
                    key,
                    value,
                } => {
                    let node = resolve(*node)?;
                    tx.index_add(index, node, key, value)?;
                    None
                }
                BatchOp::SetProperty { node, name, value } => {
                    let node = resolve(*node)?;
                    tx.set_property(node, name, value.clone())?;
                    None
                }
            };
            created.push(outcome);
        }
        tx.commit()?;
        debug!(jobs = batch.len(), "Batch applied");
        Ok(created)
    }
}

impl GraphRead for EmbeddedGraph {
    fn index_get(&self, index: &str, key: &str, value: &str) -> Result<Vec<NodeId>> {
        self.inner.ensure_open()?;
        let state = self.inner.state.read();
        let index = state
            .indexes
            .get(index)
            .ok_or_else(|| GraphBenchError::NotFound(format!("index '{index}'")))?;
        Ok(index.get(key, value))
    }

    fn index_range(&self, index: &str, range: &IndexRange) -> Result<Vec<NodeId>> {
        self.inner.ensure_open()?;
        let state = self.inner.state.read();
        let index = state
            .indexes
            .get(index)
            .ok_or_else(|| GraphBenchError::NotFound(format!("index '{index}'")))?;
        Ok(index.range(range))
    }

    fn node_property(&self, node: NodeId, name: &str) -> Result<Option<PropertyValue>> {
        self.inner.ensure_open()?;
        let state = self.inner.state.read();
        let props = state
            .nodes
            .get(&node)
            .ok_or_else(|| GraphBenchError::NotFound(format!("node {node}")))?;
        Ok(props.get(name).cloned())
    }

    fn node_properties(&self, node: NodeId) -> Result<BTreeMap<String, PropertyValue>> {
        self.inner.ensure_open()?;
        let state = self.inner.state.read();
        state
            .nodes
            .get(&node)
            .cloned()
            .ok_or_else(|| GraphBenchError::NotFound(format!("node {node}")))
    }
}

impl GraphConnection for EmbeddedGraph {
    fn begin(&self) -> Result<Box<dyn GraphTransaction + '_>> {
        Ok(Box::new(self.begin_transaction()?))
    }

    fn create_index(&self, name: &str) -> Result<()> {
        self.inner.ensure_open()?;
        if name.is_empty() {
            return Err(GraphBenchError::InvalidArgument(
                "index name must not be empty".into(),
            ));
        }
        let mut state = self.inner.state.write();
        if state.indexes.contains_key(name) {
            return Err(GraphBenchError::IndexExists(name.to_string()));
        }
        state.indexes.insert(name.to_string(), NodeIndex::default());
        info!(index = name, "Node index created");
        Ok(())
    }

    fn execute_batch(&self, batch: &Batch) -> Result<Vec<Option<NodeId>>> {
        self.run_batch(batch)
    }

    fn shutdown(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.persist()?;
        info!(path = ?self.inner.path, "Embedded graph shut down");
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.inner.path {
            Some(path) => format!("embedded:{}", path.display()),
            None => "embedded:memory".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn indexed_graph() -> EmbeddedGraph {
        let graph = EmbeddedGraph::in_memory();
        graph.create_index("node_index").unwrap();
        graph
    }

    fn insert(graph: &EmbeddedGraph, key: &str) -> NodeId {
        let mut tx = graph.begin_transaction().unwrap();
        let node = tx.create_node().unwrap();
        tx.set_property(node, "_id", PropertyValue::Str(key.into()))
            .unwrap();
        tx.index_add("node_index", node, "_id", key).unwrap();
        tx.commit().unwrap();
        node
    }

    #[test]
    fn committed_writes_become_visible() {
        let graph = indexed_graph();
        let node = insert(&graph, "user1");
        assert_eq!(graph.index_get("node_index", "_id", "user1").unwrap(), vec![node]);
        assert_eq!(
            graph.node_property(node, "_id").unwrap(),
            Some(PropertyValue::Str("user1".into()))
        );
    }

    #[test]
    fn staged_writes_are_invisible_until_commit() {
        let graph = indexed_graph();
        let mut tx = graph.begin_transaction().unwrap();
        let node = tx.create_node().unwrap();
        tx.index_add("node_index", node, "_id", "k").unwrap();
        assert!(graph.index_get("node_index", "_id", "k").unwrap().is_empty());
        assert_eq!(graph.node_count(), 0);
        tx.commit().unwrap();
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn dropped_transaction_discards_writes() {
        let graph = indexed_graph();
        {
            let mut tx = graph.begin_transaction().unwrap();
            let node = tx.create_node().unwrap();
            tx.index_add("node_index", node, "_id", "k").unwrap();
        }
        assert_eq!(graph.node_count(), 0);
        assert!(graph.index_get("node_index", "_id", "k").unwrap().is_empty());
    }

    #[test]
    fn empty_property_name_is_rejected() {
        let graph = indexed_graph();
        let mut tx = graph.begin_transaction().unwrap();
        let node = tx.create_node().unwrap();
        let err = tx
            .set_property(node, "", PropertyValue::Bytes(vec![1]))
            .unwrap_err();
        assert!(matches!(err, GraphBenchError::InvalidArgument(_)));
    }

    #[test]
    fn create_index_twice_reports_exists() {
        let graph = indexed_graph();
        assert!(matches!(
            graph.create_index("node_index"),
            Err(GraphBenchError::IndexExists(name)) if name == "node_index"
        ));
    }

    #[test]
    fn delete_purges_index_entries() {
        let graph = indexed_graph();
        let node = insert(&graph, "gone");
        let mut tx = graph.begin_transaction().unwrap();
        tx.delete_node(node).unwrap();
        tx.commit().unwrap();
        assert!(graph.index_get("node_index", "_id", "gone").unwrap().is_empty());
        assert!(matches!(
            graph.node_properties(node),
            Err(GraphBenchError::NotFound(_))
        ));
    }

    #[test]
    fn concurrent_delete_turns_into_conflict() {
        let graph = indexed_graph();
        let node = insert(&graph, "contended");

        let mut writer = graph.begin_transaction().unwrap();
        writer
            .set_property(node, "field0", PropertyValue::Bytes(b"v".to_vec()))
            .unwrap();

        let mut deleter = graph.begin_transaction().unwrap();
        deleter.delete_node(node).unwrap();
        deleter.commit().unwrap();

        assert!(matches!(writer.commit(), Err(GraphBenchError::Conflict(_))));
    }

    #[test]
    fn range_is_ordered_and_limited() {
        let graph = indexed_graph();
        for key in ["c", "a", "d", "b"] {
            insert(&graph, key);
        }
        let range = IndexRange::starting_at("_id", "b").with_limit(2);
        let nodes = graph.index_range("node_index", &range).unwrap();
        let keys: Vec<_> = nodes
            .iter()
            .map(|node| graph.node_property(*node, "_id").unwrap().unwrap())
            .collect();
        assert_eq!(
            keys,
            vec![PropertyValue::Str("b".into()), PropertyValue::Str("c".into())]
        );
    }

    #[test]
    fn batch_resolves_job_references() {
        let graph = indexed_graph();
        let mut batch = Batch::new();
        let mut properties = BTreeMap::new();
        properties.insert("_id".to_string(), PropertyValue::Str("batched".into()));
        let node = batch.push(BatchOp::CreateNode { properties });
        batch.push(BatchOp::IndexAdd {
            index: "node_index".into(),
            node,
            key: "_id".into(),
            value: "batched".into(),
        });
        batch.push(BatchOp::SetProperty {
            node,
            name: "field0".into(),
            value: PropertyValue::Bytes(b"x".to_vec()),
        });

        let created = graph.execute_batch(&batch).unwrap();
        let id = created[0].unwrap();
        assert_eq!(created[1..], [None, None]);
        assert_eq!(graph.index_get("node_index", "_id", "batched").unwrap(), vec![id]);
    }

    #[test]
    fn failing_batch_leaves_nothing_behind() {
        let graph = indexed_graph();
        let mut batch = Batch::new();
        let node = batch.push(BatchOp::CreateNode {
            properties: BTreeMap::new(),
        });
        batch.push(BatchOp::IndexAdd {
            index: "missing_index".into(),
            node,
            key: "_id".into(),
            value: "k".into(),
        });
        assert!(graph.execute_batch(&batch).is_err());
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn shutdown_persists_and_reopen_restores() {
        let dir = TempDir::new().unwrap();
        let node = {
            let graph = EmbeddedGraph::open(dir.path()).unwrap();
            graph.create_index("node_index").unwrap();
            let node = insert(&graph, "durable");
            graph.shutdown().unwrap();
            assert!(matches!(
                graph.index_get("node_index", "_id", "durable"),
                Err(GraphBenchError::Closed)
            ));
            node
        };

        let graph = EmbeddedGraph::open(dir.path()).unwrap();
        assert_eq!(graph.index_get("node_index", "_id", "durable").unwrap(), vec![node]);
        let next = insert(&graph, "after");
        assert!(next > node);
    }
}
