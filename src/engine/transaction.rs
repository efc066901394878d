use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{GraphInner, GraphState};
use crate::error::{GraphBenchError, Result};
use crate::graph::{GraphTransaction, GraphWrite};
use crate::value::{NodeId, PropertyValue};

/// The state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxState {
    /// Transaction is active and can accept operations
    Active,
    /// Transaction has been successfully committed
    Committed,
    /// Transaction has been rolled back
    RolledBack,
}

#[derive(Debug, Clone)]
enum WriteOp {
    CreateNode(NodeId),
    SetProperty {
        node: NodeId,
        name: String,
        value: PropertyValue,
    },
    DeleteNode(NodeId),
    IndexAdd {
        index: String,
        node: NodeId,
        key: String,
        value: String,
    },
    IndexRemove {
        index: String,
        node: NodeId,
        key: String,
        value: String,
    },
}

/// A transaction on an [`EmbeddedGraph`](super::EmbeddedGraph).
///
/// Writes are staged locally and checked against committed state as they
/// arrive. `commit` re-checks them under the engine's write lock and applies
/// all of them or none. Dropping an active transaction rolls it back.
pub struct EngineTx {
    graph: Arc<GraphInner>,
    id: u64,
    ops: Vec<WriteOp>,
    created: BTreeSet<NodeId>,
    deleted: BTreeSet<NodeId>,
    state: TxState,
}

impl EngineTx {
    pub(crate) fn new(graph: Arc<GraphInner>, id: u64) -> Self {
        debug!(tx_id = id, "Transaction started");
        Self {
            graph,
            id,
            ops: Vec::new(),
            created: BTreeSet::new(),
            deleted: BTreeSet::new(),
            state: TxState::Active,
        }
    }

    /// Engine-assigned transaction id, unique per engine.
    pub fn id(&self) -> u64 {
        self.id
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state != TxState::Active {
            return Err(GraphBenchError::InvalidArgument(
                "transaction is no longer active".into(),
            ));
        }
        self.graph.ensure_open()
    }

    fn check_node(&self, node: NodeId) -> Result<()> {
        if self.deleted.contains(&node) {
            return Err(GraphBenchError::NotFound(format!("node {node}")));
        }
        if self.created.contains(&node) || self.graph.state.read().nodes.contains_key(&node) {
            return Ok(());
        }
        Err(GraphBenchError::NotFound(format!("node {node}")))
    }

    fn check_index(&self, index: &str) -> Result<()> {
        if self.graph.state.read().indexes.contains_key(index) {
            Ok(())
        } else {
            Err(GraphBenchError::NotFound(format!("index '{index}'")))
        }
    }

    /// Commits the transaction, making all staged writes visible at once.
    ///
    /// # Errors
    /// * `GraphBenchError::Conflict` - a staged write no longer applies,
    ///   e.g. its node was deleted by a transaction that committed first
    /// * `GraphBenchError::Closed` - the engine was shut down
    pub fn commit(mut self) -> Result<()> {
        self.ensure_active()?;
        let mut state = self.graph.state.write();
        if let Err(err) = validate(&state, &self.ops) {
            drop(state);
            self.state = TxState::RolledBack;
            warn!(tx_id = self.id, %err, "Transaction rolled back at commit");
            return Err(err);
        }
        let ops = std::mem::take(&mut self.ops);
        let count = ops.len();
        apply(&mut state, ops);
        drop(state);
        self.state = TxState::Committed;
        debug!(tx_id = self.id, writes = count, "Transaction committed");
        Ok(())
    }

    /// Discards every staged write.
    pub fn rollback(mut self) -> Result<()> {
        self.ensure_active()?;
        self.discard();
        Ok(())
    }

    fn discard(&mut self) {
        let count = self.ops.len();
        self.ops.clear();
        self.created.clear();
        self.deleted.clear();
        self.state = TxState::RolledBack;
        debug!(tx_id = self.id, writes = count, "Transaction rolled back");
    }
}

impl GraphWrite for EngineTx {
    fn create_node(&mut self) -> Result<NodeId> {
        self.ensure_active()?;
        let node = self.graph.allocate_node_id();
        self.created.insert(node);
        self.ops.push(WriteOp::CreateNode(node));
        Ok(node)
    }

    fn set_property(&mut self, node: NodeId, name: &str, value: PropertyValue) -> Result<()> {
        self.ensure_active()?;
        if name.is_empty() {
            return Err(GraphBenchError::InvalidArgument(
                "property name must not be empty".into(),
            ));
        }
        self.check_node(node)?;
        self.ops.push(WriteOp::SetProperty {
            node,
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn delete_node(&mut self, node: NodeId) -> Result<()> {
        self.ensure_active()?;
        self.check_node(node)?;
        self.created.remove(&node);
        self.deleted.insert(node);
        self.ops.push(WriteOp::DeleteNode(node));
        Ok(())
    }

    fn index_add(&mut self, index: &str, node: NodeId, key: &str, value: &str) -> Result<()> {
        self.ensure_active()?;
        self.check_index(index)?;
        self.check_node(node)?;
        self.ops.push(WriteOp::IndexAdd {
            index: index.to_string(),
            node,
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn index_remove(&mut self, index: &str, node: NodeId, key: &str, value: &str) -> Result<()> {
        self.ensure_active()?;
        self.check_index(index)?;
        self.ops.push(WriteOp::IndexRemove {
            index: index.to_string(),
            node,
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }
}

impl GraphTransaction for EngineTx {
    fn id(&self) -> u64 {
        self.id
    }

    fn commit(self: Box<Self>) -> Result<()> {
        EngineTx::commit(*self)
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        EngineTx::rollback(*self)
    }
}

impl Drop for EngineTx {
    fn drop(&mut self) {
        if self.state == TxState::Active {
            self.discard();
        }
    }
}

/// Replays `ops` against a view of `state` and fails on the first write
/// that would not apply.
fn validate(state: &GraphState, ops: &[WriteOp]) -> Result<()> {
    let mut created = BTreeSet::new();
    let mut deleted = BTreeSet::new();
    let live = |node: &NodeId, created: &BTreeSet<NodeId>, deleted: &BTreeSet<NodeId>| {
        !deleted.contains(node) && (created.contains(node) || state.nodes.contains_key(node))
    };
    for op in ops {
        match op {
            WriteOp::CreateNode(node) => {
                created.insert(*node);
            }
            WriteOp::SetProperty { node, .. } | WriteOp::IndexAdd { node, .. } => {
                if !live(node, &created, &deleted) {
                    return Err(GraphBenchError::Conflict(format!("node {node} was removed")));
                }
            }
            WriteOp::DeleteNode(node) => {
                if !live(node, &created, &deleted) {
                    return Err(GraphBenchError::Conflict(format!("node {node} was removed")));
                }
                deleted.insert(*node);
            }
            WriteOp::IndexRemove { .. } => {}
        }
        match op {
            WriteOp::IndexAdd { index, .. } | WriteOp::IndexRemove { index, .. }
                if !state.indexes.contains_key(index) =>
            {
                return Err(GraphBenchError::Conflict(format!("index '{index}' was dropped")));
            }
            _ => {}
        }
    }
    Ok(())
}

fn apply(state: &mut GraphState, ops: Vec<WriteOp>) {
    for op in ops {
        match op {
            WriteOp::CreateNode(node) => {
                state.nodes.entry(node).or_default();
            }
            WriteOp::SetProperty { node, name, value } => {
                if let Some(props) = state.nodes.get_mut(&node) {
                    props.insert(name, value);
                }
            }
            WriteOp::DeleteNode(node) => {
                state.nodes.remove(&node);
                for index in state.indexes.values_mut() {
                    index.purge(node);
                }
            }
            WriteOp::IndexAdd {
                index,
                node,
                key,
                value,
            } => {
                if let Some(index) = state.indexes.get_mut(&index) {
                    index.add(&key, &value, node);
                }
            }
            WriteOp::IndexRemove {
                index,
                node,
                key,
                value,
            } => {
                if let Some(index) = state.indexes.get_mut(&index) {
                    index.remove(&key, &value, node);
                }
            }
        }
    }
}
