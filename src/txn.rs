//! Per-operation transactions and the mode-specific mutation strategies.
//!
//! Every mutating operation runs inside exactly one [`TxScope`]: it is
//! begun before the first write and either committed once or aborted.
//! A scope dropped while still open is aborted.

use tracing::{debug, warn};

use crate::accessor::RecordAccessor;
use crate::config::Mode;
use crate::error::{GraphBenchError, Result};
use crate::graph::{Batch, GraphConnection, GraphTransaction, GraphWrite};
use crate::index::KeyIndex;
use crate::value::{FieldMap, NodeId, PropertyValue};

/// Lifecycle of a [`TxScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    /// Writes may be staged.
    Begun,
    /// Writes are durable and visible.
    Committed,
    /// Writes were discarded.
    Aborted,
}

/// Transaction guard around one operation.
pub struct TxScope<'g> {
    tx: Option<Box<dyn GraphTransaction + 'g>>,
    phase: TxPhase,
}

impl<'g> TxScope<'g> {
    /// Opens a transaction on `graph`.
    pub fn begin(graph: &'g dyn GraphConnection) -> Result<Self> {
        let tx = graph.begin()?;
        Ok(Self {
            tx: Some(tx),
            phase: TxPhase::Begun,
        })
    }

    /// Current phase.
    pub fn phase(&self) -> TxPhase {
        self.phase
    }

    fn tx(&mut self) -> Result<&mut (dyn GraphTransaction + 'g)> {
        match self.tx.as_deref_mut() {
            Some(tx) => Ok(tx),
            None => Err(GraphBenchError::InvalidArgument(
                "transaction scope already finished".into(),
            )),
        }
    }

    /// Commits the scope. A failed commit leaves nothing applied.
    pub fn commit(mut self) -> Result<()> {
        let Some(tx) = self.tx.take() else {
            return Err(GraphBenchError::InvalidArgument(
                "transaction scope already finished".into(),
            ));
        };
        let id = tx.id();
        match tx.commit() {
            Ok(()) => {
                self.phase = TxPhase::Committed;
                Ok(())
            }
            Err(err) => {
                self.phase = TxPhase::Aborted;
                debug!(tx_id = id, %err, "Commit failed");
                Err(err)
            }
        }
    }

    /// Aborts the scope. Rollback failures are logged.
    pub fn abort(mut self) {
        self.rollback();
    }

    fn rollback(&mut self) {
        if let Some(tx) = self.tx.take() {
            let id = tx.id();
            if let Err(err) = tx.rollback() {
                warn!(tx_id = id, %err, "Rollback failed");
            }
            self.phase = TxPhase::Aborted;
        }
    }
}

impl Drop for TxScope<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}

impl GraphWrite for TxScope<'_> {
    fn create_node(&mut self) -> Result<NodeId> {
        self.tx()?.create_node()
    }

    fn set_property(&mut self, node: NodeId, name: &str, value: PropertyValue) -> Result<()> {
        self.tx()?.set_property(node, name, value)
    }

    fn delete_node(&mut self, node: NodeId) -> Result<()> {
        self.tx()?.delete_node(node)
    }

    fn index_add(&mut self, index: &str, node: NodeId, key: &str, value: &str) -> Result<()> {
        self.tx()?.index_add(index, node, key, value)
    }

    fn index_remove(&mut self, index: &str, node: NodeId, key: &str, value: &str) -> Result<()> {
        self.tx()?.index_remove(index, node, key, value)
    }
}

/// Runs `body` in a fresh scope: commit when it succeeds, abort when it
/// fails.
pub fn in_transaction<'g, T, F>(graph: &'g dyn GraphConnection, body: F) -> Result<T>
where
    F: FnOnce(&mut TxScope<'g>) -> Result<T>,
{
    let mut scope = TxScope::begin(graph)?;
    match body(&mut scope) {
        Ok(value) => {
            scope.commit()?;
            Ok(value)
        }
        Err(err) => {
            scope.abort();
            Err(err)
        }
    }
}

/// How a client turns insert, update and delete into store writes.
///
/// Picked once per client from its [`Mode`].
pub trait MutationStrategy: Send + Sync {
    /// Mode this strategy serves.
    fn mode(&self) -> Mode;

    /// Creates the node, registers its key and writes its fields.
    fn insert(&self, graph: &dyn GraphConnection, key: &str, fields: &FieldMap) -> Result<()>;

    /// Writes `fields` onto `node` and refreshes its index entry.
    fn update(&self, graph: &dyn GraphConnection, node: NodeId, key: &str, fields: &FieldMap) -> Result<()>;

    /// Unregisters `key` and deletes `node`.
    fn delete(&self, graph: &dyn GraphConnection, node: NodeId, key: &str) -> Result<()>;
}

/// Builds the strategy for `mode`.
pub fn strategy_for(mode: Mode, index: KeyIndex, accessor: RecordAccessor) -> Box<dyn MutationStrategy> {
    let interactive = Interactive {
        mode,
        index,
        accessor,
    };
    match mode {
        Mode::Embedded | Mode::Remote => Box::new(interactive),
        Mode::RemoteBatch => Box::new(Batched { interactive }),
    }
}

/// One store call per step inside a transaction scope.
#[derive(Debug, Clone)]
pub struct Interactive {
    mode: Mode,
    index: KeyIndex,
    accessor: RecordAccessor,
}

impl Interactive {
    /// Strategy for `mode` over the given index and accessor.
    pub fn new(mode: Mode, index: KeyIndex, accessor: RecordAccessor) -> Self {
        Self {
            mode,
            index,
            accessor,
        }
    }
}

impl MutationStrategy for Interactive {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn insert(&self, graph: &dyn GraphConnection, key: &str, fields: &FieldMap) -> Result<()> {
        in_transaction(graph, |tx| {
            let node = tx.create_node()?;
            self.index.register(tx, node, key)?;
            self.accessor.write_fields(tx, node, fields)
        })
    }

    fn update(&self, graph: &dyn GraphConnection, node: NodeId, key: &str, fields: &FieldMap) -> Result<()> {
        in_transaction(graph, |tx| {
            self.accessor.write_fields(tx, node, fields)?;
            self.index.refresh(tx, node, key)
        })
    }

    fn delete(&self, graph: &dyn GraphConnection, node: NodeId, key: &str) -> Result<()> {
        in_transaction(graph, |tx| {
            self.index.unregister(tx, node, key)?;
            tx.delete_node(node)
        })
    }
}

/// Inserts go out as a single atomic batch; updates and deletes fall back
/// to interactive transactions.
#[derive(Debug, Clone)]
pub struct Batched {
    interactive: Interactive,
}

impl Batched {
    /// Batch strategy over the given index and accessor.
    pub fn new(index: KeyIndex, accessor: RecordAccessor) -> Self {
        Self {
            interactive: Interactive::new(Mode::RemoteBatch, index, accessor),
        }
    }

    /// The batch an insert of `key` sends.
    pub fn insert_batch(&self, key: &str, fields: &FieldMap) -> Batch {
        let mut batch = Batch::new();
        let node = self.interactive.index.register_in_batch(&mut batch, key);
        self.interactive
            .accessor
            .write_fields_in_batch(&mut batch, node, fields);
        batch
    }
}

impl MutationStrategy for Batched {
    fn mode(&self) -> Mode {
        Mode::RemoteBatch
    }

    fn insert(&self, graph: &dyn GraphConnection, key: &str, fields: &FieldMap) -> Result<()> {
        let batch = self.insert_batch(key, fields);
        graph.execute_batch(&batch)?;
        Ok(())
    }

    fn update(&self, graph: &dyn GraphConnection, node: NodeId, key: &str, fields: &FieldMap) -> Result<()> {
        self.interactive.update(graph, node, key, fields)
    }

    fn delete(&self, graph: &dyn GraphConnection, node: NodeId, key: &str) -> Result<()> {
        self.interactive.delete(graph, node, key)
    }
}
