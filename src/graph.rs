//! Backing-store seam.
//!
//! The key index, the record accessor and the transaction manager talk to
//! the stores only through these traits. [`EmbeddedGraph`](crate::engine::EmbeddedGraph)
//! and [`RemoteGraph`](crate::remote::RemoteGraph) implement them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::value::{NodeId, PropertyValue};

/// Upper bound used for open-ended index range scans. Sorts after every
/// key made of Basic Multilingual Plane characters.
pub const RANGE_END_SENTINEL: &str = "\u{FFFF}";

/// Inclusive value range over one key of a node index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    /// Index key (the property name the entries were registered under).
    pub key: String,
    /// Inclusive lower bound.
    pub from: String,
    /// Inclusive upper bound.
    pub to: String,
    /// Maximum number of node ids to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl IndexRange {
    /// Range from `from` to the end sentinel.
    pub fn starting_at(key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            from: from.into(),
            to: RANGE_END_SENTINEL.to_string(),
            limit: None,
        }
    }

    /// Caps the number of returned ids.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Read access to committed graph state.
pub trait GraphRead {
    /// Node ids registered in `index` under `key = value`, in index order.
    fn index_get(&self, index: &str, key: &str, value: &str) -> Result<Vec<NodeId>>;

    /// Node ids whose indexed value falls inside `range`, ordered by value
    /// and then by node id.
    fn index_range(&self, index: &str, range: &IndexRange) -> Result<Vec<NodeId>>;

    /// One property of a node; `Ok(None)` when the node lacks it.
    fn node_property(&self, node: NodeId, name: &str) -> Result<Option<PropertyValue>>;

    /// Every property of a node.
    fn node_properties(&self, node: NodeId) -> Result<BTreeMap<String, PropertyValue>>;
}

/// Mutations staged inside a transaction.
pub trait GraphWrite {
    /// Creates an empty node and returns its id.
    fn create_node(&mut self) -> Result<NodeId>;

    /// Sets or overwrites one property. Empty names are rejected.
    fn set_property(&mut self, node: NodeId, name: &str, value: PropertyValue) -> Result<()>;

    /// Deletes a node together with its index entries.
    fn delete_node(&mut self, node: NodeId) -> Result<()>;

    /// Registers `node` in `index` under `key = value`.
    fn index_add(&mut self, index: &str, node: NodeId, key: &str, value: &str) -> Result<()>;

    /// Removing an entry that is not present is not an error.
    fn index_remove(&mut self, index: &str, node: NodeId, key: &str, value: &str) -> Result<()>;
}

/// An open transaction on a backing store.
///
/// Dropping a transaction that was neither committed nor rolled back
/// discards its staged writes.
pub trait GraphTransaction: GraphWrite + Send {
    /// Store-assigned transaction identifier, for logging.
    fn id(&self) -> u64;

    /// Makes every staged write visible atomically.
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every staged write.
    fn rollback(self: Box<Self>) -> Result<()>;
}

/// A live connection handle to a backing store.
pub trait GraphConnection: GraphRead + Send + Sync {
    /// Opens a transaction scope.
    fn begin(&self) -> Result<Box<dyn GraphTransaction + '_>>;

    /// Creates a node index. Fails with
    /// [`GraphBenchError::IndexExists`](crate::GraphBenchError::IndexExists)
    /// when the index is already there.
    fn create_index(&self, name: &str) -> Result<()>;

    /// Runs every job of `batch` atomically in one round trip and returns,
    /// per job, the node id it created.
    fn execute_batch(&self, batch: &Batch) -> Result<Vec<Option<NodeId>>>;

    /// Releases the handle. Further calls fail with `Closed`.
    fn shutdown(&self) -> Result<()>;

    /// Human-readable location of the store, for logs.
    fn describe(&self) -> String;
}

/// Reference to a node inside a batch: an existing node or the node created
/// by an earlier job of the same batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRef {
    /// A committed node.
    Id(NodeId),
    /// The node created by the job at this position.
    Job(usize),
}

/// One step of a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BatchOp {
    /// Creates a node with initial properties.
    CreateNode {
        /// Properties set on creation.
        #[serde(default)]
        properties: BTreeMap<String, PropertyValue>,
    },
    /// Registers a node in an index.
    IndexAdd {
        /// Target index.
        index: String,
        /// Node to register.
        node: NodeRef,
        /// Index key.
        key: String,
        /// Indexed value.
        value: String,
    },
    /// Sets one property of a node.
    SetProperty {
        /// Node to write.
        node: NodeRef,
        /// Property name.
        name: String,
        /// New value.
        value: PropertyValue,
    },
}

/// A single atomic multi-step mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a job and returns a reference to it for later jobs.
    pub fn push(&mut self, op: BatchOp) -> NodeRef {
        self.ops.push(op);
        NodeRef::Job(self.ops.len() - 1)
    }

    /// Jobs in submission order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Number of jobs.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether no job has been pushed.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
