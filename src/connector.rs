//! Connection lifecycle.
//!
//! Embedded clients share one engine per [`SharedConnection`] registry,
//! counted under a single lock; the last release shuts the engine down.
//! Remote clients each open their own [`RemoteGraph`].

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{BindingConfig, Mode};
use crate::engine::EmbeddedGraph;
use crate::error::{GraphBenchError, Result};
use crate::graph::GraphConnection;
use crate::remote::RemoteGraph;

#[derive(Debug)]
struct Slot {
    graph: Option<EmbeddedGraph>,
    refs: usize,
    opens: usize,
}

/// Reference-counted holder of the embedded engine handle.
///
/// The lock guards only the open/increment/decrement/close bookkeeping;
/// requests run against the cloned handle without it.
#[derive(Debug)]
pub struct SharedConnection {
    slot: Mutex<Slot>,
}

impl Default for SharedConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedConnection {
    /// An empty registry with no engine open.
    pub const fn new() -> Self {
        Self {
            slot: parking_lot::const_mutex(Slot {
                graph: None,
                refs: 0,
                opens: 0,
            }),
        }
    }

    /// The process-wide registry used by [`Connector::new`].
    pub fn global() -> Arc<SharedConnection> {
        static GLOBAL: OnceLock<Arc<SharedConnection>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(SharedConnection::new())))
    }

    /// Returns the shared engine, opening it and provisioning the key index
    /// on first use, and counts one more holder.
    pub fn acquire(&self, config: &BindingConfig) -> Result<EmbeddedGraph> {
        let mut slot = self.slot.lock();
        let graph = match &slot.graph {
            Some(graph) => {
                let requested = config.path();
                if graph.path() != Some(requested.as_path()) {
                    warn!(
                        requested = %requested.display(),
                        open = ?graph.path(),
                        "Embedded graph already open elsewhere; sharing it"
                    );
                }
                // Holders may name different indexes on one engine.
                provision_index(graph, &config.index)
                    .map_err(|err| provision_error(&config.index, err))?;
                graph.clone()
            }
            None => {
                let path = config.path();
                let graph = EmbeddedGraph::open(&path).map_err(|err| {
                    GraphBenchError::Config(format!(
                        "failed to open embedded graph at {}: {err}",
                        path.display()
                    ))
                })?;
                if let Err(err) = provision_index(&graph, &config.index) {
                    if let Err(close_err) = graph.shutdown() {
                        warn!(%close_err, "Failed to close embedded graph after provisioning error");
                    }
                    return Err(provision_error(&config.index, err));
                }
                slot.opens += 1;
                slot.graph = Some(graph.clone());
                info!(path = %path.display(), "Shared embedded connection opened");
                graph
            }
        };
        slot.refs += 1;
        debug!(refs = slot.refs, "Shared embedded connection acquired");
        Ok(graph)
    }

    /// Drops one holder. The last one shuts the engine down; shutdown
    /// failures are logged, never returned.
    pub fn release(&self) {
        let mut slot = self.slot.lock();
        if slot.refs == 0 {
            warn!("Shared embedded connection released more often than acquired");
            return;
        }
        slot.refs -= 1;
        debug!(refs = slot.refs, "Shared embedded connection released");
        if slot.refs > 0 {
            return;
        }
        if let Some(graph) = slot.graph.take() {
            match graph.shutdown() {
                Ok(()) => info!(graph = %graph.describe(), "Shared embedded connection closed"),
                Err(err) => warn!(%err, "Failed to close shared embedded connection"),
            }
        }
    }

    /// Current number of holders.
    pub fn ref_count(&self) -> usize {
        self.slot.lock().refs
    }

    /// Whether an engine is currently held open.
    pub fn is_open(&self) -> bool {
        self.slot.lock().graph.is_some()
    }

    /// How many times the engine has been opened by this registry.
    pub fn opens(&self) -> usize {
        self.slot.lock().opens
    }
}

fn provision_error(index: &str, err: GraphBenchError) -> GraphBenchError {
    GraphBenchError::Config(format!("failed to provision index '{index}': {err}"))
}

/// Creates `index`, treating "already exists" as success.
pub fn provision_index(graph: &dyn GraphConnection, index: &str) -> Result<()> {
    match graph.create_index(index) {
        Ok(()) => {
            info!(index, graph = %graph.describe(), "Key index created");
            Ok(())
        }
        Err(GraphBenchError::IndexExists(_)) => {
            debug!(index, "Key index already exists");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// One holder's claim on the shared embedded engine. Dropping it releases
/// the claim exactly once.
pub struct EmbeddedLease {
    registry: Arc<SharedConnection>,
    graph: EmbeddedGraph,
}

impl EmbeddedLease {
    /// The shared engine handle.
    pub fn graph(&self) -> &EmbeddedGraph {
        &self.graph
    }
}

impl Drop for EmbeddedLease {
    fn drop(&mut self) {
        self.registry.release();
    }
}

/// A client's connection handle.
pub enum Connection {
    /// A lease on the registry's shared engine.
    Embedded(EmbeddedLease),
    /// A private HTTP client.
    Remote(RemoteGraph),
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Connection").field(&self.graph().describe()).finish()
    }
}

impl Connection {
    /// The store behind this connection.
    pub fn graph(&self) -> &dyn GraphConnection {
        match self {
            Connection::Embedded(lease) => lease.graph(),
            Connection::Remote(graph) => graph,
        }
    }

    /// Releases the handle. Failures are logged and swallowed.
    pub fn close(self) {
        match self {
            Connection::Embedded(lease) => drop(lease),
            Connection::Remote(graph) => {
                if let Err(err) = graph.shutdown() {
                    warn!(%err, "Failed to close remote connection");
                }
            }
        }
    }
}

/// Opens connections according to a client's [`Mode`].
#[derive(Debug, Clone)]
pub struct Connector {
    registry: Arc<SharedConnection>,
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector {
    /// Connector backed by the process-wide registry.
    pub fn new() -> Self {
        Self::with_registry(SharedConnection::global())
    }

    /// Connector backed by a private registry.
    pub fn with_registry(registry: Arc<SharedConnection>) -> Self {
        Self { registry }
    }

    /// The registry embedded connections are counted in.
    pub fn registry(&self) -> &Arc<SharedConnection> {
        &self.registry
    }

    /// Opens a connection for `config.mode` and makes sure the key index
    /// exists.
    ///
    /// # Errors
    /// `GraphBenchError::Config` when the store cannot be opened, reached
    /// or provisioned.
    pub fn acquire(&self, config: &BindingConfig) -> Result<Connection> {
        match config.mode {
            Mode::Embedded => {
                let graph = self.registry.acquire(config)?;
                Ok(Connection::Embedded(EmbeddedLease {
                    registry: Arc::clone(&self.registry),
                    graph,
                }))
            }
            Mode::Remote | Mode::RemoteBatch => {
                let graph = RemoteGraph::connect(&config.url, config.timeout()).map_err(|err| {
                    GraphBenchError::Config(format!(
                        "failed to connect to remote graph at {}: {err}",
                        config.url
                    ))
                })?;
                provision_index(&graph, &config.index)
                    .map_err(|err| provision_error(&config.index, err))?;
                Ok(Connection::Remote(graph))
            }
        }
    }
}
