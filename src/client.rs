//! [`GraphClient`], the [`Db`] implementation over graph stores.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::accessor::{FieldSelection, RecordAccessor};
use crate::config::{BindingConfig, Mode, ScanPolicy};
use crate::connector::{Connection, Connector};
use crate::db::{Db, Status};
use crate::error::{GraphBenchError, Result};
use crate::graph::GraphConnection;
use crate::index::KeyIndex;
use crate::txn::{strategy_for, MutationStrategy};
use crate::value::{FieldMap, FieldSet};

/// State that exists only between a successful `init` and `cleanup`.
struct Session {
    connection: Connection,
    index: KeyIndex,
    accessor: RecordAccessor,
    strategy: Box<dyn MutationStrategy>,
}

impl Session {
    fn graph(&self) -> &dyn GraphConnection {
        self.connection.graph()
    }
}

/// One benchmark client. Not shared between threads; embedded clients of
/// one process share the engine underneath.
pub struct GraphClient {
    config: BindingConfig,
    connector: Connector,
    session: Option<Session>,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl GraphClient {
    /// A client using the process-wide embedded registry.
    pub fn new(config: BindingConfig) -> Self {
        Self::with_connector(config, Connector::new())
    }

    /// A client whose embedded connections go through `connector`.
    pub fn with_connector(config: BindingConfig, connector: Connector) -> Self {
        Self {
            config,
            connector,
            session: None,
        }
    }

    /// Builds a client from `graph.*` properties.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        Ok(Self::new(BindingConfig::from_properties(props)?))
    }

    /// The settings this client was built with.
    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// Mode fixed at construction.
    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    /// Whether `init` succeeded and `cleanup` has not run since.
    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(GraphBenchError::NotInitialized)
    }

    /// Reads `key`; `Ok(None)` when no record is stored under it.
    pub fn try_read(&self, key: &str, fields: Option<&FieldSet>) -> Result<Option<FieldMap>> {
        let session = self.session()?;
        let graph = session.graph();
        let Some(node) = session.index.lookup(graph, key)? else {
            return Ok(None);
        };
        let selection = FieldSelection::resolve(self.config.mode, fields);
        session.accessor.read_fields(graph, node, selection).map(Some)
    }

    /// Stores a new record under `key`; existing records are not checked.
    pub fn try_insert(&self, key: &str, values: &FieldMap) -> Result<()> {
        let session = self.session()?;
        session.strategy.insert(session.graph(), key, values)
    }

    /// Returns `false` when no record is stored under `key`.
    pub fn try_update(&self, key: &str, values: &FieldMap) -> Result<bool> {
        let session = self.session()?;
        let graph = session.graph();
        let Some(node) = session.index.lookup(graph, key)? else {
            return Ok(false);
        };
        session.strategy.update(graph, node, key, values)?;
        Ok(true)
    }

    /// Returns `false` when no record is stored under `key`.
    pub fn try_delete(&self, key: &str) -> Result<bool> {
        let session = self.session()?;
        let graph = session.graph();
        let Some(node) = session.index.lookup(graph, key)? else {
            return Ok(false);
        };
        session.strategy.delete(graph, node, key)?;
        Ok(true)
    }

    /// Up to `count` records in key order from `start`.
    pub fn try_scan(&self, start: &str, count: usize, fields: Option<&FieldSet>) -> Result<Vec<FieldMap>> {
        let session = self.session()?;
        match self.config.scan {
            ScanPolicy::Unsupported => return Err(GraphBenchError::Unsupported("scan")),
            ScanPolicy::IndexRange => {}
        }
        let graph = session.graph();
        let selection = FieldSelection::resolve(self.config.mode, fields);
        session
            .index
            .range(graph, start, count)?
            .into_iter()
            .map(|node| session.accessor.read_fields(graph, node, selection))
            .collect()
    }
}

/// Logs a failed operation and converts it into the driver's status.
fn failed(operation: &str, key: &str, err: &GraphBenchError) -> Status {
    let status = Status::from(err);
    match status {
        Status::NotInitialized | Status::NotImplemented => {
            debug!(operation, key, %err, "Operation not available")
        }
        _ => warn!(operation, key, %err, "Operation failed"),
    }
    status
}

impl Db for GraphClient {
    fn init(&mut self) -> Result<()> {
        if self.session.is_some() {
            debug!("Client already initialized");
            return Ok(());
        }
        self.config.validate()?;
        let connection = self.connector.acquire(&self.config)?;
        let index = KeyIndex::from_config(&self.config);
        let accessor = RecordAccessor::new(self.config.key_field.clone());
        let strategy = strategy_for(self.config.mode, index.clone(), accessor.clone());
        info!(
            mode = %self.config.mode,
            graph = %connection.graph().describe(),
            index = index.name(),
            "Client initialized"
        );
        self.session = Some(Session {
            connection,
            index,
            accessor,
            strategy,
        });
        Ok(())
    }

    fn cleanup(&mut self) {
        if let Some(session) = self.session.take() {
            session.connection.close();
            debug!(mode = %self.config.mode, "Client cleaned up");
        }
    }

    fn insert(&mut self, key: &str, values: &FieldMap) -> Status {
        match self.try_insert(key, values) {
            Ok(()) => Status::Ok,
            Err(err) => failed("insert", key, &err),
        }
    }

    fn read(&mut self, key: &str, fields: Option<&FieldSet>, result: &mut FieldMap) -> Status {
        match self.try_read(key, fields) {
            Ok(Some(record)) => {
                result.extend(record);
                Status::Ok
            }
            Ok(None) => Status::NotFound,
            Err(err) => failed("read", key, &err),
        }
    }

    fn update(&mut self, key: &str, values: &FieldMap) -> Status {
        match self.try_update(key, values) {
            Ok(true) => Status::Ok,
            Ok(false) => Status::NotFound,
            Err(err) => failed("update", key, &err),
        }
    }

    fn delete(&mut self, key: &str) -> Status {
        match self.try_delete(key) {
            Ok(true) => Status::Ok,
            Ok(false) => Status::NotFound,
            Err(err) => failed("delete", key, &err),
        }
    }

    fn scan(
        &mut self,
        start: &str,
        count: usize,
        fields: Option<&FieldSet>,
        result: &mut Vec<FieldMap>,
    ) -> Status {
        match self.try_scan(start, count, fields) {
            Ok(records) => {
                result.extend(records);
                Status::Ok
            }
            Err(err) => failed("scan", start, &err),
        }
    }
}

impl Drop for GraphClient {
    fn drop(&mut self) {
        self.cleanup();
    }
}
