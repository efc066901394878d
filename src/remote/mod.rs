//! Blocking HTTP client for the remote engine.
//!
//! Every call is one round trip. Interactive transactions live on the
//! server and are addressed by id; batches are sent whole.

pub mod wire;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{GraphBenchError, Result};
use crate::graph::{Batch, GraphConnection, GraphRead, GraphTransaction, GraphWrite, IndexRange};
use crate::value::{NodeId, PropertyValue};
use wire::{
    BatchResponse, CreateIndexRequest, ErrorBody, IndexLookup, PropertyQuery, ServiceRoot,
    TxBegun, TxOp, TxOpResponse, API_ROOT,
};

/// Connection handle to a remote engine. Owned by exactly one client.
pub struct RemoteGraph {
    http: Client,
    base: Url,
    closed: AtomicBool,
}

impl std::fmt::Debug for RemoteGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteGraph")
            .field("base", &self.base.as_str())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl RemoteGraph {
    /// Connects to the engine at `url` and checks that it answers.
    ///
    /// `timeout` bounds every request; `None` waits indefinitely.
    pub fn connect(url: &str, timeout: Option<Duration>) -> Result<Self> {
        let base = Url::parse(&format!("{}{API_ROOT}", url.trim_end_matches('/')))
            .map_err(|err| GraphBenchError::Config(format!("invalid engine url '{url}': {err}")))?;
        if base.cannot_be_a_base() {
            return Err(GraphBenchError::Config(format!(
                "engine url '{url}' cannot carry a path"
            )));
        }
        let http = Client::builder().timeout(timeout).build()?;
        let graph = Self {
            http,
            base,
            closed: AtomicBool::new(false),
        };
        let root: ServiceRoot = graph.send(graph.http.get(graph.endpoint(&[])?))?;
        info!(
            url = %graph.base,
            engine = %root.engine,
            version = %root.version,
            "Remote graph connected"
        );
        Ok(graph)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GraphBenchError::Closed);
        }
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| GraphBenchError::Config("engine url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json()?);
        }
        Err(Self::error_from(status, response))
    }

    fn send_empty(&self, request: RequestBuilder) -> Result<()> {
        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(Self::error_from(status, response))
    }

    fn error_from(status: reqwest::StatusCode, response: reqwest::blocking::Response) -> GraphBenchError {
        let body = response.json::<ErrorBody>().unwrap_or_else(|_| ErrorBody {
            kind: "remote".into(),
            detail: status.to_string(),
        });
        body.into_error(status.as_u16())
    }

    fn stage(&self, tx: u64, op: &TxOp) -> Result<TxOpResponse> {
        self.ensure_open()?;
        let url = self.endpoint(&["transaction", &tx.to_string()])?;
        self.send(self.http.post(url).json(op))
    }
}

impl GraphRead for RemoteGraph {
    fn index_get(&self, index: &str, key: &str, value: &str) -> Result<Vec<NodeId>> {
        self.ensure_open()?;
        let url = self.endpoint(&["index", "node", index, "lookup"])?;
        let body = IndexLookup {
            key: key.to_string(),
            value: value.to_string(),
        };
        self.send(self.http.post(url).json(&body))
    }

    fn index_range(&self, index: &str, range: &IndexRange) -> Result<Vec<NodeId>> {
        self.ensure_open()?;
        let url = self.endpoint(&["index", "node", index, "range"])?;
        self.send(self.http.post(url).json(range))
    }

    fn node_property(&self, node: NodeId, name: &str) -> Result<Option<PropertyValue>> {
        self.ensure_open()?;
        let url = self.endpoint(&["node", &node.to_string(), "property"])?;
        let query = PropertyQuery {
            name: name.to_string(),
        };
        self.send(self.http.get(url).query(&query))
    }

    fn node_properties(&self, node: NodeId) -> Result<BTreeMap<String, PropertyValue>> {
        self.ensure_open()?;
        let url = self.endpoint(&["node", &node.to_string(), "properties"])?;
        self.send(self.http.get(url))
    }
}

impl GraphConnection for RemoteGraph {
    fn begin(&self) -> Result<Box<dyn GraphTransaction + '_>> {
        self.ensure_open()?;
        let begun: TxBegun = self.send(self.http.post(self.endpoint(&["transaction"])?))?;
        debug!(tx_id = begun.id, "Remote transaction started");
        Ok(Box::new(RemoteTx {
            graph: self,
            id: begun.id,
            active: true,
        }))
    }

    fn create_index(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let url = self.endpoint(&["index", "node"])?;
        let body = CreateIndexRequest {
            name: name.to_string(),
        };
        self.send_empty(self.http.post(url).json(&body))
    }

    fn execute_batch(&self, batch: &Batch) -> Result<Vec<Option<NodeId>>> {
        self.ensure_open()?;
        let url = self.endpoint(&["batch"])?;
        let response: BatchResponse = self.send(self.http.post(url).json(batch))?;
        Ok(response.nodes)
    }

    fn shutdown(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(url = %self.base, "Remote graph disconnected");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.base.to_string()
    }
}

/// Server-side transaction driven over HTTP.
struct RemoteTx<'g> {
    graph: &'g RemoteGraph,
    id: u64,
    active: bool,
}

impl RemoteTx<'_> {
    fn stage(&self, op: TxOp) -> Result<TxOpResponse> {
        self.graph.stage(self.id, &op)
    }

    fn finish(&mut self, commit: bool) -> Result<()> {
        self.active = false;
        let id = self.id.to_string();
        if commit {
            let url = self.graph.endpoint(&["transaction", &id, "commit"])?;
            self.graph.send_empty(self.graph.http.post(url))
        } else {
            let url = self.graph.endpoint(&["transaction", &id])?;
            self.graph.send_empty(self.graph.http.delete(url))
        }
    }
}

impl GraphWrite for RemoteTx<'_> {
    fn create_node(&mut self) -> Result<NodeId> {
        self.stage(TxOp::CreateNode)?.node.ok_or_else(|| GraphBenchError::Remote {
            status: 200,
            message: "engine did not return the created node".into(),
        })
    }

    fn set_property(&mut self, node: NodeId, name: &str, value: PropertyValue) -> Result<()> {
        self.stage(TxOp::SetProperty {
            node,
            name: name.to_string(),
            value,
        })?;
        Ok(())
    }

    fn delete_node(&mut self, node: NodeId) -> Result<()> {
        self.stage(TxOp::DeleteNode { node })?;
        Ok(())
    }

    fn index_add(&mut self, index: &str, node: NodeId, key: &str, value: &str) -> Result<()> {
        self.stage(TxOp::IndexAdd {
            index: index.to_string(),
            node,
            key: key.to_string(),
            value: value.to_string(),
        })?;
        Ok(())
    }

    fn index_remove(&mut self, index: &str, node: NodeId, key: &str, value: &str) -> Result<()> {
        self.stage(TxOp::IndexRemove {
            index: index.to_string(),
            node,
            key: key.to_string(),
            value: value.to_string(),
        })?;
        Ok(())
    }
}

impl GraphTransaction for RemoteTx<'_> {
    fn id(&self) -> u64 {
        self.id
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.finish(true)
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish(false)
    }
}

impl Drop for RemoteTx<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = self.finish(false) {
                warn!(tx_id = self.id, %err, "Failed to roll back remote transaction");
            }
        }
    }
}
