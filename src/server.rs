//! HTTP front for an [`EmbeddedGraph`], speaking the protocol in
//! [`crate::remote::wire`]. This is the engine the remote modes talk to.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::engine::{EmbeddedGraph, EngineTx};
use crate::error::GraphBenchError;
use crate::graph::{Batch, GraphConnection, GraphRead, GraphWrite, IndexRange};
use crate::remote::wire::{
    self, BatchResponse, CreateIndexRequest, ErrorBody, IndexLookup, PropertyQuery, ServiceRoot,
    TxBegun, TxOp, TxOpResponse, API_ROOT,
};
use crate::value::{NodeId, PropertyValue};

/// Runtime options used to boot the engine server.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    /// Store directory; `None` keeps the graph in memory.
    pub path: Option<PathBuf>,
    /// Network interface to bind to.
    pub host: IpAddr,
    /// Listening port.
    pub port: u16,
    /// Indexes to create at startup if they are missing.
    pub indexes: Vec<String>,
}

/// Errors that can occur while running the engine server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Opening or shutting down the graph failed.
    #[error("graph error: {0}")]
    Graph(#[from] GraphBenchError),
    /// Binding or serving the TCP listener failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

type AppState = Arc<ServerState>;

struct ServerState {
    graph: EmbeddedGraph,
    transactions: Mutex<HashMap<u64, EngineTx>>,
}

impl ServerState {
    fn take_transaction(&self, id: u64) -> Result<EngineTx, ApiError> {
        self.transactions
            .lock()
            .remove(&id)
            .ok_or_else(|| ApiError(GraphBenchError::NotFound(format!("transaction {id}"))))
    }
}

struct ApiError(GraphBenchError);

impl From<GraphBenchError> for ApiError {
    fn from(err: GraphBenchError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(wire::status_code(&self.0))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(err = %self.0, "request failed");
        } else {
            debug!(err = %self.0, "request rejected");
        }
        (status, Json(ErrorBody::from_error(&self.0))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Opens the graph, provisions indexes and serves until ctrl-c, then
/// shuts the graph down so its snapshot is written.
pub async fn serve(options: ServerOptions) -> Result<(), ServerError> {
    let graph = match &options.path {
        Some(path) => EmbeddedGraph::open(path)?,
        None => EmbeddedGraph::in_memory(),
    };
    for index in &options.indexes {
        match graph.create_index(index) {
            Ok(()) | Err(GraphBenchError::IndexExists(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }

    let addr = SocketAddr::from((options.host, options.port));
    let listener = TcpListener::bind(addr).await?;
    info!(
        %addr,
        path = ?options.path,
        indexes = ?options.indexes,
        "engine server listening"
    );

    serve_on(listener, graph.clone(), shutdown_signal()).await?;
    graph.shutdown()?;
    Ok(())
}

/// Serves `graph` on an already bound listener until `shutdown` resolves.
pub async fn serve_on(
    listener: TcpListener,
    graph: EmbeddedGraph,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(graph).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}

/// Builds the engine's routes over `graph`.
pub fn router(graph: EmbeddedGraph) -> Router {
    let state = Arc::new(ServerState {
        graph,
        transactions: Mutex::new(HashMap::new()),
    });
    let api = Router::new()
        .route("/", get(service_root))
        .route("/index/node", post(create_index))
        .route("/index/node/:index/lookup", post(index_lookup))
        .route("/index/node/:index/range", post(index_range))
        .route("/node/:id/properties", get(node_properties))
        .route("/node/:id/property", get(node_property))
        .route("/transaction", post(begin_transaction))
        .route(
            "/transaction/:id",
            post(stage_operation).delete(rollback_transaction),
        )
        .route("/transaction/:id/commit", post(commit_transaction))
        .route("/batch", post(execute_batch));
    Router::new()
        .nest(API_ROOT, api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}

async fn service_root() -> Json<ServiceRoot> {
    Json(ServiceRoot {
        engine: "graphbench".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

async fn create_index(
    State(state): State<AppState>,
    Json(request): Json<CreateIndexRequest>,
) -> ApiResult<StatusCode> {
    state.graph.create_index(&request.name)?;
    Ok(StatusCode::CREATED)
}

async fn index_lookup(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Json(lookup): Json<IndexLookup>,
) -> ApiResult<Json<Vec<NodeId>>> {
    Ok(Json(state.graph.index_get(&index, &lookup.key, &lookup.value)?))
}

async fn index_range(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Json(range): Json<IndexRange>,
) -> ApiResult<Json<Vec<NodeId>>> {
    Ok(Json(state.graph.index_range(&index, &range)?))
}

async fn node_properties(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
) -> ApiResult<Json<BTreeMap<String, PropertyValue>>> {
    Ok(Json(state.graph.node_properties(id)?))
}

async fn node_property(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
    Query(query): Query<PropertyQuery>,
) -> ApiResult<Json<Option<PropertyValue>>> {
    Ok(Json(state.graph.node_property(id, &query.name)?))
}

async fn begin_transaction(State(state): State<AppState>) -> ApiResult<Json<TxBegun>> {
    let tx = state.graph.begin_transaction()?;
    let id = tx.id();
    state.transactions.lock().insert(id, tx);
    Ok(Json(TxBegun { id }))
}

async fn stage_operation(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(op): Json<TxOp>,
) -> ApiResult<Json<TxOpResponse>> {
    let mut transactions = state.transactions.lock();
    let tx = transactions
        .get_mut(&id)
        .ok_or_else(|| GraphBenchError::NotFound(format!("transaction {id}")))?;
    Ok(Json(stage(tx, op)?))
}

fn stage(tx: &mut EngineTx, op: TxOp) -> Result<TxOpResponse, GraphBenchError> {
    let mut response = TxOpResponse::default();
    match op {
        TxOp::CreateNode => response.node = Some(tx.create_node()?),
        TxOp::SetProperty { node, name, value } => tx.set_property(node, &name, value)?,
        TxOp::DeleteNode { node } => tx.delete_node(node)?,
        TxOp::IndexAdd {
            index,
            node,
            key,
            value,
        } => tx.index_add(&index, node, &key, &value)?,
        TxOp::IndexRemove {
            index,
            node,
            key,
            value,
        } => tx.index_remove(&index, node, &key, &value)?,
    }
    Ok(response)
}

async fn commit_transaction(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    state.take_transaction(id)?.commit()?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rollback_transaction(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    state.take_transaction(id)?.rollback()?;
    Ok(StatusCode::NO_CONTENT)
}

async fn execute_batch(
    State(state): State<AppState>,
    Json(batch): Json<Batch>,
) -> ApiResult<Json<BatchResponse>> {
    let nodes = state.graph.execute_batch(&batch)?;
    Ok(Json(BatchResponse { nodes }))
}

/// An engine server running on its own runtime, for in-process use.
///
/// Dropping it stops the server.
pub struct BackgroundServer {
    runtime: Option<tokio::runtime::Runtime>,
    addr: SocketAddr,
    graph: EmbeddedGraph,
}

impl BackgroundServer {
    /// Serves `graph` on an ephemeral localhost port.
    pub fn start(graph: EmbeddedGraph) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let listener = runtime.block_on(TcpListener::bind(("127.0.0.1", 0)))?;
        let addr = listener.local_addr()?;
        let served = graph.clone();
        runtime.spawn(async move {
            if let Err(err) = serve_on(listener, served, std::future::pending()).await {
                tracing::error!(%err, "background engine server stopped");
            }
        });
        debug!(%addr, "background engine server started");
        Ok(Self {
            runtime: Some(runtime),
            addr,
            graph,
        })
    }

    /// Base URL to put in `graph.url`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The engine being served, for direct inspection.
    pub fn graph(&self) -> &EmbeddedGraph {
        &self.graph
    }
}

impl Drop for BackgroundServer {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
