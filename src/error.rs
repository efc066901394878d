//! Error taxonomy shared by every layer.

use std::io;

use thiserror::Error;

/// Result alias used across the adapter layer.
pub type Result<T> = std::result::Result<T, GraphBenchError>;

/// Errors raised by the connector, the key index, the record accessor and
/// the backing stores they drive.
///
/// None of these cross the [`Db`](crate::Db) boundary; the façade folds them
/// into a [`Status`](crate::Status).
#[derive(Debug, Error)]
pub enum GraphBenchError {
    /// Filesystem failure inside the embedded engine.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Persisted state failed validation.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// The backing store could not be configured or opened.
    #[error("configuration error: {0}")]
    Config(String),
    /// A node, index or transaction does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// A requested field is absent on the entity.
    #[error("field '{0}' is not set on the entity")]
    MissingField(String),
    /// Index creation collided with an existing index.
    #[error("index '{0}' already exists")]
    IndexExists(String),
    /// The store rejected an argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A staged write no longer applies to the committed state.
    #[error("transaction conflict: {0}")]
    Conflict(String),
    /// The connection handle has been shut down.
    #[error("connection is closed")]
    Closed,
    /// An operation ran on a client whose `init` never succeeded.
    #[error("client is not initialized")]
    NotInitialized,
    /// The binding deliberately does not implement the operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    /// The remote engine answered with an error we have no variant for.
    #[error("remote engine error ({status}): {message}")]
    Remote {
        /// HTTP status returned by the engine.
        status: u16,
        /// Message carried in the error body.
        message: String,
    },
    /// Transport failure talking to the remote engine.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<serde_json::Error> for GraphBenchError {
    fn from(err: serde_json::Error) -> Self {
        GraphBenchError::Serialization(err.to_string())
    }
}

impl GraphBenchError {
    /// Short machine-readable name, used as the `kind` of wire error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            GraphBenchError::Io(_) => "io",
            GraphBenchError::Serialization(_) => "serialization",
            GraphBenchError::Corruption(_) => "corruption",
            GraphBenchError::Config(_) => "config",
            GraphBenchError::NotFound(_) => "not_found",
            GraphBenchError::MissingField(_) => "missing_field",
            GraphBenchError::IndexExists(_) => "index_exists",
            GraphBenchError::InvalidArgument(_) => "invalid_argument",
            GraphBenchError::Conflict(_) => "conflict",
            GraphBenchError::Closed => "closed",
            GraphBenchError::NotInitialized => "not_initialized",
            GraphBenchError::Unsupported(_) => "unsupported",
            GraphBenchError::Remote { .. } => "remote",
            GraphBenchError::Http(_) => "http",
        }
    }
}
