//! JSON bodies exchanged with the remote engine, under `{url}/db/data`.

use serde::{Deserialize, Serialize};

use crate::error::GraphBenchError;
use crate::value::{NodeId, PropertyValue};

/// Path prefix of every engine endpoint.
pub const API_ROOT: &str = "/db/data";

/// Answer to `GET /db/data/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRoot {
    /// Engine name.
    pub engine: String,
    /// Engine version.
    pub version: String,
}

/// Body of `POST /db/data/index/node`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIndexRequest {
    /// Index to create.
    pub name: String,
}

/// Query string of an exact index lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexLookup {
    /// Index key.
    pub key: String,
    /// Value to match.
    pub value: String,
}

/// Query string naming one node property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyQuery {
    /// Property name.
    pub name: String,
}

/// Answer to opening a server-side transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TxBegun {
    /// Id used in the transaction's endpoints.
    pub id: u64,
}

/// One step of an interactive transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TxOp {
    /// Creates an empty node.
    CreateNode,
    /// Sets one property.
    SetProperty {
        /// Node to write.
        node: NodeId,
        /// Property name.
        name: String,
        /// New value.
        value: PropertyValue,
    },
    /// Deletes a node and its index entries.
    DeleteNode {
        /// Node to delete.
        node: NodeId,
    },
    /// Registers a node in an index.
    IndexAdd {
        /// Target index.
        index: String,
        /// Node to register.
        node: NodeId,
        /// Index key.
        key: String,
        /// Indexed value.
        value: String,
    },
    /// Removes a node's index entry.
    IndexRemove {
        /// Target index.
        index: String,
        /// Node to unregister.
        node: NodeId,
        /// Index key.
        key: String,
        /// Indexed value.
        value: String,
    },
}

/// Answer to one [`TxOp`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TxOpResponse {
    /// Id of the node created by `create_node`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
}

/// Answer to a batch request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Per job, the node it created.
    pub nodes: Vec<Option<NodeId>>,
}

/// Error body returned with every non-2xx answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error kind, as returned by `GraphBenchError::kind`.
    pub kind: String,
    /// Human-readable detail.
    pub detail: String,
}

impl ErrorBody {
    /// Encodes a server-side error.
    pub fn from_error(err: &GraphBenchError) -> Self {
        let detail = match err {
            GraphBenchError::NotFound(detail)
            | GraphBenchError::MissingField(detail)
            | GraphBenchError::IndexExists(detail)
            | GraphBenchError::InvalidArgument(detail)
            | GraphBenchError::Conflict(detail) => detail.clone(),
            other => other.to_string(),
        };
        Self {
            kind: err.kind().to_string(),
            detail,
        }
    }

    /// Rebuilds the error on the client side of the wire.
    pub fn into_error(self, status: u16) -> GraphBenchError {
        match self.kind.as_str() {
            "not_found" => GraphBenchError::NotFound(self.detail),
            "missing_field" => GraphBenchError::MissingField(self.detail),
            "index_exists" => GraphBenchError::IndexExists(self.detail),
            "invalid_argument" => GraphBenchError::InvalidArgument(self.detail),
            "conflict" => GraphBenchError::Conflict(self.detail),
            "closed" => GraphBenchError::Closed,
            "unsupported" => GraphBenchError::Unsupported("remote engine operation"),
            _ => GraphBenchError::Remote {
                status,
                message: self.detail,
            },
        }
    }
}

/// HTTP status the engine answers with for `err`.
pub fn status_code(err: &GraphBenchError) -> u16 {
    match err {
        GraphBenchError::NotFound(_) | GraphBenchError::MissingField(_) => 404,
        GraphBenchError::IndexExists(_) | GraphBenchError::Conflict(_) => 409,
        GraphBenchError::InvalidArgument(_) | GraphBenchError::Serialization(_) => 400,
        GraphBenchError::Unsupported(_) => 501,
        GraphBenchError::Closed => 503,
        _ => 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_op_is_tagged() {
        let op = TxOp::DeleteNode { node: 9 };
        assert_eq!(
            serde_json::to_string(&op).unwrap(),
            r#"{"op":"delete_node","node":9}"#
        );
        let create: TxOp = serde_json::from_str(r#"{"op":"create_node"}"#).unwrap();
        assert_eq!(create, TxOp::CreateNode);
    }

    #[test]
    fn error_kinds_survive_the_wire() {
        let sent = GraphBenchError::IndexExists("node_index".into());
        let body = ErrorBody::from_error(&sent);
        let json = serde_json::to_string(&body).unwrap();
        let received: ErrorBody = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            received.into_error(status_code(&sent)),
            GraphBenchError::IndexExists(name) if name == "node_index"
        ));
    }

    #[test]
    fn unknown_kind_becomes_remote_error() {
        let body = ErrorBody {
            kind: "io".into(),
            detail: "disk full".into(),
        };
        assert!(matches!(
            body.into_error(500),
            GraphBenchError::Remote { status: 500, .. }
        ));
    }
}
