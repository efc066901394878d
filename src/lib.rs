//! Graph-store bindings for key-value benchmark workloads.
//!
//! A [`GraphClient`] maps records (a key plus named byte fields) onto graph
//! nodes located through a node index, and runs every mutation in its own
//! transaction. Three modes are supported: an in-process engine shared by
//! all clients of the process, and an HTTP engine driven either step by
//! step or with single-request batches.

pub mod accessor;
pub mod client;
pub mod config;
pub mod connector;
pub mod db;
pub mod engine;
pub mod error;
pub mod graph;
pub mod index;
pub mod logging;
pub mod remote;
pub mod server;
pub mod txn;
pub mod value;

pub use client::GraphClient;
pub use config::{BindingConfig, ConfigError, Mode, ScanPolicy};
pub use connector::{Connector, SharedConnection};
pub use db::{Db, Status};
pub use engine::EmbeddedGraph;
pub use error::{GraphBenchError, Result};
pub use remote::RemoteGraph;
pub use value::{FieldMap, FieldSet, FieldValue};
