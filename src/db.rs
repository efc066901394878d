//! Benchmark-facing client contract.

use std::fmt;

use crate::error::{GraphBenchError, Result};
use crate::value::{FieldMap, FieldSet};

/// Outcome of a client operation as the benchmark driver sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The operation succeeded.
    Ok,
    /// The operation failed; details were logged.
    Error,
    /// No record is stored under the key.
    NotFound,
    /// `init` has not completed successfully.
    NotInitialized,
    /// The configured scan policy does not support the operation.
    NotImplemented,
}

impl Status {
    /// Numeric code: `0` on success, `1` otherwise.
    pub const fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            _ => 1,
        }
    }

    /// Whether this is [`Status::Ok`].
    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }

    /// Upper-case name used in driver reports.
    pub const fn name(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Error => "ERROR",
            Status::NotFound => "NOT_FOUND",
            Status::NotInitialized => "NOT_INITIALIZED",
            Status::NotImplemented => "NOT_IMPLEMENTED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&GraphBenchError> for Status {
    fn from(err: &GraphBenchError) -> Self {
        match err {
            GraphBenchError::NotInitialized => Status::NotInitialized,
            GraphBenchError::Unsupported(_) => Status::NotImplemented,
            _ => Status::Error,
        }
    }
}

/// Operations a benchmark driver invokes on one client.
///
/// Each client is driven by one thread at a time. Failures are reported as
/// a [`Status`] and logged, never raised.
pub trait Db {
    /// Reads configuration and acquires the connection.
    fn init(&mut self) -> Result<()>;

    /// Releases the connection. Never fails.
    fn cleanup(&mut self);

    /// Stores a new record.
    fn insert(&mut self, key: &str, values: &FieldMap) -> Status;

    /// Fills `result` with the requested fields of `key`; `None` selects the
    /// mode's default.
    fn read(&mut self, key: &str, fields: Option<&FieldSet>, result: &mut FieldMap) -> Status;

    /// Overwrites the given fields of an existing record.
    fn update(&mut self, key: &str, values: &FieldMap) -> Status;

    /// Removes the record and its index entry.
    fn delete(&mut self, key: &str) -> Status;

    /// Appends up to `count` records whose keys sort at or after `start`.
    fn scan(
        &mut self,
        start: &str,
        count: usize,
        fields: Option<&FieldSet>,
        result: &mut Vec<FieldMap>,
    ) -> Status;
}
