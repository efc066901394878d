//! Process-wide `tracing` subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{GraphBenchError, Result};

/// Filter used when neither `--log-level` nor `RUST_LOG` is given. Only
/// this crate's events are shown, at `info` and above.
pub const DEFAULT_DIRECTIVE: &str = "graphbench=info";

/// Installs a global `fmt` subscriber filtered by `level`, an
/// `EnvFilter` directive such as `info` or `graphbench=debug`.
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| GraphBenchError::InvalidArgument(format!("Invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| GraphBenchError::InvalidArgument("Logging already initialized".into()))
}
