//! Binary entry point for the graphbench engine server.
#![forbid(unsafe_code)]

use std::error::Error;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use graphbench::config::DEFAULT_INDEX;
use graphbench::logging::{init_logging, DEFAULT_DIRECTIVE};
use graphbench::server::{self, ServerOptions};

#[derive(Parser, Debug)]
#[command(
    name = "graphbench-server",
    version,
    about = "HTTP graph engine for the REMOTE and REMOTE_BATCH benchmark modes"
)]
struct Cli {
    #[arg(
        long,
        value_name = "DIR",
        env = "GRAPHBENCH_PATH",
        help = "Store directory; omit to keep the graph in memory"
    )]
    path: Option<PathBuf>,

    #[arg(
        long,
        value_name = "HOST",
        default_value = "127.0.0.1",
        help = "Bind address host"
    )]
    host: IpAddr,

    #[arg(long, value_name = "PORT", default_value_t = 7474, help = "Bind port")]
    port: u16,

    #[arg(
        long = "index",
        value_name = "NAME",
        default_values_t = [DEFAULT_INDEX.to_string()],
        help = "Node index to create at startup (repeatable)"
    )]
    indexes: Vec<String>,

    #[arg(
        long,
        value_name = "FILTER",
        env = "RUST_LOG",
        default_value = DEFAULT_DIRECTIVE,
        help = "Log filter directive"
    )]
    log_level: String,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let options = ServerOptions {
        path: cli.path,
        host: cli.host,
        port: cli.port,
        indexes: cli.indexes,
    };
    if let Err(err) = server::serve(options).await {
        eprintln!("engine server terminated: {err}");
        return Err(Box::new(err));
    }
    Ok(())
}
