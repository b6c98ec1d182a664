//! respkv - A Single-Threaded In-Memory Key-Value Server
//!
//! This is the main entry point for the respkv server.
//! It loads the snapshot, binds the listener and serves clients until Ctrl+C.

use anyhow::Context;
use respkv::commands::CommandHandler;
use respkv::config::{parse_args, CliAction, Config};
use respkv::server::Server;
use respkv::storage::{ExpiryConfig, ExpirySweeper, Keyspace, SnapshotStore};
use std::net::SocketAddr;
use tokio::signal;
use tokio::task::LocalSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
respkv - A Single-Threaded In-Memory Key-Value Server

USAGE:
    respkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>        Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>        Port to listen on (default: 6379)
    -s, --snapshot <PATH>    Snapshot file for SAVE and startup (default: dump.rkv)
        --log-level <LEVEL>  Log filter when RUST_LOG is unset (default: info)
        --active-expiry      Reclaim expired keys in the background
    -v, --version            Print version information
        --help               Print this help message

EXAMPLES:
    respkv                         # Start on 127.0.0.1:6379
    respkv --port 6380             # Start on port 6380
    respkv -s /var/lib/respkv.rkv  # Use a different snapshot file

CONNECTING:
    Use redis-cli or any RESP client to connect:
    $ redis-cli -p 6379
    127.0.0.1:6379> PING
    "PONG"
    127.0.0.1:6379> SET name "Ariz" EX 60
    "OK"
    127.0.0.1:6379> GET name
    "Ariz"
"#
    );
}

fn print_banner(config: &Config, addr: SocketAddr) {
    println!(
        r#"
respkv v{} - Single-Threaded In-Memory Key-Value Server
──────────────────────────────────────────────────────────────
Server started on {}
Snapshot file: {}
Ready to accept connections.

Use Ctrl+C to shutdown.
"#,
        respkv::VERSION,
        addr,
        config.snapshot_path.display()
    );
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = match parse_args(std::env::args().skip(1)) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("respkv version {}", respkv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    init_logging(&config.log_level);

    // Connection tasks hold `Rc`s, so everything runs on this one thread.
    LocalSet::new().run_until(serve(config)).await
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let snapshots = SnapshotStore::new(&config.snapshot_path);
    let mut keyspace = Keyspace::new();
    snapshots.load_into(&mut keyspace).with_context(|| {
        format!(
            "failed to load snapshot from {}",
            config.snapshot_path.display()
        )
    })?;
    let keyspace = keyspace.into_shared();

    let _sweeper = config
        .active_expiry
        .then(|| ExpirySweeper::start(keyspace.clone(), ExpiryConfig::default()));

    let handler = CommandHandler::new(keyspace, snapshots);
    let server = Server::bind(config.bind_address(), handler)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;

    print_banner(&config, server.local_addr()?);

    server.run(shutdown_signal()).await;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}
