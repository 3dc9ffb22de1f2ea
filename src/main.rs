//! memlru - A memcached-Compatible LRU Cache Server
//!
//! This is the main entry point for the memlru server.
//! It sets up the TCP listener, storage engine, and handles incoming connections.

use memlru::commands::CommandHandler;
use memlru::config::{CliAction, Config};
use memlru::connection::{handle_connection, ConnectionStats};
use memlru::storage::{ExpiryTask, StorageEngine};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
memlru - A memcached-Compatible LRU Cache Server

USAGE:
    memlru [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 9000)
    -l, --limit <N>      Maximum number of cached items (default: 100)
    -v, --version        Print version information
        --help           Print this help message

EXAMPLES:
    memlru                         # Start on 127.0.0.1:9000
    memlru --port 11211            # Start on port 11211
    memlru --limit 10000           # Keep up to 10000 items

CONNECTING:
    Use telnet, nc or any memcached client:
    $ nc 127.0.0.1 9000
    set name 0 0 4
    Ariz
    STORED
    get name
    VALUE name 0 4
    Ariz
    END
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
memlru v{} - memcached-Compatible LRU Cache
──────────────────────────────────────────────
Server started on {}
Item limit: {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        memlru::VERSION,
        config.bind_address(),
        config.limit
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = match Config::from_env() {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::PrintHelp) => {
            print_help();
            return Ok(());
        }
        Ok(CliAction::PrintVersion) => {
            println!("memlru version {}", memlru::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // Set up logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Print the banner
    print_banner(&config);

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::with_limit(config.limit));
    info!(limit = config.limit, "Storage engine initialized");

    // Start the background expiration task
    let _expiry = ExpiryTask::start(Arc::clone(&storage));

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, storage, stats) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&stats));
                let stats = Arc::clone(&stats);

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
