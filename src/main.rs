use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcp_thought_tree::{
    cli::{self, Commands},
    clock::{Clock, SystemClock},
    config::{Config, LogFormat},
    engine::ThinkingEngine,
    server::{spawn_cleanup_task, AppState, McpServer},
    storage::{SnapshotStore, SqliteStorage},
};

/// MCP server that tracks reasoning sessions as thought trees.
#[derive(Parser, Debug)]
#[command(name = "mcp-thought-tree", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::CheckConfig => exit_with(cli::execute_check_config(&config)),
        Commands::Snapshots { command } => {
            let storage = match SqliteStorage::new(&config.database).await {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Failed to open snapshot database: {}", e);
                    std::process::exit(1);
                }
            };
            let result =
                cli::execute_snapshot_command(command, &storage, SystemClock.now_ms()).await;
            exit_with(result)
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "MCP Thought Tree Server starting..."
    );

    let engine = ThinkingEngine::new(&config, Arc::new(SystemClock))?;

    // Initialize storage
    let storage: Option<Arc<dyn SnapshotStore>> = match &config.database.path {
        Some(path) => match SqliteStorage::new(&config.database).await {
            Ok(s) => {
                info!(path = %path.display(), "Snapshot database initialized");
                Some(Arc::new(s))
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize snapshot database");
                return Err(e.into());
            }
        },
        None => {
            info!("Snapshot persistence disabled");
            None
        }
    };

    // Create application state
    let state = Arc::new(AppState::new(config, engine, storage));

    if let Err(e) = state.restore_from_storage().await {
        warn!(error = %e, "Failed to restore sessions, starting empty");
    }

    let cleanup = spawn_cleanup_task(state.clone());

    // Start MCP server
    let server = McpServer::new(state.clone());

    info!("Server ready, waiting for requests on stdin...");

    let result = server.run().await;
    cleanup.abort();
    state.sync_removed();
    state.flush_snapshots().await;

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

fn exit_with(result: cli::CliResult) -> anyhow::Result<()> {
    if result.exit_code == 0 {
        println!("{}", result.message);
        Ok(())
    } else {
        eprintln!("{}", result.message);
        std::process::exit(result.exit_code);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
