use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcp_compatibility_assessment::{
    cli::{execute_preview, Commands},
    config::{Config, LogFormat},
    langbase::{DisabledRunner, LangbaseClient, PipeRunner},
    server::{AppState, McpServer},
    storage::SqliteStorage,
};

/// Couple compatibility assessment MCP server.
#[derive(Parser, Debug)]
#[command(name = "mcp-compatibility-assessment", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Preview { file, compact } => {
            let result = execute_preview(&file, compact);
            if result.exit_code == 0 {
                println!("{}", result.message);
            } else {
                eprintln!("{}", result.message);
            }
            std::process::exit(result.exit_code);
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "MCP compatibility assessment server starting..."
    );

    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let runner = build_runner(&config).await?;

    let state = Arc::new(AppState::new(config, storage, runner));
    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Langbase client when a key is configured; otherwise every AI call falls back.
async fn build_runner(config: &Config) -> anyhow::Result<Arc<dyn PipeRunner>> {
    if !config.assessment.ai_enabled {
        warn!("LANGBASE_API_KEY not set or AI disabled, using deterministic fallbacks only");
        return Ok(Arc::new(DisabledRunner));
    }

    let langbase = match LangbaseClient::new(&config.langbase, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.langbase.base_url, "Langbase client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Langbase client");
            return Err(e.into());
        }
    };

    // Pipe setup failures are not fatal; calls will fail and fall back
    info!("Ensuring assessment pipes exist...");
    if let Err(e) = langbase.ensure_assessment_pipes(&config.pipes).await {
        warn!(error = %e, "Failed to ensure assessment pipes, continuing");
    }

    Ok(Arc::new(langbase))
}

/// Initialize tracing/logging on stderr; stdout carries the MCP channel
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
