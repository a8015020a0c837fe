use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use preview_hub::config::{FileConfig, HubConfig, HubDirs, load_config};
use preview_hub::{AppState, build_router};

#[derive(Parser)]
#[command(name = "preview-hub")]
#[command(about = "Live multi-viewer preview workspaces")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to ~/.preview_hub)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server in the foreground (default)
    Serve(ServerArgs),

    /// Print the resolved configuration as TOML
    Config,
}

#[derive(Parser, Default)]
struct ServerArgs {
    /// Port for the web server (overrides [server] port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides [server] host)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = HubDirs::new(cli.data_dir)?;
    let file_config: FileConfig = load_config(&dirs.data_dir)
        .extract()
        .with_context(|| format!("Invalid configuration in {:?}", dirs.config_toml_path()))?;

    match cli.command {
        None => run_server(ServerArgs::default(), dirs, file_config).await,
        Some(Commands::Serve(args)) => run_server(args, dirs, file_config).await,
        Some(Commands::Config) => print_config(&dirs, file_config),
    }
}

fn print_config(dirs: &HubDirs, mut file_config: FileConfig) -> Result<()> {
    file_config
        .workspace
        .root
        .get_or_insert_with(|| dirs.default_workspace_root());
    let rendered =
        toml::to_string_pretty(&file_config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}

async fn run_server(args: ServerArgs, dirs: HubDirs, mut file_config: FileConfig) -> Result<()> {
    // Setup logging
    let default_directive = if args.debug {
        "preview_hub=debug,proc_manager=debug,tower_http=debug,info"
    } else {
        "preview_hub=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting Preview Hub");

    if let Some(host) = args.host {
        file_config.server.host = host;
    }
    if let Some(port) = args.port {
        file_config.server.port = port;
    }

    let config = HubConfig::from_file(&file_config, &dirs);
    std::fs::create_dir_all(&config.workspace.root).with_context(|| {
        format!(
            "Failed to create workspace root: {}",
            config.workspace.root.display()
        )
    })?;

    info!(
        "Workspace root: {} (idle grace {}s, capture limit {}KB)",
        config.workspace.root.display(),
        config.workspace.idle_grace.as_secs(),
        config.supervisor.max_capture_bytes / 1024
    );

    let state = AppState::new(&config);
    let app = build_router(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port)
        .parse::<SocketAddr>()
        .context("Invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Preview Hub listening on http://{}", actual_addr);
    info!("API endpoints:");
    info!("  GET    /api/previews/:id/ws        - WebSocket for a workspace");
    info!("  PUT    /api/previews/:id/files     - Write a file");
    info!("  POST   /api/previews/:id/execute   - Start a process");
    info!("  GET    /preview/:id/               - Serve workspace files");

    // Create shutdown signal handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    // Run server with graceful shutdown
    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    info!("Stopping running processes...");
    state.shutdown().await;

    info!("Shutdown complete");
    server_result
}
