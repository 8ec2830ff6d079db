use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use sqlite_explorer::{
    config::Config, llm::ProviderConnector, routes::create_router, utils::init_logger, AppState,
};

#[derive(Parser, Debug)]
#[command(name = "sqlite-explorer")]
#[command(about = "Upload a SQLite database and query it in natural language")]
struct Cli {
    /// Address to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for rolling log files (overrides LOG_DIR)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_env()?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(log_dir) = cli.log_dir {
        config.server.log_dir = Some(log_dir);
    }

    let _guard = init_logger(config.server.log_dir.as_deref());
    info!(
        host = %config.server.host,
        port = config.server.port,
        provider = %config.llm.provider,
        model = %config.llm.model,
        "Configuration loaded"
    );

    let state = AppState::new(config.clone(), Arc::new(ProviderConnector));
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
