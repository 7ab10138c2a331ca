use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leadgenie::{
    config::Config,
    ingest::{parse_upload, require_leads},
    library::FileLibraryStore,
    routes::create_router,
    sheets::SheetsClient,
    stats::StatsResponse,
    AppState,
};

#[derive(Parser)]
#[command(name = "leadgenie", about = "Lead pipeline backend for imported spreadsheets")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (default)
    Serve,
    /// Import a file or shared sheet once and print its funnel statistics
    Inspect {
        /// CSV or spreadsheet file to read
        #[arg(short, long, conflicts_with = "url")]
        file: Option<PathBuf>,

        /// Google Sheets share URL
        #[arg(short, long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadgenie=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Inspect { file, url } => inspect(config, file, url).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(path = %config.library.data_dir.display(), "Using library directory");
    let library = Arc::new(FileLibraryStore::with_path(config.library.data_dir.clone()));

    let state = AppState::new(config.clone(), library);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid HOST/PORT")?;
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

async fn inspect(config: Config, file: Option<PathBuf>, url: Option<String>) -> anyhow::Result<()> {
    let leads = match (file, url) {
        (Some(path), _) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            parse_upload(&path.to_string_lossy(), None, &bytes)?
        }
        (None, Some(url)) => {
            SheetsClient::from_config(&config.sheets)
                .fetch_leads_from_url(&url)
                .await?
        }
        (None, None) => anyhow::bail!("inspect needs --file or --url"),
    };
    let leads = require_leads(leads)?;

    let report = StatsResponse::new(None, &leads);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
