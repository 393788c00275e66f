use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use paperflow::config::{self, Config, LogFormat};
use paperflow::db::Database;
use paperflow::{AppState, api};

#[derive(Parser)]
#[command(name = "paperflow", version, about = "Offer, order and invoice backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Overrides BIND_ADDR
        #[arg(long)]
        bind: Option<String>,
    },
    /// Apply the database migrations and exit
    Migrate,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("paperflow=info,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Compact => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
    }
}

async fn serve(config: Config, bind: Option<String>) -> Result<()> {
    let addr = bind.unwrap_or_else(|| config.bind_addr.clone());
    let state = AppState::from_config(config).await?;
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "paperflow listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn migrate(config: Config) -> Result<()> {
    let db = Database::new(&config).await?;
    db.migrate().await?;
    tracing::info!("migrations applied");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init()?;
    init_tracing(config.log_format);

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Migrate => migrate(config).await,
    }
}
