//! leadsignal: HTTP server + CLI entrypoint for the distress-lead
//! intelligence core.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leadsignal_core::api::{self, AppState};
use leadsignal_core::config::Config;
use leadsignal_core::middleware::{rate_limit_middleware, RateLimitConfig, RateLimitLayer};
use leadsignal_core::models::EventLog;
use leadsignal_core::orchestrator;
use leadsignal_core::store::sqlite::SqliteRepository;
use leadsignal_core::vendor::propertyradar::PropertyRadarClient;

/// `leadsignal serve` runs the HTTP API; `leadsignal bulk-seed` runs a
/// one-shot pull outside the HTTP boundary, for cron invocation without a
/// loopback call to its own server.
#[derive(Parser, Debug)]
#[command(name = "leadsignal")]
#[command(about = "Distress-lead ingestion, scoring, and lifecycle core")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP ingest API (default when no subcommand is given).
    Serve,
    /// Run a bulk-seed pull directly, without the HTTP boundary.
    BulkSeed {
        #[arg(long, default_value = "200")]
        limit: u32,
        #[arg(long, value_delimiter = ',')]
        counties: Vec<String>,
    },
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("leadsignal_core={log_level},tower_http=info").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn build_state(cfg: &Config) -> Result<AppState> {
    let repo = Arc::new(SqliteRepository::new(&cfg.database_path).context("failed to open sqlite store")?);
    let vendor = Arc::new(PropertyRadarClient::new(cfg.vendor_api_key.clone().unwrap_or_default()));
    Ok(AppState { repo, vendor, config: Arc::new(cfg.clone()) })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::from_env().context("failed to load configuration")?;
    init_tracing(&cfg.log_level);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        Command::BulkSeed { limit, counties } => run_bulk_seed(cfg, limit, counties).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    info!("leadsignal starting");

    let bind_addr = cfg.bind_addr.clone();
    let state = build_state(&cfg).await?;
    let limiter = RateLimitLayer::new(RateLimitConfig::default());

    let app = api::router()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(axum::middleware::from_fn(leadsignal_core::middleware::request_logging_simple));

    let addr: SocketAddr = bind_addr.parse().context("invalid BIND_ADDR")?;
    let listener = TcpListener::bind(addr).await.context("failed to bind")?;
    info!(%addr, "ingest api listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;

    Ok(())
}

async fn run_bulk_seed(cfg: Config, limit: u32, counties: Vec<String>) -> Result<()> {
    let state = build_state(&cfg).await?;
    let request = orchestrator::BulkSeedRequest { limit, counties };

    let result = orchestrator::bulk_seed(
        state.repo.as_ref(),
        state.vendor.as_ref(),
        cfg.elite_cutoff,
        request,
        EventLog::system_actor(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("bulk seed failed: {e}"))?;

    info!(
        inserted = result.inserted,
        updated = result.updated,
        errored = result.errored,
        above_cutoff = result.above_cutoff,
        top_score = result.top_score,
        elapsed_ms = result.elapsed_ms,
        "bulk seed complete"
    );

    Ok(())
}
