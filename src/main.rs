use anyhow::Context;
use clap::{Parser, Subcommand};
use inflation_ingest::config::Config;
use inflation_ingest::constants::default_layouts;
use inflation_ingest::logging;
use inflation_ingest::pipeline::run_ingestion;
use inflation_ingest::server::{start_server, AppState};
use inflation_ingest::storage::Store;
use inflation_ingest::types::parse_series;
use inflation_ingest::workbook::ReqwestWorkbookSource;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "inflation_ingest")]
#[command(about = "ONS inflation workbook ingester")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the workbook and upsert every indicator
    Ingest,
    /// Serve the ingestion trigger and read endpoints
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print stored rows of one series as JSON
    Query {
        /// CPI, CPIH or RPI
        #[arg(long)]
        indicator: String,
        /// Observation, TwelveMonthPercentageChange or OneMonthPercentageChange
        #[arg(long)]
        variant: String,
        #[arg(long, default_value_t = 1900)]
        start_year: i32,
    },
    /// List recent ingestion runs
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::load().context("loading configuration")?;
    logging::init_logging(&config.logging);

    match cli.command {
        Commands::Ingest => {
            let source =
                ReqwestWorkbookSource::new(config.source.url.clone(), config.source.timeout_seconds)?;
            match run_ingestion(&source, config.database.path.clone(), &default_layouts()).await {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                Err(e) => {
                    error!("Ingestion failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            let metrics = match metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
            {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!("Failed to install Prometheus recorder: {}", e);
                    None
                }
            };
            let source =
                ReqwestWorkbookSource::new(config.source.url.clone(), config.source.timeout_seconds)?;
            let state = Arc::new(AppState {
                db_path: config.database.path.clone(),
                source: Arc::new(source),
                layouts: default_layouts(),
                metrics,
            });
            info!(port = config.server.port, "starting server");
            start_server(&config, state).await?;
        }
        Commands::Query {
            indicator,
            variant,
            start_year,
        } => {
            let (indicator, variant) = parse_series(&indicator, &variant)?;
            let store = Store::open(&config.database.path)
                .with_context(|| format!("opening {}", config.database.path.display()))?;
            let rows = store.select_series(indicator, variant, start_year)?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Commands::Runs { limit } => {
            let store = Store::open(&config.database.path)?;
            let runs = store.recent_runs(limit)?;
            println!("{}", serde_json::to_string_pretty(&runs)?);
        }
    }
    Ok(())
}
