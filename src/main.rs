//! # Order Metrics Entry Point
//!
//! ```bash
//! # Serve the read API (default)
//! order-metrics
//!
//! # Ingest, aggregate and summarize orders created since a date
//! order-metrics run --since 2025-01-01
//!
//! # Rebuild daily rows for a range from stored orders
//! order-metrics aggregate --start 2025-01-01 --end 2025-01-31
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use order_metrics::aggregation::{self, DateRange};
use order_metrics::config::{AppConfig, ConfigLoader};
use order_metrics::connectors::ShopifyOrderSource;
use order_metrics::ingest::{IngestWindow, OrderIngestor};
use order_metrics::pipeline::{Pipeline, RunRequest, RunStatus};
use order_metrics::reconciliation::{self, ReferenceTotals};
use order_metrics::repositories::CustomerFirstOrderRepository;
use order_metrics::{db, server, telemetry};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Order-to-financial-metrics pipeline and read API
#[derive(Parser, Debug)]
#[command(name = "order-metrics")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the read API
    Serve,
    /// Ingest a window, then rebuild daily rows and the summary
    Run(RunArgs),
    /// Ingest a window without aggregating
    Ingest(WindowArgs),
    /// Rebuild daily rows for a date range from stored orders
    Aggregate(RangeArgs),
    /// Rebuild the product summary from daily rows
    Summarize(SummarizeArgs),
    /// Compare daily totals with reference totals from a JSON file
    Reconcile(ReconcileArgs),
    /// Rebuild the customer first-order index from stored orders
    RebuildCustomers,
    /// Apply pending database migrations
    Migrate,
}

impl Command {
    /// Whether the command talks to the upstream store.
    fn needs_upstream(&self) -> bool {
        match self {
            Self::Run(args) => !args.no_ingest,
            Self::Ingest(_) => true,
            _ => false,
        }
    }
}

#[derive(Args, Debug)]
struct WindowArgs {
    /// Earliest order creation time (RFC 3339 or YYYY-MM-DD, UTC)
    #[arg(long, value_parser = parse_instant)]
    since: DateTime<Utc>,
    /// Latest order creation time (RFC 3339 or YYYY-MM-DD, UTC)
    #[arg(long, value_parser = parse_instant)]
    until: Option<DateTime<Utc>>,
}

impl WindowArgs {
    fn window(&self) -> IngestWindow {
        IngestWindow {
            start: self.since,
            end: self.until,
        }
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    window: WindowArgs,
    /// Skip ingestion and only rebuild derived tables for the window
    #[arg(long)]
    no_ingest: bool,
    /// Reference day for summary windows (default: today, UTC)
    #[arg(long)]
    today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct RangeArgs {
    #[arg(long)]
    start: NaiveDate,
    #[arg(long)]
    end: NaiveDate,
}

#[derive(Args, Debug)]
struct SummarizeArgs {
    #[arg(long)]
    today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    #[command(flatten)]
    range: RangeArgs,
    /// JSON file with reference totals
    #[arg(long)]
    reference: PathBuf,
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
        .map_err(|_| format!("expected RFC 3339 timestamp or YYYY-MM-DD, got {value:?}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Token cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping");
            trigger.cancel();
        }
    });
    token
}

fn range(args: &RangeArgs) -> Result<DateRange> {
    Ok(DateRange::new(args.start, args.end)?)
}

fn order_source(config: &AppConfig) -> Result<Arc<ShopifyOrderSource>> {
    config.validate_for_ingest()?;
    Ok(Arc::new(ShopifyOrderSource::from_config(&config.shopify)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load().context("loading configuration")?;
    telemetry::init_tracing(&config)?;
    if let Ok(redacted) = config.redacted_json() {
        tracing::info!(profile = %config.profile, config = %redacted, "Configuration loaded");
    }

    let command = cli.command.unwrap_or(Command::Serve);
    // Missing credentials fail before the database is opened or migrated.
    let source = if command.needs_upstream() {
        Some(order_source(&config)?)
    } else {
        None
    };

    let db = db::init_pool(&config).await?;
    if !matches!(command, Command::Migrate) {
        db::run_migrations(&db).await?;
    }
    let cancel = shutdown_token();

    match command {
        Command::Serve => server::run_server(config, db, cancel).await,
        Command::Migrate => db::run_migrations(&db).await,
        Command::Run(args) => {
            let mut pipeline = Pipeline::new(db, config.clone());
            let mut request = RunRequest::new(args.window.window());
            request.today = args.today;
            match source {
                Some(source) => pipeline = pipeline.with_source(source),
                None => request.ingest = false,
            }
            let report = pipeline.run(request, cancel).await;
            print_json(&report)?;
            match report.status {
                RunStatus::Failed => bail!("pipeline run failed"),
                RunStatus::Locked => bail!("another run holds the sync lock"),
                _ => Ok(()),
            }
        }
        Command::Ingest(args) => {
            let source = source.context("ingestion needs an order source")?;
            let ingestor = OrderIngestor::new(db, source, &config);
            let report = ingestor.ingest(args.window(), &cancel).await;
            print_json(&report)
        }
        Command::Aggregate(args) => {
            let report =
                aggregation::aggregate_daily(&db, range(&args)?, &config.metrics_policy).await?;
            print_json(&report)
        }
        Command::Summarize(args) => {
            let today = args.today.unwrap_or_else(|| Utc::now().date_naive());
            let report =
                aggregation::summarize_products(&db, today, &config.metrics_policy).await?;
            print_json(&report)
        }
        Command::RebuildCustomers => {
            let customers = CustomerFirstOrderRepository::new(db).rebuild().await?;
            print_json(&serde_json::json!({ "customers_indexed": customers }))
        }
        Command::Reconcile(args) => {
            let raw = std::fs::read_to_string(&args.reference)
                .with_context(|| format!("reading {}", args.reference.display()))?;
            let reference: ReferenceTotals =
                serde_json::from_str(&raw).context("parsing reference totals")?;
            let report =
                reconciliation::compare_against_reference(&db, range(&args.range)?, &reference)
                    .await?;
            print_json(&report)
        }
    }
}
