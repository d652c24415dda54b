//! Reversion: rebuild an object's version history across two S3-compatible sites.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use reversion_core::config::{Config, LogFormat};
use reversion_reconcile::{
    EventSink, Migration, MigrationEvent, MigrationOutcome, MigrationPlan, MigrationReport,
    NoopSink, Sites,
};
use reversion_s3::S3SiteClient;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli;

use cli::{Cli, Commands, MigrateArgs, OutputFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate(args) => run_migrate(*args).await,
        Commands::Version => {
            println!("reversion {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_migrate(args: MigrateArgs) -> Result<()> {
    // Load configuration and apply CLI overrides
    let mut config = load_config(&args.config)?;
    args.apply(&mut config);

    init_logging(&config)?;
    config.validate().context("Invalid configuration")?;

    let primary =
        S3SiteClient::new(&config.site1).context("Failed to create Site1 client")?;
    let secondary =
        S3SiteClient::new(&config.site2).context("Failed to create Site2 client")?;
    let sites = Sites::new(Arc::new(primary), Arc::new(secondary));

    let plan = MigrationPlan::from_config(&config).with_dry_run(args.dry_run);
    let events: Arc<dyn EventSink> = match args.format {
        OutputFormat::Text => Arc::new(ConsoleSink),
        OutputFormat::Json => Arc::new(NoopSink),
    };

    let migration = Migration::new(sites, plan, events);
    info!(
        batch = %migration.batch().id(),
        site1 = %config.site1.endpoint,
        site2 = %config.site2.endpoint,
        "Prepared migration"
    );

    let report = match migration.run().await {
        Ok(report) => report,
        Err(e) => {
            if e.is_destructive() {
                error!(
                    batch = %migration.batch().id(),
                    scratch_dir = %config.staging.scratch_dir.display(),
                    "Migration stopped after sites were modified; staged versions are kept"
                );
            }
            return Err(e).with_context(|| {
                format!("Migration of {}/{} failed", config.target.bucket, config.target.object)
            });
        }
    };

    match args.format {
        OutputFormat::Text => print_summary(&report),
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
            println!("{json}");
        }
    }

    Ok(())
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    Config::load(path.as_deref()).context("Failed to load configuration")
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    // Progress and reports own stdout.
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry().with(filter).with(fmt_layer.json()).init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
    }

    Ok(())
}

/// Prints each event as an operator-facing line.
struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: &MigrationEvent) {
        println!("{event}");
    }
}

fn print_summary(report: &MigrationReport) {
    if report.outcome != MigrationOutcome::Completed {
        return;
    }

    println!();
    println!("  Batch:     {}", report.batch_id);
    println!("  Object:    {}/{}", report.bucket, report.object);
    println!("  Replayed:  {} versions", report.replayed.len());
    if let Some(manifest) = &report.manifest {
        println!("  Manifest:  {}", manifest.display());
    }
    for path in &report.staged_files {
        println!("  Staged:    {}", path.display());
    }
}
