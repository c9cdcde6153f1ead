use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod compute;
mod config;
mod daily;
mod extract;
mod models;
mod render;
mod stages;
mod warehouse;

use crate::api::ApiState;
use crate::config::Settings;
use crate::warehouse::{PgWarehouse, QueryRunner};

#[derive(Parser)]
#[command(name = "trend-pipeline")]
#[command(about = "GitHub trend pipeline: daily warehouse recompute and read API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the warehouse schemas and output tables
    Setup {
        #[arg(long)]
        dry_run: bool,
        #[arg(long, default_value = "sql")]
        sql_root: PathBuf,
    },
    /// Copy one day of source events into the raw layer
    Extract {
        #[arg(long)]
        date: NaiveDate,
    },
    /// Rebuild staging, model and mart relations from the raw layer
    Transform {
        #[arg(long)]
        dry_run: bool,
        #[arg(long, default_value = "sql")]
        sql_root: PathBuf,
    },
    /// Recompute alerts and the daily summary for one date
    Compute {
        #[arg(long)]
        date: NaiveDate,
    },
    /// Run extract, transform and compute for yesterday (UTC)
    RunDaily {
        #[arg(long, default_value = "sql")]
        sql_root: PathBuf,
    },
    /// Serve the read-only query API
    Serve {
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to the warehouse")?;

    match cli.command {
        Commands::Setup { dry_run, sql_root } => {
            let warehouse = PgWarehouse::new(pool, &settings);
            let runner = QueryRunner::new(warehouse, &settings);
            stages::run_stages(&runner, &sql_root, stages::SETUP_STAGES, dry_run).await?;
        }
        Commands::Extract { date } => {
            let warehouse = PgWarehouse::new(pool, &settings);
            let runner = QueryRunner::new(warehouse, &settings);
            extract::run_extract(&runner, &settings, date).await?;
        }
        Commands::Transform { dry_run, sql_root } => {
            let warehouse = PgWarehouse::new(pool, &settings);
            let runner = QueryRunner::new(warehouse, &settings);
            stages::run_stages(&runner, &sql_root, stages::TRANSFORM_STAGES, dry_run).await?;
        }
        Commands::Compute { date } => {
            let warehouse = PgWarehouse::new(pool, &settings);
            let runner = QueryRunner::new(warehouse, &settings);
            compute::run_compute(&runner, date).await?;
        }
        Commands::RunDaily { sql_root } => {
            let warehouse = PgWarehouse::new(pool, &settings);
            let runner = QueryRunner::new(warehouse, &settings);
            daily::run_daily(&runner, &settings, &sql_root).await?;
        }
        Commands::Serve { bind } => {
            let state = ApiState {
                pool,
                settings: Arc::new(settings),
            };
            let app = api::router(state);
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            info!("read API listening on {bind}");
            axum::serve(listener, app)
                .await
                .context("read API server failed")?;
        }
    }

    Ok(())
}
