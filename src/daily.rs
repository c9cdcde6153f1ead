use std::path::Path;

use chrono::{Duration, NaiveDate, Utc};
use tracing::info;

use crate::config::Settings;
use crate::warehouse::{QueryRunner, Warehouse};
use crate::{compute, extract, stages};

/// The daily job is parameterless: it always targets yesterday in UTC.
pub fn yesterday_utc() -> NaiveDate {
    Utc::now().date_naive() - Duration::days(1)
}

/// Run extract, transform and compute in sequence for yesterday. Each step
/// must finish before the next starts; the first failure aborts the rest of
/// the run.
pub async fn run_daily<W: Warehouse>(
    runner: &QueryRunner<W>,
    settings: &Settings,
    sql_root: &Path,
) -> anyhow::Result<()> {
    let date = yesterday_utc();
    info!("running daily pipeline for date: {date}");

    extract::run_extract(runner, settings, date).await?;
    stages::run_stages(runner, sql_root, stages::TRANSFORM_STAGES, false).await?;
    compute::run_compute(runner, date).await?;

    info!("daily pipeline run completed");
    Ok(())
}
