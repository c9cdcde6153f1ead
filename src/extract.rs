use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::info;

use crate::config::Settings;
use crate::warehouse::{QueryOutcome, QueryRunner, Warehouse};

// Hard coded rather than shipped under sql/ because the day-table name is
// part of the application logic.
const EXTRACT_SQL: &str = r#"
-- Copy one day of archived events into the raw events table.
INSERT INTO ${RAW_DATASET}.events (event_date, created_at, type, repo_name, actor_login, payload)
SELECT
    DATE '${DATE}' AS event_date,
    created_at,
    type,
    repo_name,
    actor_login,
    payload
FROM ${SOURCE_DATASET}.${SOURCE_TABLE}
WHERE created_at >= TIMESTAMP '${DATE}'
  AND created_at < TIMESTAMP '${DATE}' + INTERVAL '1 day';
"#;

/// Daily archive tables are named after the day they hold.
pub fn source_table_name(date: NaiveDate) -> String {
    format!("events_{}", date.format("%Y%m%d"))
}

pub async fn run_extract<W: Warehouse>(
    runner: &QueryRunner<W>,
    settings: &Settings,
    date: NaiveDate,
) -> anyhow::Result<QueryOutcome> {
    let table = source_table_name(date);
    let extra = BTreeMap::from([
        ("DATE".to_string(), date.to_string()),
        ("SOURCE_DATASET".to_string(), settings.source_events_dataset.clone()),
        ("SOURCE_TABLE".to_string(), table.clone()),
    ]);

    info!(
        "extracting {date} from {}/{}.{table} into {}.events",
        settings.source_events_project, settings.source_events_dataset, settings.raw_dataset
    );
    let outcome = runner.run_with(EXTRACT_SQL, "extract", &extra).await?;
    info!(
        job_id = %outcome.job_id,
        rows = outcome.rows_affected,
        processed = outcome.bytes_processed,
        billed = outcome.bytes_billed,
        "extract done"
    );
    Ok(outcome)
}
