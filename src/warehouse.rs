use std::collections::BTreeMap;

use anyhow::{bail, Context};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::config::Settings;
use crate::render;

/// Execution record for one warehouse submission.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub job_id: Uuid,
    pub rows_affected: u64,
    pub bytes_processed: i64,
    pub bytes_billed: i64,
}

/// A warehouse backend. Submissions block until the warehouse reports
/// completion or failure; failures propagate untouched, there is no retry.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn execute(&self, sql: &str, step: &str) -> anyhow::Result<QueryOutcome>;
}

/// Postgres-backed warehouse. One pool per process, used strictly
/// sequentially by the write path.
pub struct PgWarehouse {
    pool: PgPool,
    project: String,
    location: String,
}

impl PgWarehouse {
    pub fn new(pool: PgPool, settings: &Settings) -> Self {
        Self {
            pool,
            project: settings.warehouse_project.clone(),
            location: settings.warehouse_location.clone(),
        }
    }
}

/// Prefix each submission with a cost-tracking tag so it can be attributed
/// in pg_stat_statements and the server log.
fn tag_statement(sql: &str, project: &str, location: &str, step: &str, job_id: Uuid) -> String {
    format!("/* project={project} location={location} step={step} job={job_id} */\n{sql}")
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn execute(&self, sql: &str, step: &str) -> anyhow::Result<QueryOutcome> {
        let job_id = Uuid::new_v4();
        let tagged = tag_statement(sql, &self.project, &self.location, step, job_id);
        let result = sqlx::raw_sql(&tagged)
            .execute(&self.pool)
            .await
            .with_context(|| format!("query for step '{step}' failed (job {job_id})"))?;

        // Postgres does not meter scanned or billed bytes per statement.
        Ok(QueryOutcome {
            job_id,
            rows_affected: result.rows_affected(),
            bytes_processed: 0,
            bytes_billed: 0,
        })
    }
}

/// Renders and submits queries against an explicitly passed backend. Owned by
/// each stage invocation; never a process-wide singleton, so tests can swap
/// in a recording backend.
pub struct QueryRunner<W> {
    warehouse: W,
    base: BTreeMap<String, String>,
}

impl<W: Warehouse> QueryRunner<W> {
    pub fn new(warehouse: W, settings: &Settings) -> Self {
        Self {
            warehouse,
            base: settings.placeholders(),
        }
    }

    pub async fn run(&self, sql: &str, step: &str) -> anyhow::Result<QueryOutcome> {
        self.run_with(sql, step, &BTreeMap::new()).await
    }

    /// Render with call-site overrides, refuse any text with unresolved
    /// placeholders, then hand the query to the warehouse.
    pub async fn run_with(
        &self,
        sql: &str,
        step: &str,
        extra: &BTreeMap<String, String>,
    ) -> anyhow::Result<QueryOutcome> {
        let rendered = render::render_sql(sql, &self.base, extra);
        let leftover = render::unresolved_placeholders(&rendered);
        if !leftover.is_empty() {
            bail!(
                "unresolved placeholders in query for step '{step}': {}",
                leftover.join(", ")
            );
        }

        let outcome = self.warehouse.execute(&rendered, step).await?;
        debug!(
            step,
            job_id = %outcome.job_id,
            rows = outcome.rows_affected,
            "query completed"
        );
        Ok(outcome)
    }
}
