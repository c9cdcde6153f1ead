use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::info;

use crate::warehouse::{QueryRunner, Warehouse};

// The recompute is delete-then-insert for one date: clearing first makes the
// whole stage safe to rerun without duplicate accumulation.
const CLEANUP_SQL: &str = r#"
-- Clear any prior output for the day.
DELETE FROM ${MART_DATASET}.alerts_daily WHERE event_date = DATE '${DATE}';
DELETE FROM ${MART_DATASET}.daily_summary WHERE event_date = DATE '${DATE}';
"#;

// Inclusion uses the configurable thresholds; the severity tiers are a
// separate, fixed cutoff set. The cap is enforced at insert time.
const REPO_ALERTS_SQL: &str = r#"
-- Insert repo alerts for a given day.
INSERT INTO ${MART_DATASET}.alerts_daily
(
    event_date, alert_type, entity, severity,
    trend_score, z_events, growth_events_ratio,
    events_today, actors_today, stars_today,
    primary_language, created_at
)
SELECT
    t.event_date,
    'repo' AS alert_type,
    t.repo_name AS entity,
    CASE
        WHEN t.z_events >= 6 OR t.growth_events_ratio >= 10 THEN 'high'
        WHEN t.z_events >= 4 OR t.growth_events_ratio >= 5 THEN 'medium'
        ELSE 'low'
    END AS severity,
    t.trend_score,
    t.z_events,
    t.growth_events_ratio,
    t.events_today,
    t.actors_today,
    t.stars_today,
    t.primary_language,
    NOW() AS created_at
FROM ${MART_DATASET}.trending_repos_enriched t
WHERE t.event_date = DATE '${DATE}'
    AND (
        t.z_events >= ${ALERT_Z_THRESHOLD_LOW}
        OR t.growth_events_ratio >= ${ALERT_GROWTH_THRESHOLD_LOW}
    )
ORDER BY t.trend_score DESC, t.repo_name ASC
LIMIT ${MAX_REPO_ALERTS};
"#;

const LANGUAGE_ALERTS_SQL: &str = r#"
-- Insert language alerts for a given day.
INSERT INTO ${MART_DATASET}.alerts_daily
(
    event_date, alert_type, entity, severity,
    trend_score, z_events, growth_events_ratio,
    events_today, actors_today, stars_today,
    primary_language, created_at
)
SELECT
    l.event_date,
    'language' AS alert_type,
    l.primary_language AS entity,
    CASE
        WHEN l.avg_trend_score >= 6 THEN 'high'
        WHEN l.avg_trend_score >= 4 THEN 'medium'
        ELSE 'low'
    END AS severity,
    l.avg_trend_score AS trend_score,
    NULL AS z_events,
    NULL AS growth_events_ratio,
    l.events_today_total AS events_today,
    l.actors_today_total AS actors_today,
    l.stars_today_total AS stars_today,
    l.primary_language,
    NOW() AS created_at
FROM ${MART_DATASET}.trending_languages_daily l
WHERE l.event_date = DATE '${DATE}'
    AND l.primary_language IS NOT NULL
ORDER BY l.total_trend_score DESC, l.primary_language ASC
LIMIT ${MAX_LANGUAGE_ALERTS};
"#;

// Counts are re-derived warehouse-side from the rows just inserted, not
// carried over in process.
const SUMMARY_SQL: &str = r#"
-- Create the daily summary row.
INSERT INTO ${MART_DATASET}.daily_summary
(event_date, summary_text, top_repos, top_languages, created_at)
WITH top_repos AS (
    SELECT COALESCE(array_agg(repo_name), '{}') AS repos
    FROM (
        SELECT repo_name
        FROM ${MART_DATASET}.trending_repos_enriched
        WHERE event_date = DATE '${DATE}'
        ORDER BY trend_score DESC, repo_name ASC
        LIMIT 5
    ) ranked_repos
),
top_langs AS (
    SELECT COALESCE(array_agg(primary_language), '{}') AS langs
    FROM (
        SELECT primary_language
        FROM ${MART_DATASET}.trending_languages_daily
        WHERE event_date = DATE '${DATE}'
        ORDER BY total_trend_score DESC, primary_language ASC
        LIMIT 5
    ) ranked_langs
),
stats AS (
    SELECT
        (SELECT COUNT(DISTINCT repo_name) FROM ${MART_DATASET}.trending_repos_enriched WHERE event_date = DATE '${DATE}') AS repo_count,
        (SELECT COUNT(*) FROM ${MART_DATASET}.alerts_daily WHERE event_date = DATE '${DATE}' AND alert_type = 'repo') AS repo_alerts,
        (SELECT COUNT(*) FROM ${MART_DATASET}.alerts_daily WHERE event_date = DATE '${DATE}' AND alert_type = 'language') AS lang_alerts
)
SELECT
    DATE '${DATE}' AS event_date,
    'Daily GitHub trend summary for ${DATE}: '
        || 'Trending repos analyzed: ' || stats.repo_count || '. '
        || 'Repo alerts: ' || stats.repo_alerts || '. '
        || 'Language alerts: ' || stats.lang_alerts || '.' AS summary_text,
    top_repos.repos AS top_repos,
    top_langs.langs AS top_languages,
    NOW() AS created_at
FROM stats, top_repos, top_langs;
"#;

/// Recompute alerts and the daily summary for one date. Any failure aborts
/// the remaining statements; the cleanup-first discipline makes the next run
/// self-correcting.
pub async fn run_compute<W: Warehouse>(
    runner: &QueryRunner<W>,
    date: NaiveDate,
) -> anyhow::Result<()> {
    let extra = BTreeMap::from([("DATE".to_string(), date.to_string())]);

    info!("cleaning up existing alerts for date {date}");
    runner
        .run_with(CLEANUP_SQL, "compute_alerts_cleanup", &extra)
        .await?;

    info!("inserting repo alerts for date {date}");
    runner
        .run_with(REPO_ALERTS_SQL, "compute_repo_alerts", &extra)
        .await?;

    info!("inserting language alerts for date {date}");
    runner
        .run_with(LANGUAGE_ALERTS_SQL, "compute_language_alerts", &extra)
        .await?;

    info!("inserting daily summary for date {date}");
    runner
        .run_with(SUMMARY_SQL, "compute_daily_summary", &extra)
        .await?;

    info!("compute done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_settings;
    use crate::warehouse::testing::RecordingWarehouse;

    fn march_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn statements_run_in_cleanup_insert_summary_order() {
        let warehouse = RecordingWarehouse::default();
        let runner = QueryRunner::new(&warehouse, &test_settings());

        run_compute(&runner, march_first()).await.unwrap();

        assert_eq!(
            warehouse.steps(),
            vec![
                "compute_alerts_cleanup",
                "compute_repo_alerts",
                "compute_language_alerts",
                "compute_daily_summary",
            ]
        );
    }

    #[tokio::test]
    async fn cleanup_clears_both_output_relations_for_the_date() {
        let warehouse = RecordingWarehouse::default();
        let runner = QueryRunner::new(&warehouse, &test_settings());

        run_compute(&runner, march_first()).await.unwrap();

        let sql = warehouse.sql_for("compute_alerts_cleanup");
        assert!(sql.contains("DELETE FROM mart_github.alerts_daily WHERE event_date = DATE '2024-03-01'"));
        assert!(sql.contains("DELETE FROM mart_github.daily_summary WHERE event_date = DATE '2024-03-01'"));
    }

    #[tokio::test]
    async fn repo_alerts_render_inclusion_thresholds_and_cap() {
        let warehouse = RecordingWarehouse::default();
        let runner = QueryRunner::new(&warehouse, &test_settings());

        run_compute(&runner, march_first()).await.unwrap();

        let sql = warehouse.sql_for("compute_repo_alerts");
        assert!(sql.contains("t.z_events >= 3"));
        assert!(sql.contains("t.growth_events_ratio >= 3"));
        assert!(sql.contains("LIMIT 50"));
        assert!(!sql.contains("${"));
    }

    #[tokio::test]
    async fn repo_severity_tiers_are_fixed_cutoffs() {
        let warehouse = RecordingWarehouse::default();
        let runner = QueryRunner::new(&warehouse, &test_settings());

        run_compute(&runner, march_first()).await.unwrap();

        let sql = warehouse.sql_for("compute_repo_alerts");
        assert!(sql.contains("WHEN t.z_events >= 6 OR t.growth_events_ratio >= 10 THEN 'high'"));
        assert!(sql.contains("WHEN t.z_events >= 4 OR t.growth_events_ratio >= 5 THEN 'medium'"));
        assert!(sql.contains("ELSE 'low'"));
    }

    #[tokio::test]
    async fn language_alerts_carry_no_repo_metrics() {
        let warehouse = RecordingWarehouse::default();
        let runner = QueryRunner::new(&warehouse, &test_settings());

        run_compute(&runner, march_first()).await.unwrap();

        let sql = warehouse.sql_for("compute_language_alerts");
        assert!(sql.contains("NULL AS z_events"));
        assert!(sql.contains("NULL AS growth_events_ratio"));
        assert!(sql.contains("l.primary_language IS NOT NULL"));
        assert!(sql.contains("LIMIT 20"));
    }

    #[tokio::test]
    async fn summary_re_derives_counts_from_inserted_alerts() {
        let warehouse = RecordingWarehouse::default();
        let runner = QueryRunner::new(&warehouse, &test_settings());

        run_compute(&runner, march_first()).await.unwrap();

        let sql = warehouse.sql_for("compute_daily_summary");
        assert!(sql.contains("alert_type = 'repo'"));
        assert!(sql.contains("alert_type = 'language'"));
        assert!(sql.contains("Daily GitHub trend summary for 2024-03-01"));
        assert!(sql.contains("LIMIT 5"));
    }

    #[tokio::test]
    async fn a_failed_insert_stops_the_stage() {
        let warehouse = RecordingWarehouse {
            fail_on_step: Some("compute_repo_alerts".to_string()),
            ..Default::default()
        };
        let runner = QueryRunner::new(&warehouse, &test_settings());

        let err = run_compute(&runner, march_first()).await.unwrap_err();
        assert!(err.to_string().contains("compute_repo_alerts"));
        assert_eq!(warehouse.calls.lock().unwrap().len(), 2);
    }
}
