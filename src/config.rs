use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{anyhow, bail};

/// Typed pipeline configuration, resolved once at startup from the process
/// environment. A missing required variable or an unparseable numeric value
/// is fatal before any query runs.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub warehouse_project: String,
    pub warehouse_location: String,

    pub raw_dataset: String,
    pub stg_dataset: String,
    pub mart_dataset: String,

    pub source_events_project: String,
    pub source_events_dataset: String,
    pub source_repos_table: String,

    pub lookback_days: i64,
    pub min_events_threshold: i64,

    pub alert_z_threshold_low: f64,
    pub alert_growth_threshold_low: f64,
    pub max_repo_alerts: i64,
    pub max_language_alerts: i64,
}

fn req(name: &str) -> anyhow::Result<String> {
    let val = std::env::var(name).unwrap_or_default();
    let val = val.trim();
    if val.is_empty() {
        bail!("environment variable '{name}' is required but not set");
    }
    Ok(val.to_string())
}

fn opt(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
        _ => default.to_string(),
    }
}

fn opt_parse<T>(name: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = opt(name, default);
    raw.parse::<T>()
        .map_err(|err| anyhow!("environment variable '{name}' has invalid value '{raw}': {err}"))
}

impl Settings {
    pub fn load() -> anyhow::Result<Settings> {
        Ok(Settings {
            database_url: req("DATABASE_URL")?,
            warehouse_project: req("WAREHOUSE_PROJECT")?,
            warehouse_location: opt("WAREHOUSE_LOCATION", "us-east-1"),

            raw_dataset: opt("RAW_DATASET", "raw_github"),
            stg_dataset: opt("STG_DATASET", "stg_github"),
            mart_dataset: opt("MART_DATASET", "mart_github"),

            source_events_project: opt("SOURCE_EVENTS_PROJECT", "githubarchive"),
            source_events_dataset: opt("SOURCE_EVENTS_DATASET", "gharchive"),
            source_repos_table: opt("SOURCE_REPOS_TABLE", "gharchive.repos"),

            lookback_days: opt_parse("LOOKBACK_DAYS", "14")?,
            min_events_threshold: opt_parse("MIN_EVENTS_THRESHOLD", "50")?,

            alert_z_threshold_low: opt_parse("ALERT_Z_THRESHOLD_LOW", "3")?,
            alert_growth_threshold_low: opt_parse("ALERT_GROWTH_THRESHOLD_LOW", "3")?,
            max_repo_alerts: opt_parse("MAX_REPO_ALERTS", "50")?,
            max_language_alerts: opt_parse("MAX_LANGUAGE_ALERTS", "20")?,
        })
    }

    /// Base placeholder mapping for the query renderer. Values here are
    /// operator-controlled configuration, never request input.
    pub fn placeholders(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("WAREHOUSE_PROJECT".to_string(), self.warehouse_project.clone()),
            ("RAW_DATASET".to_string(), self.raw_dataset.clone()),
            ("STG_DATASET".to_string(), self.stg_dataset.clone()),
            ("MART_DATASET".to_string(), self.mart_dataset.clone()),
            ("SOURCE_REPOS_TABLE".to_string(), self.source_repos_table.clone()),
            ("LOOKBACK_DAYS".to_string(), self.lookback_days.to_string()),
            (
                "MIN_EVENTS_THRESHOLD".to_string(),
                self.min_events_threshold.to_string(),
            ),
            (
                "ALERT_Z_THRESHOLD_LOW".to_string(),
                self.alert_z_threshold_low.to_string(),
            ),
            (
                "ALERT_GROWTH_THRESHOLD_LOW".to_string(),
                self.alert_growth_threshold_low.to_string(),
            ),
            ("MAX_REPO_ALERTS".to_string(), self.max_repo_alerts.to_string()),
            (
                "MAX_LANGUAGE_ALERTS".to_string(),
                self.max_language_alerts.to_string(),
            ),
        ])
    }
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        database_url: "postgres://localhost/unused".to_string(),
        warehouse_project: "trend-test".to_string(),
        warehouse_location: "us-east-1".to_string(),
        raw_dataset: "raw_github".to_string(),
        stg_dataset: "stg_github".to_string(),
        mart_dataset: "mart_github".to_string(),
        source_events_project: "githubarchive".to_string(),
        source_events_dataset: "gharchive".to_string(),
        source_repos_table: "gharchive.repos".to_string(),
        lookback_days: 14,
        min_events_threshold: 50,
        alert_z_threshold_low: 3.0,
        alert_growth_threshold_low: 3.0,
        max_repo_alerts: 50,
        max_language_alerts: 20,
    }
}
