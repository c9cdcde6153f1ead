use chrono::NaiveDate;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrendingRepoRow {
    pub event_date: NaiveDate,
    pub repo_name: String,
    pub primary_language: String,
    pub license: String,
    pub events_today: i64,
    pub actors_today: i64,
    pub stars_today: i64,
    pub growth_events_ratio: Option<f64>,
    pub z_events: Option<f64>,
    pub trend_score: f64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrendingLanguageRow {
    pub event_date: NaiveDate,
    pub primary_language: String,
    pub trending_repos_count: i64,
    pub events_today_total: i64,
    pub actors_today_total: i64,
    pub stars_today_total: i64,
    pub avg_trend_score: f64,
    pub total_trend_score: f64,
    pub top_repos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AlertRow {
    pub event_date: NaiveDate,
    pub alert_type: String,
    pub entity: String,
    pub severity: String,
    pub trend_score: Option<f64>,
    pub z_events: Option<f64>,
    pub growth_events_ratio: Option<f64>,
    pub events_today: Option<i64>,
    pub actors_today: Option<i64>,
    pub stars_today: Option<i64>,
    pub primary_language: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DailySummaryRow {
    pub event_date: String,
    pub summary_text: String,
    pub top_repos: Vec<String>,
    pub top_languages: Vec<String>,
    pub created_at: String,
}

impl DailySummaryRow {
    /// Sentinel for a date with no computed summary: callers read it as
    /// "not computed yet", never as an error.
    pub fn placeholder(date: &str) -> Self {
        Self {
            event_date: date.to_string(),
            summary_text: "No summary available for this date.".to_string(),
            top_repos: Vec::new(),
            top_languages: Vec::new(),
            created_at: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    Repo,
    Language,
}

impl AlertType {
    pub fn parse(raw: &str) -> Option<AlertType> {
        match raw {
            "repo" => Some(AlertType::Repo),
            "language" => Some(AlertType::Language),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Repo => "repo",
            AlertType::Language => "language",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn parse(raw: &str) -> Option<Severity> {
        match raw {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}
