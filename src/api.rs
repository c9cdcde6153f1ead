use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::models::{AlertRow, AlertType, DailySummaryRow, Severity, TrendingLanguageRow, TrendingRepoRow};

/// Shared read-API state. Every request runs an independent read-only query;
/// there is no mutable in-process state.
#[derive(Clone)]
pub struct ApiState {
    pub pool: PgPool,
    pub settings: Arc<Settings>,
}

type ApiError = (StatusCode, String);

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/trending/repos", get(trending_repos))
        .route("/trending/languages", get(trending_languages))
        .route("/alerts", get(alerts))
        .route("/summary", get(summary))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, message.into())
}

fn internal_error(err: sqlx::Error) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| bad_request(format!("invalid date '{raw}', expected YYYY-MM-DD")))
}

fn check_limit(limit: Option<i64>, default: i64, max: i64) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(default);
    if !(1..=max).contains(&limit) {
        return Err(bad_request(format!("limit must be between 1 and {max}")));
    }
    Ok(limit)
}

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "project": state.settings.warehouse_project,
        "mart_dataset": state.settings.mart_dataset,
    }))
}

#[derive(Deserialize)]
struct TrendingReposParams {
    date: String,
    limit: Option<i64>,
    language: Option<String>,
}

async fn trending_repos(
    State(state): State<ApiState>,
    Query(params): Query<TrendingReposParams>,
) -> Result<Json<Vec<TrendingRepoRow>>, ApiError> {
    let date = parse_date(&params.date)?;
    let limit = check_limit(params.limit, 50, 200)?;

    let sql = format!(
        "SELECT \
            event_date, \
            repo_name, \
            primary_language, \
            license, \
            events_today, \
            actors_today, \
            stars_today, \
            growth_events_ratio, \
            z_events, \
            trend_score \
        FROM {mart}.trending_repos_enriched \
        WHERE event_date = $1 \
            AND ($2::text IS NULL OR primary_language = $2) \
        ORDER BY trend_score DESC, repo_name ASC \
        LIMIT $3",
        mart = state.settings.mart_dataset
    );
    let rows = sqlx::query_as::<_, TrendingRepoRow>(&sql)
        .bind(date)
        .bind(params.language.as_deref())
        .bind(limit)
        .fetch_all(&state.pool)
        .await
        .map_err(internal_error)?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
struct TrendingLanguagesParams {
    date: String,
    limit: Option<i64>,
}

async fn trending_languages(
    State(state): State<ApiState>,
    Query(params): Query<TrendingLanguagesParams>,
) -> Result<Json<Vec<TrendingLanguageRow>>, ApiError> {
    let date = parse_date(&params.date)?;
    let limit = check_limit(params.limit, 20, 200)?;

    let sql = format!(
        "SELECT \
            event_date, \
            primary_language, \
            trending_repos_count, \
            events_today_total, \
            actors_today_total, \
            stars_today_total, \
            avg_trend_score, \
            total_trend_score, \
            top_repos \
        FROM {mart}.trending_languages_daily \
        WHERE event_date = $1 \
        ORDER BY total_trend_score DESC, primary_language ASC \
        LIMIT $2",
        mart = state.settings.mart_dataset
    );
    let rows = sqlx::query_as::<_, TrendingLanguageRow>(&sql)
        .bind(date)
        .bind(limit)
        .fetch_all(&state.pool)
        .await
        .map_err(internal_error)?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
struct AlertsParams {
    date: String,
    alert_type: Option<String>,
    severity: Option<String>,
    limit: Option<i64>,
}

async fn alerts(
    State(state): State<ApiState>,
    Query(params): Query<AlertsParams>,
) -> Result<Json<Vec<AlertRow>>, ApiError> {
    let date = parse_date(&params.date)?;
    let limit = check_limit(params.limit, 100, 500)?;
    let alert_type = params
        .alert_type
        .as_deref()
        .map(|raw| {
            AlertType::parse(raw)
                .ok_or_else(|| bad_request(format!("invalid alert_type '{raw}', expected repo|language")))
        })
        .transpose()?;
    let severity = params
        .severity
        .as_deref()
        .map(|raw| {
            Severity::parse(raw)
                .ok_or_else(|| bad_request(format!("invalid severity '{raw}', expected low|medium|high")))
        })
        .transpose()?;

    let sql = format!(
        "SELECT \
            event_date, \
            alert_type, \
            entity, \
            severity, \
            trend_score, \
            z_events, \
            growth_events_ratio, \
            events_today, \
            actors_today, \
            stars_today, \
            primary_language, \
            created_at::text AS created_at \
        FROM {mart}.alerts_daily \
        WHERE event_date = $1 \
            AND ($2::text IS NULL OR alert_type = $2) \
            AND ($3::text IS NULL OR severity = $3) \
        ORDER BY \
            CASE severity \
                WHEN 'high' THEN 3 \
                WHEN 'medium' THEN 2 \
                WHEN 'low' THEN 1 \
                ELSE 0 \
            END DESC, \
            COALESCE(trend_score, 0) DESC, \
            entity ASC \
        LIMIT $4",
        mart = state.settings.mart_dataset
    );
    let rows = sqlx::query_as::<_, AlertRow>(&sql)
        .bind(date)
        .bind(alert_type.map(AlertType::as_str))
        .bind(severity.map(Severity::as_str))
        .bind(limit)
        .fetch_all(&state.pool)
        .await
        .map_err(internal_error)?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
struct SummaryParams {
    date: String,
}

async fn summary(
    State(state): State<ApiState>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<DailySummaryRow>, ApiError> {
    let date = parse_date(&params.date)?;

    let sql = format!(
        "SELECT \
            event_date::text AS event_date, \
            summary_text, \
            top_repos, \
            top_languages, \
            created_at::text AS created_at \
        FROM {mart}.daily_summary \
        WHERE event_date = $1 \
        LIMIT 1",
        mart = state.settings.mart_dataset
    );
    let row = sqlx::query_as::<_, DailySummaryRow>(&sql)
        .bind(date)
        .fetch_optional(&state.pool)
        .await
        .map_err(internal_error)?;

    Ok(Json(row.unwrap_or_else(|| DailySummaryRow::placeholder(&date.to_string()))))
}
