use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use jobrec_core::analytics::{self, CategoryMonthCount, CountryRate, DashboardFilter, KeyInsights, MonthlyCount, MonthlyRate};
use jobrec_core::catalog::parse_date;
use jobrec_core::{RankedResult, Ranker, RankerHandle, RecommendError, Recommendation, DEFAULT_K};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod pages;

pub const MAX_K: usize = 100;
pub const EXPORT_FILE_NAME: &str = "filtered_job_data.csv";

type ApiError = (StatusCode, String);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub catalog_path: PathBuf,
    pub model_path: PathBuf,
    /// Required in `X-ADMIN-TOKEN` for admin routes; unset disables them.
    pub admin_token: Option<String>,
    /// Comma-separated allowed origins; unset allows any.
    pub cors_allow_origin: Option<String>,
}

impl ServerConfig {
    /// Paths from the command line, secrets and CORS from the environment
    /// (`ADMIN_TOKEN`, `CORS_ALLOW_ORIGIN`).
    pub fn from_env(catalog_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            catalog_path: catalog_path.into(),
            model_path: model_path.into(),
            admin_token: std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            cors_allow_origin: std::env::var("CORS_ALLOW_ORIGIN").ok(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub ranker: Arc<RankerHandle>,
    pub config: Arc<ServerConfig>,
}

/// Load catalog and model, then build the router. Load failures are
/// returned so the process exits instead of serving without data.
pub fn build_app(config: ServerConfig) -> Result<Router> {
    let ranker = Ranker::load(&config.catalog_path, &config.model_path)?;
    Ok(router(ranker, config))
}

pub fn router(ranker: Ranker, config: ServerConfig) -> Router {
    let cors = cors_layer(config.cors_allow_origin.as_deref());
    let state = AppState { ranker: Arc::new(RankerHandle::new(ranker)), config: Arc::new(config) };

    Router::new()
        .route("/", get(index_page))
        .route("/health", get(|| async { "ok" }))
        .route("/api/recommend", get(recommend_handler))
        .route("/dashboard", get(dashboard_page))
        .route("/api/dashboard", get(dashboard_handler))
        .route("/api/dashboard/export", get(export_handler))
        .route("/admin/reload", post(reload_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allow_origin: Option<&str>) -> CorsLayer {
    let origins: Vec<_> = allow_origin
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

#[derive(Debug, Deserialize)]
pub struct RecommendParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    DEFAULT_K
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Nothing was asked yet; the UI should prompt for input.
    AwaitingQuery,
    Ok,
    NoResults,
}

#[derive(Serialize)]
pub struct RecommendResponse {
    pub query: String,
    pub took_s: f64,
    pub status: QueryStatus,
    pub results: Vec<Recommendation>,
}

/// Shared by the JSON and HTML routes. A blank query never reaches the
/// ranker; it is the prompt-for-input state.
fn run_query(state: &AppState, params: &RecommendParams) -> Result<(QueryStatus, RankedResult), ApiError> {
    if params.q.trim().is_empty() {
        return Ok((QueryStatus::AwaitingQuery, RankedResult::default()));
    }
    let k = params.k.clamp(1, MAX_K);
    let ranker = state.ranker.current();
    let results = ranker.recommend(&params.q, k).map_err(query_error)?;
    let status = if results.is_empty() { QueryStatus::NoResults } else { QueryStatus::Ok };
    Ok((status, results))
}

fn query_error(err: RecommendError) -> ApiError {
    tracing::error!(error = %err, "query failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

pub async fn recommend_handler(
    State(state): State<AppState>,
    Query(params): Query<RecommendParams>,
) -> Result<Json<RecommendResponse>, ApiError> {
    let start = std::time::Instant::now();
    let (status, results) = run_query(&state, &params)?;
    let took_s = start.elapsed().as_secs_f64();
    tracing::debug!(query = %params.q, hits = results.len(), took_s, "recommend");
    Ok(Json(RecommendResponse { query: params.q, took_s, status, results: results.items }))
}

pub async fn index_page(State(state): State<AppState>, Query(params): Query<RecommendParams>) -> (StatusCode, Html<String>) {
    let rows = state.ranker.current().catalog().len();
    match run_query(&state, &params) {
        Ok((status, results)) => (StatusCode::OK, Html(pages::render_index(&params.q, rows, status, &results))),
        Err((code, message)) => (code, Html(pages::render_error(&params.q, rows, &message))),
    }
}

/// Dashboard filter as query parameters: comma-separated lists and
/// `YYYY-MM-DD` bounds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardParams {
    pub categories: Option<String>,
    pub countries: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DashboardParams {
    fn to_filter(&self) -> Result<DashboardFilter, ApiError> {
        Ok(DashboardFilter {
            categories: split_list(self.categories.as_deref()),
            countries: split_list(self.countries.as_deref()),
            start: date_param("start", self.start.as_deref())?,
            end: date_param("end", self.end.as_deref())?,
        })
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn date_param(name: &str, raw: Option<&str>) -> Result<Option<time::Date>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => parse_date(s)
            .map(Some)
            .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("{name}: expected YYYY-MM-DD, got {s:?}"))),
    }
}

#[derive(Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub categories: Vec<String>,
    pub countries: Vec<String>,
    pub date_range: Option<DateRange>,
    pub insights: KeyInsights,
    pub job_trend: Vec<MonthlyCount>,
    pub rate_trend: Vec<MonthlyRate>,
    pub category_trend: Vec<CategoryMonthCount>,
    pub country_rates: Vec<CountryRate>,
}

/// Aggregates for one filter selection. The option lists and date range
/// always describe the whole catalog.
fn dashboard_view(state: &AppState, params: &DashboardParams) -> Result<DashboardResponse, ApiError> {
    let filter = params.to_filter()?;
    let ranker = state.ranker.current();
    let catalog = ranker.catalog();
    let rows = analytics::filter(catalog, &filter);

    Ok(DashboardResponse {
        categories: analytics::categories(catalog),
        countries: analytics::countries(catalog),
        date_range: analytics::date_range(catalog)
            .map(|(start, end)| DateRange { start: start.to_string(), end: end.to_string() }),
        insights: analytics::key_insights(&rows),
        job_trend: analytics::monthly_postings(&rows),
        rate_trend: analytics::monthly_hourly_rate(&rows),
        category_trend: analytics::category_trend(&rows),
        country_rates: analytics::country_hourly_rate(&rows),
    })
}

pub async fn dashboard_handler(
    State(state): State<AppState>,
    Query(params): Query<DashboardParams>,
) -> Result<Json<DashboardResponse>, ApiError> {
    dashboard_view(&state, &params).map(Json)
}

pub async fn dashboard_page(
    State(state): State<AppState>,
    Query(params): Query<DashboardParams>,
) -> (StatusCode, Html<String>) {
    match dashboard_view(&state, &params) {
        Ok(view) => (StatusCode::OK, Html(pages::render_dashboard(&params, &view))),
        Err((code, message)) => (code, Html(pages::render_dashboard_error(&params, &message))),
    }
}

pub async fn export_handler(
    State(state): State<AppState>,
    Query(params): Query<DashboardParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = params.to_filter()?;
    let ranker = state.ranker.current();
    let rows = analytics::filter(ranker.catalog(), &filter);

    let mut body = Vec::new();
    analytics::write_csv(&rows, &mut body).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    tracing::info!(rows = rows.len(), "exported filtered postings");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{EXPORT_FILE_NAME}\"")),
        ],
        body,
    ))
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub rows: usize,
    pub vocabulary_size: usize,
}

/// Rebuild the ranker from the configured paths. On failure the current
/// ranker keeps serving.
pub async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<ReloadResponse>, ApiError> {
    authorize(&state, &headers)?;
    let catalog_path = state.config.catalog_path.clone();
    let model_path = state.config.model_path.clone();

    let ranker = tokio::task::spawn_blocking(move || Ranker::load(catalog_path, model_path))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            tracing::error!(error = %e, "reload failed; keeping current ranker");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    let response = ReloadResponse { rows: ranker.catalog().len(), vocabulary_size: ranker.model().vocabulary_size() };
    state.ranker.replace(ranker);
    tracing::info!(rows = response.rows, vocabulary_size = response.vocabulary_size, "ranker reloaded");
    Ok(Json(response))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.config.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
