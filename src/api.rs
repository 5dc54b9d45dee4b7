// 🌐 Read API - HTTP surface over the canonical dataset
//
// Every handler asks the injected `DatasetStore` for the current dataset, so a
// fresh `data.json` is picked up on the next request without a restart.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, warn};

use crate::config::Config;
use crate::dataset::{DatasetInfo, RankingEntry, University, YearScore};
use crate::error::StoreError;
use crate::store::DatasetStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DatasetStore>,
}

// ============================================================================
// ERRORS
// ============================================================================

/// Error response with a `{"detail": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn not_found(detail: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::not_found(err.to_string()),
            other => {
                error!(error = %other, "dataset unavailable");
                ApiError::internal(other.to_string())
            }
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// RESPONSES
// ============================================================================

#[derive(Serialize)]
struct ServiceInfo {
    message: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct YearsResponse {
    years: Vec<i32>,
}

#[derive(Serialize)]
struct RankingResponse {
    year: i32,
    ranking: Vec<RankingEntry>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<University>,
}

#[derive(Serialize)]
struct UniversitiesResponse {
    universities: Vec<University>,
}

#[derive(Serialize)]
struct ScoresResponse {
    university: String,
    slug: String,
    scores: Vec<YearScore>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /
async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "UniSkor API",
        version: crate::VERSION,
    })
}

/// GET /health
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// GET /api/data/
async fn data_info(State(state): State<AppState>) -> ApiResult<DatasetInfo> {
    let dataset = state.store.load()?;
    Ok(Json(dataset.info()))
}

/// GET /api/data/years
async fn years(State(state): State<AppState>) -> ApiResult<YearsResponse> {
    let dataset = state.store.load()?;
    Ok(Json(YearsResponse {
        years: dataset.years.clone(),
    }))
}

/// GET /api/data/latest
async fn latest(State(state): State<AppState>) -> ApiResult<RankingResponse> {
    let dataset = state.store.load()?;
    let year = dataset
        .latest_year()
        .ok_or_else(|| ApiError::not_found("No data available"))?;

    Ok(Json(RankingResponse {
        year,
        ranking: dataset.ranking(year),
    }))
}

/// GET /api/data/year/:year
async fn year_ranking(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> ApiResult<RankingResponse> {
    let dataset = state.store.load()?;
    if !dataset.has_year(year) {
        return Err(ApiError::not_found(format!("Year {} not available", year)));
    }

    Ok(Json(RankingResponse {
        year,
        ranking: dataset.ranking(year),
    }))
}

/// GET /api/data/search?q=
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<SearchResponse> {
    let query = params.q.unwrap_or_default();
    if query.is_empty() {
        return Err(ApiError::bad_request("Query parameter 'q' must not be empty"));
    }

    let dataset = state.store.load()?;
    Ok(Json(SearchResponse {
        results: dataset.search(&query).into_iter().cloned().collect(),
    }))
}

/// GET /api/universities/
async fn universities(State(state): State<AppState>) -> ApiResult<UniversitiesResponse> {
    let dataset = state.store.load()?;
    Ok(Json(UniversitiesResponse {
        universities: dataset.universities.clone(),
    }))
}

/// GET /api/universities/:slug
async fn university(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<University> {
    let dataset = state.store.load()?;
    dataset
        .find(&slug)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("University not found"))
}

/// GET /api/universities/:slug/scores
async fn university_scores(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<ScoresResponse> {
    let dataset = state.store.load()?;
    let university = dataset
        .find(&slug)
        .ok_or_else(|| ApiError::not_found("University not found"))?;

    Ok(Json(ScoresResponse {
        university: university.name.clone(),
        scores: dataset.series(university),
        slug,
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

/// API routes only, no middleware.
pub fn router(store: Arc<DatasetStore>) -> Router {
    let state = AppState { store };

    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/api/data", get(data_info))
        .route("/api/data/", get(data_info))
        .route("/api/data/years", get(years))
        .route("/api/data/latest", get(latest))
        .route("/api/data/year/:year", get(year_ranking))
        .route("/api/data/search", get(search))
        .route("/api/universities", get(universities))
        .route("/api/universities/", get(universities))
        .route("/api/universities/:slug", get(university))
        .route("/api/universities/:slug/scores", get(university_scores))
        .with_state(state)
}

/// Full application: API routes, `/data` static files, CORS allow-list.
pub fn app(config: &Config) -> Router {
    let store = Arc::new(DatasetStore::new(config.output.dataset.clone()));

    router(store)
        .nest_service("/data", ServeDir::new(&config.output.data_dir))
        .layer(cors(&config.server.cors_origins))
}

fn cors(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CanonicalDataset, ScorePair};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn write_sample(dir: &std::path::Path) -> std::path::PathBuf {
        let mut ds = CanonicalDataset::default();
        let pair = |o: Option<f64>, m: Option<f64>| ScorePair { ortalama: o, medyan: m };
        ds.upsert("Ankara Üniversitesi", 2023, pair(Some(0.71), Some(0.7)));
        ds.upsert("Ankara Üniversitesi", 2024, pair(Some(0.8), None));
        ds.upsert("Ege Üniversitesi", 2024, pair(Some(0.9), Some(0.88)));
        ds.upsert("Gazi Üniversitesi", 2024, pair(None, Some(0.5)));
        ds.last_updated = Some("2024-10-26".to_string());

        let path = dir.join("data.json");
        ds.write_to(&path).unwrap();
        path
    }

    fn test_router(path: std::path::PathBuf) -> Router {
        router(Arc::new(DatasetStore::new(path)))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(dir.path().join("data.json"));

        let (status, body) = get_json(app.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "UniSkor API");

        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_data_info() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(write_sample(dir.path()));

        for uri in ["/api/data", "/api/data/"] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["years"], json!([2023, 2024]));
            assert_eq!(body["universityCount"], 3);
            assert_eq!(body["latestYear"], 2024);
            assert_eq!(body["lastUpdated"], "2024-10-26");
        }

        let (_, body) = get_json(app, "/api/data/years").await;
        assert_eq!(body, json!({ "years": [2023, 2024] }));
    }

    #[tokio::test]
    async fn test_latest_and_year_ranking() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(write_sample(dir.path()));

        let (status, body) = get_json(app.clone(), "/api/data/latest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["year"], 2024);
        let ranking = body["ranking"].as_array().unwrap();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0]["slug"], "ege-universitesi");
        assert_eq!(ranking[1]["medyan"], Value::Null);

        let (status, body) = get_json(app.clone(), "/api/data/year/2023").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ranking"].as_array().unwrap().len(), 1);

        let (status, body) = get_json(app, "/api/data/year/1999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Year 1999 not available");
    }

    #[tokio::test]
    async fn test_latest_without_years() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        CanonicalDataset::default().write_to(&path).unwrap();

        let (status, body) = get_json(test_router(path), "/api/data/latest").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "No data available");
    }

    #[tokio::test]
    async fn test_search() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(write_sample(dir.path()));

        let (status, body) = get_json(app.clone(), "/api/data/search?q=ege").await;
        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["name"], "Ege Üniversitesi");

        let (status, body) = get_json(app.clone(), "/api/data/search?q=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());

        let (status, _) = get_json(app.clone(), "/api/data/search").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // whitespace is a real query: matches every multi-word name
        let (status, body) = get_json(app, "/api/data/search?q=%20").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_universities() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(write_sample(dir.path()));

        let (_, body) = get_json(app.clone(), "/api/universities/").await;
        assert_eq!(body["universities"].as_array().unwrap().len(), 3);

        let (status, body) = get_json(app.clone(), "/api/universities/ankara-universitesi").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Ankara Üniversitesi");
        assert_eq!(body["scores"]["2023"]["ortalama"], 0.71);

        let (status, body) = get_json(app, "/api/universities/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "University not found");
    }

    #[tokio::test]
    async fn test_university_scores() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(write_sample(dir.path()));

        let (status, body) =
            get_json(app.clone(), "/api/universities/ankara-universitesi/scores").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["university"], "Ankara Üniversitesi");
        assert_eq!(body["slug"], "ankara-universitesi");
        assert_eq!(
            body["scores"],
            json!([
                { "year": 2023, "ortalama": 0.71, "medyan": 0.7 },
                { "year": 2024, "ortalama": 0.8, "medyan": null }
            ])
        );

        let (_, body) = get_json(app, "/api/universities/ege-universitesi/scores").await;
        assert_eq!(body["scores"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_dataset_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router(dir.path().join("data.json"));

        let (status, body) = get_json(app, "/api/data/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("data file not found"));
    }
}
