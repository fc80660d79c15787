//! Axum router construction.
//!
//! The [`app`] function wires the search API and the operational endpoints
//! to their handlers and returns a ready-to-serve [`axum::Router`].

use axum::{
    extract::{RawQuery, State},
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, SearchError};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI document ---------------------------------------------------------

/// OpenAPI documentation for the docsearch API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "docsearch API",
        version = "0.1.0",
        description = "Find documents by accession number in an Azure Blob container"
    ),
    paths(health_check, crate::handlers::search::search_files),
    components(schemas(
        crate::search::SearchResult,
        crate::storage::backend::BlobRecord
    )),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Search", description = "Document search"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all routes.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/search", get(handle_search))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(cors)
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http())
        // metrics_middleware is outermost (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id` (unless the error path already set one) and
/// `server: docsearch` to every response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }
    headers.insert("server", HeaderValue::from_static("docsearch"));

    response
}

// -- Health / docs -----------------------------------------------------------

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// -- Query parameter parsing helper ------------------------------------------

/// Parse a raw query string into a map, decoding `+` as a space.
///
/// A repeated key keeps its first value.
fn parse_query(raw: Option<String>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(qs) = raw {
        for part in qs.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            map.entry(decode_component(k))
                .or_insert_with(|| decode_component(v));
        }
    }
    map
}

fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    percent_encoding::percent_decode_str(&s)
        .decode_utf8_lossy()
        .into_owned()
}

// -- Search dispatch ---------------------------------------------------------

/// `GET /api/search?accessionNumber=...`
async fn handle_search(
    State(state): State<Arc<AppState>>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, SearchError> {
    let query = parse_query(raw_query);
    crate::handlers::search::search_files(state, &query).await
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, Config};
    use crate::storage::memory::MemoryBlobStore;
    use crate::Backend;
    use axum::body::Body;
    use tower::ServiceExt;

    fn memory_app(names: &[&str]) -> (Router, Arc<MemoryBlobStore>) {
        let store = Arc::new(MemoryBlobStore::with_names(names.iter().copied()));
        let mut config = Config::default();
        config.storage.backend = BackendKind::Memory;
        let state = AppState::new(config, Backend::Memory(store.clone()));
        (app(Arc::new(state)), store)
    }

    fn azure_app(connection_string: Option<String>) -> Router {
        let mut config = Config::default();
        config.storage.connection_string = connection_string;
        config.storage.max_retries = 0;
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        app(Arc::new(AppState::new(config, Backend::Azure(client))))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, headers, json)
    }

    #[test]
    fn test_parse_query_decoding() {
        let q = parse_query(Some("accessionNumber=ACC%20123&x=a+b&flag".to_string()));
        assert_eq!(q["accessionNumber"], "ACC 123");
        assert_eq!(q["x"], "a b");
        assert_eq!(q["flag"], "");
    }

    #[test]
    fn test_parse_query_first_value_wins() {
        let q = parse_query(Some("accessionNumber=A&accessionNumber=B".to_string()));
        assert_eq!(q["accessionNumber"], "A");
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = memory_app(&[]);
        let (status, headers, body) = get(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(headers["server"], "docsearch");
        assert_eq!(headers["x-request-id"].len(), 16);
    }

    #[tokio::test]
    async fn test_search_returns_matches() {
        let (app, _) = memory_app(&["ACC123-report.pdf", "OTHER.pdf", "x/ACC123-scan.tif"]);
        let (status, _, body) = get(app, "/api/search?accessionNumber=ACC123").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["accessionNumber"], "ACC123");
        assert_eq!(body["results"][0]["name"], "ACC123-report.pdf");
        assert_eq!(
            body["results"][0]["url"],
            "memory://local/documents/ACC123-report.pdf"
        );
        assert_eq!(body["results"][0]["contentType"], "application/octet-stream");
        assert!(body["results"][0].get("lastModified").is_some());
        assert_eq!(body["results"][1]["name"], "x/ACC123-scan.tif");
    }

    #[tokio::test]
    async fn test_search_no_match_is_empty() {
        let (app, _) = memory_app(&["ACC123-report.pdf"]);
        let (status, _, body) = get(app, "/api/search?accessionNumber=XYZ").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
        assert_eq!(body["results"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_search_trims_term() {
        let (app, _) = memory_app(&["ACC123-report.pdf"]);
        let (status, _, body) = get(app, "/api/search?accessionNumber=%20ACC123%20").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accessionNumber"], "ACC123");
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn test_empty_term_rejected_without_listing() {
        for uri in ["/api/search", "/api/search?accessionNumber=", "/api/search?accessionNumber=++"] {
            let (app, store) = memory_app(&["ACC123-report.pdf"]);
            let (status, headers, body) = get(app, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"], "Please provide an accessionNumber parameter");
            assert!(headers.contains_key("x-request-id"));
            assert_eq!(store.list_calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_too_long_term_rejected() {
        let (app, store) = memory_app(&["ACC123-report.pdf"]);
        let uri = format!("/api/search?accessionNumber={}", "A".repeat(257));
        let (status, _, _) = get(app, &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_connection_string_is_500() {
        let (status, _, body) = get(azure_app(None), "/api/search?accessionNumber=ACC1").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Storage connection not configured");
    }

    #[tokio::test]
    async fn test_empty_term_checked_before_configuration() {
        let (status, _, _) = get(azure_app(None), "/api/search?accessionNumber=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_storage_is_500() {
        let conn = "AccountName=acct;AccountKey=AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=;\
                    BlobEndpoint=http://127.0.0.1:9"
            .to_string();
        let (status, _, body) = get(azure_app(Some(conn)), "/api/search?accessionNumber=ACC1").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"].as_str().unwrap();
        assert!(!message.contains("AAECAwQF"));
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let (app, _) = memory_app(&[]);
        let (status, _, body) = get(app, "/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"].get("/api/search").is_some());
        assert!(body["paths"].get("/health").is_some());
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let (app, _) = memory_app(&[]);
        let response = app
            .oneshot(
                Request::get("/api/search?accessionNumber=ACC1")
                    .header("origin", "https://ui.example.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        crate::metrics::init_metrics().unwrap();
        let (app, _) = memory_app(&[]);
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (app, _) = memory_app(&[]);
        let (status, _, _) = get(app, "/api/other").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
