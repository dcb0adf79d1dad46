//! HTTP surface of the collector

use std::net::SocketAddr;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::archive::build_archive;
use crate::error::Result;
use crate::store::CoverageStore;

/// Instrumented bundles produce large coverage maps.
const MAX_REPORT_BYTES: usize = 64 * 1024 * 1024;

pub const SERVICE_NAME: &str = "gtfs-e2e-coverage";

pub fn router(store: CoverageStore) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/coverage", get(coverage_handler))
        .route("/coverage/client", post(client_handler))
        .route("/coverage/download", get(download_handler))
        .route("/coverage/reset", post(reset_handler))
        .layer(DefaultBodyLimit::max(MAX_REPORT_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

/// Bind `addr` and serve a fresh, empty aggregate.
pub async fn serve(addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, CoverageStore::new()).await
}

/// Serve `store` on an already bound listener.
pub async fn serve_listener(listener: TcpListener, store: CoverageStore) -> Result<()> {
    info!("Coverage collector listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(store)).await?;
    Ok(())
}

async fn health_handler(State(store): State<CoverageStore>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "reports": store.report_count().await,
    }))
}

async fn coverage_handler(State(store): State<CoverageStore>) -> impl IntoResponse {
    Json(store.snapshot().await)
}

async fn client_handler(
    State(store): State<CoverageStore>,
    Json(report): Json<Value>,
) -> Result<impl IntoResponse> {
    let files = store.merge(report).await?;
    debug!("Merged coverage report ({} files)", files);
    Ok(Json(json!({ "status": "ok", "files": files })))
}

async fn download_handler(State(store): State<CoverageStore>) -> Result<impl IntoResponse> {
    let archive = build_archive(&store.snapshot().await)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"coverage.tar.gz\""),
        ],
        archive,
    ))
}

async fn reset_handler(State(store): State<CoverageStore>) -> impl IntoResponse {
    store.reset().await;
    info!("Coverage aggregate reset");
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn send(store: &CoverageStore, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router(store.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_count() {
        let store = CoverageStore::new();
        store.merge(json!({ "a.js": { "s": { "0": 1 } } })).await.unwrap();

        let (status, body) = send(&store, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);

        let health: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["service"], SERVICE_NAME);
        assert_eq!(health["reports"], 1);
    }

    #[tokio::test]
    async fn test_client_post_merges() {
        let store = CoverageStore::new();
        let report = r#"{"a.js":{"s":{"0":1}}}"#;

        let (status, _) = send(&store, post_json("/coverage/client", report)).await;
        assert_eq!(status, StatusCode::OK);
        send(&store, post_json("/coverage/client", report)).await;

        let (_, body) = send(&store, Request::get("/coverage").body(Body::empty()).unwrap()).await;
        let aggregate: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(aggregate["a.js"]["s"]["0"], 2);
    }

    #[tokio::test]
    async fn test_client_post_rejects_non_object() {
        let store = CoverageStore::new();

        let (status, body) = send(&store, post_json("/coverage/client", "[1,2]")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: Value = serde_json::from_slice(&body).unwrap();
        assert!(error["error"].as_str().unwrap().contains("JSON object"));
        assert_eq!(store.report_count().await, 0);
    }

    #[tokio::test]
    async fn test_download_is_gzip() {
        let store = CoverageStore::new();
        store.merge(json!({ "a.js": { "s": { "0": 1 } } })).await.unwrap();

        let response = router(store)
            .oneshot(Request::get("/coverage/download").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/gzip");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..2], &[0x1f, 0x8b]);
    }

    #[tokio::test]
    async fn test_reset_clears_aggregate() {
        let store = CoverageStore::new();
        store.merge(json!({ "a.js": {} })).await.unwrap();

        let (status, _) = send(&store, post_json("/coverage/reset", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(store.file_count().await, 0);
    }
}
