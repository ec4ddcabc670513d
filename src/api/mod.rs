//! API module for the HR dashboard
//!
//! REST proxy to the spreadsheet scripts plus the report endpoints.

pub mod handlers;
pub mod service;

pub use service::DashboardService;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(service: Arc<DashboardService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/ping", get(handlers::ping))
        // Sheet proxies
        .route("/api/workforce", get(handlers::get_workforce))
        .route("/api/attendance", get(handlers::get_attendance))
        .route("/api/performance", get(handlers::get_performance))
        .route("/api/turnover", get(handlers::get_turnover))
        .route("/api/recruitment", get(handlers::get_recruitment))
        .route("/api/sortie", get(handlers::get_sortie))
        // Admin
        .route("/api/admin/auth", get(handlers::get_admin_auth))
        .route("/api/admin/upload", post(handlers::post_admin_upload))
        // Reports
        .route("/api/reports/dashboard", get(handlers::dashboard))
        .route("/api/reports/attendance", get(handlers::attendance_report))
        .route("/api/reports/performance", get(handlers::performance_report))
        .route("/api/reports/recruitment", get(handlers::recruitment_report))
        .route("/api/reports/sortie", get(handlers::sortie_report))
        .route("/api/reports/turnover", get(handlers::turnover_report))
        .route("/api/reports/workforce", get(handlers::workforce_report))
        .route("/api/reports/sector", post(handlers::sector_report))
        // State and middleware
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::fetch::{Backoff, RetryOn, RetryPolicy};
    use crate::models::Source;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::IntoResponse;
    use axum::Json;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Stand-in for the spreadsheet scripts.
    fn upstream() -> Router {
        let mut attendance_row = vec![Value::String(String::new()); 32];
        attendance_row[0] = json!("C1");
        attendance_row[1] = json!("Ali");
        attendance_row[10] = json!("t");
        attendance_row[31] = json!("GroupA");

        Router::new()
            .route("/rows", get(|| async { Json(json!([["h1", "h2"], ["a", 1]])) }))
            .route("/empty", get(|| async { Json(json!([])) }))
            .route("/broken", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }))
            .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "nope") }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Json(json!([["late"]]))
                }),
            )
            .route(
                "/html",
                get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html></html>").into_response() }),
            )
            .route(
                "/attendance",
                get(move || {
                    let row = attendance_row.clone();
                    async move { Json(json!([["header"], row])) }
                }),
            )
            .route("/echo", post(|body: String| async move { body }))
            .route("/reject", post(|| async { (StatusCode::FORBIDDEN, Json(json!({"ok": false}))) }))
    }

    async fn serve_upstream() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, upstream()).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(300),
            attempts,
            backoff: Backoff::Fixed(Duration::from_millis(5)),
            retry_on: RetryOn::AnyFailure,
        }
    }

    async fn app(routes: &[(Source, &str)]) -> Router {
        let base = serve_upstream().await;
        let mut config = Config::default();
        for source in Source::ALL {
            config.set_policy(source, quick(1));
        }
        for (source, path) in routes {
            config.set_url(*source, format!("{base}{path}"));
        }
        create_router(Arc::new(DashboardService::new(config)))
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        call(app, Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        call(app, request).await
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(app(&[]).await, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_proxy_passthrough_and_failure() {
        let (status, body) = get_json(app(&[(Source::Workforce, "/rows")]).await, "/api/workforce").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([["h1", "h2"], ["a", 1]]));

        let (status, body) = get_json(app(&[(Source::Sortie, "/broken")]).await, "/api/sortie").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Failed to fetch sortie data", "message": "Google Script returned 500"}));
    }

    #[tokio::test]
    async fn test_performance_unconfigured() {
        let (status, body) = get_json(app(&[]).await, "/api/performance").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to fetch performance data");
    }

    #[tokio::test]
    async fn test_attendance_failure_shapes() {
        let (status, body) = get_json(app(&[(Source::Attendance, "/empty")]).await, "/api/attendance").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid data format");

        let (status, body) = get_json(app(&[(Source::Attendance, "/missing")]).await, "/api/attendance").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Data source error: 404");
        assert_eq!(body["details"], "Not Found");
        assert!(body["timestamp"].is_string());

        let mut config = Config::default();
        config.set_url(Source::Attendance, "http://127.0.0.1:1/exec");
        config.set_policy(Source::Attendance, quick(2));
        let app = create_router(Arc::new(DashboardService::new(config)));
        let (status, body) = get_json(app, "/api/attendance").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Service temporarily unavailable");
        assert_eq!(body["attempts"], 2);
    }

    #[tokio::test]
    async fn test_recruitment_and_turnover_failures() {
        let (status, body) = get_json(app(&[(Source::Recruitment, "/slow")]).await, "/api/recruitment").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"], "Gateway Timeout");

        let (status, body) = get_json(app(&[(Source::Turnover, "/broken")]).await, "/api/turnover").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_admin_auth_content_type() {
        let (status, body) = get_json(app(&[(Source::Auth, "/html")]).await, "/api/admin/auth").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Invalid response format from Google Sheets");
        assert_eq!(body["receivedContentType"], "text/html");

        let (status, body) = get_json(app(&[(Source::Auth, "/missing")]).await, "/api/admin/auth").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
        assert_eq!(body["statusText"], "Not Found");
    }

    #[tokio::test]
    async fn test_admin_upload() {
        let base = serve_upstream().await;
        let service = Arc::new(DashboardService::new(Config::default()));

        let (status, body) = post_json(create_router(service.clone()), "/api/admin/upload", json!({"rows": []})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "googleScriptUrl is required"}));

        let payload = json!({"googleScriptUrl": format!("{base}/echo"), "sheet": "Pointage"});
        let (status, body) = post_json(create_router(service.clone()), "/api/admin/upload", payload).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("{\"sheet\":\"Pointage\"}"));

        let payload = json!({"googleScriptUrl": format!("{base}/reject")});
        let (status, body) = post_json(create_router(service), "/api/admin/upload", payload).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["details"], json!({"ok": false}));
    }

    #[tokio::test]
    async fn test_attendance_report_endpoint() {
        let (status, body) = get_json(
            app(&[(Source::Attendance, "/attendance")]).await,
            "/api/reports/attendance?category=all",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["groupStats"],
            json!([{"name": "GroupA", "total": 1, "present": 1, "absent": 0, "presentRate": 100.0}])
        );
    }

    #[tokio::test]
    async fn test_report_errors_and_fallback() {
        let (status, body) = get_json(app(&[(Source::Sortie, "/missing")]).await, "/api/reports/sortie").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Failed to build sortie report");

        let (status, body) = get_json(
            app(&[(Source::Workforce, "/broken")]).await,
            "/api/reports/workforce?fallback=true",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalWorkers"], 3);
    }

    #[tokio::test]
    async fn test_sector_report_endpoint() {
        let request = json!({
            "workers": [
                {"id": "1", "farmId": "F1", "sex": "homme", "birthDate": "1990-01-01", "entryDate": "2024-01-01"}
            ],
            "filters": {"startDate": "2024-01-01", "endDate": "2024-02-29"},
            "asOf": "2024-06-30"
        });
        let (status, body) = post_json(app(&[]).await, "/api/reports/sector", request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalWorkers"], 1);
        assert_eq!(body["averageAge"], 34.0);

        let (status, body) = post_json(app(&[]).await, "/api/reports/sector", json!({"workers": 3})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid sector request");
    }
}
