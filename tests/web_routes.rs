//! Router-level checks that never need a live database: the pool is built
//! unchecked, so any test here that touched it would fail.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use eservices::core::config::AppConfig;
use eservices::core::shared::state::AppState;
use eservices::security::csrf::{CSRF_COOKIE, CSRF_FIELD};
use eservices::web::create_router;

fn test_router(upload_dir: &std::path::Path) -> Router {
    let mut config = AppConfig::default();
    config.security.secret_key = "integration-test-secret-key".to_string();
    config.rate_limit.enabled = false;
    config.email.enabled = false;
    config.uploads.dir = upload_dir.to_path_buf();

    let manager = ConnectionManager::<PgConnection>::new("postgres://nobody@127.0.0.1:1/none");
    let pool = Pool::builder().max_size(1).build_unchecked(manager);
    create_router(Arc::new(AppState::new(config, pool)))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

fn location(response: &axum::response::Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().expect("tempdir");
    let response = test_router(dir.path())
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("\"status\":\"ok\""));
}

#[tokio::test]
async fn test_login_page_sets_csrf_cookie_and_field() {
    let dir = tempfile::tempdir().expect("tempdir");
    let response = test_router(dir.path())
        .oneshot(Request::get("/auth/login").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(String::from))
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with(&format!("{CSRF_COOKIE}="))));

    let body = body_text(response).await;
    assert!(body.contains("<h1>Login</h1>"));
    assert!(body.contains(&format!("name=\"{CSRF_FIELD}\"")));
}

#[tokio::test]
async fn test_staff_pages_redirect_anonymous_visitors_to_login() {
    let dir = tempfile::tempdir().expect("tempdir");
    let router = test_router(dir.path());

    for path in ["/admin/staff-dashboard", "/admin/users", "/my-tickets", "/profile"] {
        let response = router
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert!(response.status().is_redirection(), "{path}");
        assert!(location(&response).starts_with("/auth/login?next="), "{path}");
    }
}

#[tokio::test]
async fn test_post_without_csrf_token_is_forbidden() {
    let dir = tempfile::tempdir().expect("tempdir");
    let response = test_router(dir.path())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/auth/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("email=admin%40deped.gov.ph&password=password123"))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_mismatched_csrf_token_is_forbidden() {
    let dir = tempfile::tempdir().expect("tempdir");
    let response = test_router(dir.path())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/auth/login")
                .header(header::COOKIE, format!("{CSRF_COOKIE}=cookie-token"))
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!("{CSRF_FIELD}=other-token")))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_path_renders_404_page() {
    let dir = tempfile::tempdir().expect("tempdir");
    let response = test_router(dir.path())
        .oneshot(Request::get("/no/such/page").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_text(response).await;
    assert!(body.contains("404"));
}
