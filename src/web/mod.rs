//! Router assembly and the shared page/form plumbing.

pub mod flash;
pub mod forms;
pub mod page;
pub mod ui;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::core::rate_limit::rate_limit_middleware;
use crate::core::shared::state::AppState;
use crate::security::csrf::csrf_middleware;

pub const UPLOADS_PATH: &str = "/static/uploads";

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "eservices" }))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(ui::error_page(StatusCode::NOT_FOUND)))
}

/// Every route of the application with its middleware stack.
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_request = state.config.uploads.max_request_bytes();
    let upload_dir = state.config.uploads.dir.clone();

    Router::new()
        .route("/health", get(health))
        .merge(crate::auth::configure_auth_routes())
        .merge(crate::profile::configure_profile_routes())
        .merge(crate::tickets::configure_tickets_routes())
        .merge(crate::canned::configure_canned_routes())
        .merge(crate::admin::configure_admin_routes())
        .merge(crate::dashboards::configure_dashboards_routes())
        .nest_service(UPLOADS_PATH, ServeDir::new(upload_dir))
        .fallback(not_found)
        // Last added runs first.
        .layer(middleware::from_fn_with_state(state.clone(), csrf_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(DefaultBodyLimit::max(max_request))
        .layer(RequestBodyLimitLayer::new(max_request))
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
