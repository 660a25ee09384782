//! Router assembly: HTTP endpoints, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/tutor/login", post(http::http_tutor_login))
        // Students
        .route("/api/v1/students", get(http::http_list_students).post(http::http_add_student))
        .route("/api/v1/students/:id", get(http::http_get_student))
        .route(
            "/api/v1/students/:id/placement",
            get(http::http_placement_test).post(http::http_complete_placement),
        )
        .route("/api/v1/students/:id/activities", get(http::http_student_activities))
        .route("/api/v1/students/:id/completed", get(http::http_student_completed))
        .route("/api/v1/students/:id/insights", get(http::http_student_insights))
        .route("/api/v1/students/:id/insights/refresh", post(http::http_refresh_insights))
        .route("/api/v1/students/:id/goals", get(http::http_student_goals).post(http::http_add_goal))
        .route("/api/v1/goals/:id/toggle", post(http::http_toggle_goal))
        // Activities & answers
        .route("/api/v1/activities", post(http::http_add_activity))
        .route("/api/v1/activities/generate", post(http::http_generate_activity))
        .route("/api/v1/activities/:id", get(http::http_get_activity))
        .route("/api/v1/activities/:id/review", get(http::http_review_activity))
        .route("/api/v1/activities/:id/complete", post(http::http_complete_activity))
        .route("/api/v1/answers", post(http::http_save_answer))
        .route("/api/v1/extract_text", post(http::http_extract_text))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
