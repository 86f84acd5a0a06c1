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
/// - learner API under `/api/v1/...` (bearer token required except health and balance)
/// - admin API under `/api/v1/admin/...`
/// - Static SPA from `./static` with index fallback
/// - CORS and per-request trace spans
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/api/v1/health", get(http::http_health))
        // Progression
        .route("/api/v1/progress", get(http::http_get_progress))
        .route("/api/v1/streak", post(http::http_post_streak))
        .route("/api/v1/achievements", get(http::http_get_achievements))
        .route("/api/v1/achievements/check", post(http::http_post_check_achievements))
        .route("/api/v1/lessons/complete", post(http::http_post_lesson_complete))
        // Quizzes
        .route("/api/v1/quizzes/submit", post(http::http_post_quiz_submit))
        .route("/api/v1/quizzes/:id", get(http::http_get_quiz))
        .route("/api/v1/attempts/:id", get(http::http_get_attempt))
        // Admin
        .route("/api/v1/admin/xp", post(http::http_post_admin_xp))
        .route("/api/v1/admin/attempts/pending", get(http::http_get_pending_attempts))
        .route("/api/v1/admin/attempts/:id/grade", post(http::http_post_grade_attempt))
        .route("/api/v1/admin/learners/:id/reconcile", get(http::http_get_reconcile))
        // Chemistry helper
        .route("/api/v1/chem/balance", post(http::http_post_balance))
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
        .fallback_service(static_service)
}
