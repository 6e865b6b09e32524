pub mod duplicates;
pub mod generation;
pub mod health;
pub mod questions;

use axum::{
    routing::{get, post},
    Router,
};

use crate::middleware::rate_limit::{rps_middleware, RateLimiter};
use crate::AppState;

/// Admin API, wrapped in a shared per-second request limit.
pub fn admin_routes(rps: u32) -> Router<AppState> {
    Router::new()
        .route(
            "/api/admin/generation/trigger",
            post(generation::trigger_generation),
        )
        .route(
            "/api/admin/generation/status",
            get(generation::generation_status),
        )
        .route(
            "/api/admin/generation/settings",
            get(generation::get_settings).post(generation::update_settings),
        )
        .route(
            "/api/admin/questions",
            get(questions::list_questions).post(questions::create_question),
        )
        .route(
            "/api/admin/questions/:id/review",
            post(questions::review_question),
        )
        .route(
            "/api/admin/questions/:id",
            axum::routing::delete(questions::delete_question),
        )
        .route("/api/admin/duplicates", get(duplicates::list_duplicates))
        .layer(axum::middleware::from_fn_with_state(
            RateLimiter::new(rps),
            rps_middleware,
        ))
}

pub fn app(state: AppState, admin_rps: u32) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .merge(admin_routes(admin_rps))
        .with_state(state)
}
