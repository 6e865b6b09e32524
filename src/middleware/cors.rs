use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// The admin dashboard is served from a different origin than the API.
pub fn admin_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_origin(Any)
}
