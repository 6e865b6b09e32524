use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use validator::Validate;

use crate::{
    dto::generation_dto::{SettingsResponse, TriggerResponse, UpdateSettingsPayload},
    error::Result,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/admin/generation/trigger",
    responses(
        (status = 202, description = "Generation queued", body = Json<TriggerResponse>)
    )
)]
#[axum::debug_handler]
pub async fn trigger_generation(State(state): State<AppState>) -> impl IntoResponse {
    let queued = state.buffer.trigger().await;
    let status = state.buffer.status().await;
    (StatusCode::ACCEPTED, Json(TriggerResponse { queued, status }))
}

#[utoipa::path(
    get,
    path = "/api/admin/generation/status",
    responses(
        (status = 200, description = "Buffer status snapshot", body = Json<crate::services::buffer_service::BufferStatus>)
    )
)]
#[axum::debug_handler]
pub async fn generation_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.buffer.status().await)
}

#[utoipa::path(
    get,
    path = "/api/admin/generation/settings",
    responses(
        (status = 200, description = "Current generation settings", body = Json<SettingsResponse>)
    )
)]
#[axum::debug_handler]
pub async fn get_settings(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let settings = state.settings.load().await?;
    Ok(Json(SettingsResponse::from(settings)))
}

#[utoipa::path(
    post,
    path = "/api/admin/generation/settings",
    request_body = UpdateSettingsPayload,
    responses(
        (status = 200, description = "Settings saved", body = Json<SettingsResponse>),
        (status = 400, description = "Invalid payload")
    )
)]
#[axum::debug_handler]
pub async fn update_settings(
    State(state): State<AppState>,
    Json(payload): Json<UpdateSettingsPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let settings = state.settings.update(payload.into()).await?;
    // Size or refill toggles change the shortfall.
    state.buffer.ensure_filled().await;
    Ok(Json(SettingsResponse::from(settings)))
}
