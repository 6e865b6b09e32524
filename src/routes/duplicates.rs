use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json},
};
use validator::Validate;

use crate::{
    dto::question_dto::{DuplicateListQuery, DuplicateListResponse},
    error::Result,
    AppState,
};

const DEFAULT_LIMIT: i64 = 50;

#[utoipa::path(
    get,
    path = "/api/admin/duplicates",
    params(
        ("limit" = Option<i64>, Query, description = "Most recent entries to return (max 200)")
    ),
    responses(
        (status = 200, description = "Rejected duplicate candidates, newest first", body = Json<DuplicateListResponse>)
    )
)]
#[axum::debug_handler]
pub async fn list_duplicates(
    State(state): State<AppState>,
    Query(query): Query<DuplicateListQuery>,
) -> Result<impl IntoResponse> {
    query.validate()?;
    let items = state
        .duplicate_logs
        .recent(query.limit.unwrap_or(DEFAULT_LIMIT))
        .await?;
    Ok(Json(DuplicateListResponse { items }))
}
