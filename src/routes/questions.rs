use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::question_dto::{
        CreateQuestionPayload, QuestionListQuery, QuestionListResponse, QuestionResponse,
        ReviewPayload,
    },
    error::{Error, Result},
    services::vector_index::{VectorPayload, VectorPoint},
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/admin/questions",
    params(
        ("status" = Option<String>, Query, description = "to_review, accepted or rejected"),
        ("page" = Option<i64>, Query, description = "Page number"),
        ("per_page" = Option<i64>, Query, description = "Items per page")
    ),
    responses(
        (status = 200, description = "Questions", body = Json<QuestionListResponse>),
        (status = 400, description = "Invalid filter")
    )
)]
#[axum::debug_handler]
pub async fn list_questions(
    State(state): State<AppState>,
    Query(query): Query<QuestionListQuery>,
) -> Result<impl IntoResponse> {
    query.validate()?;
    let list = state.questions.list(query.into_filter()?).await?;
    Ok(Json(QuestionListResponse::from(list)))
}

#[utoipa::path(
    post,
    path = "/api/admin/questions",
    request_body = CreateQuestionPayload,
    responses(
        (status = 201, description = "Question created", body = Json<QuestionResponse>),
        (status = 400, description = "Invalid payload or duplicate text")
    )
)]
#[axum::debug_handler]
pub async fn create_question(
    State(state): State<AppState>,
    Json(payload): Json<CreateQuestionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let new_question = payload.into_new_question()?;

    if let Some(existing) = state.questions.find_by_hash(&new_question.question_hash).await? {
        return Err(Error::BadRequest(format!(
            "A question with the same text already exists ({})",
            existing.id
        )));
    }

    let question = state.questions.insert(new_question).await?;
    tracing::info!(question_id = %question.id, "Manual question created");

    match state.generator.embed(&question.question_text).await {
        Ok(vector) => {
            let point = VectorPoint {
                id: question.id,
                vector,
                payload: VectorPayload::from(&question),
            };
            if let Err(e) = state.index.upsert(point).await {
                tracing::warn!(question_id = %question.id, error = %e, "Vector upsert failed for manual question");
            }
        }
        Err(e) => {
            tracing::warn!(question_id = %question.id, error = %e, "Embedding failed for manual question")
        }
    }

    Ok((StatusCode::CREATED, Json(QuestionResponse::from(question))))
}

#[utoipa::path(
    post,
    path = "/api/admin/questions/{id}/review",
    params(
        ("id" = Uuid, Path, description = "Question ID")
    ),
    request_body = ReviewPayload,
    responses(
        (status = 200, description = "Review recorded", body = Json<QuestionResponse>),
        (status = 400, description = "Invalid status"),
        (status = 404, description = "Question not found")
    )
)]
#[axum::debug_handler]
pub async fn review_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let status = payload.decision()?;
    let question = state.questions.set_status(id, status).await?;
    tracing::info!(question_id = %id, status = %status, "Question reviewed");

    state.buffer.ensure_filled().await;
    Ok(Json(QuestionResponse::from(question)))
}

#[utoipa::path(
    delete,
    path = "/api/admin/questions/{id}",
    params(
        ("id" = Uuid, Path, description = "Question ID")
    ),
    responses(
        (status = 204, description = "Question deleted"),
        (status = 404, description = "Question not found")
    )
)]
#[axum::debug_handler]
pub async fn delete_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.questions.soft_delete(id).await?;
    tracing::info!(question_id = %id, "Question soft-deleted");
    if let Err(e) = state.index.delete(id).await {
        tracing::warn!(question_id = %id, error = %e, "Vector delete failed for deleted question");
    }

    state.buffer.ensure_filled().await;
    Ok(StatusCode::NO_CONTENT)
}
