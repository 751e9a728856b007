use axum::{extract::rejection::JsonRejection, extract::State, routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::{ApiError, GENERIC_INTERNAL_ERROR};
use crate::api::validation::first_validation_message;
use crate::core::state::AppState;
use crate::schemas::feedback::{ChatRequest, ChatResponse, CompareRequest, CompareResponse};
use crate::services::feedback_chat::ChatError;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/compare", post(compare)).route("/chat", post(chat))
}

async fn compare(
    State(state): State<AppState>,
    payload: Result<Json<CompareRequest>, JsonRejection>,
) -> Result<Json<CompareResponse>, ApiError> {
    let Json(payload) = payload.map_err(|err| ApiError::BadRequest(err.body_text()))?;
    payload.validate().map_err(|e| ApiError::BadRequest(first_validation_message(&e)))?;

    let (feedback, session_id) = state
        .feedback_chat()
        .compare(&payload.teacher_script, &payload.student_script)
        .await
        .map_err(chat_error)?;

    Ok(Json(CompareResponse { feedback, session_id }))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(payload) = payload.map_err(|err| ApiError::BadRequest(err.body_text()))?;
    payload.validate().map_err(|e| ApiError::BadRequest(first_validation_message(&e)))?;

    let message = state
        .feedback_chat()
        .continue_chat(&payload.session_id, &payload.message)
        .await
        .map_err(chat_error)?;

    Ok(Json(ChatResponse { message }))
}

fn chat_error(err: ChatError) -> ApiError {
    match err {
        ChatError::SessionNotFound => ApiError::NotFound("Invalid session ID".to_string()),
        ChatError::Model(model) if model.is_timeout() => {
            tracing::warn!(error = %model, "Feedback chat model call timed out");
            ApiError::GatewayTimeout("The language model did not respond in time".to_string())
        }
        ChatError::Model(model) => ApiError::internal(model, GENERIC_INTERNAL_ERROR),
    }
}
