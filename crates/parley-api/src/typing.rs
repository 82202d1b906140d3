use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

use parley_db::models::parse_id;
use parley_types::api::SetTypingRequest;
use parley_types::events::GatewayEvent;
use parley_types::models::UserProfile;

use crate::auth::{AppState, now_ms};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::Caller;

/// POST /conversations/{conversation_id}/typing
pub async fn set_typing(
    State(state): State<AppState>,
    ApiPath(conversation_id): ApiPath<Uuid>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<SetTypingRequest>,
) -> ApiResult<StatusCode> {
    let subject = caller.subject().map(str::to_owned);
    let now = now_ms();
    let is_typing = req.is_typing;

    let user_id = state
        .run(move |db| db.set_typing(subject.as_deref(), &conversation_id.to_string(), is_typing, now))
        .await?;

    state.dispatcher.broadcast(GatewayEvent::TypingUpdate {
        conversation_id,
        user_id: parse_id(&user_id, "user"),
        is_typing,
    });
    Ok(StatusCode::NO_CONTENT)
}

/// GET /conversations/{conversation_id}/typing
pub async fn list_typing(
    State(state): State<AppState>,
    ApiPath(conversation_id): ApiPath<Uuid>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<UserProfile>>> {
    let subject = caller.subject().map(str::to_owned);
    let now = now_ms();
    let users = state
        .run(move |db| db.list_typing(subject.as_deref(), &conversation_id.to_string(), now))
        .await?;
    Ok(Json(users))
}
