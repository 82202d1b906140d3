use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_db::models::{parse_id, to_datetime};
use parley_types::api::{MessageCreated, SendMessageRequest};
use parley_types::events::GatewayEvent;
use parley_types::models::MessageView;

use crate::auth::{AppState, now_ms};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::Caller;

/// GET /conversations/{conversation_id}/messages: oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    ApiPath(conversation_id): ApiPath<Uuid>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let subject = caller.subject().map(str::to_owned);
    let messages = state
        .run(move |db| db.list_messages(subject.as_deref(), &conversation_id.to_string()))
        .await?;
    Ok(Json(messages))
}

/// POST /conversations/{conversation_id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    ApiPath(conversation_id): ApiPath<Uuid>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let subject = caller.subject().map(str::to_owned);
    let now = now_ms();

    let row = state
        .run(move |db| db.send_message(subject.as_deref(), &conversation_id.to_string(), &req.content, now))
        .await?;

    let message_id = parse_id(&row.id, "message");
    let created_at = to_datetime(row.created_at);

    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        conversation_id,
        message_id,
        sender_id: parse_id(&row.sender_id, "sender"),
        timestamp: created_at,
    });
    let members = state.member_ids(conversation_id).await?;
    state.dispatcher.notify_members(conversation_id, &members).await;

    Ok((StatusCode::CREATED, Json(MessageCreated { message_id, created_at })))
}

/// DELETE /messages/{message_id}: soft delete, sender only.
pub async fn delete_message(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<Uuid>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<StatusCode> {
    let subject = caller.subject().map(str::to_owned);

    let row = state
        .run(move |db| db.delete_message(subject.as_deref(), &message_id.to_string()))
        .await?;

    let conversation_id = parse_id(&row.conversation_id, "conversation");
    state.dispatcher.broadcast(GatewayEvent::MessageDelete {
        conversation_id,
        message_id,
    });
    // The deleted message may be the list preview
    let members = state.member_ids(conversation_id).await?;
    state.dispatcher.notify_members(conversation_id, &members).await;

    Ok(StatusCode::NO_CONTENT)
}
