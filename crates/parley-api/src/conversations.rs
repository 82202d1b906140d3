use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use parley_db::models::parse_id;
use parley_types::api::{ConversationCreated, CreateDirectRequest, CreateGroupRequest};
use parley_types::models::{ConversationDetail, ConversationSummary};

use crate::auth::{AppState, now_ms};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::Caller;

/// GET /conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let subject = caller.subject().map(str::to_owned);
    let list = state
        .run(move |db| db.list_conversations(subject.as_deref()))
        .await?;
    Ok(Json(list))
}

/// GET /conversations/{conversation_id}: null when missing or not visible.
pub async fn get_conversation(
    State(state): State<AppState>,
    ApiPath(conversation_id): ApiPath<Uuid>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Option<ConversationDetail>>> {
    let subject = caller.subject().map(str::to_owned);
    let detail = state
        .run(move |db| db.get_conversation(subject.as_deref(), &conversation_id.to_string()))
        .await?;
    Ok(Json(detail))
}

/// POST /conversations/direct: 201 when created, 200 when it already existed.
pub async fn create_direct(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<CreateDirectRequest>,
) -> ApiResult<impl IntoResponse> {
    let subject = caller.subject().map(str::to_owned);
    let other = req.other_user_id.to_string();
    let now = now_ms();

    let direct = state
        .run(move |db| db.get_or_create_direct(subject.as_deref(), &other, now))
        .await?;
    let conversation_id = parse_id(&direct.id, "conversation");

    let status = if direct.created {
        let members = state.member_ids(conversation_id).await?;
        state.dispatcher.notify_members(conversation_id, &members).await;
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(ConversationCreated { conversation_id })))
}

/// POST /conversations/group
pub async fn create_group(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<CreateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let subject = caller.subject().map(str::to_owned);
    let member_ids: Vec<String> = req.member_ids.iter().map(Uuid::to_string).collect();
    let now = now_ms();

    let id = state
        .run(move |db| db.create_group(subject.as_deref(), &member_ids, &req.group_name, now))
        .await?;
    let conversation_id = parse_id(&id, "conversation");

    let members = state.member_ids(conversation_id).await?;
    state.dispatcher.notify_members(conversation_id, &members).await;
    info!("Group {} created with {} members", conversation_id, members.len());

    Ok((StatusCode::CREATED, Json(ConversationCreated { conversation_id })))
}

/// POST /conversations/{conversation_id}/seen
pub async fn mark_seen(
    State(state): State<AppState>,
    ApiPath(conversation_id): ApiPath<Uuid>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<StatusCode> {
    let subject = caller.subject().map(str::to_owned);
    let lookup = subject.clone();

    let marked = state
        .run(move |db| db.mark_seen(subject.as_deref(), &conversation_id.to_string()))
        .await?;

    if marked.is_some() {
        // Only the caller's unread count moved
        let me = state.run(move |db| db.get_me(lookup.as_deref())).await?;
        if let Some(me) = me {
            state
                .dispatcher
                .notify_members(conversation_id, &[parse_id(&me.id, "user")])
                .await;
        }
    }
    Ok(StatusCode::NO_CONTENT)
}
