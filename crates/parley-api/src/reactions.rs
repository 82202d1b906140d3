use axum::{
    Extension, Json,
    extract::State,
};
use uuid::Uuid;

use parley_db::models::parse_id;
use parley_types::api::{ToggleReactionRequest, ToggleReactionResponse};
use parley_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::Caller;

/// POST /messages/{message_id}/reactions
pub async fn toggle_reaction(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<Uuid>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<ToggleReactionRequest>,
) -> ApiResult<Json<ToggleReactionResponse>> {
    let subject = caller.subject().map(str::to_owned);
    let emoji = req.emoji.clone();

    let toggle = state
        .run(move |db| db.toggle_reaction(subject.as_deref(), &message_id.to_string(), &emoji))
        .await?;

    state.dispatcher.broadcast(GatewayEvent::ReactionUpdate {
        conversation_id: parse_id(&toggle.conversation_id, "conversation"),
        message_id,
        user_id: parse_id(&toggle.user_id, "user"),
        emoji: req.emoji,
        added: toggle.added,
    });

    Ok(Json(ToggleReactionResponse { added: toggle.added }))
}
