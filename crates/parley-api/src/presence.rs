use axum::{Extension, Json, extract::State, http::StatusCode};
use uuid::Uuid;

use parley_types::events::GatewayEvent;

use crate::auth::{AppState, now_ms};
use crate::error::ApiResult;
use crate::middleware::Caller;

/// POST /presence/heartbeat
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<StatusCode> {
    let subject = caller.subject().map(str::to_owned);
    let now = now_ms();
    let user_id = state.run(move |db| db.heartbeat(subject.as_deref(), now)).await?;

    state.dispatcher.broadcast(GatewayEvent::PresenceUpdate {
        user_id: parley_db::models::parse_id(&user_id, "user"),
    });
    Ok(StatusCode::NO_CONTENT)
}

/// GET /presence/online
pub async fn list_online(State(state): State<AppState>) -> ApiResult<Json<Vec<Uuid>>> {
    let now = now_ms();
    let ids = state.run(move |db| db.list_online(now)).await?;
    Ok(Json(
        ids.iter()
            .map(|id| parley_db::models::parse_id(id, "user"))
            .collect(),
    ))
}
