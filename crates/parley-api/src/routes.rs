use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post},
};

use parley_gateway::connection;

use crate::auth::AppState;
use crate::middleware::{optional_auth, require_auth};
use crate::{conversations, messages, presence, reactions, typing, users};

/// All HTTP routes plus the gateway upgrade. Reads accept anonymous callers
/// and degrade to empty results; writes demand a valid token.
pub fn router(state: AppState) -> Router {
    let reads = Router::new()
        .route("/users", get(users::search_users))
        .route("/users/me", get(users::get_me))
        .route("/users/{user_id}", get(users::get_user))
        .route("/presence/online", get(presence::list_online))
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/{conversation_id}", get(conversations::get_conversation))
        .route("/conversations/{conversation_id}/messages", get(messages::list_messages))
        .route("/conversations/{conversation_id}/typing", get(typing::list_typing))
        .layer(from_fn_with_state(state.clone(), optional_auth));

    let writes = Router::new()
        .route("/users/me", post(users::upsert_me))
        .route("/presence/heartbeat", post(presence::heartbeat))
        .route("/conversations/direct", post(conversations::create_direct))
        .route("/conversations/group", post(conversations::create_group))
        .route("/conversations/{conversation_id}/seen", post(conversations::mark_seen))
        .route("/conversations/{conversation_id}/messages", post(messages::send_message))
        .route("/conversations/{conversation_id}/typing", post(typing::set_typing))
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route("/messages/{message_id}/reactions", post(reactions::toggle_reaction))
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(reads)
        .merge(writes)
        .route("/gateway", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.dispatcher.clone(),
            state.db.clone(),
            state.jwt_secret.clone(),
        )
    })
}
