use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use parley_db::{ChatResult, Database};
use parley_types::api::Claims;
use parley_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Clients must Identify within this long after connecting.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Conversations a connection receives scoped events for.
pub type Subscriptions = Arc<RwLock<HashSet<Uuid>>>;

/// An identified gateway user.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    /// External auth subject, passed to store calls as the caller.
    pub subject: String,
}

/// Handle a single WebSocket connection: Identify handshake, Ready, then the
/// event loop until either side goes away.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let Some(subject) = wait_for_identify(&mut receiver, &jwt_secret).await else {
        warn!("WebSocket client failed to identify, closing");
        return;
    };

    // Step 2: Map the subject to a registered user
    let lookup_subject = subject.clone();
    let user = blocking(&db, move |db| db.resolve_user(Some(&lookup_subject))).await.flatten();
    let Some(user) = user else {
        warn!("Gateway identify for unregistered subject {}, closing", subject);
        return;
    };
    let session = Session {
        user_id: parley_db::models::parse_id(&user.id, "user"),
        subject,
    };

    info!("{} ({}) connected to gateway", user.name, session.user_id);

    // Step 3: Send Ready event
    let ready = GatewayEvent::Ready { user_id: session.user_id };
    let Some(text) = event_text(&ready) else {
        return;
    };
    if sender.send(Message::Text(text.into())).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, db, session).await;
    info!("{} disconnected from gateway", user.name);
}

async fn run_connection_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    session: Session,
) {
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(session.user_id).await;

    // Connecting counts as activity
    handle_command(&dispatcher, &db, &session, GatewayCommand::Heartbeat, &Subscriptions::default()).await;

    let mut broadcast_rx = dispatcher.subscribe();

    // Per-connection conversation subscriptions (shared between send and recv tasks).
    let subscriptions: Subscriptions = Arc::default();
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Spawn task to forward broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if let Some(conversation_id) = event.conversation_id() {
                        let subscribed = send_subscriptions
                            .read()
                            .unwrap_or_else(|e| e.into_inner())
                            .contains(&conversation_id);
                        if !subscribed {
                            continue;
                        }
                    }

                    let Some(text) = event_text(&event) else { continue };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let Some(event) = result else { break };
                    let Some(text) = event_text(&event) else { continue };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_dispatcher = dispatcher.clone();
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&recv_dispatcher, &db, &recv_session, cmd, &subscriptions).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            recv_session.user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_user_channel(session.user_id, conn_id).await;
}

/// Wait for an Identify command and return the verified auth subject.
async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<String> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return verify_token(&token, jwt_secret);
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

/// Verify an HS256 bearer token and return its subject.
pub fn verify_token(token: &str, jwt_secret: &str) -> Option<String> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    Some(token_data.claims.sub)
}

/// Apply one client command. Store failures are logged and dropped: the
/// gateway has no reply channel for command errors.
pub async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    session: &Session,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { conversation_ids } => {
            let requested = conversation_ids.len();
            let user_id = session.user_id.to_string();
            let allowed = blocking(db, move |db| {
                let mut allowed = HashSet::new();
                for id in conversation_ids {
                    if db.is_member(&id.to_string(), &user_id)? {
                        allowed.insert(id);
                    }
                }
                Ok(allowed)
            })
            .await
            .unwrap_or_default();

            info!(
                "{} subscribed to {} of {} requested conversations",
                session.user_id,
                allowed.len(),
                requested
            );
            *subscriptions.write().unwrap_or_else(|e| e.into_inner()) = allowed;
        }

        GatewayCommand::Heartbeat => {
            let subject = session.subject.clone();
            let now = chrono::Utc::now().timestamp_millis();
            if blocking(db, move |db| db.heartbeat(Some(&subject), now)).await.is_some() {
                dispatcher.broadcast(GatewayEvent::PresenceUpdate { user_id: session.user_id });
            }
        }

        GatewayCommand::SetTyping { conversation_id, is_typing } => {
            let subject = session.subject.clone();
            let now = chrono::Utc::now().timestamp_millis();
            let stored = blocking(db, move |db| {
                db.set_typing(Some(&subject), &conversation_id.to_string(), is_typing, now)
            })
            .await;

            if stored.is_some() {
                dispatcher.broadcast(GatewayEvent::TypingUpdate {
                    conversation_id,
                    user_id: session.user_id,
                    is_typing,
                });
            }
        }
    }
}

/// Run a store call off the async runtime, logging failures.
async fn blocking<T, F>(db: &Arc<Database>, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> ChatResult<T> + Send + 'static,
{
    let db = db.clone();
    match tokio::task::spawn_blocking(move || f(&db)).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("Gateway store call failed: {}", e);
            None
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            None
        }
    }
}

fn event_text(event: &GatewayEvent) -> Option<String> {
    serde_json::to_string(event)
        .map_err(|e| error!("Failed to serialize gateway event: {}", e))
        .ok()
}
