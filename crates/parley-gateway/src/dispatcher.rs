use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use parley_types::events::GatewayEvent;

/// Fan-out hub for gateway events.
///
/// Conversation-scoped and global events go over one broadcast channel and
/// each connection filters by its subscriptions. User-scoped events go
/// straight to that user's connections.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// user_id -> every open connection of that user as (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, Vec<(Uuid, mpsc::UnboundedSender<GatewayEvent>)>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-connection targeted channel. Returns (conn_id, receiver).
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .push((conn_id, tx));
        (conn_id, rx)
    }

    /// Drop one connection's targeted channel; other connections of the same
    /// user stay registered.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.retain(|(id, _)| *id != conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to every connection of a user.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some(conns) = channels.get(&user_id) {
            for (_, tx) in conns {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Tell each member that their view of a conversation changed.
    pub async fn notify_members(&self, conversation_id: Uuid, member_ids: &[Uuid]) {
        for &user_id in member_ids {
            self.send_to_user(user_id, GatewayEvent::ConversationUpdate { conversation_id })
                .await;
        }
    }

    #[cfg(test)]
    async fn is_connected(&self, user_id: Uuid) -> bool {
        self.inner.user_channels.read().await.contains_key(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        let event = GatewayEvent::PresenceUpdate { user_id: Uuid::new_v4() };
        dispatcher.broadcast(event.clone());
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_targeted_events_reach_every_connection_of_the_user() {
        let dispatcher = Dispatcher::new();
        let ana = Uuid::new_v4();
        let ben = Uuid::new_v4();
        let (_, mut tab_one) = dispatcher.register_user_channel(ana).await;
        let (_, mut tab_two) = dispatcher.register_user_channel(ana).await;
        let (_, mut other) = dispatcher.register_user_channel(ben).await;

        let conversation_id = Uuid::new_v4();
        dispatcher.notify_members(conversation_id, &[ana]).await;

        let expected = GatewayEvent::ConversationUpdate { conversation_id };
        assert_eq!(tab_one.recv().await.unwrap(), expected);
        assert_eq!(tab_two.recv().await.unwrap(), expected);
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_only_drops_that_connection() {
        let dispatcher = Dispatcher::new();
        let ana = Uuid::new_v4();
        let (first, _rx1) = dispatcher.register_user_channel(ana).await;
        let (second, _rx2) = dispatcher.register_user_channel(ana).await;

        dispatcher.unregister_user_channel(ana, first).await;
        assert!(dispatcher.is_connected(ana).await);

        dispatcher.unregister_user_channel(ana, second).await;
        assert!(!dispatcher.is_connected(ana).await);
    }
}
