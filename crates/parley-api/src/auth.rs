use std::sync::Arc;

use parley_db::{ChatResult, Database};
use parley_gateway::dispatcher::Dispatcher;
use tracing::error;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: String) -> AppState {
        Arc::new(Self {
            db: Arc::new(db),
            jwt_secret,
            dispatcher: Dispatcher::new(),
        })
    }

    /// Run a store call off the async runtime.
    pub async fn run<T, F>(&self, f: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> ChatResult<T> + Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(e.to_string())
            })?;
        Ok(result?)
    }

    /// Member ids of a conversation, for targeted notifications.
    pub async fn member_ids(&self, conversation_id: Uuid) -> ApiResult<Vec<Uuid>> {
        let ids = self
            .run(move |db| db.member_ids(&conversation_id.to_string()))
            .await?;
        Ok(ids
            .iter()
            .map(|id| parley_db::models::parse_id(id, "member"))
            .collect())
    }
}

/// Wall clock in epoch milliseconds, the store's time unit.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
