//! Application State

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use assistant_core::LlmProvider;
use portfolio_advisor::{Assistant, AssistantSession, UserStore};

/// One conversation, locked for the duration of a turn
pub type SharedSession = Arc<tokio::sync::Mutex<AssistantSession>>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Assistant>,

    /// Used for health checks only; turns go through the assistant
    pub provider: Arc<dyn LlmProvider>,

    pub user_store: Arc<dyn UserStore>,
    pub sessions: SessionMap,

    /// Market data runs on service-level Alpaca credentials
    pub market_data_live: bool,
}

/// Live conversations keyed by user and conversation id.
///
/// Conversations idle longer than the configured window are evicted, as are
/// the least recently used ones once the map is full.
#[derive(Clone)]
pub struct SessionMap {
    inner: Cache<String, SharedSession>,
}

impl SessionMap {
    pub fn new(max_capacity: u64, idle: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_idle(idle)
                .build(),
        }
    }

    fn key(user_id: &str, conversation_id: &str) -> String {
        format!("{user_id}/{conversation_id}")
    }

    /// Existing conversation, or a fresh one from `create`
    pub async fn get_or_create(
        &self,
        user_id: &str,
        conversation_id: &str,
        create: impl FnOnce() -> AssistantSession,
    ) -> SharedSession {
        self.inner
            .get_with(Self::key(user_id, conversation_id), async move {
                Arc::new(tokio::sync::Mutex::new(create()))
            })
            .await
    }

    pub async fn get(&self, user_id: &str, conversation_id: &str) -> Option<SharedSession> {
        self.inner.get(&Self::key(user_id, conversation_id)).await
    }

    /// Forget a conversation; returns whether it was live
    pub async fn remove(&self, user_id: &str, conversation_id: &str) -> bool {
        self.inner
            .remove(&Self::key(user_id, conversation_id))
            .await
            .is_some()
    }

    pub async fn count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}
