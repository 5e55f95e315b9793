//! Storage, auth and realtime collaborators.
//!
//! Everything above this module talks to the backend through the traits
//! defined here, so the same code runs against the hosted server
//! ([`RemoteBackend`]), a local database ([`SqliteBackend`]) or an
//! in-process fake ([`MemoryBackend`]).

pub mod hub;
pub mod memory;
pub mod remote;
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use futures::StreamExt;
use uuid::Uuid;

use crate::models::{
    AnalysisSummary, ChangeEvent, DailyMetric, Product, SavedAnalysis, ToolRecord, User, UserId,
};

pub use hub::RealtimeHub;
pub use memory::MemoryBackend;
pub use remote::RemoteBackend;
pub use sqlite::SqliteBackend;

/// Errors surfaced by backend collaborators.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Not signed in")]
    NoSession,
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Server returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("Realtime channel error: {0}")]
    Channel(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Accessor for the current authentication session.
pub trait AuthSession: Send + Sync {
    fn current_user(&self) -> Option<User>;
}

/// Row storage and change notifications for per-tool records.
#[async_trait]
pub trait ToolStore: Send + Sync {
    /// Rows matching `(owner, tool_name)`, at most `limit` of them.
    async fn select_tool_records(
        &self,
        owner: &UserId,
        tool_name: &str,
        limit: usize,
    ) -> BackendResult<Vec<ToolRecord>>;

    /// Insert-or-replace keyed by `(owner_id, tool_name)`. The payload is
    /// replaced wholesale.
    async fn upsert_tool_record(&self, record: &ToolRecord) -> BackendResult<ToolRecord>;

    /// Opens a change feed for every tool record owned by `owner`.
    ///
    /// `topic` names the channel for diagnostics; the feed is not narrowed
    /// to a single tool.
    async fn subscribe(&self, owner: &UserId, topic: &str) -> BackendResult<Subscription>;
}

/// Products, ledger entries and saved analyses.
#[async_trait]
pub trait DashboardStore: Send + Sync {
    async fn list_products(&self, owner: &UserId) -> BackendResult<Vec<Product>>;
    async fn insert_product(&self, product: &Product) -> BackendResult<Product>;
    async fn delete_product(&self, owner: &UserId, id: Uuid) -> BackendResult<()>;
    async fn product_has_metrics(&self, owner: &UserId, id: Uuid) -> BackendResult<bool>;

    /// Ledger entries of one product between `from` and `to`, inclusive.
    async fn select_daily_metrics(
        &self,
        owner: &UserId,
        product_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BackendResult<Vec<DailyMetric>>;
    async fn upsert_daily_metric(&self, metric: &DailyMetric) -> BackendResult<DailyMetric>;

    /// Saved analyses, newest first.
    async fn list_analyses(&self, owner: &UserId) -> BackendResult<Vec<AnalysisSummary>>;
    async fn insert_analysis(&self, analysis: &SavedAnalysis) -> BackendResult<SavedAnalysis>;
    async fn get_analysis(&self, owner: &UserId, id: Uuid)
        -> BackendResult<Option<SavedAnalysis>>;
    async fn delete_analysis(&self, owner: &UserId, id: Uuid) -> BackendResult<()>;
}

/// Auth and tool storage behind one handle, as the sync layer needs both.
pub trait ToolBackend: AuthSession + ToolStore {}

impl<T: AuthSession + ToolStore + ?Sized> ToolBackend for T {}

/// Locks a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type CloseHook = Box<dyn FnOnce() + Send>;

/// An open change feed.
///
/// Closing is idempotent: the close hook runs at most once, either through
/// [`Subscription::close`] or when the subscription is dropped.
pub struct Subscription {
    topic: String,
    events: BoxStream<'static, ChangeEvent>,
    on_close: Option<CloseHook>,
    closed: bool,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, events: BoxStream<'static, ChangeEvent>) -> Self {
        Self {
            topic: topic.into(),
            events,
            on_close: None,
            closed: false,
        }
    }

    /// Registers a hook that runs when the subscription is closed.
    pub fn with_close_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next change event, or `None` once the feed ends or is closed.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        if self.closed {
            return None;
        }
        self.events.next().await
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        tracing::debug!("[realtime] closing channel {}", self.topic);
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_subscription_close_hook_runs_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);
        let mut subscription = Subscription::new("tool-x-u1", futures::stream::pending().boxed())
            .with_close_hook(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        subscription.close();
        subscription.close();
        assert!(subscription.is_closed());
        assert!(subscription.next().await.is_none());
        drop(subscription);

        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscription_drop_closes() {
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);
        let subscription = Subscription::new("t", futures::stream::empty().boxed())
            .with_close_hook(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        drop(subscription);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
