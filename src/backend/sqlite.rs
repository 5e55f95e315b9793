//! Local database backend.
//!
//! Rows live in SQLite through the repositories in [`crate::db`]; changes to
//! tool records are fanned out through a shared [`RealtimeHub`] so every
//! subscription in the process sees them. The server wraps one of these per
//! process and the CLI uses one when no server is configured.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{
    AuthSession, BackendError, BackendResult, DashboardStore, RealtimeHub, Subscription, ToolStore,
};
use crate::db::{AnalysisRepository, MetricRepository, ProductRepository, ToolRepository};
use crate::models::{
    AnalysisSummary, ChangeEvent, DailyMetric, Product, SavedAnalysis, ToolRecord, User, UserId,
};

#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    hub: Arc<RealtimeHub>,
    user: Option<User>,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool, hub: Arc<RealtimeHub>) -> Self {
        Self {
            pool,
            hub,
            user: None,
        }
    }

    /// Same database, acting as `user`.
    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn hub(&self) -> &Arc<RealtimeHub> {
        &self.hub
    }

    fn tools(&self) -> ToolRepository {
        ToolRepository::new(self.pool.clone())
    }

    fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    fn metrics(&self) -> MetricRepository {
        MetricRepository::new(self.pool.clone())
    }

    fn analyses(&self) -> AnalysisRepository {
        AnalysisRepository::new(self.pool.clone())
    }
}

impl AuthSession for SqliteBackend {
    fn current_user(&self) -> Option<User> {
        self.user.clone()
    }
}

#[async_trait]
impl ToolStore for SqliteBackend {
    async fn select_tool_records(
        &self,
        owner: &UserId,
        tool_name: &str,
        limit: usize,
    ) -> BackendResult<Vec<ToolRecord>> {
        Ok(self.tools().select(owner, tool_name, limit).await?)
    }

    async fn upsert_tool_record(&self, record: &ToolRecord) -> BackendResult<ToolRecord> {
        let (old, stored) = self.tools().upsert(record).await?;
        tracing::debug!(
            "[sqlite] upserted {} for {}",
            stored.tool_name,
            stored.owner_id
        );
        self.hub
            .publish(ChangeEvent::from_upsert(old, stored.clone()))
            .await;
        Ok(stored)
    }

    async fn subscribe(&self, owner: &UserId, topic: &str) -> BackendResult<Subscription> {
        Ok(self.hub.subscription(owner, topic).await)
    }
}

#[async_trait]
impl DashboardStore for SqliteBackend {
    async fn list_products(&self, owner: &UserId) -> BackendResult<Vec<Product>> {
        Ok(self.products().list(owner).await?)
    }

    async fn insert_product(&self, product: &Product) -> BackendResult<Product> {
        Ok(self.products().create(product).await?)
    }

    async fn delete_product(&self, owner: &UserId, id: Uuid) -> BackendResult<()> {
        if self.products().delete(owner, id).await? {
            Ok(())
        } else {
            Err(BackendError::NotFound(format!("product {}", id)))
        }
    }

    async fn product_has_metrics(&self, owner: &UserId, id: Uuid) -> BackendResult<bool> {
        Ok(self.products().has_metrics(owner, id).await?)
    }

    async fn select_daily_metrics(
        &self,
        owner: &UserId,
        product_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BackendResult<Vec<DailyMetric>> {
        Ok(self.metrics().range(owner, product_id, from, to).await?)
    }

    async fn upsert_daily_metric(&self, metric: &DailyMetric) -> BackendResult<DailyMetric> {
        Ok(self.metrics().upsert(metric).await?)
    }

    async fn list_analyses(&self, owner: &UserId) -> BackendResult<Vec<AnalysisSummary>> {
        Ok(self.analyses().list(owner).await?)
    }

    async fn insert_analysis(&self, analysis: &SavedAnalysis) -> BackendResult<SavedAnalysis> {
        Ok(self.analyses().create(analysis).await?)
    }

    async fn get_analysis(
        &self,
        owner: &UserId,
        id: Uuid,
    ) -> BackendResult<Option<SavedAnalysis>> {
        Ok(self.analyses().get_by_id(owner, id).await?)
    }

    async fn delete_analysis(&self, owner: &UserId, id: Uuid) -> BackendResult<()> {
        Ok(self.analyses().delete(owner, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::models::ChangeKind;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (SqliteBackend, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        let backend =
            SqliteBackend::new(pool, Arc::new(RealtimeHub::new())).with_user(User::new("u1"));
        (backend, temp_dir)
    }

    #[tokio::test]
    async fn test_upsert_publishes_update_to_subscribers() {
        let (backend, _dir) = setup().await;
        let owner = UserId::new("u1");
        let mut subscription = backend.subscribe(&owner, "tool-sonar-u1").await.unwrap();

        backend
            .upsert_tool_record(&ToolRecord::new(owner.clone(), "sonar", json!({"a": 1})))
            .await
            .unwrap();
        backend
            .upsert_tool_record(&ToolRecord::new(owner.clone(), "sonar", json!({"a": 2})))
            .await
            .unwrap();

        assert_eq!(subscription.next().await.unwrap().kind, ChangeKind::Insert);
        let update = subscription.next().await.unwrap();
        assert_eq!(update.kind, ChangeKind::Update);
        assert_eq!(update.new.unwrap().payload, json!({"a": 2}));
    }

    #[tokio::test]
    async fn test_delete_missing_product_is_not_found() {
        let (backend, _dir) = setup().await;
        let result = backend
            .delete_product(&UserId::new("u1"), Uuid::new_v4())
            .await;
        assert!(matches!(result, Err(BackendError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_current_user() {
        let (backend, _dir) = setup().await;
        assert_eq!(backend.current_user().unwrap().id.as_str(), "u1");
    }
}
