//! In-process backend.
//!
//! Keeps every table in memory and fans changes out through a
//! [`RealtimeHub`]. Failures can be injected per operation and open
//! subscriptions are counted, which makes it the collaborator of choice for
//! exercising the sync layer without a server.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use super::{
    lock, AuthSession, BackendError, BackendResult, DashboardStore, RealtimeHub, Subscription,
    ToolStore,
};
use crate::models::{
    AnalysisSummary, ChangeEvent, DailyMetric, Product, SavedAnalysis, ToolRecord, User, UserId,
};

#[derive(Default)]
struct Tables {
    /// Keyed by `(owner, tool)`; duplicates only exist when seeded on purpose.
    tools: BTreeMap<(UserId, String), Vec<ToolRecord>>,
    products: HashMap<Uuid, Product>,
    metrics: BTreeMap<(UserId, Uuid, NaiveDate), DailyMetric>,
    analyses: HashMap<Uuid, SavedAnalysis>,
}

#[derive(Default)]
struct Faults {
    select: Option<String>,
    upsert: Option<String>,
    subscribe: Option<String>,
    upsert_latency: Option<Duration>,
}

#[derive(Default)]
struct Counters {
    selects: AtomicUsize,
    upserts: AtomicUsize,
    open_subscriptions: AtomicUsize,
    opened_subscriptions: AtomicUsize,
    closed_subscriptions: AtomicUsize,
}

/// In-memory implementation of every backend trait.
pub struct MemoryBackend {
    user: Mutex<Option<User>>,
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
    counters: Arc<Counters>,
    hub: Arc<RealtimeHub>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            user: Mutex::new(None),
            tables: Mutex::new(Tables::default()),
            faults: Mutex::new(Faults::default()),
            counters: Arc::new(Counters::default()),
            hub: Arc::new(RealtimeHub::new()),
        }
    }

    /// Starts with `user` signed in.
    pub fn with_user(user: User) -> Self {
        let backend = Self::new();
        backend.sign_in(user);
        backend
    }

    pub fn sign_in(&self, user: User) {
        *lock(&self.user) = Some(user);
    }

    pub fn sign_out(&self) {
        *lock(&self.user) = None;
    }

    /// Appends a row without going through the upsert key, e.g. to model a
    /// store that let a duplicate through.
    pub fn seed_tool_record(&self, record: ToolRecord) {
        let key = (record.owner_id.clone(), record.tool_name.clone());
        lock(&self.tables).tools.entry(key).or_default().push(record);
    }

    /// Makes the next selects fail with `message` until cleared.
    pub fn fail_selects(&self, message: Option<&str>) {
        lock(&self.faults).select = message.map(str::to_string);
    }

    /// Makes the next upserts fail with `message` until cleared.
    pub fn fail_upserts(&self, message: Option<&str>) {
        lock(&self.faults).upsert = message.map(str::to_string);
    }

    /// Makes every upsert take `latency` before it lands.
    pub fn delay_upserts(&self, latency: Option<Duration>) {
        lock(&self.faults).upsert_latency = latency;
    }

    /// Makes the next subscribes fail with `message` until cleared.
    pub fn fail_subscribes(&self, message: Option<&str>) {
        lock(&self.faults).subscribe = message.map(str::to_string);
    }

    pub fn select_count(&self) -> usize {
        self.counters.selects.load(Ordering::SeqCst)
    }

    pub fn upsert_count(&self) -> usize {
        self.counters.upserts.load(Ordering::SeqCst)
    }

    /// Subscriptions currently open.
    pub fn open_subscriptions(&self) -> usize {
        self.counters.open_subscriptions.load(Ordering::SeqCst)
    }

    /// Subscriptions opened since creation.
    pub fn opened_subscriptions(&self) -> usize {
        self.counters.opened_subscriptions.load(Ordering::SeqCst)
    }

    /// Subscriptions closed since creation.
    pub fn closed_subscriptions(&self) -> usize {
        self.counters.closed_subscriptions.load(Ordering::SeqCst)
    }

    async fn upsert_latency(&self) {
        let latency = lock(&self.faults).upsert_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn injected(&self, pick: impl FnOnce(&Faults) -> Option<String>) -> BackendResult<()> {
        match pick(&lock(&self.faults)) {
            Some(message) => Err(BackendError::Unavailable(message)),
            None => Ok(()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession for MemoryBackend {
    fn current_user(&self) -> Option<User> {
        lock(&self.user).clone()
    }
}

#[async_trait]
impl ToolStore for MemoryBackend {
    async fn select_tool_records(
        &self,
        owner: &UserId,
        tool_name: &str,
        limit: usize,
    ) -> BackendResult<Vec<ToolRecord>> {
        self.counters.selects.fetch_add(1, Ordering::SeqCst);
        self.injected(|f| f.select.clone())?;

        let tables = lock(&self.tables);
        let rows = tables
            .tools
            .get(&(owner.clone(), tool_name.to_string()))
            .map(|rows| rows.iter().take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(rows)
    }

    async fn upsert_tool_record(&self, record: &ToolRecord) -> BackendResult<ToolRecord> {
        self.counters.upserts.fetch_add(1, Ordering::SeqCst);
        self.upsert_latency().await;
        self.injected(|f| f.upsert.clone())?;

        let mut stored = record.clone();
        stored.updated_at = Utc::now();

        let old = {
            let mut tables = lock(&self.tables);
            let key = (record.owner_id.clone(), record.tool_name.clone());
            let previous = tables.tools.insert(key, vec![stored.clone()]);
            previous.and_then(|rows| rows.into_iter().next())
        };

        self.hub
            .publish(ChangeEvent::from_upsert(old, stored.clone()))
            .await;
        Ok(stored)
    }

    async fn subscribe(&self, owner: &UserId, topic: &str) -> BackendResult<Subscription> {
        self.injected(|f| f.subscribe.clone())?;

        let subscription = self.hub.subscription(owner, topic).await;

        // Counted only once the feed exists, so a cancelled subscribe leaves no trace
        let counters = Arc::clone(&self.counters);
        counters.open_subscriptions.fetch_add(1, Ordering::SeqCst);
        counters.opened_subscriptions.fetch_add(1, Ordering::SeqCst);

        Ok(subscription.with_close_hook(move || {
            counters.open_subscriptions.fetch_sub(1, Ordering::SeqCst);
            counters.closed_subscriptions.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

#[async_trait]
impl DashboardStore for MemoryBackend {
    async fn list_products(&self, owner: &UserId) -> BackendResult<Vec<Product>> {
        let tables = lock(&self.tables);
        let mut products: Vec<Product> = tables
            .products
            .values()
            .filter(|p| &p.owner_id == owner)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn insert_product(&self, product: &Product) -> BackendResult<Product> {
        lock(&self.tables)
            .products
            .insert(product.id, product.clone());
        Ok(product.clone())
    }

    async fn delete_product(&self, owner: &UserId, id: Uuid) -> BackendResult<()> {
        let mut tables = lock(&self.tables);
        match tables.products.get(&id) {
            Some(product) if &product.owner_id == owner => {
                tables.products.remove(&id);
                Ok(())
            }
            _ => Err(BackendError::NotFound(format!("product {}", id))),
        }
    }

    async fn product_has_metrics(&self, owner: &UserId, id: Uuid) -> BackendResult<bool> {
        let tables = lock(&self.tables);
        Ok(tables
            .metrics
            .keys()
            .any(|(o, product_id, _)| o == owner && *product_id == id))
    }

    async fn select_daily_metrics(
        &self,
        owner: &UserId,
        product_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BackendResult<Vec<DailyMetric>> {
        self.injected(|f| f.select.clone())?;
        let tables = lock(&self.tables);
        Ok(tables
            .metrics
            .range((owner.clone(), product_id, from)..=(owner.clone(), product_id, to))
            .map(|(_, metric)| metric.clone())
            .collect())
    }

    async fn upsert_daily_metric(&self, metric: &DailyMetric) -> BackendResult<DailyMetric> {
        self.counters.upserts.fetch_add(1, Ordering::SeqCst);
        self.upsert_latency().await;
        self.injected(|f| f.upsert.clone())?;

        let mut stored = metric.clone();
        stored.updated_at = Utc::now();
        let key = (
            metric.owner_id.clone(),
            metric.product_id,
            metric.entry_date,
        );
        lock(&self.tables).metrics.insert(key, stored.clone());
        Ok(stored)
    }

    async fn list_analyses(&self, owner: &UserId) -> BackendResult<Vec<AnalysisSummary>> {
        let tables = lock(&self.tables);
        let mut analyses: Vec<&SavedAnalysis> = tables
            .analyses
            .values()
            .filter(|a| &a.owner_id == owner)
            .collect();
        analyses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(analyses.into_iter().map(SavedAnalysis::summary).collect())
    }

    async fn insert_analysis(&self, analysis: &SavedAnalysis) -> BackendResult<SavedAnalysis> {
        lock(&self.tables)
            .analyses
            .insert(analysis.id, analysis.clone());
        Ok(analysis.clone())
    }

    async fn get_analysis(
        &self,
        owner: &UserId,
        id: Uuid,
    ) -> BackendResult<Option<SavedAnalysis>> {
        let tables = lock(&self.tables);
        Ok(tables
            .analyses
            .get(&id)
            .filter(|a| &a.owner_id == owner)
            .cloned())
    }

    async fn delete_analysis(&self, owner: &UserId, id: Uuid) -> BackendResult<()> {
        let mut tables = lock(&self.tables);
        if tables
            .analyses
            .get(&id)
            .is_some_and(|a| &a.owner_id == owner)
        {
            tables.analyses.remove(&id);
        }
        Ok(())
    }
}
