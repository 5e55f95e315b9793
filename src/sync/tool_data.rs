use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::notify::{Notice, Notifier, TracingNotifier};
use crate::backend::{lock, ToolBackend};
use crate::models::{ChangeEvent, ChangeKind, ToolRecord, User, UserId};

/// Rows requested when loading a tool record.
pub const FETCH_LIMIT: usize = 1;

const DEFAULT_SUBSCRIBE_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_STATUS_RESET: Duration = Duration::from_millis(2000);

/// Timing knobs of a [`ToolDataSync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Wait between the initial load and opening the realtime subscription.
    pub subscribe_delay: Duration,
    /// How long a save result stays visible before returning to idle.
    pub status_reset: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            subscribe_delay: DEFAULT_SUBSCRIBE_DELAY,
            status_reset: DEFAULT_STATUS_RESET,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Loading,
    Ready,
}

/// Observable state of one tool binding.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolState<P> {
    pub payload: P,
    pub phase: Phase,
    pub loading: bool,
    pub saving: bool,
    pub save_status: SaveStatus,
    /// The last load failed and `payload` holds the default instead of the
    /// stored record. Cleared once the payload is known to match the store.
    pub load_failed: bool,
}

impl<P> ToolState<P> {
    fn initial(payload: P) -> Self {
        Self {
            payload,
            phase: Phase::Uninitialized,
            loading: true,
            saving: false,
            save_status: SaveStatus::Idle,
            load_failed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Failed,
    /// No user was signed in; nothing was sent.
    Refused,
    /// The binding was rebound or unmounted while the write was in flight.
    Discarded,
}

type RemoteUpdateCallback<P> = Arc<dyn Fn(&P, &P) + Send + Sync>;

struct Binding {
    user: Option<User>,
    tool_name: String,
}

struct Inner<P> {
    backend: Arc<dyn ToolBackend>,
    notifier: Arc<dyn Notifier>,
    on_remote_update: Option<RemoteUpdateCallback<P>>,
    settings: SyncSettings,
    default: P,
    binding: Mutex<Binding>,
    state: watch::Sender<ToolState<P>>,
    generation: AtomicU64,
}

impl<P> Inner<P>
where
    P: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    fn user(&self) -> Option<User> {
        lock(&self.binding).user.clone()
    }

    fn tool_name(&self) -> String {
        lock(&self.binding).tool_name.clone()
    }

    async fn load(&self, generation: u64) {
        let Some(user) = self.user() else {
            self.state.send_modify(|state| {
                state.payload = self.default.clone();
                state.loading = false;
                state.phase = Phase::Ready;
                state.load_failed = false;
            });
            return;
        };
        let tool_name = self.tool_name();

        self.state.send_modify(|state| {
            state.loading = true;
            state.phase = Phase::Loading;
        });

        let result = self
            .backend
            .select_tool_records(&user.id, &tool_name, FETCH_LIMIT)
            .await
            .map_err(|e| e.to_string())
            .and_then(|rows| match rows.into_iter().next() {
                Some(record) => serde_json::from_value::<P>(record.payload)
                    .map_err(|e| format!("stored payload does not match: {}", e)),
                None => Ok(self.default.clone()),
            });

        if !self.is_current(generation) {
            tracing::debug!("Discarding stale load of {}", tool_name);
            return;
        }

        let load_failed = result.is_err();
        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to load data for tool {}: {}", tool_name, e);
                self.notifier.notify(Notice::warning(format!(
                    "Could not load the data of {}.",
                    tool_name
                )));
                self.default.clone()
            }
        };

        self.state.send_modify(|state| {
            state.payload = payload;
            state.loading = false;
            state.phase = Phase::Ready;
            state.load_failed = load_failed;
        });
    }

    fn apply_remote(&self, owner: &UserId, tool_name: &str, event: ChangeEvent) {
        if event.kind != ChangeKind::Update {
            return;
        }
        let Some(record) = event.new else {
            return;
        };
        if &record.owner_id != owner || record.tool_name != tool_name {
            return;
        }

        let incoming: P = match serde_json::from_value(record.payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("[realtime] ignoring malformed update for {}: {}", tool_name, e);
                return;
            }
        };
        tracing::debug!("[realtime] update received for {}", tool_name);

        let mut previous = None;
        self.state.send_modify(|state| {
            previous = Some(std::mem::replace(&mut state.payload, incoming.clone()));
            state.load_failed = false;
        });

        if let (Some(callback), Some(previous)) = (&self.on_remote_update, previous) {
            callback(&previous, &incoming);
        }
    }
}

async fn follow_changes<P>(inner: Arc<Inner<P>>, user: User, tool_name: String, generation: u64)
where
    P: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    tokio::time::sleep(inner.settings.subscribe_delay).await;

    let topic = format!("tool-{}-{}", tool_name, user.id);
    let mut subscription = match inner.backend.subscribe(&user.id, &topic).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::error!("[realtime] problem on channel {}: {}", topic, e);
            return;
        }
    };
    tracing::debug!("[realtime] connected to channel {}", topic);

    while let Some(event) = subscription.next().await {
        if !inner.is_current(generation) {
            break;
        }
        inner.apply_remote(&user.id, &tool_name, event);
    }
}

/// Builder for [`ToolDataSync`].
pub struct ToolDataSyncBuilder<P> {
    backend: Arc<dyn ToolBackend>,
    tool_name: String,
    default: P,
    notifier: Option<Arc<dyn Notifier>>,
    on_remote_update: Option<RemoteUpdateCallback<P>>,
    settings: SyncSettings,
}

impl<P> ToolDataSyncBuilder<P>
where
    P: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Called with `(previous, new)` after a change from another session
    /// replaced the payload.
    pub fn on_remote_update(mut self, callback: impl Fn(&P, &P) + Send + Sync + 'static) -> Self {
        self.on_remote_update = Some(Arc::new(callback));
        self
    }

    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Mounts for whoever the backend session reports.
    pub async fn mount(self) -> ToolDataSync<P> {
        let user = self.backend.current_user();
        self.mount_as(user).await
    }

    /// Mounts for an explicit identity.
    pub async fn mount_as(self, user: Option<User>) -> ToolDataSync<P> {
        let sync = ToolDataSync {
            inner: Arc::new(Inner {
                backend: self.backend,
                notifier: self
                    .notifier
                    .unwrap_or_else(|| Arc::new(TracingNotifier)),
                on_remote_update: self.on_remote_update,
                settings: self.settings,
                state: watch::channel(ToolState::initial(self.default.clone())).0,
                default: self.default,
                binding: Mutex::new(Binding {
                    user: None,
                    tool_name: self.tool_name.clone(),
                }),
                generation: AtomicU64::new(0),
            }),
            realtime: Mutex::new(None),
            status_reset: Mutex::new(None),
        };
        sync.rebind(user, self.tool_name).await;
        sync
    }
}

/// Binding between one tool's in-memory payload and its stored record.
///
/// Dropping the binding (or calling [`ToolDataSync::unmount`]) cancels a
/// pending subscription timer and closes an open subscription; results of
/// fetches and saves still in flight are discarded.
pub struct ToolDataSync<P> {
    inner: Arc<Inner<P>>,
    realtime: Mutex<Option<JoinHandle<()>>>,
    status_reset: Mutex<Option<JoinHandle<()>>>,
}

impl<P> ToolDataSync<P>
where
    P: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn builder(
        backend: Arc<dyn ToolBackend>,
        tool_name: impl Into<String>,
        default: P,
    ) -> ToolDataSyncBuilder<P> {
        ToolDataSyncBuilder {
            backend,
            tool_name: tool_name.into(),
            default,
            notifier: None,
            on_remote_update: None,
            settings: SyncSettings::default(),
        }
    }

    pub fn tool_name(&self) -> String {
        self.inner.tool_name()
    }

    pub fn user(&self) -> Option<User> {
        self.inner.user()
    }

    pub fn state(&self) -> ToolState<P> {
        self.inner.state.borrow().clone()
    }

    pub fn payload(&self) -> P {
        self.inner.state.borrow().payload.clone()
    }

    /// Receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<ToolState<P>> {
        self.inner.state.subscribe()
    }

    /// Replaces the local payload without saving it.
    pub fn set_payload(&self, payload: P) {
        self.inner.state.send_modify(|state| state.payload = payload);
    }

    /// Edits the local payload in place without saving it.
    pub fn update(&self, edit: impl FnOnce(&mut P)) {
        self.inner.state.send_modify(|state| edit(&mut state.payload));
    }

    /// Fetches the stored record again, replacing the local payload.
    pub async fn reload(&self) {
        let generation = self.inner.generation();
        self.inner.load(generation).await;
    }

    /// Restarts the binding for another identity or tool.
    ///
    /// Loading starts from scratch, the visible save status is reset and
    /// results of saves still in flight are ignored.
    pub async fn rebind(&self, user: Option<User>, tool_name: impl Into<String>) {
        self.teardown();
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut binding = lock(&self.inner.binding);
            binding.user = user.clone();
            binding.tool_name = tool_name.into();
        }
        self.inner
            .state
            .send_replace(ToolState::initial(self.inner.default.clone()));

        self.inner.load(generation).await;

        let Some(user) = user else {
            return;
        };
        if !self.inner.is_current(generation) {
            return;
        }
        let handle = tokio::spawn(follow_changes(
            Arc::clone(&self.inner),
            user,
            self.inner.tool_name(),
            generation,
        ));
        if let Some(previous) = lock(&self.realtime).replace(handle) {
            previous.abort();
        }
    }

    /// Saves the current local payload.
    pub async fn save_current(&self) -> SaveOutcome {
        let payload = self.payload();
        self.save(&payload).await
    }

    /// Upserts `payload` as this tool's record.
    ///
    /// The local payload is left as it is whatever the outcome.
    pub async fn save(&self, payload: &P) -> SaveOutcome {
        let Some(user) = self.inner.user() else {
            self.inner
                .notifier
                .notify(Notice::error("You need to be signed in to save."));
            return SaveOutcome::Refused;
        };
        let generation = self.inner.generation();
        let tool_name = self.inner.tool_name();

        self.inner.state.send_modify(|state| {
            state.saving = true;
            state.save_status = SaveStatus::Idle;
        });

        let result = match serde_json::to_value(payload) {
            Ok(value) => self
                .inner
                .backend
                .upsert_tool_record(&ToolRecord::new(user.id.clone(), tool_name.clone(), value))
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        if !self.inner.is_current(generation) {
            tracing::debug!("Discarding result of stale save of {}", tool_name);
            return SaveOutcome::Discarded;
        }

        let (status, outcome) = match result {
            Ok(_) => {
                self.inner
                    .notifier
                    .notify(Notice::success("Data saved successfully."));
                (SaveStatus::Success, SaveOutcome::Saved)
            }
            Err(e) => {
                tracing::error!("Failed to save data for tool {}: {}", tool_name, e);
                self.inner
                    .notifier
                    .notify(Notice::error("An error occurred while saving the data."));
                (SaveStatus::Error, SaveOutcome::Failed)
            }
        };

        self.inner.state.send_modify(|state| {
            state.saving = false;
            state.save_status = status;
            if outcome == SaveOutcome::Saved {
                state.load_failed = false;
            }
        });
        self.schedule_status_reset(generation);

        outcome
    }

    fn schedule_status_reset(&self, generation: u64) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.settings.status_reset).await;
            if inner.is_current(generation) {
                inner
                    .state
                    .send_modify(|state| state.save_status = SaveStatus::Idle);
            }
        });
        if let Some(previous) = lock(&self.status_reset).replace(handle) {
            previous.abort();
        }
    }

    /// Stops following changes. Safe to call any number of times.
    pub async fn unmount(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let realtime = lock(&self.realtime).take();
        if let Some(handle) = lock(&self.status_reset).take() {
            handle.abort();
        }
        if let Some(handle) = realtime {
            handle.abort();
            // Resolves once the task, and the subscription it owns, is dropped
            let _ = handle.await;
        }
    }

    fn teardown(&self) {
        if let Some(handle) = lock(&self.realtime).take() {
            handle.abort();
        }
        if let Some(handle) = lock(&self.status_reset).take() {
            handle.abort();
        }
    }
}

impl<P> Drop for ToolDataSync<P> {
    fn drop(&mut self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = lock(&self.realtime).take() {
            handle.abort();
        }
        if let Some(handle) = lock(&self.status_reset).take() {
            handle.abort();
        }
    }
}
