use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use super::{LedgerError, LedgerField, LedgerMonth};
use crate::backend::{lock, DashboardStore};
use crate::models::{DailyMetric, UserId};
use crate::sync::{Debouncer, Notice, Notifier};

/// Quiet period after the last edit of a row before it is saved.
pub const AUTOSAVE_DELAY: Duration = Duration::from_millis(1500);

/// How long a row shows as saved.
pub const SAVED_FLAG_DURATION: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Idle,
    Pending,
    Saving,
    Saved,
}

#[derive(Debug, Default)]
struct RowFlags {
    saving: bool,
    saved_until: Option<Instant>,
}

struct RowAutosave {
    debouncer: Debouncer<bool>,
    flags: Arc<Mutex<RowFlags>>,
}

impl RowAutosave {
    fn new(delay: Duration) -> Self {
        Self {
            debouncer: Debouncer::new(delay),
            flags: Arc::new(Mutex::new(RowFlags::default())),
        }
    }

    fn status(&self) -> RowStatus {
        let flags = lock(&self.flags);
        if flags.saving || self.debouncer.is_running() {
            RowStatus::Saving
        } else if self.debouncer.is_pending() {
            RowStatus::Pending
        } else if flags.saved_until.is_some_and(|until| Instant::now() < until) {
            RowStatus::Saved
        } else {
            RowStatus::Idle
        }
    }
}

/// Upserts one row, flagging it while in flight. Failures are reported once
/// and not retried.
async fn save_row(
    store: Arc<dyn DashboardStore>,
    notifier: Arc<dyn Notifier>,
    flags: Arc<Mutex<RowFlags>>,
    metric: DailyMetric,
) -> bool {
    lock(&flags).saving = true;
    let result = store.upsert_daily_metric(&metric).await;

    let mut flags = lock(&flags);
    flags.saving = false;
    match result {
        Ok(_) => {
            tracing::debug!("[ledger] saved {} for {}", metric.entry_date, metric.product_id);
            flags.saved_until = Some(Instant::now() + SAVED_FLAG_DURATION);
            true
        }
        Err(e) => {
            tracing::error!("[ledger] failed to save {}: {}", metric.entry_date, e);
            notifier.notify(Notice::error("Failed to save."));
            false
        }
    }
}

/// A month of the ledger being edited, with per-row debounced saving.
///
/// Each row owns its own timer: editing a row restarts only that row's
/// timer. Dropping the sheet cancels every save that has not started yet.
pub struct LedgerSheet {
    store: Arc<dyn DashboardStore>,
    notifier: Arc<dyn Notifier>,
    owner: UserId,
    month: LedgerMonth,
    rows: HashMap<u32, RowAutosave>,
    delay: Duration,
}

impl LedgerSheet {
    pub fn new(
        store: Arc<dyn DashboardStore>,
        notifier: Arc<dyn Notifier>,
        owner: UserId,
        month: LedgerMonth,
    ) -> Self {
        Self {
            store,
            notifier,
            owner,
            month,
            rows: HashMap::new(),
            delay: AUTOSAVE_DELAY,
        }
    }

    /// Loads `year-month` of a product into a new sheet.
    pub async fn open(
        store: Arc<dyn DashboardStore>,
        notifier: Arc<dyn Notifier>,
        owner: UserId,
        product_id: uuid::Uuid,
        year: i32,
        month: u32,
    ) -> Result<Self, LedgerError> {
        let loaded = LedgerMonth::load(store.as_ref(), &owner, product_id, year, month).await?;
        Ok(Self::new(store, notifier, owner, loaded))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn month(&self) -> &LedgerMonth {
        &self.month
    }

    pub fn status(&self, day: u32) -> RowStatus {
        self.rows.get(&day).map_or(RowStatus::Idle, RowAutosave::status)
    }

    /// Edits one cell and (re)starts that row's save timer.
    pub fn edit(
        &mut self,
        day: u32,
        field: LedgerField,
        value: Option<f64>,
    ) -> Result<(), LedgerError> {
        let entry = self.month.set(day, field, value)?;
        let date = self.month.date(day)?;
        let metric = entry.to_metric(&self.owner, self.month.product_id, date);

        let delay = self.delay;
        let row = self
            .rows
            .entry(day)
            .or_insert_with(|| RowAutosave::new(delay));
        row.debouncer.schedule(save_row(
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
            Arc::clone(&row.flags),
            metric,
        ));
        Ok(())
    }

    /// Saves every row still waiting on its timer right away and waits for
    /// saves that already started.
    ///
    /// Returns how many rows were saved successfully.
    pub async fn flush(&mut self) -> usize {
        let mut days: Vec<u32> = self.rows.keys().copied().collect();
        days.sort_unstable();

        let mut saved = 0;
        for day in days {
            let Some(row) = self.rows.get_mut(&day) else {
                continue;
            };
            let due = row.debouncer.is_pending();
            let in_flight = row.debouncer.is_running();
            row.debouncer.cancel();

            // An older save of the row lands before the newer value is sent
            let started = row.debouncer.settle().await;
            if !due {
                if in_flight && started == Some(true) {
                    saved += 1;
                }
                continue;
            }

            let Ok(date) = self.month.date(day) else {
                continue;
            };
            let metric = self
                .month
                .entry(day)
                .to_metric(&self.owner, self.month.product_id, date);
            let flags = Arc::clone(&row.flags);
            if save_row(
                Arc::clone(&self.store),
                Arc::clone(&self.notifier),
                flags,
                metric,
            )
            .await
            {
                saved += 1;
            }
        }
        saved
    }
}
