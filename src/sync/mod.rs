//! Per-tool state kept in step with the backend.
//!
//! A [`ToolDataSync`] owns the in-memory payload of one tool for one user:
//! it fetches the stored record when mounted, follows changes made from
//! other sessions through a realtime subscription and writes the payload
//! back on demand. Failures never escape as errors; they surface as
//! [`SaveStatus`] flags, [`SaveOutcome`] values and [`Notice`]s.

mod debounce;
mod notify;
mod tool_data;

pub use debounce::Debouncer;
pub use notify::{Notice, NoticeLevel, Notifier, RecordingNotifier, TracingNotifier};
pub use tool_data::{
    Phase, SaveOutcome, SaveStatus, SyncSettings, ToolDataSync, ToolDataSyncBuilder, ToolState,
    FETCH_LIMIT,
};
