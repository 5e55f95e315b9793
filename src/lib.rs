//! Trafego core library
//!
//! Marketing calculators whose inputs follow the user across sessions and
//! devices, a daily ledger with per-row auto-save, product management and
//! AI-assisted campaign analysis. The `trafego` CLI and the
//! `trafego-server` backend are both built on top of this crate.

pub mod analysis;
pub mod backend;
pub mod calculators;
pub mod config;
pub mod db;
pub mod ledger;
pub mod models;
pub mod products;
pub mod server;
pub mod sync;

pub use backend::{BackendError, MemoryBackend, RemoteBackend, SqliteBackend};
pub use calculators::{Tool, ToolKind};
pub use sync::{ToolDataSync, ToolState};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
