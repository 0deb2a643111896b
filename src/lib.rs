//! The syncline worker: pulls a paginated record collection from a remote
//! API and persists each record, under a sliding-window rate limit, bounded
//! per-record parallelism, and single-flight credential refresh.
//!
//! The heavy lifting lives in the component crates (`syncline-ratelimit`,
//! `syncline-queue`, `syncline-credential`, `syncline-retry`,
//! `syncline-client`); this crate wires them to configuration, persistence,
//! a reqwest transport, and the run orchestrator.

pub mod config;
pub mod orchestrator;
pub mod records;
pub mod report;
pub mod store;
pub mod transport;

pub use config::{LogFormat, WorkerConfig};
pub use orchestrator::Orchestrator;
pub use records::{PageInfo, RecordPage, SyncRecord, SyncResponse};
pub use report::{SyncReport, SyncResult};
pub use store::{RecordStore, SqliteStore};
pub use transport::HttpTransport;
