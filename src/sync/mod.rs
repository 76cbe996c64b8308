//! The sync engine: orchestrator, folder worker and deduplicator

mod dedup;
mod orchestrator;
mod result;
mod worker;

pub use dedup::{DedupDecision, MessageDeduplicator};
pub use orchestrator::{SyncOrchestrator, resolve_start_date};
pub use result::{ACCOUNT_NOT_FOUND, ALREADY_RUNNING, FolderSyncResult, SyncOutcome, SyncResult};
pub use worker::FolderSyncWorker;
