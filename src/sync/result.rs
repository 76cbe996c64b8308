//! Per-folder and per-run sync results

use crate::account::AccountId;
use crate::folder::Folder;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const ACCOUNT_NOT_FOUND: &str = "Email account not found";
pub const ALREADY_RUNNING: &str = "Sync already in progress for this account";

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed,
    Failed,
    /// Stopped by the caller. Committed work is kept, the watermark is not
    /// advanced.
    Cancelled,
    NotFound,
    /// Rejected by the single-flight guard.
    AlreadyRunning,
}

/// Counters for one pass over one folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderSyncResult {
    pub folder: Folder,
    pub emails_processed: usize,
    pub attachments_processed: usize,
    /// Messages the deduplicator had already seen.
    pub skipped_duplicates: usize,
    /// Attachments that could not be stored and were dropped.
    pub attachments_failed: usize,
    pub fetch_retries: u32,
    /// Latest received timestamp among the fetched messages.
    pub latest_received: Option<DateTime<Utc>>,
    /// The pass stopped early on cancellation.
    pub cancelled: bool,
}

impl FolderSyncResult {
    #[must_use]
    pub const fn new(folder: Folder) -> Self {
        Self {
            folder,
            emails_processed: 0,
            attachments_processed: 0,
            skipped_duplicates: 0,
            attachments_failed: 0,
            fetch_retries: 0,
            latest_received: None,
            cancelled: false,
        }
    }

    pub(super) fn observe(&mut self, received_at: DateTime<Utc>) {
        self.latest_received = self.latest_received.max(Some(received_at));
    }
}

/// Result of one account run.
///
/// `sync_account` never fails; every outcome ends up here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub account_id: AccountId,
    pub outcome: SyncOutcome,
    pub success: bool,
    pub error_message: Option<String>,
    pub emails_processed: usize,
    pub attachments_processed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub folders: Vec<FolderSyncResult>,
}

impl SyncResult {
    pub(super) fn start(account_id: AccountId) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            outcome: SyncOutcome::Failed,
            success: false,
            error_message: None,
            emails_processed: 0,
            attachments_processed: 0,
            started_at: now,
            finished_at: now,
            folders: Vec::new(),
        }
    }

    pub(super) fn merge_folder(&mut self, folder: FolderSyncResult) {
        self.emails_processed += folder.emails_processed;
        self.attachments_processed += folder.attachments_processed;
        self.folders.push(folder);
    }

    fn finish(mut self, outcome: SyncOutcome, error_message: Option<String>) -> Self {
        self.outcome = outcome;
        self.success = outcome == SyncOutcome::Completed;
        self.error_message = error_message;
        self.finished_at = Utc::now();
        self
    }

    pub(super) fn complete(self) -> Self {
        self.finish(SyncOutcome::Completed, None)
    }

    pub(super) fn fail(self, message: impl Into<String>) -> Self {
        self.finish(SyncOutcome::Failed, Some(message.into()))
    }

    pub(super) fn cancel(self) -> Self {
        self.finish(SyncOutcome::Cancelled, Some("Sync cancelled".into()))
    }

    pub(super) fn not_found(self) -> Self {
        self.finish(SyncOutcome::NotFound, Some(ACCOUNT_NOT_FOUND.into()))
    }

    pub(super) fn already_running(self) -> Self {
        self.finish(SyncOutcome::AlreadyRunning, Some(ALREADY_RUNNING.into()))
    }
}
