//! Account sync orchestrator
//!
//! Entry point for the scheduler. Runs accounts one at a time per
//! account (single-flight) and several accounts at once per batch
//! (bounded pool). Nothing here returns an error: every failure is
//! folded into the [`SyncResult`] of the account it belongs to.

use super::result::SyncResult;
use super::worker::FolderSyncWorker;
use crate::account::{Account, AccountId, SyncStatus};
use crate::attachments::AttachmentStorage;
use crate::config::SyncConfig;
use crate::error::Error;
use crate::indexer::KnowledgeIndexer;
use crate::store::{AccountStore, MessageStore};
use crate::transport::TransportRegistry;
use chrono::{DateTime, Months, Utc};
use futures::{StreamExt, stream};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Start of the fetch window for a folder.
///
/// An explicit date wins, then the folder watermark, then `now` minus
/// the backfill window.
#[must_use]
pub fn resolve_start_date(
    explicit: Option<DateTime<Utc>>,
    watermark: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    backfill_months: u32,
) -> DateTime<Utc> {
    explicit.or(watermark).unwrap_or_else(|| {
        now.checked_sub_months(Months::new(backfill_months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    })
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    accounts: Arc<dyn AccountStore>,
    transports: TransportRegistry,
    worker: FolderSyncWorker,
    pool_size: usize,
    backfill_months: u32,
    running: Arc<Mutex<HashSet<AccountId>>>,
}

impl SyncOrchestrator {
    #[must_use]
    pub fn new(
        config: &SyncConfig,
        accounts: Arc<dyn AccountStore>,
        messages: Arc<dyn MessageStore>,
        attachments: Arc<dyn AttachmentStorage>,
        transports: TransportRegistry,
    ) -> Self {
        Self {
            accounts,
            transports,
            worker: FolderSyncWorker::new(messages, attachments, config.retry),
            pool_size: config.pool_size.max(1),
            backfill_months: config.backfill_months,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    #[must_use]
    pub fn with_indexer(mut self, indexer: Arc<dyn KnowledgeIndexer>) -> Self {
        self.worker = self.worker.with_indexer(indexer);
        self
    }

    /// Sync one account.
    ///
    /// `start_date` overrides every folder's watermark for this run.
    pub async fn sync_account(
        &self,
        account_id: &AccountId,
        start_date: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> SyncResult {
        let result = SyncResult::start(account_id.clone());

        let Some(_flight) = InFlight::acquire(&self.running, account_id) else {
            warn!(account = %account_id, "sync already running in this process");
            return result.already_running();
        };

        let account = match self.accounts.get_by_id(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!(account = %account_id, "email account not found");
                return result.not_found();
            }
            Err(e) => {
                error!(account = %account_id, error = %e, "loading account failed");
                return result.fail(e.to_string());
            }
        };

        if account.status == SyncStatus::InProgress {
            warn!(account = %account_id, "account is already marked in progress");
            return result.already_running();
        }

        self.run(account, start_date, cancel, result).await
    }

    async fn run(
        &self,
        mut account: Account,
        start_date: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
        mut result: SyncResult,
    ) -> SyncResult {
        let previous_status = account.status;
        account.status = SyncStatus::InProgress;
        if let Err(e) = self.accounts.update(&account).await {
            error!(account = %account.id, error = %e, "could not mark account in progress");
            return result.fail(e.to_string());
        }
        info!(account = %account.id, provider = %account.provider, "sync started");

        let transport = match self.transports.resolve(account.provider) {
            Ok(transport) => transport,
            Err(e) => return self.finish_failed(account, result, &e).await,
        };

        let now = Utc::now();
        for folder in account.sync_folders() {
            if cancel.is_cancelled() {
                return self.finish_cancelled(account, previous_status, result).await;
            }

            let since = resolve_start_date(
                start_date,
                account.watermark(&folder),
                now,
                self.backfill_months,
            );
            match self
                .worker
                .sync_folder(&account, transport.as_ref(), &folder, since, cancel)
                .await
            {
                Ok(pass) => {
                    let cancelled = pass.cancelled;
                    info!(
                        account = %account.id,
                        folder = %pass.folder,
                        emails = pass.emails_processed,
                        attachments = pass.attachments_processed,
                        skipped = pass.skipped_duplicates,
                        "folder synced"
                    );
                    result.merge_folder(pass);
                    if cancelled {
                        return self.finish_cancelled(account, previous_status, result).await;
                    }
                }
                Err(Error::Cancelled) => {
                    return self.finish_cancelled(account, previous_status, result).await;
                }
                Err(e) => return self.finish_failed(account, result, &e).await,
            }
        }

        self.finish_completed(account, result, now).await
    }

    async fn finish_completed(
        &self,
        mut account: Account,
        result: SyncResult,
        run_started: DateTime<Utc>,
    ) -> SyncResult {
        for pass in &result.folders {
            account.advance_watermark(
                pass.folder.clone(),
                pass.latest_received.unwrap_or(run_started),
            );
        }
        account.status = SyncStatus::Completed;
        account.last_sync_at = Some(Utc::now());
        account.last_error = None;
        account.requires_reauth = false;

        if let Err(e) = self.accounts.update(&account).await {
            error!(account = %account.id, error = %e, "could not persist completed sync");
            return result.fail(e.to_string());
        }

        let result = result.complete();
        info!(
            account = %account.id,
            emails = result.emails_processed,
            attachments = result.attachments_processed,
            "sync completed"
        );
        result
    }

    async fn finish_failed(
        &self,
        mut account: Account,
        result: SyncResult,
        err: &Error,
    ) -> SyncResult {
        let message = err.to_string();
        error!(account = %account.id, error = %message, "sync failed");

        account.status = SyncStatus::Failed;
        account.last_error = Some(message.clone());
        if err.is_authentication() {
            account.requires_reauth = true;
        }
        if let Err(e) = self.accounts.update(&account).await {
            error!(account = %account.id, error = %e, "could not persist failed sync");
        }
        result.fail(message)
    }

    async fn finish_cancelled(
        &self,
        mut account: Account,
        previous_status: SyncStatus,
        result: SyncResult,
    ) -> SyncResult {
        info!(account = %account.id, "sync cancelled");
        account.status = previous_status;
        if let Err(e) = self.accounts.update(&account).await {
            error!(account = %account.id, error = %e, "could not persist cancelled sync");
        }
        result.cancel()
    }

    /// Sync every account that is due, `pool_size` at a time.
    ///
    /// Results come back in the order the store listed the accounts. An
    /// account whose task panics gets a failed result and is marked
    /// failed; the rest of the batch is unaffected.
    pub async fn sync_all_accounts(&self, cancel: &CancellationToken) -> Vec<SyncResult> {
        let due = match self.accounts.get_accounts_due_for_sync().await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "could not list accounts due for sync");
                return Vec::new();
            }
        };
        info!(accounts = due.len(), pool_size = self.pool_size, "batch sync started");

        let results: Vec<SyncResult> = stream::iter(due)
            .map(|account| {
                let this = self.clone();
                let cancel = cancel.clone();
                async move { this.sync_isolated(account.id, cancel).await }
            })
            .buffered(self.pool_size)
            .collect()
            .await;

        let failed = results.iter().filter(|r| !r.success).count();
        info!(accounts = results.len(), failed, "batch sync finished");
        results
    }

    async fn sync_isolated(&self, account_id: AccountId, cancel: CancellationToken) -> SyncResult {
        let task = {
            let this = self.clone();
            let account_id = account_id.clone();
            tokio::spawn(async move { this.sync_account(&account_id, None, &cancel).await })
        };

        match task.await {
            Ok(result) => result,
            Err(join_err) => {
                let message = format!("sync task aborted: {join_err}");
                error!(account = %account_id, error = %message, "account sync panicked");
                self.mark_failed(&account_id, &message).await;
                SyncResult::start(account_id).fail(message)
            }
        }
    }

    async fn mark_failed(&self, account_id: &AccountId, message: &str) {
        match self.accounts.get_by_id(account_id).await {
            Ok(Some(mut account)) => {
                account.status = SyncStatus::Failed;
                account.last_error = Some(message.to_string());
                if let Err(e) = self.accounts.update(&account).await {
                    error!(account = %account_id, error = %e, "could not mark account failed");
                }
            }
            Ok(None) => {}
            Err(e) => error!(account = %account_id, error = %e, "could not reload account"),
        }
    }
}

/// Process-local single-flight guard, released on drop.
struct InFlight {
    running: Arc<Mutex<HashSet<AccountId>>>,
    account_id: AccountId,
}

impl InFlight {
    fn acquire(running: &Arc<Mutex<HashSet<AccountId>>>, account_id: &AccountId) -> Option<Self> {
        let inserted = running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account_id.clone());
        inserted.then(|| Self {
            running: running.clone(),
            account_id: account_id.clone(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.account_id);
    }
}
