//! Folder sync worker
//!
//! One pass over one (account, folder) pair: fetch since the start date,
//! drop messages already persisted, store attachments, persist the rest.

use super::dedup::{DedupDecision, MessageDeduplicator};
use super::result::FolderSyncResult;
use crate::account::Account;
use crate::attachments::AttachmentStorage;
use crate::error::Result;
use crate::folder::Folder;
use crate::indexer::{IndexedAttachment, KnowledgeIndexer, NoopIndexer};
use crate::message::{AttachmentRef, ExternalMessage, PersistedMessage};
use crate::retry::RetryPolicy;
use crate::store::MessageStore;
use crate::transport::MailTransport;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct FolderSyncWorker {
    messages: Arc<dyn MessageStore>,
    attachments: Arc<dyn AttachmentStorage>,
    indexer: Arc<dyn KnowledgeIndexer>,
    dedup: MessageDeduplicator,
    retry: RetryPolicy,
}

impl FolderSyncWorker {
    #[must_use]
    pub fn new(
        messages: Arc<dyn MessageStore>,
        attachments: Arc<dyn AttachmentStorage>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            dedup: MessageDeduplicator::new(messages.clone()),
            messages,
            attachments,
            indexer: Arc::new(NoopIndexer),
            retry,
        }
    }

    #[must_use]
    pub fn with_indexer(mut self, indexer: Arc<dyn KnowledgeIndexer>) -> Self {
        self.indexer = indexer;
        self
    }

    /// Sync one folder.
    ///
    /// Messages are handled in the order the transport returns them.
    /// Cancellation is checked before each message; a cancelled pass
    /// returns what it got through with `cancelled` set.
    ///
    /// # Errors
    ///
    /// Returns the fetch error once the retry policy gives up, or a
    /// message store error. Attachment storage and indexer failures are
    /// logged, never returned.
    pub async fn sync_folder(
        &self,
        account: &Account,
        transport: &dyn MailTransport,
        folder: &Folder,
        since: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<FolderSyncResult> {
        let label = format!("fetch {}/{folder}", account.id);
        let fetched = self
            .retry
            .execute(&label, cancel, || transport.fetch_since(account, folder, since))
            .await?;

        let mut result = FolderSyncResult::new(folder.clone());
        result.fetch_retries = fetched.retries;
        debug!(
            account = %account.id,
            %folder,
            %since,
            fetched = fetched.value.len(),
            "fetched folder"
        );

        for message in fetched.value {
            if cancel.is_cancelled() {
                info!(account = %account.id, %folder, "folder pass cancelled");
                result.cancelled = true;
                break;
            }

            result.observe(message.received_at);

            let decision = self
                .dedup
                .check(&account.id, &message.provider_message_id)
                .await?;
            if decision == DedupDecision::AlreadyPersisted {
                debug!(
                    account = %account.id,
                    message_id = %message.provider_message_id,
                    "already persisted, skipping"
                );
                result.skipped_duplicates += 1;
                continue;
            }

            self.persist_new(account, folder, message, &mut result).await?;
        }

        Ok(result)
    }

    async fn persist_new(
        &self,
        account: &Account,
        folder: &Folder,
        mut message: ExternalMessage,
        result: &mut FolderSyncResult,
    ) -> Result<()> {
        let mut refs = Vec::with_capacity(message.attachments.len());
        for attachment in std::mem::take(&mut message.attachments) {
            match self
                .attachments
                .store(&attachment.file_name, &attachment.content_type, &attachment.bytes)
                .await
            {
                Ok(blob) => refs.push(AttachmentRef {
                    file_name: attachment.file_name,
                    content_type: attachment.content_type,
                    size: attachment.size,
                    content_hash: blob.content_hash,
                    storage_path: blob.storage_path,
                }),
                Err(e) => {
                    warn!(
                        account = %account.id,
                        message_id = %message.provider_message_id,
                        file_name = %attachment.file_name,
                        error = %e,
                        "could not store attachment, skipping it"
                    );
                    result.attachments_failed += 1;
                }
            }
        }

        let provider_message_id = message.provider_message_id.clone();
        let persisted = PersistedMessage::from_external(
            account.id.clone(),
            folder.clone(),
            message,
            refs.clone(),
        );
        self.messages.add(persisted).await?;

        result.emails_processed += 1;
        result.attachments_processed += refs.len();
        debug!(
            account = %account.id,
            message_id = %provider_message_id,
            attachments = refs.len(),
            "persisted message"
        );

        for r in refs {
            let indexed = IndexedAttachment {
                account_id: account.id.clone(),
                provider_message_id: provider_message_id.clone(),
                file_name: r.file_name,
                content_type: r.content_type,
                size: r.size,
                content_hash: r.content_hash,
                storage_path: r.storage_path,
            };
            if let Err(e) = self.indexer.index_attachment(&indexed).await {
                warn!(
                    account = %account.id,
                    hash = %indexed.content_hash,
                    error = %e,
                    "indexing attachment failed"
                );
            }
        }

        Ok(())
    }
}
