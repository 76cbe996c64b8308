//! Knowledge indexer collaborator
//!
//! Indexing is best effort: the folder worker logs indexer errors and
//! moves on.

use crate::account::AccountId;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// An attachment that was stored for a newly persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedAttachment {
    pub account_id: AccountId,
    pub provider_message_id: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub content_hash: String,
    pub storage_path: String,
}

#[async_trait]
pub trait KnowledgeIndexer: Send + Sync {
    /// # Errors
    ///
    /// Implementations return whatever their backend reports; callers
    /// treat every error as non-fatal.
    async fn index_attachment(&self, attachment: &IndexedAttachment) -> Result<()>;
}

/// Indexer that accepts and drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndexer;

#[async_trait]
impl KnowledgeIndexer for NoopIndexer {
    async fn index_attachment(&self, _attachment: &IndexedAttachment) -> Result<()> {
        Ok(())
    }
}
