//! Message deduplication by provider message id

use crate::account::AccountId;
use crate::error::Result;
use crate::store::MessageStore;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    New,
    AlreadyPersisted,
}

/// Decides whether a fetched message still needs to be persisted.
///
/// The key is `(account, provider message id)`, so the same message seen
/// again in a later run, in an overlapping fetch window, or in another
/// folder of the same account is skipped.
#[derive(Clone)]
pub struct MessageDeduplicator {
    messages: Arc<dyn MessageStore>,
}

impl MessageDeduplicator {
    #[must_use]
    pub fn new(messages: Arc<dyn MessageStore>) -> Self {
        Self { messages }
    }

    /// # Errors
    ///
    /// Returns the message store's error if the lookup fails.
    pub async fn check(
        &self,
        account_id: &AccountId,
        provider_message_id: &str,
    ) -> Result<DedupDecision> {
        let existing = self
            .messages
            .get_by_provider_message_id(account_id, provider_message_id)
            .await?;
        Ok(if existing.is_some() {
            DedupDecision::AlreadyPersisted
        } else {
            DedupDecision::New
        })
    }
}
