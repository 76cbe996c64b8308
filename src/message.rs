//! Message and attachment records
//!
//! [`ExternalMessage`] and [`ExternalAttachment`] are what a transport
//! hands over; they live only for the duration of a folder pass.
//! [`PersistedMessage`] is the durable, write-once record.

use crate::account::AccountId;
use crate::folder::Folder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message as fetched from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalMessage {
    /// Provider-stable id; the dedup key within an account.
    pub provider_message_id: String,
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub attachments: Vec<ExternalAttachment>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ExternalAttachment {
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub bytes: Vec<u8>,
    pub provider_id: Option<String>,
}

impl ExternalAttachment {
    #[must_use]
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            size: bytes.len() as u64,
            bytes,
            provider_id: None,
        }
    }
}

// Debug output never includes the raw bytes.
impl std::fmt::Debug for ExternalAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalAttachment")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .field("provider_id", &self.provider_id)
            .finish_non_exhaustive()
    }
}

/// Link from a persisted message to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub content_hash: String,
    pub storage_path: String,
}

/// A message persisted for an account.
///
/// `(account_id, provider_message_id)` is unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMessage {
    pub account_id: AccountId,
    pub provider_message_id: String,
    pub folder: Folder,
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub attachments: Vec<AttachmentRef>,
    pub synced_at: DateTime<Utc>,
}

impl PersistedMessage {
    /// Build the durable record for a fetched message.
    ///
    /// Attachment bytes are not carried over; only the refs to blobs
    /// that were actually stored are.
    #[must_use]
    pub fn from_external(
        account_id: AccountId,
        folder: Folder,
        message: ExternalMessage,
        attachments: Vec<AttachmentRef>,
    ) -> Self {
        Self {
            account_id,
            provider_message_id: message.provider_message_id,
            folder,
            subject: message.subject,
            from: message.from,
            to: message.to,
            sent_at: message.sent_at,
            received_at: message.received_at,
            body_text: message.body_text,
            body_html: message.body_html,
            attachments,
            synced_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn references_hash(&self, content_hash: &str) -> bool {
        self.attachments
            .iter()
            .any(|a| a.content_hash == content_hash)
    }
}
