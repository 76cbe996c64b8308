//! Mailbox synchronization engine
//!
//! Pulls messages from mail providers into a local store with
//! exactly-once persistence per message, and keeps attachment bytes in a
//! content-addressed blob store so identical content is stored once
//! across every message and account.
//!
//! The entry point is [`SyncOrchestrator`]. Persistence, fetching and
//! indexing are injected through the [`AccountStore`], [`MessageStore`],
//! [`MailTransport`] and [`KnowledgeIndexer`] traits; in-memory stores
//! and an IMAP bridge transport ship with the crate.

mod account;
mod attachments;
mod config;
mod error;
mod folder;
mod indexer;
mod message;
mod retry;
mod store;
mod sync;
mod transport;

pub use account::{Account, AccountId, Provider, SyncStatus};
pub use attachments::{
    AttachmentStorage, BlobReader, FsAttachmentStore, StoredBlob, content_hash, prune_blob,
    storage_path_for,
};
pub use config::{ImapConfig, SyncConfig};
pub use error::{Error, Result};
pub use folder::{DEFAULT_SYNC_FOLDERS, Folder};
pub use indexer::{IndexedAttachment, KnowledgeIndexer, NoopIndexer};
pub use message::{AttachmentRef, ExternalAttachment, ExternalMessage, PersistedMessage};
pub use retry::{Retried, RetryPolicy};
pub use store::{AccountStore, MemoryAccountStore, MemoryMessageStore, MessageStore};
pub use sync::{
    ACCOUNT_NOT_FOUND, ALREADY_RUNNING, DedupDecision, FolderSyncResult, FolderSyncWorker,
    MessageDeduplicator, SyncOrchestrator, SyncOutcome, SyncResult, resolve_start_date,
};
pub use transport::{ImapTransport, MailTransport, TransportRegistry, parse_message};
