//! Email accounts and their sync state

use crate::folder::{DEFAULT_SYNC_FOLDERS, Folder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier of an email account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The mail provider an account lives on. Only used to pick a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gmail,
    Outlook,
    Imap,
}

impl Provider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Outlook => "outlook",
            Self::Imap => "imap",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

/// A synced mailbox account.
///
/// The orchestrator is the only writer of `status`, `watermarks`,
/// `last_sync_at`, `last_error` and `requires_reauth`, and only at run
/// boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub provider: Provider,
    /// Owning user.
    pub owner: String,
    /// Mailbox address, used by transports for login hints.
    pub address: String,
    pub status: SyncStatus,
    /// Folders to sync. Empty means [`DEFAULT_SYNC_FOLDERS`].
    #[serde(default)]
    pub folders: Vec<Folder>,
    /// Per-folder received-timestamp through which the folder is synced.
    #[serde(default)]
    pub watermarks: BTreeMap<Folder, DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Set when the provider rejected the credentials.
    #[serde(default)]
    pub requires_reauth: bool,
}

impl Account {
    #[must_use]
    pub fn new(
        id: impl Into<AccountId>,
        provider: Provider,
        owner: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            provider,
            owner: owner.into(),
            address: address.into(),
            status: SyncStatus::NotStarted,
            folders: Vec::new(),
            watermarks: BTreeMap::new(),
            last_sync_at: None,
            last_error: None,
            requires_reauth: false,
        }
    }

    #[must_use]
    pub fn with_folders(mut self, folders: impl IntoIterator<Item = Folder>) -> Self {
        self.folders = folders.into_iter().collect();
        self
    }

    /// The folders a run iterates, in order.
    #[must_use]
    pub fn sync_folders(&self) -> Vec<Folder> {
        if self.folders.is_empty() {
            DEFAULT_SYNC_FOLDERS.to_vec()
        } else {
            self.folders.clone()
        }
    }

    #[must_use]
    pub fn watermark(&self, folder: &Folder) -> Option<DateTime<Utc>> {
        self.watermarks.get(folder).copied()
    }

    /// Move a folder's watermark forward. Never moves it backwards.
    pub fn advance_watermark(&mut self, folder: Folder, to: DateTime<Utc>) {
        let entry = self.watermarks.entry(folder).or_insert(to);
        if to > *entry {
            *entry = to;
        }
    }
}
