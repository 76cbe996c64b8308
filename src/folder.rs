//! Mailbox folder identifiers
//!
//! Folders are strongly typed so the orchestrator can key watermarks
//! and results by them. They serialize as their mailbox name.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Folders synced when an account does not list its own.
pub const DEFAULT_SYNC_FOLDERS: [Folder; 2] = [Folder::Inbox, Folder::Sent];

/// A mailbox folder on the provider side.
///
/// # Examples
///
/// ```
/// use mailbox_sync::Folder;
///
/// assert_eq!(Folder::from("inbox"), Folder::Inbox);
/// assert_eq!(Folder::custom("Receipts").as_str(), "Receipts");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Folder {
    /// `INBOX`, matched case-insensitively.
    Inbox,
    Sent,
    Drafts,
    Archive,
    Spam,
    Trash,
    /// Any other mailbox, by its provider-side name. Never holds one of
    /// the names above; build it with [`Folder::custom`] or `From<&str>`.
    Custom(String),
}

impl Folder {
    /// Folder by name. Well-known names map to their own variant, so
    /// `custom("Sent")` is [`Folder::Sent`].
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self::from(name.into())
    }

    /// The mailbox name as the provider knows it.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Inbox => "INBOX",
            Self::Sent => "Sent",
            Self::Drafts => "Drafts",
            Self::Archive => "Archive",
            Self::Spam => "Spam",
            Self::Trash => "Trash",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Folder {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("inbox") {
            return Self::Inbox;
        }
        match s {
            "Sent" => Self::Sent,
            "Drafts" => Self::Drafts,
            "Archive" => Self::Archive,
            "Spam" => Self::Spam,
            "Trash" => Self::Trash,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for Folder {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl Serialize for Folder {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Folder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from(name))
    }
}
