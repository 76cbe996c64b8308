//! Error types for mailbox-sync
//!
//! Every failure the engine can observe maps to one variant here. The
//! retry policy and the orchestrator only look at the classification
//! helpers ([`Error::is_transient`], [`Error::is_authentication`]),
//! never at error strings.

use crate::account::Provider;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("No transport configured for provider {0}")]
    TransportNotConfigured(Provider),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Email parsing error: {0}")]
    Parse(String),

    #[error("Attachment storage error: {0}")]
    Storage(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Sync cancelled")]
    Cancelled,
}

impl Error {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Protocol-level "not authenticated" means the session dropped out
    /// of the authenticated state, which a reconnect fixes. Rejected
    /// credentials are [`Error::Authentication`] and are terminal.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Timeout(_)
                | Self::NotConnected(_)
                | Self::NotAuthenticated(_)
                | Self::Imap(_)
        )
    }

    /// Whether the account needs to be re-authenticated before it can
    /// sync again.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
