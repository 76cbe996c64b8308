//! Fetch transports
//!
//! A [`MailTransport`] is the one capability the engine needs from a
//! provider. Which implementation serves an account is decided once per
//! run by [`TransportRegistry::resolve`]; nothing else looks at
//! [`Provider`].

mod imap;
mod parse;

pub use imap::ImapTransport;
pub use parse::parse_message;

use crate::account::{Account, Provider};
use crate::error::{Error, Result};
use crate::folder::Folder;
use crate::message::ExternalMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Fetch messages in `folder` received at or after `since`, in the
    /// order they should be processed.
    ///
    /// Returning messages from slightly before `since` is fine; the
    /// engine dedups them.
    ///
    /// # Errors
    ///
    /// Implementations classify failures with the crate [`Error`]
    /// variants so the retry policy can tell transient from terminal.
    async fn fetch_since(
        &self,
        account: &Account,
        folder: &Folder,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExternalMessage>>;
}

/// Provider → transport lookup.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<Provider, Arc<dyn MailTransport>>,
}

impl TransportRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, provider: Provider, transport: Arc<dyn MailTransport>) -> Self {
        self.register(provider, transport);
        self
    }

    pub fn register(&mut self, provider: Provider, transport: Arc<dyn MailTransport>) {
        self.transports.insert(provider, transport);
    }

    /// # Errors
    ///
    /// Returns [`Error::TransportNotConfigured`] if nothing is
    /// registered for `provider`.
    pub fn resolve(&self, provider: Provider) -> Result<Arc<dyn MailTransport>> {
        self.transports
            .get(&provider)
            .cloned()
            .ok_or(Error::TransportNotConfigured(provider))
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.transports.keys()).finish()
    }
}
