//! Persistence collaborators
//!
//! The engine only talks to accounts and messages through
//! [`AccountStore`] and [`MessageStore`]. The in-memory implementations
//! are plain injected values; each instance owns its own maps, so
//! tests never share state.

use crate::account::{Account, AccountId, SyncStatus};
use crate::error::{Error, Result};
use crate::message::PersistedMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backing store cannot be read.
    async fn get_by_id(&self, id: &AccountId) -> Result<Option<Account>>;

    /// Replace the stored account with `account`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the account is unknown or the write
    /// fails.
    async fn update(&self, account: &Account) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backing store cannot be read.
    async fn get_accounts_due_for_sync(&self) -> Result<Vec<Account>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backing store cannot be read.
    async fn get_by_provider_message_id(
        &self,
        account_id: &AccountId,
        provider_message_id: &str,
    ) -> Result<Option<PersistedMessage>>;

    /// Insert a new message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if a message with the same
    /// `(account_id, provider_message_id)` already exists or the write
    /// fails.
    async fn add(&self, message: PersistedMessage) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backing store cannot be read.
    async fn count_for_account(&self, account_id: &AccountId) -> Result<usize>;

    /// Number of persisted messages linking to the blob `content_hash`,
    /// across all accounts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backing store cannot be read.
    async fn count_hash_references(&self, content_hash: &str) -> Result<usize>;
}

/// Accounts kept in memory, keyed by id.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, account: Account) {
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account);
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_by_id(&self, id: &AccountId) -> Result<Option<Account>> {
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn update(&self, account: &Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let slot = accounts
            .get_mut(&account.id)
            .ok_or_else(|| Error::Store(format!("unknown account {}", account.id)))?;
        *slot = account.clone();
        Ok(())
    }

    /// Accounts that are idle and still hold valid credentials, sorted
    /// by id.
    async fn get_accounts_due_for_sync(&self) -> Result<Vec<Account>> {
        let mut due: Vec<Account> = self
            .accounts
            .read()
            .await
            .values()
            .filter(|a| a.status != SyncStatus::InProgress && !a.requires_reauth)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(due)
    }
}

/// Messages kept in memory, keyed by `(account, provider message id)`.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: RwLock<HashMap<(AccountId, String), PersistedMessage>>,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn get_by_provider_message_id(
        &self,
        account_id: &AccountId,
        provider_message_id: &str,
    ) -> Result<Option<PersistedMessage>> {
        let key = (account_id.clone(), provider_message_id.to_string());
        Ok(self.messages.read().await.get(&key).cloned())
    }

    async fn add(&self, message: PersistedMessage) -> Result<()> {
        let key = (
            message.account_id.clone(),
            message.provider_message_id.clone(),
        );
        let mut messages = self.messages.write().await;
        if messages.contains_key(&key) {
            return Err(Error::Store(format!(
                "message {} already exists for account {}",
                key.1, key.0
            )));
        }
        messages.insert(key, message);
        Ok(())
    }

    async fn count_for_account(&self, account_id: &AccountId) -> Result<usize> {
        Ok(self
            .messages
            .read()
            .await
            .keys()
            .filter(|(id, _)| id == account_id)
            .count())
    }

    async fn count_hash_references(&self, content_hash: &str) -> Result<usize> {
        Ok(self
            .messages
            .read()
            .await
            .values()
            .filter(|m| m.references_hash(content_hash))
            .count())
    }
}
