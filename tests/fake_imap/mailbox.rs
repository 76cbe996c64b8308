//! Mailbox state served by the fake bridge
//!
//! ```ignore
//! let mailbox = MailboxBuilder::new()
//!     .credentials("alice@example.com", "secret")
//!     .folder("INBOX")
//!         .email(1, days_ago(2), &raw)
//!     .folder("Sent")
//!     .build();
//! ```
//!
//! SEARCH SINCE matches on each email's internal date, as real servers
//! do, not on its `Date:` header.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct Mailbox {
    pub username: String,
    pub password: String,
    pub folders: Vec<Folder>,
}

impl Mailbox {
    /// Folder by exact name.
    pub fn get_folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    pub emails: Vec<TestEmail>,
}

#[derive(Debug, Clone)]
pub struct TestEmail {
    pub uid: u32,
    /// Arrival time reported as INTERNALDATE.
    pub internal_date: DateTime<Utc>,
    pub raw: Vec<u8>,
}

pub struct MailboxBuilder {
    username: String,
    password: String,
    folders: Vec<Folder>,
}

impl MailboxBuilder {
    pub fn new() -> Self {
        Self {
            username: "testuser".into(),
            password: "testpass".into(),
            folders: Vec::new(),
        }
    }

    /// The only login the server accepts.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn folder(mut self, name: &str) -> Self {
        self.folders.push(Folder {
            name: name.into(),
            emails: Vec::new(),
        });
        self
    }

    /// Add an email to the last folder.
    ///
    /// # Panics
    ///
    /// Panics if no folder was added yet.
    pub fn email(mut self, uid: u32, internal_date: DateTime<Utc>, raw: &[u8]) -> Self {
        self.folders
            .last_mut()
            .expect("call .folder() before .email()")
            .emails
            .push(TestEmail {
                uid,
                internal_date,
                raw: raw.to_vec(),
            });
        self
    }

    pub fn build(self) -> Mailbox {
        Mailbox {
            username: self.username,
            password: self.password,
            folders: self.folders,
        }
    }
}
