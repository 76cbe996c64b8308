//! Scripted in-process transport for engine tests
//!
//! ```ignore
//! let transport = FakeTransport::new()
//!     .message(Folder::Inbox, msg("<1@x>", at(9)))
//!     .failures(2, Failure::Transient);
//! ```
//!
//! `fetch_since` returns the folder's messages received at or after
//! `since`, in insertion order, after first burning through any queued
//! failures. Every call is recorded so tests can assert on attempt
//! counts and fetch windows.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Days, TimeZone, Utc};
use mailbox_sync::{
    Account, Error, ExternalAttachment, ExternalMessage, Folder, MailTransport, Result,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// Timeout; retried by the engine.
    Transient,
    /// Rejected credentials; never retried.
    Terminal,
}

impl Failure {
    fn to_error(self) -> Error {
        match self {
            Self::Transient => Error::Timeout("fake server too slow".into()),
            Self::Terminal => Error::Authentication("fake server rejected login".into()),
        }
    }
}

/// One recorded `fetch_since` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub folder: Folder,
    pub since: DateTime<Utc>,
}

#[derive(Default)]
pub struct FakeTransport {
    folders: Mutex<HashMap<Folder, Vec<ExternalMessage>>>,
    failures: Mutex<VecDeque<Failure>>,
    always_fail: Option<Failure>,
    fail_folder: Option<(Folder, Failure)>,
    calls: Mutex<Vec<FetchCall>>,
    delay: Option<Duration>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(self, folder: Folder, message: ExternalMessage) -> Self {
        self.push(folder, message);
        self
    }

    /// Queue `n` failures ahead of the next successful fetches.
    pub fn failures(self, n: usize, failure: Failure) -> Self {
        self.failures.lock().unwrap().extend(std::iter::repeat_n(failure, n));
        self
    }

    pub fn always_failing(mut self, failure: Failure) -> Self {
        self.always_fail = Some(failure);
        self
    }

    pub fn failing_folder(mut self, folder: Folder, failure: Failure) -> Self {
        self.fail_folder = Some((folder, failure));
        self
    }

    /// Sleep inside every fetch, to make overlapping calls observable.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Block every fetch until `release` is notified; `entered` is
    /// notified once a fetch is waiting.
    pub fn gated(mut self, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        self.gate = Some((entered, release));
        self
    }

    /// Add a message after construction, e.g. new mail between runs.
    pub fn push(&self, folder: Folder, message: ExternalMessage) {
        self.folders
            .lock()
            .unwrap()
            .entry(folder)
            .or_default()
            .push(message);
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_failure(&self, folder: &Folder) -> Option<Failure> {
        if let Some(f) = self.always_fail {
            return Some(f);
        }
        if let Some((failing, f)) = &self.fail_folder {
            if failing == folder {
                return Some(*f);
            }
        }
        self.failures.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn fetch_since(
        &self,
        _account: &Account,
        folder: &Folder,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExternalMessage>> {
        self.calls.lock().unwrap().push(FetchCall {
            folder: folder.clone(),
            since,
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(failure) = self.next_failure(folder) {
            return Err(failure.to_error());
        }

        Ok(self
            .folders
            .lock()
            .unwrap()
            .get(folder)
            .map(|msgs| {
                msgs.iter()
                    .filter(|m| m.received_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// `hour`:00 UTC on the day a week before today.
///
/// Inside the default backfill window, so fixtures are fetched no
/// matter when the suite runs.
pub fn at(hour: u32) -> DateTime<Utc> {
    let day = (Utc::now() - Days::new(7)).date_naive();
    Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
}

pub fn msg(id: &str, received_at: DateTime<Utc>) -> ExternalMessage {
    ExternalMessage {
        provider_message_id: id.to_string(),
        subject: format!("Subject of {id}"),
        from: "sender@example.com".into(),
        to: vec!["me@example.com".into()],
        sent_at: Some(received_at),
        received_at,
        body_text: Some(format!("Body of {id}")),
        body_html: None,
        attachments: Vec::new(),
    }
}

pub fn with_attachment(
    mut message: ExternalMessage,
    file_name: &str,
    bytes: &[u8],
) -> ExternalMessage {
    message.attachments.push(ExternalAttachment::new(
        file_name,
        "application/octet-stream",
        bytes.to_vec(),
    ));
    message
}
