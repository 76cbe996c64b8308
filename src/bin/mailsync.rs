#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for running one-off syncs against an IMAP bridge

use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use mailbox_sync::{
    Account, AttachmentStorage, Folder, FsAttachmentStore, ImapConfig, ImapTransport,
    MemoryAccountStore, MemoryMessageStore, Provider, SyncConfig, SyncOrchestrator, SyncResult,
    TransportRegistry,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailsync")]
#[command(about = "Sync a mailbox into a deduplicated local attachment store")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Sync the IMAP account configured through IMAP_* variables
    ///
    /// Account and message state live in memory for this run only, so
    /// every invocation starts from the backfill window (or --since).
    /// Attachments are written to SYNC_STORAGE_DIR and stay deduplicated
    /// across runs.
    Sync {
        /// Folder to sync (repeatable, default: INBOX and Sent)
        #[arg(long = "folder")]
        folders: Vec<String>,

        /// Fetch messages since this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        since: Option<NaiveDate>,
    },

    /// Print the deduplicated size of the attachment store
    StorageSize,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("Invalid date '{s}': {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = SyncConfig::from_env()?;

    match &args.command {
        Command::Sync { folders, since } => {
            cmd_sync(&config, &args, folders, *since).await?;
        }
        Command::StorageSize => {
            cmd_storage_size(&config, &args).await?;
        }
    }

    Ok(())
}

async fn cmd_sync(
    config: &SyncConfig,
    args: &Args,
    folders: &[String],
    since: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let imap = ImapConfig::from_env()?;
    let login = imap.username.clone();
    let account = Account::new(login.as_str(), Provider::Imap, login.as_str(), login.as_str())
        .with_folders(folders.iter().map(|f| Folder::from(f.as_str())));
    let account_id = account.id.clone();

    let accounts = Arc::new(MemoryAccountStore::new());
    accounts.insert(account).await;

    let transport = ImapTransport::new(imap).with_timeout(config.fetch_timeout);
    let orchestrator = SyncOrchestrator::new(
        config,
        accounts,
        Arc::new(MemoryMessageStore::new()),
        Arc::new(FsAttachmentStore::new(&config.storage_dir)),
        TransportRegistry::new().with(Provider::Imap, Arc::new(transport)),
    );

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling sync");
            on_ctrl_c.cancel();
        }
    });

    let start = since.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|d| Utc.from_utc_datetime(&d));
    let result = orchestrator.sync_account(&account_id, start, &cancel).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_storage_size(config: &SyncConfig, args: &Args) -> anyhow::Result<()> {
    let store = FsAttachmentStore::new(&config.storage_dir);
    let bytes = store.total_size().await?;

    if args.json {
        println!("{}", serde_json::json!({ "bytes": bytes }));
    } else {
        println!("{bytes} bytes in {}", config.storage_dir.display());
    }
    Ok(())
}

fn print_result(result: &SyncResult) {
    println!("{:<12} {:>8} {:>12} {:>10}", "Folder", "Emails", "Attachments", "Skipped");
    println!("{}", "-".repeat(46));
    for folder in &result.folders {
        println!(
            "{:<12} {:>8} {:>12} {:>10}",
            folder.folder.as_str(),
            folder.emails_processed,
            folder.attachments_processed,
            folder.skipped_duplicates,
        );
    }
    println!(
        "\n{:?}: {} email(s), {} attachment(s) in {}s",
        result.outcome,
        result.emails_processed,
        result.attachments_processed,
        (result.finished_at - result.started_at).num_seconds(),
    );
    if let Some(error) = &result.error_message {
        println!("Error: {error}");
    }
}
