//! In-process fake IMAP bridge
//!
//! Like a local mail bridge, the server greets in plaintext, upgrades
//! with STARTTLS to a self-signed certificate, and only then accepts
//! LOGIN. Commands are parsed with `imap-codec` and dispatched to the
//! handlers; anything the sync transport never sends gets `BAD`.
//!
//! ```text
//!   S: * OK IMAP4rev1 Fake bridge ready
//!   C: A0001 STARTTLS
//!   S: A0001 OK Begin TLS negotiation now
//!   <TLS handshake>
//!   C: A0002 LOGIN "alice@example.com" "secret"
//!   S: A0002 OK LOGIN completed
//!   C: A0003 SELECT INBOX
//!   C: A0004 UID SEARCH SINCE 8-Oct-2026
//!   S: * SEARCH 2 3
//!   C: A0005 UID FETCH 2 (UID INTERNALDATE BODY.PEEK[])
//!   S: * 1 FETCH (UID 2 INTERNALDATE "08-Oct-2026 10:00:00 +0000" BODY[] {512}
//!   <512 bytes>)
//! ```

use super::handlers::{
    handle_login, handle_logout, handle_select, handle_uid_fetch, handle_uid_search,
};
use super::io::send;
use super::mailbox::Mailbox;
use imap_codec::CommandCodec;
use imap_codec::decode::Decoder;
use imap_codec::imap_types::command::CommandBody;
use imap_codec::imap_types::mailbox::Mailbox as ImapMailbox;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

/// A fake bridge on `127.0.0.1` with an OS-assigned port. Stops when
/// dropped.
pub struct FakeImapServer {
    port: u16,
    logins: Arc<AtomicUsize>,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeImapServer {
    pub async fn start(mailbox: Mailbox) -> Self {
        // the server config below needs a process-wide provider
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let cert = generate_simple_self_signed(vec!["127.0.0.1".to_string()])
            .expect("generate self-signed cert");
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert.cert.der().clone()], key_der.into())
            .expect("build server TLS config");

        let acceptor = TlsAcceptor::from(Arc::new(tls_config));
        let mailbox = Arc::new(mailbox);
        let logins = Arc::new(AtomicUsize::new(0));

        let handle = {
            let logins = logins.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let acceptor = acceptor.clone();
                    let mailbox = mailbox.clone();
                    let logins = logins.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, acceptor, &mailbox, &logins).await;
                    });
                }
            })
        };

        Self {
            port,
            logins,
            handle,
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// LOGIN commands received so far, accepted or not.
    pub fn login_attempts(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

impl Drop for FakeImapServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    mailbox: &Mailbox,
    logins: &AtomicUsize,
) {
    let mut reader = BufReader::new(stream);
    if send(&mut reader, "* OK IMAP4rev1 Fake bridge ready\r\n").await.is_err() {
        return;
    }

    let mut line = String::new();
    if reader.read_line(&mut line).await.is_err() {
        return;
    }
    let Some((tag, command)) = line.trim().split_once(' ') else {
        return;
    };
    if !command.eq_ignore_ascii_case("STARTTLS") {
        let _ = send(&mut reader, format!("{tag} BAD Expected STARTTLS\r\n")).await;
        return;
    }
    let ok = format!("{tag} OK Begin TLS negotiation now\r\n");
    if send(&mut reader, ok).await.is_err() {
        return;
    }

    let Ok(tls_stream) = acceptor.accept(reader.into_inner()).await else {
        return;
    };
    handle_session(tls_stream, mailbox, logins).await;
}

fn mailbox_name(mb: &ImapMailbox<'_>) -> String {
    match mb {
        ImapMailbox::Inbox => "INBOX".to_string(),
        ImapMailbox::Other(other) => {
            let bytes: &[u8] = other.as_ref();
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

async fn handle_session<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    mailbox: &Mailbox,
    logins: &AtomicUsize,
) {
    let mut reader = BufReader::new(stream);
    let mut selected: Option<String> = None;
    let codec = CommandCodec::default();

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if line.trim().is_empty() {
            continue;
        }

        let Ok((_, command)) = codec.decode(line.as_bytes()) else {
            let tag = line.split_whitespace().next().unwrap_or("*");
            if send(&mut reader, format!("{tag} BAD Parse error\r\n")).await.is_err() {
                break;
            }
            continue;
        };
        let tag = command.tag.inner();

        match command.body {
            CommandBody::Login { .. } => {
                logins.fetch_add(1, Ordering::SeqCst);
                if !handle_login(tag, &line, mailbox, &mut reader).await {
                    break;
                }
            }
            CommandBody::Select { mailbox: mb, .. } => {
                selected = handle_select(tag, &mailbox_name(&mb), mailbox, &mut reader).await;
            }
            CommandBody::Search {
                criteria,
                uid: true,
                ..
            } => {
                handle_uid_search(
                    tag,
                    criteria.as_ref(),
                    mailbox,
                    selected.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Fetch {
                sequence_set,
                uid: true,
                ..
            } => {
                handle_uid_fetch(tag, &sequence_set, mailbox, selected.as_deref(), &mut reader)
                    .await;
            }
            CommandBody::Logout => {
                handle_logout(tag, &mut reader).await;
                break;
            }
            _ => {
                if send(&mut reader, format!("{tag} BAD Unknown command\r\n")).await.is_err() {
                    break;
                }
            }
        }
    }
}
