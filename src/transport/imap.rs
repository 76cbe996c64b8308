//! Generic IMAP transport for IMAP bridges
//!
//! Talks to a local bridge (Proton Bridge and similar) over STARTTLS.
//! Bridges present self-signed certificates, so the certificate chain is
//! not validated; handshake signatures still are.

use super::MailTransport;
use super::parse::parse_message;
use crate::account::Account;
use crate::config::{DEFAULT_FETCH_TIMEOUT, ImapConfig};
use crate::error::{Error, Result};
use crate::folder::Folder;
use crate::message::ExternalMessage;
use async_imap::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

type ImapSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

/// [`MailTransport`] over IMAP with STARTTLS.
#[derive(Debug, Clone)]
pub struct ImapTransport {
    config: ImapConfig,
    timeout: Duration,
}

impl ImapTransport {
    #[must_use]
    pub const fn new(config: ImapConfig) -> Self {
        Self {
            config,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Bound a whole `fetch_since` call, connect included.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connect(&self) -> Result<ImapSession> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        debug!("Connecting to IMAP server at {}", addr);

        let tcp_stream = TcpStream::connect(&addr).await?;
        let mut client = async_imap::Client::new(tcp_stream.compat());

        client
            .run_command_and_check_ok("STARTTLS", None)
            .await
            .map_err(|e| Error::NotConnected(format!("STARTTLS failed: {e}")))?;

        let server_name = ServerName::try_from(self.config.host.clone())
            .map_err(|e| Error::Config(format!("Invalid server name: {e}")))?;

        let inner = client.into_inner().into_inner();
        let tls_stream = tls_connector()?
            .connect(server_name, inner)
            .await
            .map_err(|e| Error::NotConnected(format!("TLS handshake failed: {e}")))?;

        let session = async_imap::Client::new(tls_stream.compat())
            .login(&self.config.username, &self.config.password)
            .await
            .map_err(|(e, _)| login_err(e))?;

        info!("Connected to IMAP server");
        Ok(session)
    }

    async fn fetch_folder(
        &self,
        session: &mut ImapSession,
        folder: &Folder,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExternalMessage>> {
        session
            .select(folder.as_str())
            .await
            .map_err(imap_err(&format!("Failed to select {folder}")))?;

        // IMAP SINCE has day granularity; the engine dedups the overlap.
        let query = format!("SINCE {}", since.format("%-d-%b-%Y"));
        let uids = session
            .uid_search(&query)
            .await
            .map_err(imap_err("Search failed"))?;

        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable();
        info!("Found {} messages in {} matching '{}'", uid_list.len(), folder, query);

        let mut messages = Vec::with_capacity(uid_list.len());
        for uid in uid_list {
            match fetch_single(session, folder, uid).await {
                Ok(message) => messages.push(message),
                Err(e @ Error::Parse(_)) => warn!("Skipping unparseable UID {}: {}", uid, e),
                Err(e) => return Err(e),
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl MailTransport for ImapTransport {
    async fn fetch_since(
        &self,
        account: &Account,
        folder: &Folder,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExternalMessage>> {
        // one transport serves exactly the mailbox its login opens
        if !account.address.eq_ignore_ascii_case(&self.config.username) {
            return Err(Error::Config(format!(
                "IMAP login {} cannot sync account {} ({})",
                self.config.username, account.id, account.address
            )));
        }
        debug!(account = %account.id, %folder, %since, "IMAP fetch");

        let fetch = async {
            let mut session = self.connect().await?;
            let result = self.fetch_folder(&mut session, folder, since).await;
            session.logout().await.ok();
            result
        };

        tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "fetching {folder} took longer than {}s",
                    self.timeout.as_secs()
                ))
            })?
    }
}

async fn fetch_single(
    session: &mut ImapSession,
    folder: &Folder,
    uid: u32,
) -> Result<ExternalMessage> {
    let mut messages = session
        .uid_fetch(uid.to_string(), "(UID INTERNALDATE BODY.PEEK[])")
        .await
        .map_err(imap_err("Fetch failed"))?;

    // drain to the tagged completion so the next command starts clean
    let mut parsed = None;
    while let Some(msg_result) = messages.next().await {
        let msg = msg_result.map_err(imap_err("Fetch error"))?;
        if parsed.is_some() {
            continue;
        }
        if let Some(body) = msg.body() {
            let received_at = msg.internal_date().map(|d| d.with_timezone(&Utc));
            parsed = Some(parse_message(body, &format!("{folder}:{uid}"), received_at));
        }
    }

    parsed.unwrap_or_else(|| Err(Error::Imap(format!("No body found for UID {uid}"))))
}

/// Only a tagged `NO` to LOGIN means the credentials were rejected.
fn login_err(e: async_imap::error::Error) -> Error {
    match e {
        async_imap::error::Error::No(msg) => {
            Error::Authentication(format!("Login failed: {msg}"))
        }
        async_imap::error::Error::Io(io) => Error::Io(io),
        async_imap::error::Error::ConnectionLost => {
            Error::NotConnected("connection lost during login".into())
        }
        other => Error::Imap(format!("Login failed: {other}")),
    }
}

fn imap_err(context: &str) -> impl Fn(async_imap::error::Error) -> Error + '_ {
    move |e| match e {
        async_imap::error::Error::Io(io) => Error::Io(io),
        other => Error::Imap(format!("{context}: {other}")),
    }
}

fn tls_connector() -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Config(format!("TLS setup failed: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(BridgeCertVerifier { provider }))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Accepts any certificate chain but checks handshake signatures with
/// the provider's algorithms.
#[derive(Debug)]
struct BridgeCertVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for BridgeCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
