//! LOGOUT: untagged BYE, then the tagged OK.

use crate::fake_imap::io::send;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_logout<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) {
    let _ = send(stream, format!("* BYE\r\n{tag} OK LOGOUT completed\r\n")).await;
}
