//! LOGIN: accepts only the mailbox's credentials.
//!
//! A wrong password gets a tagged `NO [AUTHENTICATIONFAILED]`, which is
//! what bridges answer for revoked or mistyped credentials.

use crate::fake_imap::io::send;
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Returns `false` if the connection should be closed.
pub async fn handle_login<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    line: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> bool {
    let mut args = line.split_whitespace().skip(2).map(|a| a.trim_matches('"'));
    let accepted = args.next() == Some(mailbox.username.as_str())
        && args.next() == Some(mailbox.password.as_str());

    let resp = if accepted {
        format!("{tag} OK LOGIN completed\r\n")
    } else {
        format!("{tag} NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
    };
    send(stream, resp).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;

    async fn run(line: &str) -> String {
        let mailbox = MailboxBuilder::new().credentials("alice@example.com", "secret").build();
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);

        assert!(handle_login("A1", line, &mailbox, &mut stream).await);
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn accepts_matching_credentials() {
        let output = run("A1 LOGIN \"alice@example.com\" \"secret\"\r\n").await;
        assert_eq!(output, "A1 OK LOGIN completed\r\n");
    }

    #[tokio::test]
    async fn rejects_wrong_password() {
        let output = run("A1 LOGIN \"alice@example.com\" \"guess\"\r\n").await;
        assert!(output.starts_with("A1 NO [AUTHENTICATIONFAILED]"));
    }
}
