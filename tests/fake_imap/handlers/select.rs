//! SELECT: the untagged data async-imap expects, then `OK`, or `NO` for
//! an unknown folder. Returns the selected folder name.

use crate::fake_imap::io::send;
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> Option<String> {
    let Some(folder) = mailbox.get_folder(folder_name) else {
        let _ = send(stream, format!("{tag} NO Folder not found\r\n")).await;
        return None;
    };

    let uidnext = folder.emails.iter().map(|e| e.uid).max().map_or(1, |max| max + 1);
    let resp = format!(
        "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n\
         * {} EXISTS\r\n\
         * 0 RECENT\r\n\
         * OK [UIDVALIDITY 1]\r\n\
         * OK [UIDNEXT {uidnext}]\r\n\
         {tag} OK [READ-ONLY] SELECT completed\r\n",
        folder.emails.len()
    );
    let _ = send(stream, resp).await;
    Some(folder_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use chrono::Utc;

    async fn run(folder_name: &str, mailbox: &Mailbox) -> (String, Option<String>) {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        let selected = handle_select("A1", folder_name, mailbox, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        (String::from_utf8(buf).unwrap(), selected)
    }

    #[tokio::test]
    async fn reports_count_and_next_uid() {
        let mailbox = MailboxBuilder::new()
            .folder("Sent")
            .email(4, Utc::now(), b"Subject: a\r\n\r\na")
            .email(9, Utc::now(), b"Subject: b\r\n\r\nb")
            .build();

        let (output, selected) = run("Sent", &mailbox).await;

        assert_eq!(selected.as_deref(), Some("Sent"));
        assert!(output.contains("* 2 EXISTS"));
        assert!(output.contains("* OK [UIDNEXT 10]"));
        assert!(output.ends_with("A1 OK [READ-ONLY] SELECT completed\r\n"));
    }

    #[tokio::test]
    async fn unknown_folder_is_no() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();
        let (output, selected) = run("Archive", &mailbox).await;
        assert!(selected.is_none());
        assert_eq!(output, "A1 NO Folder not found\r\n");
    }
}
