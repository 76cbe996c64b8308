//! RFC 5322 message → [`ExternalMessage`]

use crate::error::{Error, Result};
use crate::message::{ExternalAttachment, ExternalMessage};
use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail};

/// Parse a raw message.
///
/// The `Message-ID` header is the provider message id; `fallback_id`
/// is used when it is missing. `received_at` defaults to the `Date`
/// header, then to now.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the MIME structure cannot be parsed.
pub fn parse_message(
    raw: &[u8],
    fallback_id: &str,
    received_at: Option<DateTime<Utc>>,
) -> Result<ExternalMessage> {
    let mail = mailparse::parse_mail(raw).map_err(|e| Error::Parse(e.to_string()))?;
    let headers = mail.get_headers();

    let provider_message_id = headers
        .get_first_value("Message-ID")
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| fallback_id.to_string());

    let sent_at = headers
        .get_first_value("Date")
        .and_then(|d| mailparse::dateparse(&d).ok())
        .and_then(|ts| DateTime::from_timestamp(ts, 0));

    let mut to = addresses(headers.get_first_value("To").as_deref());
    to.extend(addresses(headers.get_first_value("Cc").as_deref()));

    let mut message = ExternalMessage {
        provider_message_id,
        subject: headers.get_first_value("Subject").unwrap_or_default(),
        from: addresses(headers.get_first_value("From").as_deref())
            .into_iter()
            .next()
            .unwrap_or_default(),
        to,
        sent_at,
        received_at: received_at.or(sent_at).unwrap_or_else(Utc::now),
        body_text: None,
        body_html: None,
        attachments: Vec::new(),
    };
    collect_parts(&mail, &mut message)?;
    Ok(message)
}

fn addresses(header: Option<&str>) -> Vec<String> {
    let Some(list) = header.and_then(|h| mailparse::addrparse(h).ok()) else {
        return Vec::new();
    };
    list.iter()
        .flat_map(|addr| match addr {
            MailAddr::Single(info) => vec![info.addr.clone()],
            MailAddr::Group(group) => group.addrs.iter().map(|i| i.addr.clone()).collect(),
        })
        .collect()
}

fn collect_parts(part: &ParsedMail<'_>, message: &mut ExternalMessage) -> Result<()> {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_parts(sub, message)?;
        }
        return Ok(());
    }

    let disposition = part.get_content_disposition();
    let file_name = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned();
    let mimetype = part.ctype.mimetype.to_ascii_lowercase();

    if disposition.disposition == DispositionType::Attachment || file_name.is_some() {
        let bytes = part.get_body_raw().map_err(|e| Error::Parse(e.to_string()))?;
        let mut attachment = ExternalAttachment::new(
            file_name.unwrap_or_else(|| "attachment".to_string()),
            mimetype,
            bytes,
        );
        attachment.provider_id = part
            .get_headers()
            .get_first_value("Content-ID")
            .map(|id| id.trim().to_string());
        message.attachments.push(attachment);
        return Ok(());
    }

    let slot = match mimetype.as_str() {
        "text/plain" => &mut message.body_text,
        "text/html" => &mut message.body_html,
        _ => return Ok(()),
    };
    if slot.is_none() {
        *slot = Some(part.get_body().map_err(|e| Error::Parse(e.to_string()))?);
    }
    Ok(())
}
