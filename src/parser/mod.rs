//! Raw RFC 5322 bytes to a fixed-shape parsed message.

use crate::{models::attachment::attachment_meta::AttachmentMeta, util::html_escape};
use mailparse::{
  DispositionType, MailAddr, MailHeaderMap, MailParseError, ParsedMail, addrparse_header,
  parse_mail,
};
use thiserror::Error;
use uuid::Uuid;

pub const UNKNOWN_SENDER: &str = "unknown@unknown.com";
pub const NO_SUBJECT: &str = "(No Subject)";

const TEXT_WRAP_COLUMNS: usize = 100;

#[derive(Debug, Error)]
pub enum ParseError {
  #[error("message is empty")]
  Empty,
  #[error("malformed MIME structure: {0}")]
  Mime(#[from] MailParseError),
  #[error("undecodable {part} body: {source}")]
  Body {
    part: &'static str,
    source: MailParseError,
  },
}

/// Message content shared by every recipient row of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
  /// `Message-ID` header verbatim (angle brackets included), if present.
  pub message_id: Option<String>,
  pub from_name: String,
  pub from_address: String,
  pub subject: String,
  pub text_body: String,
  pub html_body: String,
  pub attachments: Vec<AttachmentMeta>,
}

/// Parse a complete message as received after `DATA`.
pub fn parse(raw: &[u8]) -> Result<ParsedMessage, ParseError> {
  if raw.iter().all(u8::is_ascii_whitespace) {
    return Err(ParseError::Empty);
  }
  let parsed = parse_mail(raw)?;

  let message_id = parsed
    .headers
    .get_first_value("Message-ID")
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty());
  let (from_name, from_address) = sender(&parsed);
  let subject = parsed
    .headers
    .get_first_value("Subject")
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .unwrap_or_else(|| NO_SUBJECT.to_string());

  let (text, html) = extract_bodies(&parsed)?;
  let (text_body, html_body) = match (text, html) {
    (Some(t), Some(h)) => (t, h),
    (Some(t), None) => {
      let h = text_as_html(&t);
      (t, h)
    }
    (None, Some(h)) => (html2text::from_read(h.as_bytes(), TEXT_WRAP_COLUMNS), h),
    (None, None) => (String::new(), String::new()),
  };

  let mut attachments = Vec::new();
  collect_attachments(&parsed, &mut attachments)?;

  Ok(ParsedMessage {
    message_id,
    from_name,
    from_address,
    subject,
    text_body,
    html_body,
    attachments,
  })
}

/// Stand-in `Message-ID` for messages without one: 128 random bits.
pub fn synthetic_message_id() -> String {
  format!("<{}@tempinbox.invalid>", Uuid::new_v4().simple())
}

/// Display name and address of the first `From:` mailbox.
fn sender(parsed: &ParsedMail<'_>) -> (String, String) {
  let unknown = || (String::new(), UNKNOWN_SENDER.to_string());
  let Some(header) = parsed.headers.get_first_header("From") else {
    return unknown();
  };
  let Ok(list) = addrparse_header(header) else {
    return unknown();
  };
  let first = list.iter().find_map(|addr| match addr {
    MailAddr::Single(info) => Some(info.clone()),
    MailAddr::Group(group) => group.addrs.first().cloned(),
  });
  match first {
    Some(info) if info.addr.contains('@') => (
      info.display_name.unwrap_or_default().trim().to_string(),
      info.addr.trim().to_string(),
    ),
    _ => unknown(),
  }
}

fn is_attachment(part: &ParsedMail<'_>) -> bool {
  let disposition = part.get_content_disposition();
  let ctype = part.ctype.mimetype.to_ascii_lowercase();
  let is_text = ctype == "text/plain" || ctype == "text/html";
  matches!(disposition.disposition, DispositionType::Attachment)
    || disposition.params.contains_key("filename")
    || !is_text
}

fn decode_body(part: &ParsedMail<'_>, kind: &'static str) -> Result<String, ParseError> {
  part
    .get_body()
    .map_err(|source| ParseError::Body { part: kind, source })
}

/// First inline text and HTML bodies from a MIME tree.
fn extract_bodies(parsed: &ParsedMail<'_>) -> Result<(Option<String>, Option<String>), ParseError> {
  if parsed.subparts.is_empty() {
    if is_attachment(parsed) {
      return Ok((None, None));
    }
    return match parsed.ctype.mimetype.to_ascii_lowercase().as_str() {
      "text/html" => Ok((None, Some(decode_body(parsed, "html")?))),
      _ => Ok((Some(decode_body(parsed, "text")?), None)),
    };
  }
  let mut text = None;
  let mut html = None;
  for part in &parsed.subparts {
    let (t, h) = extract_bodies(part)?;
    if text.is_none() {
      text = t;
    }
    if html.is_none() {
      html = h;
    }
    if text.is_some() && html.is_some() {
      break;
    }
  }
  Ok((text, html))
}

/// Walk MIME leaves and record attachment metadata in document order.
fn collect_attachments(
  parsed: &ParsedMail<'_>,
  out: &mut Vec<AttachmentMeta>,
) -> Result<(), ParseError> {
  if !parsed.subparts.is_empty() {
    for part in &parsed.subparts {
      collect_attachments(part, out)?;
    }
    return Ok(());
  }
  if !is_attachment(parsed) {
    return Ok(());
  }
  let disposition = parsed.get_content_disposition();
  let filename = disposition
    .params
    .get("filename")
    .cloned()
    .or_else(|| parsed.ctype.params.get("name").cloned())
    .map(|f| f.trim().trim_matches(['"', '\'']).to_string())
    .filter(|f| !f.is_empty());
  let size = parsed
    .get_body_raw()
    .map_err(|source| ParseError::Body {
      part: "attachment",
      source,
    })?
    .len() as u64;
  out.push(AttachmentMeta {
    filename,
    content_type: parsed.ctype.mimetype.clone(),
    size,
  });
  Ok(())
}

fn text_as_html(text: &str) -> String {
  format!("<p>{}</p>", html_escape(text).replace("\r\n", "\n").replace('\n', "<br/>"))
}
