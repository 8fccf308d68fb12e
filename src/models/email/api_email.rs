//! API representations of a stored email.

use super::db_email::DbEmail;
use crate::models::attachment::attachment_meta::AttachmentMeta;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

const PREVIEW_CHARS: usize = 200;

/// Full message, returned by the detail endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiEmail {
  pub id: Uuid,
  pub message_id: String,
  pub from_name: String,
  pub from_email: String,
  pub to_email: String,
  pub subject: String,
  pub body_text: String,
  pub body_html: String,
  pub attachments: Vec<AttachmentMeta>,
  pub is_read: bool,
  pub is_starred: bool,
  pub folder: String,
  pub received_at: DateTime<Utc>,
}

/// Row in a mailbox listing.
#[derive(Debug, Clone, Serialize)]
pub struct EmailSummary {
  pub id: Uuid,
  pub from_name: String,
  pub from_email: String,
  pub subject: String,
  pub preview: String,
  pub has_attachments: bool,
  pub is_read: bool,
  pub is_starred: bool,
  pub folder: String,
  pub received_at: DateTime<Utc>,
}

pub fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
  DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// First characters of the plain-text body, whitespace collapsed.
pub fn preview_of(text: &str) -> String {
  text
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .chars()
    .take(PREVIEW_CHARS)
    .collect()
}

impl TryFrom<DbEmail> for ApiEmail {
  type Error = serde_json::Error;

  fn try_from(d: DbEmail) -> Result<Self, Self::Error> {
    let attachments: Vec<AttachmentMeta> = serde_json::from_str(&d.attachments)?;
    Ok(ApiEmail {
      id: d.id,
      message_id: d.message_id,
      from_name: d.from_name,
      from_email: d.from_email,
      to_email: d.to_email,
      subject: d.subject,
      body_text: d.body_text,
      body_html: d.body_html,
      attachments,
      is_read: d.is_read,
      is_starred: d.is_starred,
      folder: d.folder,
      received_at: millis_to_datetime(d.received_at),
    })
  }
}

impl From<DbEmail> for EmailSummary {
  fn from(d: DbEmail) -> Self {
    EmailSummary {
      id: d.id,
      preview: preview_of(&d.body_text),
      has_attachments: d.attachments.trim() != "[]",
      from_name: d.from_name,
      from_email: d.from_email,
      subject: d.subject,
      is_read: d.is_read,
      is_starred: d.is_starred,
      folder: d.folder,
      received_at: millis_to_datetime(d.received_at),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn preview_collapses_whitespace_and_truncates() {
    let text = format!("Hello\r\n\r\n  world {}", "x".repeat(500));
    let p = preview_of(&text);
    assert!(p.starts_with("Hello world x"));
    assert_eq!(p.chars().count(), 200);
  }
}
