//! Insert and update payloads for the mailstore.

use crate::models::attachment::attachment_meta::AttachmentMeta;
use crate::parser::ParsedMessage;
use serde::Deserialize;

/// A message ready to be stored for one recipient. `id` and `received_at` are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmail {
    pub message_id: String,
    pub from_name: String,
    pub from_email: String,
    pub to_email: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    pub attachments: Vec<AttachmentMeta>,
}

impl NewEmail {
    /// Build the row for `to_email` from a message parsed once per transaction.
    pub fn for_recipient(parsed: &ParsedMessage, message_id: &str, to_email: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            from_name: parsed.from_name.clone(),
            from_email: parsed.from_address.clone(),
            to_email: crate::recipient::normalize_address(to_email),
            subject: parsed.subject.clone(),
            body_text: parsed.text_body.clone(),
            body_html: parsed.html_body.clone(),
            attachments: parsed.attachments.clone(),
        }
    }
}

/// Mutable flags owned by the CRUD layer. `None` leaves a field untouched.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct EmailPatch {
    pub is_read: Option<bool>,
    pub is_starred: Option<bool>,
    pub folder: Option<String>,
}

impl EmailPatch {
    pub fn is_empty(&self) -> bool {
        self.is_read.is_none() && self.is_starred.is_none() && self.folder.is_none()
    }
}
