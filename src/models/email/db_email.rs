//! Database row for a stored email.

use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct DbEmail {
    pub id: Uuid,
    pub message_id: String,
    pub from_name: String,
    pub from_email: String,
    pub to_email: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    /// JSON array of attachment metadata.
    pub attachments: String,
    pub is_read: bool,
    pub is_starred: bool,
    pub folder: String,
    /// Unix milliseconds.
    pub received_at: i64,
}

/// Column list matching [`DbEmail`], for `SELECT`/`RETURNING` clauses.
pub const EMAIL_COLUMNS: &str = "id, message_id, from_name, from_email, to_email, subject, body_text, body_html, attachments, is_read, is_starred, folder, received_at";
