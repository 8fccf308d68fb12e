//! Attachment metadata kept alongside a stored message.

use serde::{Deserialize, Serialize};

/// One attachment as recorded at ingestion; payload bytes are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
  pub filename: Option<String>,
  pub content_type: String,
  pub size: u64,
}
