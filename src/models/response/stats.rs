//! Aggregate counters exposed by the stats endpoint.

use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MailStats {
    pub total_emails: i64,
    pub unique_addresses: i64,
    pub unique_senders: i64,
}
