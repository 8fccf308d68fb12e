//! The mailstore: durable, idempotent storage of parsed messages.
//!
//! Every write is a single SQL statement, so SQLite's own locking is the only
//! concurrency control needed between SMTP sessions, the sweeper and the API.

use crate::{
    error::Result,
    models::{
        email::{
            api_email::{ApiEmail, EmailSummary},
            db_email::{DbEmail, EMAIL_COLUMNS},
            new_email::{EmailPatch, NewEmail},
        },
        response::stats::MailStats,
    },
    recipient::normalize_address,
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;
use uuid::Uuid;

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Insertion timestamp in unix millis, never smaller than a previous one.
fn stamp_now() -> i64 {
    let now = Utc::now().timestamp_millis();
    let prev = LAST_STAMP.fetch_max(now, Ordering::SeqCst);
    prev.max(now)
}

#[derive(Debug, Clone)]
pub struct Mailstore {
    pool: SqlitePool,
}

impl Mailstore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store `email`, stamped with the current time.
    ///
    /// Returns `false` when a row for the same `(message_id, to_email)` already
    /// exists; that is a successful no-op, not an error.
    pub async fn insert(&self, email: &NewEmail) -> Result<bool> {
        self.insert_received_at(email, stamp_now()).await
    }

    /// Store `email` with an explicit `received_at` (unix millis).
    pub async fn insert_received_at(&self, email: &NewEmail, received_at: i64) -> Result<bool> {
        let attachments = serde_json::to_string(&email.attachments)?;
        let res = sqlx::query(
            "INSERT INTO emails (id, message_id, from_name, from_email, to_email, subject, body_text, body_html, attachments, received_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (message_id, to_email) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(&email.message_id)
        .bind(&email.from_name)
        .bind(&email.from_email)
        .bind(normalize_address(&email.to_email))
        .bind(&email.subject)
        .bind(&email.body_text)
        .bind(&email.body_html)
        .bind(attachments)
        .bind(received_at)
        .execute(&self.pool)
        .await?;
        let created = res.rows_affected() == 1;
        if !created {
            debug!(
                message_id = %email.message_id,
                to = %email.to_email,
                "duplicate delivery ignored"
            );
        }
        Ok(created)
    }

    /// Newest-first listing of one mailbox.
    pub async fn list_by_recipient(&self, address: &str, limit: u32) -> Result<Vec<EmailSummary>> {
        let sql = format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE to_email = ? ORDER BY received_at DESC, rowid DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, DbEmail>(&sql)
            .bind(normalize_address(address))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(EmailSummary::from).collect())
    }

    /// Detail read: returns the full record and marks it read.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<ApiEmail>> {
        let sql = format!("UPDATE emails SET is_read = 1 WHERE id = ? RETURNING {EMAIL_COLUMNS}");
        let row = sqlx::query_as::<_, DbEmail>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ApiEmail::try_from).transpose()?)
    }

    /// Returns whether a row was removed. A missing id is not an error.
    pub async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        let res = sqlx::query("DELETE FROM emails WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Remove every row received strictly before `cutoff`.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let res = sqlx::query("DELETE FROM emails WHERE received_at < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    /// Apply CRUD-layer flag changes. Returns whether the row exists.
    pub async fn update(&self, id: Uuid, patch: &EmailPatch) -> Result<bool> {
        if patch.is_empty() {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM emails WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
            return Ok(n > 0);
        }
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE emails SET ");
        let mut sets = qb.separated(", ");
        if let Some(read) = patch.is_read {
            sets.push("is_read = ").push_bind_unseparated(read);
        }
        if let Some(starred) = patch.is_starred {
            sets.push("is_starred = ").push_bind_unseparated(starred);
        }
        if let Some(folder) = &patch.folder {
            sets.push("folder = ").push_bind_unseparated(folder.clone());
        }
        qb.push(" WHERE id = ").push_bind(id);
        let res = qb.build().execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn stats(&self) -> Result<MailStats> {
        let stats = sqlx::query_as::<_, MailStats>(
            "SELECT COUNT(*) AS total_emails, COUNT(DISTINCT to_email) AS unique_addresses, COUNT(DISTINCT from_email) AS unique_senders FROM emails",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    /// Number of rows stored under one idempotency key.
    pub async fn count_for(&self, message_id: &str, to_email: &str) -> Result<i64> {
        let (n,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM emails WHERE message_id = ? AND to_email = ?")
                .bind(message_id)
                .bind(normalize_address(to_email))
                .fetch_one(&self.pool)
                .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, models::attachment::attachment_meta::AttachmentMeta};
    use chrono::Duration;

    async fn store() -> Mailstore {
        Mailstore::new(db::connect("sqlite::memory:").await.unwrap())
    }

    fn email(message_id: &str, to: &str) -> NewEmail {
        NewEmail {
            message_id: message_id.to_string(),
            from_name: "Sender".into(),
            from_email: "sender@example.test".into(),
            to_email: to.to_string(),
            subject: "Hello".into(),
            body_text: "body".into(),
            body_html: "<p>body</p>".into(),
            attachments: vec![AttachmentMeta {
                filename: Some("a.txt".into()),
                content_type: "text/plain".into(),
                size: 3,
            }],
        }
    }

    #[tokio::test]
    async fn insert_is_idempotent_per_recipient() {
        let s = store().await;
        assert!(s.insert(&email("<m1@x>", "a@mail.test")).await.unwrap());
        assert!(!s.insert(&email("<m1@x>", "a@mail.test")).await.unwrap());
        assert!(!s.insert(&email("<m1@x>", "A@Mail.Test")).await.unwrap());
        assert!(s.insert(&email("<m1@x>", "b@mail.test")).await.unwrap());
        assert_eq!(s.count_for("<m1@x>", "a@mail.test").await.unwrap(), 1);
        assert_eq!(s.count_for("<m1@x>", "b@mail.test").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_is_scoped_and_newest_first() {
        let s = store().await;
        let now = Utc::now().timestamp_millis();
        s.insert_received_at(&email("<old@x>", "a@mail.test"), now - 5_000)
            .await
            .unwrap();
        s.insert_received_at(&email("<new@x>", "a@mail.test"), now)
            .await
            .unwrap();
        s.insert(&email("<other@x>", "b@mail.test")).await.unwrap();

        let list = s.list_by_recipient("A@mail.test", 50).await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].received_at > list[1].received_at);
        assert!(list[0].has_attachments);

        let limited = s.list_by_recipient("a@mail.test", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn get_by_id_marks_read_once() {
        let s = store().await;
        s.insert(&email("<m@x>", "a@mail.test")).await.unwrap();
        let id = s.list_by_recipient("a@mail.test", 1).await.unwrap()[0].id;
        assert!(!s.list_by_recipient("a@mail.test", 1).await.unwrap()[0].is_read);

        let first = s.get_by_id(id).await.unwrap().unwrap();
        assert!(first.is_read);
        assert_eq!(first.attachments.len(), 1);
        assert_eq!(first.attachments[0].filename.as_deref(), Some("a.txt"));

        let second = s.get_by_id(id).await.unwrap().unwrap();
        assert!(second.is_read);
        assert_eq!(second.received_at, first.received_at);

        assert!(s.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fan_out_rows_delete_independently() {
        let s = store().await;
        s.insert(&email("<m@x>", "a@mail.test")).await.unwrap();
        s.insert(&email("<m@x>", "b@mail.test")).await.unwrap();
        let id = s.list_by_recipient("a@mail.test", 1).await.unwrap()[0].id;

        assert!(s.delete_by_id(id).await.unwrap());
        assert!(!s.delete_by_id(id).await.unwrap());
        assert_eq!(s.count_for("<m@x>", "a@mail.test").await.unwrap(), 0);
        assert_eq!(s.count_for("<m@x>", "b@mail.test").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_older_than_respects_cutoff() {
        let s = store().await;
        let now = Utc::now();
        for (mid, age) in [("<d10@x>", 10), ("<d8@x>", 8), ("<d1@x>", 1)] {
            let at = (now - Duration::days(age)).timestamp_millis();
            s.insert_received_at(&email(mid, "a@mail.test"), at)
                .await
                .unwrap();
        }
        let cutoff = now - Duration::days(7);
        assert_eq!(s.delete_older_than(cutoff).await.unwrap(), 2);
        let left = s.list_by_recipient("a@mail.test", 50).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(s.count_for("<d1@x>", "a@mail.test").await.unwrap(), 1);

        // a row exactly at the cutoff is kept
        s.insert_received_at(&email("<edge@x>", "a@mail.test"), cutoff.timestamp_millis())
            .await
            .unwrap();
        assert_eq!(s.delete_older_than(cutoff).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_and_stats() {
        let s = store().await;
        s.insert(&email("<m@x>", "a@mail.test")).await.unwrap();
        s.insert(&email("<n@x>", "b@mail.test")).await.unwrap();
        let id = s.list_by_recipient("a@mail.test", 1).await.unwrap()[0].id;

        let patch = EmailPatch {
            is_starred: Some(true),
            folder: Some("archive".into()),
            ..Default::default()
        };
        assert!(s.update(id, &patch).await.unwrap());
        assert!(!s.update(Uuid::new_v4(), &patch).await.unwrap());
        let row = s.list_by_recipient("a@mail.test", 1).await.unwrap().remove(0);
        assert!(row.is_starred);
        assert_eq!(row.folder, "archive");
        assert!(!row.is_read);

        let stats = s.stats().await.unwrap();
        assert_eq!(stats.total_emails, 2);
        assert_eq!(stats.unique_addresses, 2);
        assert_eq!(stats.unique_senders, 1);
    }

    #[test]
    fn stamps_never_go_backwards() {
        let a = stamp_now();
        let b = stamp_now();
        assert!(b >= a);
    }
}
