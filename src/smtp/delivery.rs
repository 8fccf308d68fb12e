//! Parse-once, store-per-recipient fan-out of a completed transaction.

use crate::{
    models::email::new_email::NewEmail,
    parser::{self, ParseError},
    store::Mailstore,
};
use tracing::{error, info, warn};

#[derive(Debug)]
pub enum DeliveryOutcome {
    /// At least one recipient row is durable (newly stored or already present).
    Accepted {
        message_id: String,
        stored: usize,
        duplicates: usize,
        failed: usize,
    },
    /// The payload could not be parsed; nothing was stored.
    Rejected(ParseError),
    /// Every insert failed; the peer should retry.
    StorageFailed { failed: usize },
}

/// Parse `raw` once and store one row per accepted recipient.
///
/// A failed insert does not stop the remaining recipients, and rows already
/// stored are kept even if later ones fail.
pub async fn deliver(
    store: &Mailstore,
    raw: &[u8],
    mail_from: &str,
    recipients: &[String],
) -> DeliveryOutcome {
    let parsed = match parser::parse(raw) {
        Ok(p) => p,
        Err(e) => {
            warn!(
                from = %mail_from,
                to = %recipients.join(", "),
                size = raw.len(),
                "rejecting unparseable message: {e}"
            );
            return DeliveryOutcome::Rejected(e);
        }
    };
    let message_id = parsed
        .message_id
        .clone()
        .unwrap_or_else(parser::synthetic_message_id);

    let mut stored = 0;
    let mut duplicates = 0;
    let mut failed = 0;
    for rcpt in recipients {
        let email = NewEmail::for_recipient(&parsed, &message_id, rcpt);
        match store.insert(&email).await {
            Ok(true) => stored += 1,
            Ok(false) => duplicates += 1,
            Err(e) => {
                failed += 1;
                error!(message_id = %message_id, to = %rcpt, "store failed: {e}");
            }
        }
    }

    if stored + duplicates == 0 && failed > 0 {
        return DeliveryOutcome::StorageFailed { failed };
    }
    info!(
        message_id = %message_id,
        from = %parsed.from_address,
        to = %recipients.join(", "),
        stored,
        duplicates,
        failed,
        "email received"
    );
    DeliveryOutcome::Accepted {
        message_id,
        stored,
        duplicates,
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn store() -> Mailstore {
        Mailstore::new(db::connect("sqlite::memory:").await.unwrap())
    }

    const RAW: &[u8] =
        b"Message-ID: <fan@out>\r\nFrom: a@sender.test\r\nSubject: hi\r\n\r\nbody\r\n";

    #[tokio::test]
    async fn fans_out_one_row_per_recipient() {
        let s = store().await;
        let rcpts = vec!["a@mail.test".to_string(), "b@mail.test".to_string()];
        let out = deliver(&s, RAW, "a@sender.test", &rcpts).await;
        match out {
            DeliveryOutcome::Accepted {
                message_id,
                stored,
                duplicates,
                failed,
            } => {
                assert_eq!(message_id, "<fan@out>");
                assert_eq!((stored, duplicates, failed), (2, 0, 0));
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let again = deliver(&s, RAW, "a@sender.test", &rcpts[..1]).await;
        assert!(matches!(
            again,
            DeliveryOutcome::Accepted {
                stored: 0,
                duplicates: 1,
                ..
            }
        ));
        assert_eq!(s.count_for("<fan@out>", "a@mail.test").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_message_id_shares_one_synthetic_id() {
        let s = store().await;
        let rcpts = vec!["a@mail.test".to_string(), "b@mail.test".to_string()];
        let out = deliver(&s, b"Subject: no id\r\n\r\nx\r\n", "", &rcpts).await;
        let DeliveryOutcome::Accepted { message_id, .. } = out else {
            panic!("expected acceptance");
        };
        assert!(!message_id.is_empty());
        assert_eq!(s.count_for(&message_id, "a@mail.test").await.unwrap(), 1);
        assert_eq!(s.count_for(&message_id, "b@mail.test").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn parse_failure_stores_nothing() {
        let s = store().await;
        let out = deliver(&s, b"\r\n", "x@y.test", &["a@mail.test".to_string()]).await;
        assert!(matches!(out, DeliveryOutcome::Rejected(ParseError::Empty)));
        assert_eq!(s.stats().await.unwrap().total_emails, 0);
    }

    #[tokio::test]
    async fn storage_failure_on_every_recipient_is_reported() {
        let s = store().await;
        s.pool().close().await;
        let out = deliver(&s, RAW, "a@sender.test", &["a@mail.test".to_string()]).await;
        assert!(matches!(out, DeliveryOutcome::StorageFailed { failed: 1 }));
    }

    #[tokio::test]
    async fn partial_failure_keeps_stored_rows() {
        let s = store().await;
        sqlx::query(
            "CREATE TRIGGER reject_b BEFORE INSERT ON emails \
             WHEN NEW.to_email = 'b@mail.test' \
             BEGIN SELECT RAISE(ABORT, 'mailbox unavailable'); END",
        )
        .execute(s.pool())
        .await
        .unwrap();

        let rcpts: Vec<String> = ["a@mail.test", "b@mail.test", "c@mail.test"]
            .iter()
            .map(|r| r.to_string())
            .collect();
        let out = deliver(&s, RAW, "a@sender.test", &rcpts).await;
        assert!(matches!(
            out,
            DeliveryOutcome::Accepted {
                stored: 2,
                duplicates: 0,
                failed: 1,
                ..
            }
        ));
        assert_eq!(s.count_for("<fan@out>", "a@mail.test").await.unwrap(), 1);
        assert_eq!(s.count_for("<fan@out>", "b@mail.test").await.unwrap(), 0);
        assert_eq!(s.count_for("<fan@out>", "c@mail.test").await.unwrap(), 1);
    }
}
