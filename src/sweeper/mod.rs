//! Retention sweeper: periodic deletion of messages past the retention window.

use crate::{
    error::{Error, Result},
    store::Mailstore,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::{
    sync::watch,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy)]
pub struct SweepSettings {
    pub retention_days: i64,
    pub interval: Duration,
}

/// The instant `retention_days` before `now`.
fn cutoff_before(now: DateTime<Utc>, retention_days: i64) -> Result<DateTime<Utc>> {
    ChronoDuration::try_days(retention_days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or(Error::RetentionOutOfRange {
            days: retention_days,
        })
}

/// Delete everything received more than `retention_days` ago.
pub async fn sweep_once(store: &Mailstore, retention_days: i64) -> Result<u64> {
    let cutoff = cutoff_before(Utc::now(), retention_days)?;
    let deleted = store.delete_older_than(cutoff).await?;
    if deleted > 0 {
        info!(deleted, retention_days, "deleted expired emails");
    } else {
        debug!(retention_days, "retention sweep found nothing to delete");
    }
    Ok(deleted)
}

/// Sweep now, then on every tick until `shutdown` flips.
///
/// Ticks are awaited in sequence, so two sweeps never run at once; a slow
/// sweep delays the next tick instead of stacking up.
pub async fn run(store: Mailstore, settings: SweepSettings, mut shutdown: watch::Receiver<bool>) {
    info!(
        retention_days = settings.retention_days,
        interval_secs = settings.interval.as_secs(),
        "retention sweeper started"
    );
    let mut ticker = interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            // The first tick completes immediately: the startup sweep.
            _ = ticker.tick() => {
                if let Err(e) = sweep_once(&store, settings.retention_days).await {
                    error!("retention sweep failed: {e}");
                }
            }
            _ = shutdown.changed() => {
                info!("retention sweeper stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, models::email::new_email::NewEmail};

    fn email(message_id: &str) -> NewEmail {
        NewEmail {
            message_id: message_id.into(),
            from_name: String::new(),
            from_email: "s@example.test".into(),
            to_email: "a@mail.test".into(),
            subject: "x".into(),
            body_text: "x".into(),
            body_html: String::new(),
            attachments: Vec::new(),
        }
    }

    async fn seeded() -> Mailstore {
        let store = Mailstore::new(db::connect("sqlite::memory:").await.unwrap());
        let now = Utc::now();
        for (mid, days) in [("<10d@x>", 10), ("<8d@x>", 8), ("<1d@x>", 1)] {
            let at = (now - ChronoDuration::days(days)).timestamp_millis();
            store.insert_received_at(&email(mid), at).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn sweep_deletes_only_expired_rows() {
        let store = seeded().await;
        assert_eq!(sweep_once(&store, 7).await.unwrap(), 2);
        assert_eq!(store.count_for("<1d@x>", "a@mail.test").await.unwrap(), 1);
        assert_eq!(store.count_for("<8d@x>", "a@mail.test").await.unwrap(), 0);
        // idempotent
        assert_eq!(sweep_once(&store, 7).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_sweeps_at_startup_and_stops_on_shutdown() {
        let store = seeded().await;
        let (tx, rx) = watch::channel(false);
        let settings = SweepSettings {
            retention_days: 7,
            interval: Duration::from_secs(3600),
        };
        let task = tokio::spawn(run(store.clone(), settings, rx));

        let mut remaining = 3;
        for _ in 0..100 {
            remaining = store.stats().await.unwrap().total_emails;
            if remaining == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(remaining, 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_loop() {
        let store = seeded().await;
        store.pool().close().await;
        let (tx, rx) = watch::channel(false);
        let settings = SweepSettings {
            retention_days: 7,
            interval: Duration::from_millis(10),
        };
        let task = tokio::spawn(run(store.clone(), settings, rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn out_of_range_retention_is_an_error() {
        let store = seeded().await;
        let err = sweep_once(&store, 100_000_000).await.unwrap_err();
        assert!(matches!(
            err,
            Error::RetentionOutOfRange { days: 100_000_000 }
        ));
        assert!(sweep_once(&store, i64::MAX).await.is_err());
        assert_eq!(store.stats().await.unwrap().total_emails, 3);
    }

    #[tokio::test]
    async fn out_of_range_retention_does_not_stop_the_loop() {
        let store = seeded().await;
        let (tx, rx) = watch::channel(false);
        let settings = SweepSettings {
            retention_days: 100_000_000,
            interval: Duration::from_millis(10),
        };
        let task = tokio::spawn(run(store.clone(), settings, rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.stats().await.unwrap().total_emails, 3);
    }
}
