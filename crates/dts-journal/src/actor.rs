use dts_model::{DtsError, TransferId};
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};

use crate::record::JournalRecord;
use crate::store;

enum Command {
    Record(JournalRecord, oneshot::Sender<anyhow::Result<()>>),
    Lookup(
        TransferId,
        oneshot::Sender<anyhow::Result<Option<JournalRecord>>>,
    ),
}

/// A handle to the journal's own isolated execution context: a background
/// task that owns the sqlite pool exclusively, so a storage error there
/// can't take down the dispatcher. Cloning a handle is cheap; all clones
/// talk to the same background task.
#[derive(Clone)]
pub struct Journal {
    commands: mpsc::Sender<Command>,
}

impl Journal {
    /// Spawns the journal's background task against an already-open pool.
    pub fn spawn(pool: SqlitePool) -> Self {
        let (tx, mut rx) = mpsc::channel::<Command>(32);

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Record(record, reply) => {
                        let result = store::record(&pool, &record).await;
                        if let Err(err) = &result {
                            tracing::error!(transfer_id = %record.id, %err, "failed to append journal record");
                        }
                        let _ = reply.send(result);
                    }
                    Command::Lookup(id, reply) => {
                        let result = store::lookup(&pool, id).await;
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::warn!("journal actor stopped; no more senders remain");
        });

        Self { commands: tx }
    }

    /// Appends a single journal record. At most one row per transfer ID is
    /// ever written; a duplicate insert surfaces as an error but does not
    /// fail the transfer itself (callers should log-and-continue).
    pub async fn record(&self, record: JournalRecord) -> dts_model::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Record(record, tx))
            .await
            .map_err(|_| DtsError::NotOpen)?;
        rx.await
            .map_err(|_| DtsError::NotOpen)?
            .map_err(DtsError::Other)
    }

    pub async fn lookup(&self, id: TransferId) -> dts_model::Result<Option<JournalRecord>> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Lookup(id, tx))
            .await
            .map_err(|_| DtsError::NotOpen)?;
        rx.await
            .map_err(|_| DtsError::NotOpen)?
            .map_err(DtsError::Other)
    }

    /// True as long as the background task is still accepting commands.
    pub fn is_open(&self) -> bool {
        !self.commands.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::JournalStatus;
    use chrono::Utc;

    #[tokio::test]
    async fn round_trips_through_the_actor() {
        let pool = store::open_in_memory().await.unwrap();
        let journal = Journal::spawn(pool);
        assert!(journal.is_open());

        let id = TransferId::new();
        let record = JournalRecord {
            id,
            source: "jdp".to_string(),
            destination: "kbase".to_string(),
            orcid: "0000-0001-2345-6789".to_string(),
            start_time: Utc::now(),
            stop_time: Utc::now(),
            status: JournalStatus::Succeeded,
            payload_size_bytes: 4,
            num_files: 1,
            manifest: serde_json::json!({}),
        };
        journal.record(record).await.unwrap();

        let found = journal.lookup(id).await.unwrap().unwrap();
        assert_eq!(found.num_files, 1);

        assert!(journal.lookup(TransferId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reports_not_open_once_actor_is_dropped() {
        let pool = store::open_in_memory().await.unwrap();
        let journal = Journal::spawn(pool);
        drop(journal.commands.clone());
        // The background task only stops once every sender (including the
        // one retained by `journal` itself) is gone, so explicitly replace
        // it with a handle whose channel we've closed directly.
        let (tx, rx) = mpsc::channel::<Command>(1);
        drop(rx);
        let closed = Journal { commands: tx };
        assert!(!closed.is_open());
        assert!(matches!(
            closed.lookup(TransferId::new()).await,
            Err(DtsError::NotOpen)
        ));
    }
}
