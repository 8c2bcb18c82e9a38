use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dts_adapters::{EndpointAdapter, EndpointRegistry, ProviderRegistry, RepositoryAdapter, RepositoryRegistry};
use dts_journal::{Journal, JournalRecord, JournalStatus};
use dts_model::{Destination, DtsError, Result, Transfer, TransferId, User};
use tokio::sync::{mpsc, oneshot};

use crate::snapshot::{self, Snapshot};
use crate::task::{self, TaskContext};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Static configuration the dispatcher needs at startup; everything else
/// (adapters, the journal) is handed to it already constructed.
pub struct DispatcherConfig {
    pub service_name: String,
    pub poll_interval: Duration,
    pub delete_after: chrono::Duration,
    pub max_payload_gb: f64,
    pub local_endpoint_name: String,
    pub manifest_dir: PathBuf,
    pub snapshot_path: PathBuf,
}

struct CreateRequest {
    user: User,
    source: String,
    destination: Destination,
    file_ids: Vec<String>,
    description: String,
    instructions: serde_json::Value,
}

enum Command {
    Create(CreateRequest, oneshot::Sender<Result<TransferId>>),
    Status(TransferId, oneshot::Sender<Result<Transfer>>),
    Cancel(TransferId, oneshot::Sender<Result<()>>),
    Halt(oneshot::Sender<Result<()>>),
}

/// A handle to the dispatcher's own event loop. Every mutation of the
/// transfer map happens inside that loop (the single-writer model the
/// design requires); handles just send a command and await the reply.
#[derive(Clone)]
pub struct Dispatcher {
    commands: mpsc::Sender<Command>,
}

impl Dispatcher {
    /// Restores any prior snapshot, loads adapter save-states, and spawns
    /// the event loop: a `select!` between the periodic sweep and incoming
    /// commands, exactly one of which runs at a time.
    /// `repositories`/`endpoints`/`providers` are shared (`Arc`) rather than
    /// owned outright: the REST front door opens the same registries
    /// directly for search and catalog listing, so both it and the
    /// dispatcher's event loop need their own handle to the same cached
    /// singletons.
    pub async fn spawn(
        repositories: Arc<RepositoryRegistry>,
        endpoints: Arc<EndpointRegistry>,
        providers: Arc<ProviderRegistry>,
        journal: Journal,
        config: DispatcherConfig,
    ) -> Result<Self> {
        let restored = snapshot::load(&config.snapshot_path).await?;
        let mut transfers = HashMap::new();

        if let Some(snapshot) = restored {
            transfers = snapshot.transfers;
            for (name, state) in &snapshot.repository_states {
                if let Ok(adapter) = repositories.open(name).await {
                    adapter.load(state).await?;
                }
            }
            for (name, state) in &snapshot.endpoint_states {
                if let Ok(adapter) = endpoints.open(name).await {
                    adapter.load(state).await?;
                }
            }
            tracing::info!(
                transfers = transfers.len(),
                "restored dispatcher state from {:?}",
                config.snapshot_path
            );
        }

        let (tx, rx) = mpsc::channel(128);
        let state = State {
            transfers,
            repositories,
            endpoints,
            providers,
            journal,
            config,
        };
        tokio::spawn(run(state, rx));
        Ok(Self { commands: tx })
    }

    pub async fn create(
        &self,
        user: User,
        source: String,
        destination: Destination,
        file_ids: Vec<String>,
        description: String,
        instructions: serde_json::Value,
    ) -> Result<TransferId> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Create(
            CreateRequest {
                user,
                source,
                destination,
                file_ids,
                description,
                instructions,
            },
            tx,
        ))
        .await?;
        rx.await.map_err(|_| DtsError::NotOpen)?
    }

    pub async fn status(&self, id: TransferId) -> Result<Transfer> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Status(id, tx)).await?;
        rx.await.map_err(|_| DtsError::NotOpen)?
    }

    pub async fn cancel(&self, id: TransferId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Cancel(id, tx)).await?;
        rx.await.map_err(|_| DtsError::NotOpen)?
    }

    /// Stops the event loop after one final snapshot save. Idempotent only
    /// in the sense that a second call fails with `NotOpen`.
    pub async fn halt(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Halt(tx)).await?;
        rx.await.map_err(|_| DtsError::NotOpen)?
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DtsError::NotOpen)
    }
}

struct State {
    transfers: HashMap<TransferId, Transfer>,
    repositories: Arc<RepositoryRegistry>,
    endpoints: Arc<EndpointRegistry>,
    providers: Arc<ProviderRegistry>,
    journal: Journal,
    config: DispatcherConfig,
}

/// Builds a `TaskContext` from explicit field borrows rather than a `&self`
/// method, so the borrow checker sees it as holding onto only these four
/// fields and not all of `State` — callers still need to mutate
/// `self.transfers` while `ctx` is alive.
fn task_context<'a>(
    repositories: &'a RepositoryRegistry,
    endpoints: &'a EndpointRegistry,
    providers: &'a ProviderRegistry,
    config: &'a DispatcherConfig,
) -> TaskContext<'a> {
    TaskContext {
        repositories,
        endpoints,
        providers,
        local_endpoint_name: &config.local_endpoint_name,
        manifest_dir: &config.manifest_dir,
        max_payload_gb: config.max_payload_gb,
    }
}

impl State {
    async fn handle_create(&mut self, req: CreateRequest) -> Result<TransferId> {
        if req.file_ids.is_empty() {
            return Err(DtsError::NoFilesRequested);
        }
        // Unlike `GET /databases/{id}`, an unknown source or destination at
        // create time is a malformed request (spec §6: `POST /transfers`
        // returns `400` on unknown source/destination), not a 404 lookup
        // miss, so this reports `InvalidEndpoint` rather than
        // `DatabaseNotFound`.
        if !self.repositories.contains(&req.source) {
            return Err(DtsError::InvalidEndpoint(format!(
                "unknown source database {:?}",
                req.source
            )));
        }
        match &req.destination {
            Destination::Named(name) if !self.repositories.contains(name) => {
                return Err(DtsError::InvalidEndpoint(format!(
                    "unknown destination database {name:?}"
                )));
            }
            Destination::Custom(custom) if !self.providers.contains(&custom.provider) => {
                return Err(DtsError::InvalidEndpoint(format!(
                    "unknown provider scheme {:?}",
                    custom.provider
                )));
            }
            _ => {}
        }

        let id = TransferId::new();
        let mut transfer = Transfer::new(
            id,
            req.user,
            req.source,
            req.destination,
            req.file_ids,
            req.description,
            req.instructions,
            Utc::now(),
        );

        let ctx = task_context(
            &self.repositories,
            &self.endpoints,
            &self.providers,
            &self.config,
        );
        match task::start(&mut transfer, &ctx).await {
            Ok(()) => {
                self.transfers.insert(id, transfer);
                Ok(id)
            }
            Err(err) if task::is_transient(&err) => {
                tracing::warn!(transfer_id = %id, %err, "source temporarily unavailable at create time; will retry");
                self.transfers.insert(id, transfer);
                Ok(id)
            }
            Err(err) => Err(err),
        }
    }

    fn handle_status(&self, id: TransferId) -> Result<Transfer> {
        self.transfers
            .get(&id)
            .cloned()
            .ok_or(DtsError::TransferNotFound(id))
    }

    fn handle_cancel(&mut self, id: TransferId) -> Result<()> {
        let transfer = self
            .transfers
            .get_mut(&id)
            .ok_or(DtsError::TransferNotFound(id))?;
        transfer.canceled = true;
        Ok(())
    }

    /// One periodic sweep: tick every live transfer, journal and purge as
    /// appropriate. Transfers are processed independently; one adapter's
    /// trouble never stops another transfer's tick (`task::tick` itself
    /// never returns an error).
    async fn sweep(&mut self) {
        let ctx = task_context(
            &self.repositories,
            &self.endpoints,
            &self.providers,
            &self.config,
        );
        let now = Utc::now();

        for transfer in self.transfers.values_mut() {
            let was_terminal = transfer.is_terminal();
            task::tick(transfer, &ctx, now).await;
            if !was_terminal && transfer.is_terminal() && transfer.completion_time.is_none() {
                transfer.completion_time = Some(now);
            }
        }

        for transfer in self.transfers.values_mut() {
            if transfer.is_terminal() && transfer.completion_time.is_some() && !transfer.journaled {
                journal_one(&self.journal, transfer).await;
            }
        }

        self.transfers.retain(|_, transfer| {
            let Some(completion_time) = transfer.completion_time else {
                return true;
            };
            !(transfer.journaled && now - completion_time >= self.config.delete_after)
        });
    }

    async fn snapshot(&self) -> Result<()> {
        let mut repository_states = HashMap::new();
        for (name, adapter) in self.repositories.open_instances().await {
            repository_states.insert(name, adapter.save().await?);
        }
        let mut endpoint_states = HashMap::new();
        for (name, adapter) in self.endpoints.open_instances().await {
            endpoint_states.insert(name, adapter.save().await?);
        }
        let snapshot = Snapshot {
            transfers: self.transfers.clone(),
            repository_states,
            endpoint_states,
        };
        snapshot::save(&self.config.snapshot_path, &snapshot).await
    }
}

/// Records one terminal transfer's journal entry. Per the design, a journal
/// failure is logged but never fails the transfer itself; `journaled` is
/// only set on success, so a later sweep retries the write.
async fn journal_one(journal: &Journal, transfer: &mut Transfer) {
    let status = if transfer.canceled {
        JournalStatus::Canceled
    } else if transfer.status.code == dts_model::StatusCode::Succeeded {
        JournalStatus::Succeeded
    } else {
        JournalStatus::Failed
    };

    let manifest =
        dts_model::Manifest::build(transfer, transfer.completion_time.unwrap_or_else(Utc::now));
    let record = JournalRecord {
        id: transfer.id,
        source: transfer.source.clone(),
        destination: match &transfer.destination {
            Destination::Named(name) => name.clone(),
            Destination::Custom(custom) => custom.to_string(),
        },
        orcid: transfer.user.orcid.to_string(),
        start_time: transfer.start_time,
        stop_time: transfer.completion_time.unwrap_or_else(Utc::now),
        status,
        payload_size_bytes: (transfer.payload_size_gb * BYTES_PER_GB) as u64,
        num_files: transfer.status.num_files,
        manifest: serde_json::to_value(&manifest).unwrap_or(serde_json::Value::Null),
    };

    match journal.record(record).await {
        Ok(()) => transfer.journaled = true,
        Err(err) => {
            tracing::error!(transfer_id = %transfer.id, %err, "failed to journal completed transfer; will retry");
        }
    }
}

async fn run(mut state: State, mut commands: mpsc::Receiver<Command>) {
    let mut ticker = tokio::time::interval(state.config.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                state.sweep().await;
                if let Err(err) = state.snapshot().await {
                    tracing::error!(%err, "failed to write dispatcher snapshot");
                }
            }
            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    Command::Create(req, reply) => {
                        let _ = reply.send(state.handle_create(req).await);
                    }
                    Command::Status(id, reply) => {
                        let _ = reply.send(state.handle_status(id));
                    }
                    Command::Cancel(id, reply) => {
                        let _ = reply.send(state.handle_cancel(id));
                    }
                    Command::Halt(reply) => {
                        let result = state.snapshot().await;
                        let _ = reply.send(result);
                        break;
                    }
                }
            }
        }
    }
    tracing::info!("dispatcher event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FixtureEndpoint, FixtureRepository};
    use dts_adapters::{EndpointAdapter, Registry};
    use std::sync::Arc;

    fn user() -> User {
        User {
            name: "Ada".to_string(),
            email: "ada@example.org".to_string(),
            orcid: "0000-0001-2345-6789".into(),
            organization: "example".to_string(),
            is_super: false,
        }
    }

    async fn make_dispatcher(dir: &std::path::Path) -> (Dispatcher, Arc<FixtureEndpoint>) {
        let mut repositories: RepositoryRegistry = Registry::new();
        let mut endpoints: EndpointRegistry = Registry::new();
        let providers = ProviderRegistry::new();
        let providers = Arc::new(providers);

        let source_root = dir.join("source");
        let local_root = dir.join("local");
        tokio::fs::create_dir_all(&source_root).await.unwrap();
        tokio::fs::write(source_root.join("1.txt"), b"1234").await.unwrap();

        // The source's own endpoint physically moves bytes into the
        // destination's root, standing in for what a real bulk mover would
        // do between two distinct collections.
        let source_endpoint = Arc::new(FixtureEndpoint::new("source-ep", &source_root, &local_root));
        endpoints
            .register("source-ep", {
                let endpoint = source_endpoint.clone();
                move || {
                    let endpoint = endpoint.clone();
                    async move { Ok(endpoint as Arc<dyn EndpointAdapter>) }
                }
            })
            .unwrap();

        let local_endpoint = Arc::new(FixtureEndpoint::new("local", &local_root, &local_root));
        endpoints
            .register("local", {
                let endpoint = local_endpoint.clone();
                move || {
                    let endpoint = endpoint.clone();
                    async move { Ok(endpoint as Arc<dyn EndpointAdapter>) }
                }
            })
            .unwrap();

        repositories
            .register("source-repo", || async {
                Ok(Arc::new(FixtureRepository::new(
                    "source-repo",
                    vec!["source-ep".to_string()],
                )) as Arc<dyn RepositoryAdapter>)
            })
            .unwrap();
        repositories
            .register("dest-repo", || async {
                Ok(Arc::new(FixtureRepository::new(
                    "dest-repo",
                    vec!["local".to_string()],
                )) as Arc<dyn RepositoryAdapter>)
            })
            .unwrap();

        let pool = dts_journal::open_in_memory().await.unwrap();
        let journal = Journal::spawn(pool);

        let config = DispatcherConfig {
            service_name: "test".to_string(),
            poll_interval: Duration::from_millis(20),
            delete_after: chrono::Duration::seconds(0),
            max_payload_gb: 1.0,
            local_endpoint_name: "local".to_string(),
            manifest_dir: dir.join("manifests"),
            snapshot_path: dir.join("dts-test.snapshot"),
        };

        let dispatcher = Dispatcher::spawn(
            Arc::new(repositories),
            Arc::new(endpoints),
            providers,
            journal,
            config,
        )
        .await
        .unwrap();
        (dispatcher, local_endpoint)
    }

    #[tokio::test]
    async fn rejects_empty_file_ids() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, _local) = make_dispatcher(dir.path()).await;
        let err = dispatcher
            .create(
                user(),
                "source-repo".to_string(),
                Destination::Named("dest-repo".to_string()),
                vec![],
                String::new(),
                serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DtsError::NoFilesRequested));
    }

    #[tokio::test]
    async fn happy_path_single_endpoint_eventually_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, local_endpoint) = make_dispatcher(dir.path()).await;

        let id = dispatcher
            .create(
                user(),
                "source-repo".to_string(),
                Destination::Named("dest-repo".to_string()),
                vec!["1".to_string()],
                "a test transfer".to_string(),
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let mut transfer = dispatcher.status(id).await.unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !transfer.is_terminal() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
            transfer = dispatcher.status(id).await.unwrap();
        }

        assert_eq!(transfer.status.code, dts_model::StatusCode::Succeeded);
        assert!(local_endpoint
            .root()
            .join("localuser")
            .join(format!("dts-{id}"))
            .join("1.txt")
            .exists());
    }
}
