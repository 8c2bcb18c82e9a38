//! Minimal adapter fixtures for dispatcher/task integration tests. Not a
//! realistic repository or endpoint implementation on its own; see
//! `dts_adapters::local`/`dts_adapters::globus` for those.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dts_adapters::{EndpointAdapter, FileTransfer, RepositoryAdapter, SaveState};
use dts_model::{Descriptor, DtsError, Hash, Orcid, Payload, Result, Status, StatusCode};

pub(crate) struct FixtureRepository {
    name: String,
    endpoints: Vec<String>,
}

impl FixtureRepository {
    pub fn new(name: impl Into<String>, endpoints: Vec<String>) -> Self {
        Self {
            name: name.into(),
            endpoints,
        }
    }
}

#[async_trait::async_trait]
impl RepositoryAdapter for FixtureRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoints(&self) -> Vec<String> {
        self.endpoints.clone()
    }

    async fn search(&self, _orcid: &Orcid, _params: &HashMap<String, String>) -> Result<Vec<Descriptor>> {
        Ok(vec![])
    }

    async fn descriptors(&self, _orcid: &Orcid, file_ids: &[String]) -> Result<Vec<Descriptor>> {
        Ok(file_ids
            .iter()
            .map(|id| Descriptor {
                id: id.clone(),
                name: format!("{id}.txt"),
                payload: Payload::Path {
                    path: format!("{id}.txt"),
                },
                bytes: 4,
                hash: Hash("abc".to_string()),
                endpoint: String::new(),
                extra: Default::default(),
            })
            .collect())
    }

    async fn stage_files(&self, _orcid: &Orcid, _file_ids: &[String]) -> Result<uuid::Uuid> {
        Ok(uuid::Uuid::new_v4())
    }

    async fn staging_status(&self, _staging_id: uuid::Uuid) -> Result<StatusCode> {
        Ok(StatusCode::Succeeded)
    }

    async fn finalize(&self, _orcid: &Orcid, _transfer_id: uuid::Uuid) -> Result<()> {
        Ok(())
    }

    async fn local_user(&self, _orcid: &Orcid) -> Result<String> {
        Ok("localuser".to_string())
    }

    async fn save(&self) -> Result<SaveState> {
        Ok(vec![])
    }

    async fn load(&self, _state: &SaveState) -> Result<()> {
        Ok(())
    }
}

/// A fixture endpoint that copies files from its own `root` into a
/// (possibly distinct) `destination_root`, standing in for what a real bulk
/// mover does between two separately administered collections.
pub(crate) struct FixtureEndpoint {
    name: String,
    root: PathBuf,
    destination_root: PathBuf,
    transfers: Mutex<HashMap<String, Status>>,
}

impl FixtureEndpoint {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, destination_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            destination_root: destination_root.into(),
            transfers: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl EndpointAdapter for FixtureEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn files_staged(&self, descriptors: &[Descriptor]) -> Result<bool> {
        for d in descriptors {
            let Some(path) = d.payload.as_path() else {
                continue;
            };
            if !self.root.join(path).exists() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn transfer(&self, _destination_endpoint: &str, file_transfers: &[FileTransfer]) -> Result<String> {
        let transfer_id = uuid::Uuid::new_v4().to_string();
        for ft in file_transfers {
            let src = self.root.join(&ft.source_path);
            let dst = self.destination_root.join(&ft.destination_path);
            if let Some(parent) = dst.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DtsError::Other(e.into()))?;
            }
            tokio::fs::copy(&src, &dst)
                .await
                .map_err(|e| DtsError::ResourceNotFound(format!("{}: {e}", src.display())))?;
        }
        let mut status = Status::new(StatusCode::Succeeded);
        status.num_files = file_transfers.len() as u64;
        status.num_files_transferred = file_transfers.len() as u64;
        self.transfers.lock().unwrap().insert(transfer_id.clone(), status);
        Ok(transfer_id)
    }

    async fn status(&self, transfer_id: &str) -> Result<Status> {
        self.transfers
            .lock()
            .unwrap()
            .get(transfer_id)
            .cloned()
            .ok_or_else(|| DtsError::ResourceNotFound(transfer_id.to_string()))
    }

    async fn cancel(&self, transfer_id: &str) -> Result<()> {
        if let Some(t) = self.transfers.lock().unwrap().get_mut(transfer_id) {
            if !t.code.is_terminal() {
                t.code = StatusCode::Failed;
                t.message = Some("canceled".to_string());
            }
        }
        Ok(())
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn transfers(&self) -> Result<Vec<String>> {
        Ok(self.transfers.lock().unwrap().keys().cloned().collect())
    }
}
