use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dts_model::{Descriptor, DtsError, Result, Status, StatusCode};

use crate::endpoint::{EndpointAdapter, FileTransfer};

/// A transfer this endpoint is driving or has driven, tracked purely
/// in-memory: local transfers complete synchronously, so there's nothing to
/// poll, but `status` must still answer truthfully for transfer IDs that
/// were actually issued.
struct LocalTransfer {
    status: Status,
}

/// An endpoint backed by the local filesystem. Every DTS instance has
/// exactly one of these, configured as the `endpoint` service option, and
/// uses it to deliver manifests: `transfer` performs a plain file copy
/// rather than invoking a bulk mover.
pub struct LocalEndpointAdapter {
    name: String,
    root: PathBuf,
    transfers: Mutex<HashMap<String, LocalTransfer>>,
}

impl LocalEndpointAdapter {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            transfers: Mutex::new(HashMap::new()),
        }
    }

    /// Verifies `root` is writable and readable by writing a probe file,
    /// reading it back, and removing it, per the startup check the design
    /// requires of data and manifest directories.
    pub async fn verify_writable(&self) -> Result<()> {
        let probe = self.root.join(format!(".dts-probe-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| DtsError::Other(e.into()))?;
        tokio::fs::write(&probe, b"probe")
            .await
            .map_err(|e| DtsError::Other(e.into()))?;
        let read_back = tokio::fs::read(&probe)
            .await
            .map_err(|e| DtsError::Other(e.into()))?;
        tokio::fs::remove_file(&probe)
            .await
            .map_err(|e| DtsError::Other(e.into()))?;
        if read_back != b"probe" {
            return Err(DtsError::Other(anyhow::anyhow!(
                "probe readback mismatch for {:?}",
                self.root
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EndpointAdapter for LocalEndpointAdapter {
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

    async fn transfer(
        &self,
        destination_endpoint: &str,
        file_transfers: &[FileTransfer],
    ) -> Result<String> {
        debug_assert_eq!(
            destination_endpoint, self.name,
            "local adapter only moves files onto itself"
        );
        let transfer_id = uuid::Uuid::new_v4().to_string();
        for ft in file_transfers {
            let src = self.root.join(&ft.source_path);
            let dst = self.root.join(&ft.destination_path);
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
        self.transfers
            .lock()
            .unwrap()
            .insert(transfer_id.clone(), LocalTransfer { status });
        Ok(transfer_id)
    }

    async fn status(&self, transfer_id: &str) -> Result<Status> {
        self.transfers
            .lock()
            .unwrap()
            .get(transfer_id)
            .map(|t| t.status.clone())
            .ok_or_else(|| DtsError::ResourceNotFound(transfer_id.to_string()))
    }

    async fn cancel(&self, transfer_id: &str) -> Result<()> {
        // Local transfers complete synchronously inside `transfer`, so by
        // the time a caller could cancel there's nothing in flight to stop.
        if let Some(t) = self.transfers.lock().unwrap().get_mut(transfer_id) {
            if !t.status.code.is_terminal() {
                t.status.code = StatusCode::Failed;
                t.status.message = Some("canceled".to_string());
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transfer_copies_files_and_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        tokio::fs::write(root.join("a.txt"), b"hello").await.unwrap();

        let endpoint = LocalEndpointAdapter::new("local", root);
        endpoint.verify_writable().await.unwrap();

        let ft = FileTransfer {
            source_path: "a.txt".to_string(),
            destination_path: "user/dts-1/a.txt".to_string(),
            hash: dts_model::Hash("abc".to_string()),
        };
        let id = endpoint.transfer("local", &[ft]).await.unwrap();
        let status = endpoint.status(&id).await.unwrap();
        assert_eq!(status.code, StatusCode::Succeeded);
        assert_eq!(status.num_files_transferred, 1);
        assert!(root.join("user/dts-1/a.txt").exists());
    }

    #[tokio::test]
    async fn status_on_unknown_transfer_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = LocalEndpointAdapter::new("local", dir.path());
        let err = endpoint.status("nope").await.unwrap_err();
        assert!(matches!(err, DtsError::ResourceNotFound(_)));
    }
}
