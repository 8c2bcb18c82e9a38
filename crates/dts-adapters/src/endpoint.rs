use dts_model::{Descriptor, Result, Status, StatusCode};

use crate::repository::SaveState;

/// One file to move from a source path to a destination path on another
/// endpoint, with the hash the destination should verify against.
#[derive(Debug, Clone)]
pub struct FileTransfer {
    pub source_path: String,
    pub destination_path: String,
    pub hash: dts_model::Hash,
}

impl FileTransfer {
    pub fn for_descriptor(descriptor: &Descriptor, destination_folder: &str) -> Option<Self> {
        let source_path = descriptor.payload.as_path()?.to_string();
        let file_name = std::path::Path::new(&source_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| descriptor.name.clone());
        Some(Self {
            source_path,
            destination_path: format!("{destination_folder}/{file_name}"),
            hash: descriptor.hash.clone(),
        })
    }
}

/// The bulk-mover driver contract: query staged-ness, start a transfer,
/// poll it, and cancel it. Implementations wrap a concrete provider such as
/// Globus, or the local filesystem for manifest delivery.
#[async_trait::async_trait]
pub trait EndpointAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// True iff every listed file is present and valid on this endpoint
    /// right now.
    async fn files_staged(&self, descriptors: &[Descriptor]) -> Result<bool>;

    /// Starts a bulk move to `destination_endpoint` and returns a handle
    /// immediately; the move itself proceeds asynchronously.
    async fn transfer(
        &self,
        destination_endpoint: &str,
        file_transfers: &[FileTransfer],
    ) -> Result<String>;

    async fn status(&self, transfer_id: &str) -> Result<Status>;

    /// Best-effort abort; must be idempotent.
    async fn cancel(&self, transfer_id: &str) -> Result<()>;

    /// Local root, used only for locally generated files like manifests.
    fn root(&self) -> &std::path::Path;

    /// All live transfers owned by this endpoint (diagnostic only).
    async fn transfers(&self) -> Result<Vec<String>>;

    /// Opaque checkpoint state, persisted alongside the dispatcher's own
    /// snapshot. Neither the local nor the Globus adapter keeps anything
    /// worth restoring across a restart, so the default is a no-op; an
    /// adapter that does (a renewable token, an in-flight batch cursor)
    /// overrides both.
    async fn save(&self) -> Result<SaveState> {
        Ok(Vec::new())
    }

    async fn load(&self, _state: &SaveState) -> Result<()> {
        Ok(())
    }
}

pub fn code_from_str(s: &str) -> StatusCode {
    match s {
        "ACTIVE" => StatusCode::Active,
        "INACTIVE" => StatusCode::Inactive,
        "SUCCEEDED" => StatusCode::Succeeded,
        "FAILED" => StatusCode::Failed,
        "FINALIZING" => StatusCode::Finalizing,
        _ => StatusCode::Unknown,
    }
}
