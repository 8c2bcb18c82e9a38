use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dts_adapters::SaveState;
use dts_model::{DtsError, Result, Transfer, TransferId};

/// Everything the dispatcher needs to resume exactly where it left off: the
/// live transfer map plus every adapter's own checkpoint, keyed by name.
/// Serialized with `serde_json`: `Transfer.instructions` is an opaque
/// `serde_json::Value` and `Descriptor` uses untagged/flattened variants,
/// both of which need a self-describing format rather than `bincode`.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub transfers: HashMap<TransferId, Transfer>,
    pub repository_states: HashMap<String, SaveState>,
    pub endpoint_states: HashMap<String, SaveState>,
}

/// The snapshot file path for a service instance: `dts-<name>.snapshot`, or
/// `dts.snapshot` for an unnamed instance.
pub fn path(data_dir: &Path, service_name: &str) -> PathBuf {
    let file_name = if service_name.is_empty() {
        "dts.snapshot".to_string()
    } else {
        format!("dts-{service_name}.snapshot")
    };
    data_dir.join(file_name)
}

/// Loads the snapshot at `path`, or `None` if no snapshot has ever been
/// written (a fresh service instance).
pub async fn load(path: &Path) -> Result<Option<Snapshot>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let snapshot = serde_json::from_slice(&bytes)
                .map_err(|e| DtsError::Other(anyhow::anyhow!("corrupt snapshot {path:?}: {e}")))?;
            Ok(Some(snapshot))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DtsError::Other(e.into())),
    }
}

/// Writes `snapshot` to `path` atomically: serialize to a sibling temp file,
/// then rename over the destination, so a crash mid-write never leaves a
/// half-written snapshot behind.
pub async fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let bytes = serde_json::to_vec(snapshot)
        .map_err(|e| DtsError::Other(anyhow::anyhow!("failed to encode snapshot: {e}")))?;
    let tmp = path.with_extension("snapshot.tmp");
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DtsError::Other(e.into()))?;
    }
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| DtsError::Other(e.into()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| DtsError::Other(e.into()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dts_model::User;

    #[test]
    fn path_falls_back_to_unnamed_file() {
        let dir = Path::new("/var/lib/dts");
        assert_eq!(path(dir, ""), dir.join("dts.snapshot"));
        assert_eq!(path(dir, "prod"), dir.join("dts-prod.snapshot"));
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dts.snapshot");

        let user = User {
            name: "Ada".to_string(),
            email: "ada@example.org".to_string(),
            orcid: "0000-0001-2345-6789".into(),
            organization: "example".to_string(),
            is_super: false,
        };
        let transfer = Transfer::new(
            TransferId::new(),
            user,
            "jdp".to_string(),
            dts_model::Destination::Named("kbase".to_string()),
            vec!["1".to_string()],
            String::new(),
            serde_json::json!({}),
            chrono::Utc::now(),
        );
        let mut snapshot = Snapshot::default();
        snapshot.transfers.insert(transfer.id, transfer);
        snapshot
            .repository_states
            .insert("jdp".to_string(), vec![1, 2, 3]);

        assert!(load(&file).await.unwrap().is_none());
        save(&file, &snapshot).await.unwrap();
        let restored = load(&file).await.unwrap().unwrap();
        assert_eq!(restored.transfers.len(), 1);
        assert_eq!(restored.repository_states["jdp"], vec![1, 2, 3]);
    }
}
