use std::path::Path;

use chrono::{DateTime, Utc};
use dts_adapters::{
    fill_in_single_endpoint, EndpointAdapter, EndpointRegistry, FileTransfer, ProviderRegistry,
    RepositoryAdapter, RepositoryRegistry,
};
use dts_model::{Destination, DtsError, Manifest, Result, Status, StatusCode, Transfer};
use md5::{Digest, Md5};

use crate::subtask::{self, SubtaskContext};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Everything a tick needs to drive one transfer: the shared registries and
/// the handful of service options that bear on task logic (the local
/// endpoint's name and the manifest directory and payload ceiling).
pub struct TaskContext<'a> {
    pub repositories: &'a RepositoryRegistry,
    pub endpoints: &'a EndpointRegistry,
    pub providers: &'a ProviderRegistry,
    pub local_endpoint_name: &'a str,
    pub manifest_dir: &'a Path,
    pub max_payload_gb: f64,
}

impl TaskContext<'_> {
    /// Resolves a destination to the name by which its endpoint is reachable:
    /// a registered endpoint name for a named repository, or the raw
    /// endpoint UUID for a custom spec (the provider adapter is constructed
    /// ad hoc by `ProviderRegistry` and never registered under a name).
    async fn destination_endpoint_name(&self, destination: &Destination) -> Result<String> {
        match destination {
            Destination::Named(name) => {
                let repo = self.repositories.open(name).await?;
                let endpoint = repo.endpoints().into_iter().next().ok_or_else(|| {
                    DtsError::InvalidEndpoint(format!(
                        "destination {name:?} has no configured endpoints"
                    ))
                })?;
                if !self.endpoints.contains(&endpoint) {
                    return Err(DtsError::InvalidEndpoint(format!(
                        "destination {name:?}'s endpoint {endpoint:?} is not registered"
                    )));
                }
                Ok(endpoint)
            }
            Destination::Custom(custom) => {
                if !self.providers.contains(&custom.provider) {
                    return Err(DtsError::InvalidEndpoint(format!(
                        "unknown provider scheme {:?}",
                        custom.provider
                    )));
                }
                Ok(custom.endpoint_id.to_string())
            }
        }
    }
}

fn destination_label(destination: &Destination) -> String {
    match destination {
        Destination::Named(name) => name.clone(),
        Destination::Custom(custom) => custom.to_string(),
    }
}

/// `true` for errors that represent a transient adapter hiccup rather than a
/// definitive failure: these are logged and retried on a later tick rather
/// than ever flipping a transfer to `failed`.
pub(crate) fn is_transient(err: &DtsError) -> bool {
    matches!(err, DtsError::Unavailable(_))
}

/// Resolves the destination-side username and the folder files land in.
/// `localUser` is only ever called for a named destination (open question in
/// the design notes); a custom destination gets no username and no prefix.
async fn destination_folder(
    transfer: &Transfer,
    ctx: &TaskContext<'_>,
) -> Result<(Option<String>, String)> {
    match &transfer.destination {
        Destination::Named(name) => {
            let repo = ctx.repositories.open(name).await?;
            let username = repo.local_user(&transfer.user.orcid).await?;
            let folder = format!("{username}/dts-{}", transfer.id);
            Ok((Some(username), folder))
        }
        Destination::Custom(_) => Ok((None, format!("dts-{}", transfer.id))),
    }
}

/// Transition 1: Create -> Start. Called once, the first time a transfer is
/// ticked. Errors here are not caught by the caller the way `tick`'s are;
/// the dispatcher uses them directly to decide whether transfer creation
/// itself should be rejected (see dispatcher::create).
pub async fn start(transfer: &mut Transfer, ctx: &TaskContext<'_>) -> Result<()> {
    debug_assert!(transfer.subtasks.is_empty());

    let source_repo = ctx.repositories.open(&transfer.source).await?;
    let descriptors = source_repo
        .descriptors(&transfer.user.orcid, &transfer.file_ids)
        .await?;
    if descriptors.len() != transfer.file_ids.len() {
        return Err(DtsError::ResourceNotFound(format!(
            "source {:?} returned {} descriptors for {} requested file ids",
            transfer.source,
            descriptors.len(),
            transfer.file_ids.len()
        )));
    }

    let (data_descriptors, file_descriptors): (Vec<_>, Vec<_>) =
        descriptors.into_iter().partition(|d| d.is_inline_data());
    let file_descriptors = fill_in_single_endpoint(source_repo.as_ref(), file_descriptors)?;

    let payload_bytes: u64 = file_descriptors.iter().map(|d| d.bytes).sum();
    let payload_gb = payload_bytes as f64 / BYTES_PER_GB;
    if payload_gb > ctx.max_payload_gb {
        return Err(DtsError::PayloadTooLarge {
            actual_gb: payload_gb,
            max_gb: ctx.max_payload_gb,
        });
    }

    let destination_endpoint_name = ctx.destination_endpoint_name(&transfer.destination).await?;
    let (username, folder) = destination_folder(transfer, ctx).await?;

    transfer.data_descriptors = data_descriptors;
    transfer.payload_size_gb = payload_gb;
    transfer.username = username;
    transfer.destination_folder = folder;

    transfer.subtasks = subtask::partition_by_endpoint(
        &transfer.source,
        &destination_label(&transfer.destination),
        &destination_endpoint_name,
        &transfer.destination_folder,
        file_descriptors,
    );

    for sub in transfer.subtasks.iter_mut() {
        let source_endpoint = ctx.endpoints.open(&sub.source_endpoint).await?;
        let sctx = SubtaskContext {
            orcid: &transfer.user.orcid,
            source_repository: source_repo.as_ref(),
            source_endpoint: source_endpoint.as_ref(),
        };
        subtask::start(sub, &sctx).await?;
    }

    transfer.status = Status::new(StatusCode::Staging);
    Ok(())
}

/// Transition 2: the canceled path. Re-drives cancellation of every subtask
/// that hasn't terminated yet; once all have, stamps `completionTime`.
async fn advance_canceled(transfer: &mut Transfer, ctx: &TaskContext<'_>, now: DateTime<Utc>) -> Result<()> {
    let source_repo = ctx.repositories.open(&transfer.source).await?;
    for sub in transfer.subtasks.iter_mut() {
        if subtask::is_terminal(sub) {
            continue;
        }
        let source_endpoint = ctx.endpoints.open(&sub.source_endpoint).await?;
        let sctx = SubtaskContext {
            orcid: &transfer.user.orcid,
            source_repository: source_repo.as_ref(),
            source_endpoint: source_endpoint.as_ref(),
        };
        subtask::cancel(sub, &sctx).await?;
    }

    if transfer.subtasks.iter().all(subtask::is_terminal) {
        if transfer.status.message.is_none() {
            transfer.status = Status::new(StatusCode::Failed).with_message("canceled by request");
        } else {
            transfer.status.code = StatusCode::Failed;
        }
        transfer.completion_time = Some(now);
    }
    Ok(())
}

/// Transition 3: poll the manifest transfer. On a terminal result, delete
/// the local manifest file, adopt its status as the task's own, stamp
/// `completionTime`, and run the destination's `finalize` hook.
async fn advance_manifest(
    transfer: &mut Transfer,
    ctx: &TaskContext<'_>,
    now: DateTime<Utc>,
    manifest_transfer_id: &str,
) -> Result<()> {
    let local = ctx.endpoints.open(ctx.local_endpoint_name).await?;
    let status = local.status(manifest_transfer_id).await?;
    if !status.code.is_terminal() {
        return Ok(());
    }

    if let Some(path) = transfer.manifest_file_path.take() {
        if let Err(err) = tokio::fs::remove_file(&path).await {
            tracing::warn!(transfer_id = %transfer.id, %path, %err, "failed to remove manifest file");
        }
    }
    // Adopt only the manifest transfer's terminal code/message: its own
    // `num_files*` counters describe a single-file handoff, not the
    // payload, so the totals already on `transfer.status` are left as-is.
    transfer.status.code = status.code;
    transfer.status.message = status.message.clone();
    transfer.completion_time = Some(now);

    if status.code == StatusCode::Succeeded {
        if let Destination::Named(name) = &transfer.destination {
            let dest_repo = ctx.repositories.open(name).await?;
            dest_repo
                .finalize(&transfer.user.orcid, transfer.id.0)
                .await?;
        }
    }
    Ok(())
}

/// Builds the manifest, writes it under `manifestDirectory`, and hands it to
/// the local endpoint to deliver to the destination.
async fn enter_manifest_phase(transfer: &mut Transfer, ctx: &TaskContext<'_>, now: DateTime<Utc>) -> Result<()> {
    let manifest = Manifest::build(transfer, now);
    let body = serde_json::to_vec_pretty(&manifest).map_err(|e| DtsError::Other(e.into()))?;

    tokio::fs::create_dir_all(ctx.manifest_dir)
        .await
        .map_err(|e| DtsError::Other(e.into()))?;
    let file_path = ctx.manifest_dir.join(format!("manifest-{}.json", transfer.id));
    tokio::fs::write(&file_path, &body)
        .await
        .map_err(|e| DtsError::Other(e.into()))?;

    let destination_endpoint_name = ctx.destination_endpoint_name(&transfer.destination).await?;
    let local = ctx.endpoints.open(ctx.local_endpoint_name).await?;

    let mut hasher = Md5::new();
    hasher.update(&body);
    let digest = hex::encode(hasher.finalize());

    // An absolute source path makes this robust to the local endpoint's own
    // root not being `manifestDirectory`: `PathBuf::join` discards its base
    // when the joined path is itself absolute.
    let file_transfer = FileTransfer {
        source_path: file_path.display().to_string(),
        destination_path: format!("{}/manifest.json", transfer.destination_folder),
        hash: dts_model::Hash(format!("md5:{digest}")),
    };
    let manifest_transfer_id = local
        .transfer(&destination_endpoint_name, std::slice::from_ref(&file_transfer))
        .await?;

    transfer.manifest_file_path = Some(file_path.display().to_string());
    transfer.manifest_transfer_id = Some(manifest_transfer_id);
    // The manifest transfer is a single-file handoff to the destination; its
    // own file counts aren't the payload's. Only the code moves to
    // `finalizing` here — `num_files`/`num_files_transferred`/
    // `num_files_skipped` keep the totals `advance_subtasks` just computed.
    transfer.status.code = StatusCode::Finalizing;
    transfer.status.message = None;
    Ok(())
}

/// Transition 4: the default subtask-driven advance.
async fn advance_subtasks(transfer: &mut Transfer, ctx: &TaskContext<'_>, now: DateTime<Utc>) -> Result<()> {
    let source_repo = ctx.repositories.open(&transfer.source).await?;
    let mut failure_kind = None;

    for sub in transfer.subtasks.iter_mut() {
        if subtask::is_terminal(sub) {
            continue;
        }
        let source_endpoint = ctx.endpoints.open(&sub.source_endpoint).await?;
        let sctx = SubtaskContext {
            orcid: &transfer.user.orcid,
            source_repository: source_repo.as_ref(),
            source_endpoint: source_endpoint.as_ref(),
        };
        let outcome = subtask::update(sub, &sctx).await?;
        if outcome.failed && failure_kind.is_none() {
            failure_kind = subtask::failure_kind(sub);
        }
    }

    if let Some(kind) = failure_kind {
        transfer.canceled = true;
        transfer.status =
            Status::new(StatusCode::Failed).with_message(format!("task canceled because of {kind} failure"));
        return Ok(());
    }

    let mut num_files = 0u64;
    let mut num_files_transferred = 0u64;
    let mut num_files_skipped = 0u64;
    for sub in &transfer.subtasks {
        num_files += sub.num_files().max(sub.transfer_status.num_files);
        num_files_transferred += sub.transfer_status.num_files_transferred;
        num_files_skipped += sub.transfer_status.num_files_skipped;
    }
    transfer.status.num_files = num_files;
    transfer.status.num_files_transferred = num_files_transferred;
    transfer.status.num_files_skipped = num_files_skipped;

    let all_succeeded =
        !transfer.subtasks.is_empty() && transfer.subtasks.iter().all(subtask::succeeded);
    if all_succeeded {
        return enter_manifest_phase(transfer, ctx, now).await;
    }

    let any_transfer_started = transfer
        .subtasks
        .iter()
        .any(|s| s.transfer_id.is_some() || s.transfer_status.code != StatusCode::Unknown);
    let any_staging = transfer.subtasks.iter().any(|s| s.staging_id.is_some());
    transfer.status.code = if any_staging && !any_transfer_started {
        StatusCode::Staging
    } else {
        StatusCode::Active
    };
    Ok(())
}

/// Advances `transfer` by exactly one tick. Never returns an error: adapter
/// failures are logged and, unless transient, flip the transfer to `failed`
/// (the dispatcher's own loop must never fail because a task did).
pub async fn tick(transfer: &mut Transfer, ctx: &TaskContext<'_>, now: DateTime<Utc>) {
    if transfer.is_terminal() {
        return;
    }

    let result = if transfer.canceled {
        advance_canceled(transfer, ctx, now).await
    } else if let Some(manifest_transfer_id) = transfer.manifest_transfer_id.clone() {
        advance_manifest(transfer, ctx, now, &manifest_transfer_id).await
    } else if !transfer.has_started() {
        start(transfer, ctx).await
    } else {
        advance_subtasks(transfer, ctx, now).await
    };

    if let Err(err) = result {
        if is_transient(&err) {
            tracing::warn!(transfer_id = %transfer.id, %err, "adapter temporarily unavailable; retrying next tick");
        } else {
            tracing::error!(transfer_id = %transfer.id, %err, "transfer failed");
            transfer.status = Status::new(StatusCode::Failed).with_message(err.to_string());
            transfer.completion_time = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_label_matches_spec_shapes() {
        assert_eq!(destination_label(&Destination::Named("jdp".to_string())), "jdp");
        let custom = Destination::parse("globus:4f8e9b2a-1111-4b2a-9c3d-000000000000:cred");
        assert_eq!(
            destination_label(&custom),
            "globus:4f8e9b2a-1111-4b2a-9c3d-000000000000:cred"
        );
    }

    #[test]
    fn transient_errors_are_only_unavailable() {
        assert!(is_transient(&DtsError::Unavailable("down".to_string())));
        assert!(!is_transient(&DtsError::NoFilesRequested));
        assert!(!is_transient(&DtsError::PayloadTooLarge {
            actual_gb: 2.0,
            max_gb: 1.0
        }));
    }
}
