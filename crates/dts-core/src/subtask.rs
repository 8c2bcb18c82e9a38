use std::sync::Arc;

use dts_adapters::{EndpointAdapter, FileTransfer, RepositoryAdapter};
use dts_model::{Orcid, Status, StatusCode, Subtask};

/// The adapters a subtask needs to drive itself: the source repository (for
/// staging) and the source endpoint (for transfer, status, and cancel). The
/// destination endpoint name travels with the subtask itself.
pub struct SubtaskContext<'a> {
    pub orcid: &'a Orcid,
    pub source_repository: &'a dyn RepositoryAdapter,
    pub source_endpoint: &'a dyn EndpointAdapter,
}

/// `true` if updating the subtask moved it into a state where the parent
/// task should treat it as failed (staging or transfer failure).
pub struct SubtaskOutcome {
    pub failed: bool,
    pub failure_reason: Option<String>,
}

impl SubtaskOutcome {
    fn ok() -> Self {
        Self {
            failed: false,
            failure_reason: None,
        }
    }

    fn failure(reason: impl Into<String>) -> Self {
        Self {
            failed: true,
            failure_reason: Some(reason.into()),
        }
    }
}

fn file_ids(subtask: &Subtask) -> Vec<String> {
    subtask.descriptors.iter().map(|d| d.id.clone()).collect()
}

fn file_transfers(subtask: &Subtask) -> Vec<FileTransfer> {
    subtask
        .descriptors
        .iter()
        .filter_map(|d| FileTransfer::for_descriptor(d, &subtask.destination_folder))
        .collect()
}

/// Starts a subtask: if its files are already staged on the source
/// endpoint, begins the bulk transfer immediately; otherwise requests
/// staging and records the staging ID.
pub async fn start(subtask: &mut Subtask, ctx: &SubtaskContext<'_>) -> dts_model::Result<()> {
    if ctx.source_endpoint.files_staged(&subtask.descriptors).await? {
        begin_transfer(subtask, ctx).await?;
    } else {
        let staging_id = ctx
            .source_repository
            .stage_files(ctx.orcid, &file_ids(subtask))
            .await?;
        subtask.staging_id = Some(staging_id);
        subtask.staging_status = StatusCode::Active;
    }
    Ok(())
}

async fn begin_transfer(subtask: &mut Subtask, ctx: &SubtaskContext<'_>) -> dts_model::Result<()> {
    let transfer_id = ctx
        .source_endpoint
        .transfer(&subtask.destination_endpoint, &file_transfers(subtask))
        .await?;
    subtask.staging_id = None;
    subtask.transfer_id = Some(transfer_id);
    subtask.transfer_status = Status::new(StatusCode::Active);
    Ok(())
}

/// Advances the subtask by one step: polls staging if in progress (starting
/// the transfer once staging succeeds), otherwise polls the in-flight
/// transfer.
pub async fn update(
    subtask: &mut Subtask,
    ctx: &SubtaskContext<'_>,
) -> dts_model::Result<SubtaskOutcome> {
    if let Some(staging_id) = subtask.staging_id {
        let status = ctx.source_repository.staging_status(staging_id).await?;
        subtask.staging_status = status;
        match status {
            StatusCode::Succeeded => {
                begin_transfer(subtask, ctx).await?;
            }
            StatusCode::Failed => {
                return Ok(SubtaskOutcome::failure(format!(
                    "staging {staging_id} failed on source endpoint {}",
                    subtask.source_endpoint
                )));
            }
            _ => {}
        }
        return Ok(SubtaskOutcome::ok());
    }

    if let Some(transfer_id) = subtask.transfer_id.clone() {
        let status = ctx.source_endpoint.status(&transfer_id).await?;
        let failed = status.code == StatusCode::Failed;
        let message = status.message.clone();
        subtask.transfer_status = status;
        if failed {
            return Ok(SubtaskOutcome::failure(message.unwrap_or_else(|| {
                format!("transfer {transfer_id} failed on source endpoint {}", subtask.source_endpoint)
            })));
        }
    }

    Ok(SubtaskOutcome::ok())
}

/// Cancels the subtask. A subtask still staging cancels locally, since the
/// repository adapter is never asked to un-stage; a subtask already
/// transferring asks its source endpoint to cancel (best-effort, must be
/// idempotent).
pub async fn cancel(subtask: &mut Subtask, ctx: &SubtaskContext<'_>) -> dts_model::Result<()> {
    if let Some(transfer_id) = subtask.transfer_id.clone() {
        ctx.source_endpoint.cancel(&transfer_id).await?;
        let status = ctx.source_endpoint.status(&transfer_id).await?;
        subtask.transfer_status = status;
    } else {
        subtask.staging_status = StatusCode::Failed;
        subtask.transfer_status = Status::new(StatusCode::Failed).with_message("canceled");
    }
    Ok(())
}

/// True once the subtask has reached a terminal transfer outcome.
pub fn is_terminal(subtask: &Subtask) -> bool {
    subtask.transfer_status.code.is_terminal()
        || (subtask.staging_status == StatusCode::Failed && subtask.transfer_id.is_none())
}

pub fn succeeded(subtask: &Subtask) -> bool {
    subtask.transfer_status.code == StatusCode::Succeeded
}

/// Which of a terminally-failed subtask's two phases caused the failure, if
/// any. Used by the parent task to pick its cancellation message.
pub fn failure_kind(subtask: &Subtask) -> Option<&'static str> {
    if subtask.transfer_status.code == StatusCode::Failed {
        Some("transfer")
    } else if subtask.staging_status == StatusCode::Failed && subtask.transfer_id.is_none() {
        Some("staging")
    } else {
        None
    }
}

/// Groups `descriptors` by endpoint, preserving the order induced by
/// `file_ids`, and builds one subtask per distinct endpoint (invariants 3-5).
pub fn partition_by_endpoint(
    source: &str,
    destination: &str,
    destination_endpoint: &str,
    destination_folder: &str,
    descriptors: Vec<dts_model::Descriptor>,
) -> Vec<Subtask> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: std::collections::HashMap<String, Vec<dts_model::Descriptor>> =
        std::collections::HashMap::new();

    for d in descriptors {
        if !groups.contains_key(&d.endpoint) {
            order.push(d.endpoint.clone());
        }
        groups.entry(d.endpoint.clone()).or_default().push(d);
    }

    order
        .into_iter()
        .map(|endpoint| {
            let descriptors = groups.remove(&endpoint).unwrap_or_default();
            Subtask::new(
                source.to_string(),
                endpoint,
                destination.to_string(),
                destination_endpoint.to_string(),
                destination_folder.to_string(),
                descriptors,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dts_model::{Descriptor, Hash, Payload};

    fn descriptor(id: &str, endpoint: &str) -> Descriptor {
        Descriptor {
            id: id.to_string(),
            name: format!("{id}.txt"),
            payload: Payload::Path {
                path: format!("{id}.txt"),
            },
            bytes: 4,
            hash: Hash("abc".to_string()),
            endpoint: endpoint.to_string(),
            extra: Default::default(),
        }
    }

    #[test]
    fn partitions_preserving_file_id_order_per_endpoint() {
        let descriptors = vec![
            descriptor("1", "e1"),
            descriptor("2", "e2"),
            descriptor("3", "e1"),
        ];
        let subtasks = partition_by_endpoint("src", "dst", "dst-ep", "folder", descriptors);

        assert_eq!(subtasks.len(), 2);
        assert_eq!(subtasks[0].source_endpoint, "e1");
        let ids: Vec<_> = subtasks[0].descriptors.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);

        assert_eq!(subtasks[1].source_endpoint, "e2");
        assert_eq!(subtasks[1].descriptors[0].id, "2");
    }
}
