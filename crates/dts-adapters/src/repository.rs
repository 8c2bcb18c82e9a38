use std::collections::HashMap;

use dts_model::{Descriptor, DtsError, Orcid, Result, StatusCode};

/// Opaque bytes a repository adapter uses to checkpoint its own internal
/// state across process restarts.
pub type SaveState = Vec<u8>;

/// The per-source driver contract described in the design: resolve opaque
/// file IDs to descriptors, stage files out of cold storage, map a
/// requester's ORCID to a repository-local account, and checkpoint its own
/// state. All operations may fail with the error taxonomy in
/// `dts_model::DtsError`.
#[async_trait::async_trait]
pub trait RepositoryAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Endpoints this source is configured with, in priority order. A
    /// source with exactly one endpoint lets descriptors omit `endpoint`.
    fn endpoints(&self) -> Vec<String>;

    /// Adapter-specific search filters, as a map of name to a human-readable
    /// type hint (e.g. `"date_range" -> "RFC3339/RFC3339"`).
    fn specific_search_parameters(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Free-text/filtered search. Used only by the search front door; the
    /// orchestrator core never calls this.
    async fn search(
        &self,
        orcid: &Orcid,
        params: &HashMap<String, String>,
    ) -> Result<Vec<Descriptor>>;

    /// Resolves opaque file IDs to descriptors, one per ID in input order.
    /// Must fail entirely (not partially) if any ID cannot be resolved.
    async fn descriptors(&self, orcid: &Orcid, file_ids: &[String]) -> Result<Vec<Descriptor>>;

    /// Requests that the given files be brought online. Idempotent at the
    /// granularity of `(orcid, file_ids)`; returning a fresh UUID per call
    /// is permitted.
    async fn stage_files(&self, orcid: &Orcid, file_ids: &[String]) -> Result<uuid::Uuid>;

    async fn staging_status(&self, staging_id: uuid::Uuid) -> Result<StatusCode>;

    /// Post-transfer hook, e.g. telling the destination of delivery. Called
    /// on every successful non-custom-destination transfer.
    async fn finalize(&self, orcid: &Orcid, transfer_id: uuid::Uuid) -> Result<()>;

    /// Maps the user's ORCID to the repository-local account name used to
    /// build the destination folder.
    async fn local_user(&self, orcid: &Orcid) -> Result<String>;

    async fn save(&self) -> Result<SaveState>;
    async fn load(&self, state: &SaveState) -> Result<()>;
}

/// Validates that `descriptors` assigns every returned descriptor a
/// non-empty endpoint, filling in the source's single configured endpoint
/// when one exists and a descriptor omitted it (invariant 3 / transition 1d).
pub fn fill_in_single_endpoint(
    adapter: &dyn RepositoryAdapter,
    mut descriptors: Vec<Descriptor>,
) -> Result<Vec<Descriptor>> {
    let endpoints = adapter.endpoints();
    for d in &mut descriptors {
        if d.endpoint.is_empty() {
            match endpoints.as_slice() {
                [only] => d.endpoint = only.clone(),
                [] => {
                    return Err(DtsError::InvalidEndpoint(format!(
                        "source {:?} has no configured endpoints",
                        adapter.name()
                    )))
                }
                _ => {
                    return Err(DtsError::InvalidEndpoint(format!(
                        "descriptor {:?} from a multi-endpoint source must specify an endpoint",
                        d.id
                    )))
                }
            }
        }
    }
    Ok(descriptors)
}
