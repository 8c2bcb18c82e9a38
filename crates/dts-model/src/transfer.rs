use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Descriptor, Destination, Status, StatusCode, TransferId, User};

/// One source endpoint's share of a transfer. Subtasks are in one-to-one
/// correspondence with the distinct endpoints present among the transfer's
/// file descriptors (invariant 4), and their `descriptors` preserve the
/// order induced by the transfer's `file_ids` (invariant 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub source: String,
    pub source_endpoint: String,
    pub destination: String,
    pub destination_endpoint: String,
    pub destination_folder: String,
    pub descriptors: Vec<Descriptor>,

    /// At most one of `staging_id`/`transfer_id` is ever set (invariant 6).
    #[serde(default)]
    pub staging_id: Option<uuid::Uuid>,
    pub staging_status: StatusCode,
    #[serde(default)]
    pub transfer_id: Option<String>,
    pub transfer_status: Status,
}

impl Subtask {
    pub fn new(
        source: String,
        source_endpoint: String,
        destination: String,
        destination_endpoint: String,
        destination_folder: String,
        descriptors: Vec<Descriptor>,
    ) -> Self {
        Self {
            source,
            source_endpoint,
            destination,
            destination_endpoint,
            destination_folder,
            descriptors,
            staging_id: None,
            staging_status: StatusCode::Unknown,
            transfer_id: None,
            transfer_status: Status::default(),
        }
    }

    pub fn num_files(&self) -> u64 {
        self.descriptors.len() as u64
    }
}

/// The user-visible unit of work: move a set of files, plus a manifest
/// describing them, from `source` to `destination`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub user: User,
    pub source: String,
    pub destination: Destination,
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: serde_json::Value,
    pub payload_size_gb: f64,
    pub destination_folder: String,
    /// The destination-side local username, resolved via `localUser(orcid)`
    /// for named destinations. Always `None` for custom destinations (open
    /// question in the design notes, resolved in favor of an empty manifest
    /// username for custom destinations).
    pub username: Option<String>,
    pub data_descriptors: Vec<Descriptor>,
    pub subtasks: Vec<Subtask>,
    pub manifest_transfer_id: Option<String>,
    pub manifest_file_path: Option<String>,
    pub status: Status,
    pub canceled: bool,
    pub start_time: DateTime<Utc>,
    pub completion_time: Option<DateTime<Utc>>,
    /// Set once the dispatcher has appended this transfer's journal record,
    /// so a transfer sitting in live state between completion and purge
    /// (invariant 8) is never journaled twice.
    #[serde(default)]
    pub journaled: bool,
}

impl Transfer {
    pub fn new(
        id: TransferId,
        user: User,
        source: String,
        destination: Destination,
        file_ids: Vec<String>,
        description: String,
        instructions: serde_json::Value,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user,
            source,
            destination,
            file_ids,
            description,
            instructions,
            payload_size_gb: 0.0,
            destination_folder: String::new(),
            username: None,
            data_descriptors: Vec::new(),
            subtasks: Vec::new(),
            manifest_transfer_id: None,
            manifest_file_path: None,
            status: Status::default(),
            canceled: false,
            start_time,
            completion_time: None,
            journaled: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.code.is_terminal()
    }

    pub fn has_started(&self) -> bool {
        !self.subtasks.is_empty()
    }

    /// All file descriptors across every subtask, in subtask order. Inline
    /// data descriptors are not included; they never participate in a
    /// subtask.
    pub fn file_descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.subtasks.iter().flat_map(|s| s.descriptors.iter())
    }
}
