use serde::{Deserialize, Serialize};

/// The visible state of a transfer task or of an endpoint-reported bulk
/// transfer. `unknown` is also used for a subtask that has not yet started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Unknown,
    Staging,
    Active,
    Inactive,
    Finalizing,
    Succeeded,
    Failed,
}

impl StatusCode {
    pub fn is_terminal(self) -> bool {
        matches!(self, StatusCode::Succeeded | StatusCode::Failed)
    }
}

/// A task or subtask's externally-visible status, with file-count progress
/// and an optional human-readable message (set on failure or cancellation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub num_files: u64,
    pub num_files_transferred: u64,
    pub num_files_skipped: u64,
}

impl Status {
    pub fn new(code: StatusCode) -> Self {
        Self {
            code,
            message: None,
            num_files: 0,
            num_files_transferred: 0,
            num_files_skipped: 0,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new(StatusCode::Unknown)
    }
}
