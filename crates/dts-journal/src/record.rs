use chrono::{DateTime, Utc};

/// Terminal outcome of a journaled transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalStatus {
    Succeeded,
    Failed,
    Canceled,
}

impl JournalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JournalStatus::Succeeded => "succeeded",
            JournalStatus::Failed => "failed",
            JournalStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "succeeded" => Ok(JournalStatus::Succeeded),
            "failed" => Ok(JournalStatus::Failed),
            "canceled" => Ok(JournalStatus::Canceled),
            other => Err(anyhow::anyhow!("unrecognized journal status {other:?}")),
        }
    }
}

/// One row of the audit log: a finished transfer plus its manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JournalRecord {
    pub id: dts_model::TransferId,
    pub source: String,
    pub destination: String,
    pub orcid: String,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub status: JournalStatus,
    pub payload_size_bytes: u64,
    pub num_files: u64,
    pub manifest: serde_json::Value,
}
