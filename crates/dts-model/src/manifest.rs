use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Descriptor, Transfer, User};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub title: String,
    pub email: String,
    pub organization: String,
    pub role: String,
}

impl From<&User> for Contributor {
    fn from(user: &User) -> Self {
        Self {
            title: user.name.clone(),
            email: user.email.clone(),
            organization: user.organization.clone(),
            role: "author".to_string(),
        }
    }
}

/// A Frictionless data-package manifest delivered alongside a transfer,
/// enumerating and describing every resource it touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub resources: Vec<Descriptor>,
    pub created: DateTime<Utc>,
    pub profile: String,
    pub keywords: Vec<String>,
    pub contributors: Vec<Contributor>,
    pub description: String,
    pub instructions: serde_json::Value,
    /// Destination-side local username; empty for custom destinations.
    #[serde(default)]
    pub username: String,
}

impl Manifest {
    /// Builds the manifest for a transfer whose subtasks have all completed.
    /// Resources are listed in the transfer's original file-id order
    /// (preserved by subtask-ordered iteration), followed by inline-data
    /// descriptors.
    pub fn build(transfer: &Transfer, created: DateTime<Utc>) -> Self {
        let mut resources: Vec<Descriptor> =
            transfer.file_descriptors().cloned().collect();
        resources.extend(transfer.data_descriptors.iter().cloned());

        Self {
            name: "manifest".to_string(),
            resources,
            created,
            profile: "data-package".to_string(),
            keywords: vec!["dts".to_string(), "manifest".to_string()],
            contributors: vec![Contributor::from(&transfer.user)],
            description: transfer.description.clone(),
            instructions: transfer.instructions.clone(),
            username: transfer.username.clone().unwrap_or_default(),
        }
    }
}
