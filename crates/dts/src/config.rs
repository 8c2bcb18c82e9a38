//! YAML configuration shape: `service`, `endpoints`, `databases`,
//! `credentials`, per the external interfaces design. Loading is pure
//! deserialization; turning a `Config` into live registries happens in
//! `main`, where errors can be reported with more context.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub endpoints: HashMap<String, EndpointConfig>,
    #[serde(default)]
    pub databases: HashMap<String, DatabaseConfig>,
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    pub max_payload_size: f64,
    pub poll_interval: u64,
    pub data_dir: PathBuf,
    pub manifest_dir: PathBuf,
    pub delete_after: i64,
    /// Name of the `endpoints` entry that is this instance's own local
    /// filesystem endpoint, used to deliver manifests.
    pub endpoint: String,
    #[serde(default)]
    pub documentation_url: Option<String>,
}

fn default_max_connections() -> u32 {
    100
}

#[derive(Debug, Deserialize)]
pub struct EndpointConfig {
    pub provider: String,
    #[serde(default)]
    pub id: Option<uuid::Uuid>,
    pub root: PathBuf,
    /// Key into `credentials`, consulted only by providers that need a
    /// bearer token (`globus`). Defaults to the endpoint's own name.
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default)]
    pub base_url: Option<url::Url>,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub url: String,
    /// Provider-specific fields a concrete repository adapter would read;
    /// this orchestrator doesn't ship any, so they pass through unused.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

pub fn load(path: &std::path::Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
    let config: Config = serde_yaml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;
    Ok(config)
}
