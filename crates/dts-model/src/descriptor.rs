use serde::{Deserialize, Serialize};

/// A content hash, `algorithm:digest`. `md5` is assumed when no `algorithm:`
/// prefix is present, matching the convention used by Frictionless data
/// packages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(pub String);

impl Hash {
    pub const DEFAULT_ALGORITHM: &'static str = "md5";

    pub fn algorithm(&self) -> &str {
        match self.0.split_once(':') {
            Some((algo, _digest)) => algo,
            None => Self::DEFAULT_ALGORITHM,
        }
    }

    pub fn digest(&self) -> &str {
        match self.0.split_once(':') {
            Some((_algo, digest)) => digest,
            None => &self.0,
        }
    }
}

/// Exactly one of `Path` or `Data` is present on a descriptor. `Path` means
/// "transfer this file"; `Data` means "embed this blob in the manifest".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Path { path: String },
    Data { data: serde_json::Value },
}

impl Payload {
    pub fn is_path(&self) -> bool {
        matches!(self, Payload::Path { .. })
    }

    pub fn as_path(&self) -> Option<&str> {
        match self {
            Payload::Path { path } => Some(path),
            Payload::Data { .. } => None,
        }
    }
}

/// A Frictionless-style record for one deliverable file or inline datum.
/// Additional source-specific metadata (credit, format, mediatype, ...)
/// rides along opaquely in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub id: String,
    pub name: String,

    #[serde(flatten)]
    pub payload: Payload,

    pub bytes: u64,
    pub hash: Hash,

    /// Source endpoint name. May be empty until the source's single
    /// configured endpoint is filled in at transfer-start time.
    #[serde(default)]
    pub endpoint: String,

    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Descriptor {
    pub fn is_inline_data(&self) -> bool {
        !self.payload.is_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_defaults_to_md5() {
        let h = Hash("abc123".to_string());
        assert_eq!(h.algorithm(), "md5");
        assert_eq!(h.digest(), "abc123");
    }

    #[test]
    fn hash_honors_algorithm_prefix() {
        let h = Hash("sha256:deadbeef".to_string());
        assert_eq!(h.algorithm(), "sha256");
        assert_eq!(h.digest(), "deadbeef");
    }

    #[test]
    fn descriptor_round_trips_path_payload() {
        let json = serde_json::json!({
            "id": "1",
            "name": "file1.txt",
            "path": "file1.txt",
            "bytes": 4,
            "hash": "abc",
            "endpoint": "e1",
            "credit": "someone"
        });
        let d: Descriptor = serde_json::from_value(json.clone()).unwrap();
        assert!(d.payload.is_path());
        assert_eq!(d.payload.as_path(), Some("file1.txt"));
        assert_eq!(d.extra.get("credit").unwrap(), "someone");

        let back = serde_json::to_value(&d).unwrap();
        assert_eq!(back["path"], "file1.txt");
        assert_eq!(back["credit"], "someone");
    }

    #[test]
    fn descriptor_round_trips_data_payload() {
        let json = serde_json::json!({
            "id": "2",
            "name": "inline",
            "data": {"a": 1},
            "bytes": 0,
            "hash": "abc"
        });
        let d: Descriptor = serde_json::from_value(json).unwrap();
        assert!(!d.payload.is_path());
        assert!(d.is_inline_data());
    }
}
