use std::fmt;

/// A user's ORCID, the stable personal identifier used for cross-repository
/// user mapping. Stored as the canonical `XXXX-XXXX-XXXX-XXXX` string; no
/// checksum validation is performed here, that's an authenticator concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Orcid(pub String);

impl fmt::Display for Orcid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<&str> for Orcid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Orcid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Orcid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
