use crate::Orcid;

/// The authenticated requester of a transfer, resolved by the external
/// authenticator from the bearer token on the REST request. Construction of
/// this type is out of scope for the orchestrator core.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
    pub orcid: Orcid,
    pub organization: String,
    #[serde(default)]
    pub is_super: bool,
}
