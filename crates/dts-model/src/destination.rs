use std::str::FromStr;

use crate::DtsError;

/// A transfer's destination: either the name of a registered repository, or
/// a custom spec of the form `<provider>:<endpoint-id>:<credential-name>`
/// naming an endpoint provider, a Globus-style endpoint UUID, and a key into
/// the configured credential map.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Destination {
    Named(String),
    Custom(CustomDestination),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CustomDestination {
    pub provider: String,
    pub endpoint_id: uuid::Uuid,
    pub credential_name: String,
}

impl std::fmt::Display for CustomDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.provider, self.endpoint_id, self.credential_name
        )
    }
}

impl Destination {
    /// Parses `spec` as a custom destination if it has the `provider:uuid:name`
    /// shape; otherwise treats it as a named repository.
    pub fn parse(spec: &str) -> Self {
        match spec.parse::<CustomDestination>() {
            Ok(custom) => Destination::Custom(custom),
            Err(_) => Destination::Named(spec.to_string()),
        }
    }
}

impl FromStr for CustomDestination {
    type Err = DtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(provider), Some(endpoint_id), Some(credential_name)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(DtsError::InvalidEndpoint(format!(
                "{s:?} is not a provider:endpoint-id:credential-name spec"
            )));
        };
        let endpoint_id = uuid::Uuid::parse_str(endpoint_id).map_err(|_| {
            DtsError::InvalidEndpoint(format!("{endpoint_id:?} is not a valid endpoint UUID"))
        })?;
        Ok(CustomDestination {
            provider: provider.to_string(),
            endpoint_id,
            credential_name: credential_name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_custom_destination() {
        let spec = "globus:4f8e9b2a-1111-4b2a-9c3d-000000000000:my-cred";
        let Destination::Custom(custom) = Destination::parse(spec) else {
            panic!("expected a custom destination");
        };
        assert_eq!(custom.provider, "globus");
        assert_eq!(custom.credential_name, "my-cred");
        assert_eq!(custom.to_string(), spec);
    }

    #[test]
    fn falls_back_to_named_repository() {
        assert_eq!(
            Destination::parse("jdp"),
            Destination::Named("jdp".to_string())
        );
    }

    #[test]
    fn rejects_malformed_uuid_as_named() {
        // Two colons but an invalid UUID: still parsed as a named
        // destination since the shape isn't a valid custom spec.
        match Destination::parse("globus:not-a-uuid:cred") {
            Destination::Named(name) => assert_eq!(name, "globus:not-a-uuid:cred"),
            Destination::Custom(_) => panic!("should not parse as custom"),
        }
    }
}
