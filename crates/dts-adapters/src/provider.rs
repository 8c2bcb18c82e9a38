use std::collections::HashMap;
use std::sync::Arc;

use dts_model::{DtsError, Result};
use futures::future::BoxFuture;

use crate::EndpointAdapter;

type ProviderCtor = Arc<
    dyn Fn(uuid::Uuid, &str) -> BoxFuture<'static, Result<Arc<dyn EndpointAdapter>>>
        + Send
        + Sync,
>;

/// Constructs endpoint adapters on the fly for a custom destination spec
/// (`provider:endpoint-id:credential-name`), as opposed to `EndpointRegistry`
/// which serves pre-configured, named endpoints. Keyed by provider scheme
/// (e.g. `"globus"`).
#[derive(Default)]
pub struct ProviderRegistry {
    constructors: HashMap<String, ProviderCtor>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, scheme: impl Into<String>, ctor: F) -> Result<()>
    where
        F: Fn(uuid::Uuid, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Arc<dyn EndpointAdapter>>> + Send + 'static,
    {
        let scheme = scheme.into();
        if self.constructors.contains_key(&scheme) {
            return Err(DtsError::AlreadyRegistered(scheme));
        }
        self.constructors.insert(
            scheme,
            Arc::new(move |endpoint_id, credential_name: &str| {
                Box::pin(ctor(endpoint_id, credential_name.to_string()))
            }),
        );
        Ok(())
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.constructors.contains_key(scheme)
    }

    pub async fn build(
        &self,
        provider: &str,
        endpoint_id: uuid::Uuid,
        credential_name: &str,
    ) -> Result<Arc<dyn EndpointAdapter>> {
        let ctor = self
            .constructors
            .get(provider)
            .ok_or_else(|| DtsError::InvalidEndpoint(format!("unknown provider {provider:?}")))?;
        ctor(endpoint_id, credential_name).await
    }
}
