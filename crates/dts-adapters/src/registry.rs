use std::collections::HashMap;
use std::sync::Arc;

use dts_model::{DtsError, Result};
use futures::future::BoxFuture;

/// A registered constructor: called at most once per name, the first time
/// that name is "opened".
type Ctor<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<T>>> + Send + Sync>;

/// A process-wide name to constructor map for repository or endpoint
/// adapters, populated at startup. The first call to `open` for a given
/// name constructs and caches a singleton; later calls return the cached
/// instance.
pub struct Registry<T: ?Sized + Send + Sync + 'static> {
    constructors: HashMap<String, Ctor<T>>,
    instances: tokio::sync::Mutex<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized + Send + Sync + 'static> Registry<T> {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
            instances: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Registers a constructor under `name`. Fails with `AlreadyRegistered`
    /// if the name is already taken; this is a startup-only error.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, ctor: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Arc<T>>> + Send + 'static,
    {
        let name = name.into();
        if self.constructors.contains_key(&name) {
            return Err(DtsError::AlreadyRegistered(name));
        }
        self.constructors
            .insert(name, Arc::new(move || Box::pin(ctor())));
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Opens the adapter registered under `name`, constructing and caching
    /// it on first use.
    pub async fn open(&self, name: &str) -> Result<Arc<T>> {
        let mut instances = self.instances.lock().await;
        if let Some(existing) = instances.get(name) {
            return Ok(existing.clone());
        }
        let ctor = self
            .constructors
            .get(name)
            .ok_or_else(|| DtsError::DatabaseNotFound(name.to_string()))?;
        let instance = ctor().await?;
        instances.insert(name.to_string(), instance.clone());
        Ok(instance)
    }

    /// Snapshots every constructed (not merely registered) instance's name,
    /// for use by `save`/`load` at checkpoint time.
    pub async fn open_instances(&self) -> Vec<(String, Arc<T>)> {
        self.instances
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type RepositoryRegistry = Registry<dyn crate::RepositoryAdapter>;
pub type EndpointRegistry = Registry<dyn crate::EndpointAdapter>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RepositoryAdapter;
    use std::collections::HashMap as Map;

    struct Dummy(&'static str);

    #[async_trait::async_trait]
    impl RepositoryAdapter for Dummy {
        fn name(&self) -> &str {
            self.0
        }
        fn endpoints(&self) -> Vec<String> {
            vec!["only".to_string()]
        }
        async fn search(
            &self,
            _orcid: &dts_model::Orcid,
            _params: &Map<String, String>,
        ) -> Result<Vec<dts_model::Descriptor>> {
            Ok(vec![])
        }
        async fn descriptors(
            &self,
            _orcid: &dts_model::Orcid,
            _file_ids: &[String],
        ) -> Result<Vec<dts_model::Descriptor>> {
            Ok(vec![])
        }
        async fn stage_files(
            &self,
            _orcid: &dts_model::Orcid,
            _file_ids: &[String],
        ) -> Result<uuid::Uuid> {
            Ok(uuid::Uuid::new_v4())
        }
        async fn staging_status(&self, _id: uuid::Uuid) -> Result<dts_model::StatusCode> {
            Ok(dts_model::StatusCode::Succeeded)
        }
        async fn finalize(&self, _orcid: &dts_model::Orcid, _id: uuid::Uuid) -> Result<()> {
            Ok(())
        }
        async fn local_user(&self, _orcid: &dts_model::Orcid) -> Result<String> {
            Ok("localuser".to_string())
        }
        async fn save(&self) -> Result<Vec<u8>> {
            Ok(vec![])
        }
        async fn load(&self, _state: &Vec<u8>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn open_caches_singleton() {
        let mut registry: RepositoryRegistry = Registry::new();
        registry
            .register("jdp", || async { Ok(Arc::new(Dummy("jdp")) as Arc<dyn RepositoryAdapter>) })
            .unwrap();

        let a = registry.open("jdp").await.unwrap();
        let b = registry.open("jdp").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let mut registry: RepositoryRegistry = Registry::new();
        registry
            .register("jdp", || async { Ok(Arc::new(Dummy("jdp")) as Arc<dyn RepositoryAdapter>) })
            .unwrap();
        let err = registry
            .register("jdp", || async { Ok(Arc::new(Dummy("jdp")) as Arc<dyn RepositoryAdapter>) })
            .unwrap_err();
        assert!(matches!(err, DtsError::AlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn unknown_name_is_not_found() {
        let registry: RepositoryRegistry = Registry::new();
        let err = registry.open("missing").await.unwrap_err();
        assert!(matches!(err, DtsError::DatabaseNotFound(_)));
    }
}
