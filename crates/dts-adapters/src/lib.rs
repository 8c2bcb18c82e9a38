//! Adapter contracts for repository (source) and endpoint (bulk-mover)
//! drivers, the process-wide registries that construct them by name, and a
//! couple of concrete adapters (`local`, `globus`) used by every deployment.

mod endpoint;
mod globus;
mod local;
mod provider;
mod registry;
mod repository;

pub use endpoint::{code_from_str, EndpointAdapter, FileTransfer};
pub use globus::{http_client, is_downgraded_redirect, GlobusEndpointAdapter};
pub use local::LocalEndpointAdapter;
pub use provider::ProviderRegistry;
pub use registry::{EndpointRegistry, RepositoryRegistry, Registry};
pub use repository::{fill_in_single_endpoint, RepositoryAdapter, SaveState};
