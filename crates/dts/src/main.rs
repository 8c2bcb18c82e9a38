//! Binary entry point: loads the YAML configuration, wires the registries,
//! dispatcher, journal and REST router together, and serves until asked to
//! stop.

mod config;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dts_adapters::{EndpointAdapter, EndpointRegistry, GlobusEndpointAdapter, LocalEndpointAdapter, ProviderRegistry, RepositoryRegistry, Registry};
use dts_api::{App, Authenticator, DatabaseInfo};
use dts_cli_common::{init_logging, LogArgs};
use dts_core::{Dispatcher, DispatcherConfig};
use dts_model::{DtsError, Result as DtsResult, User};
use futures::FutureExt;

/// Orchestrates bulk file transfers between scientific data repositories.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    #[clap(flatten)]
    log: LogArgs,

    /// Path to the service's YAML configuration file.
    #[clap(long = "config", env = "DTS_CONFIG")]
    config: std::path::PathBuf,
}

fn default_globus_base_url() -> url::Url {
    "https://transfer.api.globus.org/v0.10/"
        .parse()
        .expect("static URL is always valid")
}

/// Resolves the bearer token a credential key names, for providers that
/// need one (`globus`). `credential` defaults to `endpoint_name` when the
/// configuration doesn't name one explicitly.
fn resolve_credential<'a>(
    credentials: &'a std::collections::HashMap<String, String>,
    credential: &Option<String>,
    endpoint_name: &str,
) -> anyhow::Result<&'a str> {
    let key = credential.as_deref().unwrap_or(endpoint_name);
    credentials
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("no credential named {key:?} is configured"))
}

/// Builds the registry of pre-configured, named endpoints from `endpoints`.
/// Concrete construction happens lazily, on first `open`, exactly as the
/// design requires.
fn build_endpoint_registry(config: &config::Config) -> anyhow::Result<EndpointRegistry> {
    let mut registry: EndpointRegistry = Registry::new();

    for (name, econf) in &config.endpoints {
        let name = name.clone();
        match econf.provider.as_str() {
            "local" => {
                let root = econf.root.clone();
                let err_name = name.clone();
                registry
                    .register(name.clone(), move || {
                        let name = name.clone();
                        let root = root.clone();
                        async move { Ok(Arc::new(LocalEndpointAdapter::new(name, root)) as Arc<dyn EndpointAdapter>) }
                    })
                    .map_err(|e| anyhow::anyhow!("registering endpoint {err_name:?}: {e}"))?;
            }
            "globus" => {
                let endpoint_id = econf
                    .id
                    .ok_or_else(|| anyhow::anyhow!("endpoint {name:?}: globus endpoints require an id"))?;
                let root = econf.root.clone();
                let base_url = econf.base_url.clone().unwrap_or_else(default_globus_base_url);
                let access_token = resolve_credential(&config.credentials, &econf.credential, &name)?.to_string();
                let err_name = name.clone();
                registry
                    .register(name.clone(), move || {
                        let name = name.clone();
                        let root = root.clone();
                        let base_url = base_url.clone();
                        let access_token = access_token.clone();
                        async move {
                            Ok(Arc::new(GlobusEndpointAdapter::new(
                                name,
                                endpoint_id,
                                root,
                                base_url,
                                access_token,
                            )) as Arc<dyn EndpointAdapter>)
                        }
                    })
                    .map_err(|e| anyhow::anyhow!("registering endpoint {err_name:?}: {e}"))?;
            }
            other => {
                return Err(anyhow::anyhow!("endpoint {name:?}: unknown provider {other:?}"));
            }
        }
    }

    Ok(registry)
}

/// Builds the scheme-keyed registry used to construct ad hoc endpoints for
/// custom destination specs (`provider:endpoint-id:credential-name`). Only
/// `globus` is wired: a custom destination ultimately names a Globus
/// endpoint UUID that some subtask's *source* endpoint transfers to
/// directly, so this registry exists chiefly to validate that the scheme
/// is one the deployment actually supports.
fn build_provider_registry(config: &config::Config) -> anyhow::Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    let credentials = config.credentials.clone();
    let base_url = config
        .endpoints
        .values()
        .find(|e| e.provider == "globus")
        .and_then(|e| e.base_url.clone())
        .unwrap_or_else(default_globus_base_url);

    registry
        .register("globus", move |endpoint_id, credential_name| {
            let credentials = credentials.clone();
            let base_url = base_url.clone();
            async move {
                let access_token = credentials.get(&credential_name).cloned().ok_or_else(|| {
                    DtsError::InvalidEndpoint(format!("no credential named {credential_name:?} is configured"))
                })?;
                Ok(Arc::new(GlobusEndpointAdapter::new(
                    endpoint_id.to_string(),
                    endpoint_id,
                    "/",
                    base_url,
                    access_token,
                )) as Arc<dyn EndpointAdapter>)
            }
        })
        .map_err(|e| anyhow::anyhow!("registering provider \"globus\": {e}"))?;

    Ok(registry)
}

/// No concrete repository adapter ships with the orchestrator: each
/// deployment compiles in the drivers for the sources it actually talks to
/// and registers them here. An empty registry is a correctly configured
/// deployment with no sources yet wired up, not an error.
fn build_repository_registry(_config: &config::Config) -> RepositoryRegistry {
    Registry::new()
}

fn databases_from_config(config: &config::Config) -> Vec<DatabaseInfo> {
    config
        .databases
        .iter()
        .map(|(id, dbconf)| DatabaseInfo {
            id: id.clone(),
            name: id.clone(),
            organization: dbconf.organization.clone(),
            url: dbconf.url.clone(),
        })
        .collect()
}

/// Stand-in authenticator used until a deployment supplies its own: treats
/// the decoded bearer token as a `User` encoded as JSON. Real identity
/// provider integration is explicitly out of scope for this service.
struct JsonBearerAuthenticator;

#[async_trait::async_trait]
impl Authenticator for JsonBearerAuthenticator {
    async fn authenticate(&self, access_token: &str) -> DtsResult<User> {
        serde_json::from_str(access_token)
            .map_err(|e| DtsError::Other(anyhow::anyhow!("malformed bearer token: {e}")))
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Verifies a directory exists and is writable+readable, per the startup
/// check the design requires of the data and manifest directories.
async fn verify_directory_writable(dir: &std::path::Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating directory {}", dir.display()))?;
    let probe = dir.join(format!(".dts-probe-{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&probe, b"probe")
        .await
        .with_context(|| format!("probing directory {} for write access", dir.display()))?;
    let contents = tokio::fs::read(&probe).await?;
    tokio::fs::remove_file(&probe).await?;
    anyhow::ensure!(contents == b"probe", "probe readback mismatch for {}", dir.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let config = config::load(&args.config).context("loading configuration")?;
    tracing::info!(service = %config.service.name, port = config.service.port, "starting");

    verify_directory_writable(&config.service.data_dir).await?;
    verify_directory_writable(&config.service.manifest_dir).await?;

    let repositories = Arc::new(build_repository_registry(&config));
    let endpoints = Arc::new(build_endpoint_registry(&config)?);
    let providers = Arc::new(build_provider_registry(&config)?);

    if !endpoints.contains(&config.service.endpoint) {
        anyhow::bail!(
            "service.endpoint {:?} does not name a configured endpoint",
            config.service.endpoint
        );
    }
    // The local endpoint's own root is verified the same way as the data
    // and manifest directories: requests shouldn't be accepted until
    // manifest delivery is known to work.
    if let Some(local_config) = config.endpoints.get(&config.service.endpoint) {
        verify_directory_writable(&local_config.root).await?;
    }

    let journal_path = config
        .service
        .data_dir
        .join(format!("{}-journal.db", config.service.name));
    let pool = dts_journal::open(&journal_path)
        .await
        .with_context(|| format!("opening journal at {}", journal_path.display()))?;
    let journal = dts_journal::Journal::spawn(pool);

    let snapshot_path = dts_core::snapshot_path(&config.service.data_dir, &config.service.name);
    let dispatcher_config = DispatcherConfig {
        service_name: config.service.name.clone(),
        poll_interval: Duration::from_millis(config.service.poll_interval),
        delete_after: chrono::Duration::seconds(config.service.delete_after),
        max_payload_gb: config.service.max_payload_size,
        local_endpoint_name: config.service.endpoint.clone(),
        manifest_dir: config.service.manifest_dir.clone(),
        snapshot_path,
    };

    let dispatcher = Dispatcher::spawn(
        repositories.clone(),
        endpoints.clone(),
        providers.clone(),
        journal,
        dispatcher_config,
    )
    .await
    .context("starting dispatcher")?;

    let app = Arc::new(App {
        name: config.service.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        documentation_url: config.service.documentation_url.clone(),
        started_at: std::time::Instant::now(),
        dispatcher: dispatcher.clone(),
        repositories,
        databases: databases_from_config(&config),
        authenticator: Arc::new(JsonBearerAuthenticator),
    });

    let router = dts_api::router(app);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.service.port))
        .await
        .with_context(|| format!("binding port {}", config.service.port))?;
    tracing::info!(port = config.service.port, "listening");

    let shutdown = shutdown_signal();
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("serving API")?;

    dispatcher.halt().await.context("halting dispatcher")?;
    Ok(())
}

/// Resolves once SIGINT or, on unix, SIGTERM is received.
fn shutdown_signal() -> BoxFuture<'static, ()> {
    let ctrl_c = tokio::signal::ctrl_c().map(|_| ());

    #[cfg(unix)]
    {
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };
        Box::pin(async move {
            tokio::select! {
                _ = ctrl_c => {}
                _ = terminate => {}
            }
            tracing::info!("shutdown signal received");
        })
    }

    #[cfg(not(unix))]
    {
        Box::pin(async move {
            ctrl_c.await;
            tracing::info!("shutdown signal received");
        })
    }
}
