//! The REST front door described in the external interfaces design: a thin
//! axum layer translating HTTP requests into `Dispatcher` calls and
//! repository searches, and their results back into the JSON shapes
//! clients expect.

mod auth;
mod error;
mod handlers;

use std::sync::Arc;
use std::time::Instant;

use dts_adapters::RepositoryRegistry;
use dts_core::Dispatcher;

pub use auth::Authenticator;
pub use error::ApiError;

/// Static catalog metadata for one configured source, surfaced by
/// `GET /databases`. This is deliberately not part of `RepositoryAdapter`:
/// organization/url are descriptive facts from configuration, not anything
/// an adapter implementation needs to know about its own identity.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseInfo {
    pub id: String,
    pub name: String,
    pub organization: String,
    pub url: String,
}

/// Everything a handler needs, shared behind an `Arc` across the whole
/// router.
pub struct App {
    pub name: String,
    pub version: String,
    pub documentation_url: Option<String>,
    pub started_at: Instant,
    pub dispatcher: Dispatcher,
    pub repositories: Arc<RepositoryRegistry>,
    pub databases: Vec<DatabaseInfo>,
    pub authenticator: Arc<dyn Authenticator>,
}

/// Builds the full `/api/v1` router. `/`, `/databases`, and `/databases/:id`
/// are public; `/files` and the `/transfers` routes require a bearer token
/// resolving to a `User`.
pub fn router(app: Arc<App>) -> axum::Router<()> {
    use axum::routing::{get, post};

    let authenticated = axum::Router::new()
        .route("/files", get(handlers::get_files))
        .route("/transfers", post(handlers::post_transfers))
        .route(
            "/transfers/:id",
            get(handlers::get_transfer).delete(handlers::delete_transfer),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            app.clone(),
            auth::require_user,
        ));

    let public = axum::Router::new()
        .route("/", get(handlers::get_root))
        .route("/databases", get(handlers::get_databases))
        .route("/databases/:id", get(handlers::get_database));

    axum::Router::new()
        .nest("/api/v1", public.merge(authenticated))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(app)
}
