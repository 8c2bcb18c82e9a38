use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use axum_extra::extract::Query;
use dts_model::{Descriptor, Destination, DtsError, TransferId, User};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, App, DatabaseInfo};

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

pub async fn get_root(State(app): State<Arc<App>>) -> Json<RootResponse> {
    Json(RootResponse {
        name: app.name.clone(),
        version: app.version.clone(),
        uptime_seconds: app.started_at.elapsed().as_secs(),
        documentation: app.documentation_url.clone(),
    })
}

pub async fn get_databases(State(app): State<Arc<App>>) -> Json<Vec<DatabaseInfo>> {
    Json(app.databases.clone())
}

pub async fn get_database(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> Result<Json<DatabaseInfo>, ApiError> {
    app.databases
        .iter()
        .find(|d| d.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::from(DtsError::DatabaseNotFound(id)))
}

#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    database: String,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    offset: Option<u64>,
    #[serde(default)]
    limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    database: String,
    query: Option<String>,
    resources: Vec<Descriptor>,
}

/// `GET /files` is gated behind the same bearer auth as the transfer
/// endpoints even though the design doc's endpoint table doesn't call out a
/// 401 for it: `RepositoryAdapter::search` takes an orcid, so there is no
/// meaningful anonymous search to offer.
pub async fn get_files(
    State(app): State<Arc<App>>,
    Extension(user): Extension<User>,
    Query(params): Query<FilesQuery>,
) -> Result<Json<FilesResponse>, ApiError> {
    if !app.repositories.contains(&params.database) {
        return Err(ApiError::from(DtsError::DatabaseNotFound(params.database)));
    }
    let repo = app.repositories.open(&params.database).await?;

    let mut search_params = HashMap::new();
    if let Some(q) = &params.query {
        search_params.insert("query".to_string(), q.clone());
    }
    if let Some(offset) = params.offset {
        search_params.insert("offset".to_string(), offset.to_string());
    }
    if let Some(limit) = params.limit {
        search_params.insert("limit".to_string(), limit.to_string());
    }

    let resources = repo.search(&user.orcid, &search_params).await?;

    Ok(Json(FilesResponse {
        database: params.database,
        query: params.query,
        resources,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    source: String,
    destination: String,
    file_ids: Vec<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    instructions: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct CreateTransferResponse {
    id: TransferId,
}

pub async fn post_transfers(
    State(app): State<Arc<App>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateTransferRequest>,
) -> Result<(StatusCode, Json<CreateTransferResponse>), ApiError> {
    let destination = Destination::parse(&req.destination);
    let id = app
        .dispatcher
        .create(
            user,
            req.source,
            destination,
            req.file_ids,
            req.description,
            req.instructions,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(CreateTransferResponse { id })))
}

#[derive(Debug, Serialize)]
pub struct TransferStatusResponse {
    id: TransferId,
    status: dts_model::StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    num_files: u64,
    num_files_transferred: u64,
}

fn parse_transfer_id(id: &str) -> Result<TransferId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, format!("{id:?} is not a valid transfer id")))
}

pub async fn get_transfer(
    State(app): State<Arc<App>>,
    Extension(_user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<TransferStatusResponse>, ApiError> {
    let id = parse_transfer_id(&id)?;
    let transfer = app.dispatcher.status(id).await?;
    Ok(Json(TransferStatusResponse {
        id: transfer.id,
        status: transfer.status.code,
        message: transfer.status.message,
        num_files: transfer.status.num_files,
        num_files_transferred: transfer.status.num_files_transferred,
    }))
}

pub async fn delete_transfer(
    State(app): State<Arc<App>>,
    Extension(_user): Extension<User>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_transfer_id(&id)?;
    app.dispatcher.cancel(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
