//! Authorization middleware: decodes the `Authorization: Bearer
//! base64(access-token)` header and resolves it to a `User` via a
//! pluggable authenticator. Construction of the authenticator itself
//! (talking to whatever identity provider a deployment uses) is out of
//! scope here; only the header-parsing and request-extension wiring live
//! in this crate.

use std::sync::Arc;

use axum::extract::State;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use dts_model::{DtsError, User};

use crate::{error::ApiError, App};

/// Resolves an opaque access token to the user it was issued for. The only
/// implementation shipped here is a stub for tests; a real deployment
/// supplies its own.
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, access_token: &str) -> Result<User, DtsError>;
}

pub async fn require_user(
    State(app): State<Arc<App>>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let access_token = match base64::decode(bearer.token()) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(token) => token,
            Err(_) => {
                return ApiError::new(
                    axum::http::StatusCode::UNAUTHORIZED,
                    "bearer token is not valid UTF-8 after base64 decoding",
                )
                .into_response();
            }
        },
        Err(err) => {
            return ApiError::new(
                axum::http::StatusCode::UNAUTHORIZED,
                format!("bearer token is not valid base64: {err}"),
            )
            .into_response();
        }
    };

    match app.authenticator.authenticate(&access_token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}
