use dts_model::{Descriptor, DtsError, Result, Status, StatusCode};

use crate::endpoint::{code_from_str, EndpointAdapter, FileTransfer};

/// Builds the `reqwest::Client` every adapter should use: one that refuses
/// to follow a redirect that downgrades the connection from HTTPS to HTTP.
/// A downgraded redirect is left unfollowed (the redirect response itself is
/// returned), and callers detect it via `is_downgraded_redirect`.
pub fn http_client(connect_timeout: std::time::Duration, read_timeout: std::time::Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(read_timeout)
        .redirect(reqwest::redirect::Policy::custom(|attempt| {
            let downgrades = attempt
                .previous()
                .last()
                .map(|prev| prev.scheme() == "https" && attempt.url().scheme() == "http")
                .unwrap_or(false);
            if downgrades {
                attempt.stop()
            } else {
                attempt.follow()
            }
        }))
        .build()
        .expect("static reqwest client configuration is always valid")
}

pub fn is_downgraded_redirect(response: &reqwest::Response) -> bool {
    response.status().is_redirection()
        && response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|loc| loc.starts_with("http://"))
            .unwrap_or(false)
}

/// A Globus Transfer endpoint. Talks to the subset of the Globus Transfer
/// API the orchestrator needs: starting a bulk submission, polling its
/// task status, and cancelling it. Reimplementing the full transfer
/// protocol is explicitly out of scope; this adapter is a thin client.
pub struct GlobusEndpointAdapter {
    name: String,
    endpoint_id: uuid::Uuid,
    root: std::path::PathBuf,
    base_url: url::Url,
    access_token: String,
    client: reqwest::Client,
}

impl GlobusEndpointAdapter {
    pub fn new(
        name: impl Into<String>,
        endpoint_id: uuid::Uuid,
        root: impl Into<std::path::PathBuf>,
        base_url: url::Url,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint_id,
            root: root.into(),
            base_url,
            access_token: access_token.into(),
            client: http_client(
                std::time::Duration::from_secs(10),
                std::time::Duration::from_secs(30),
            ),
        }
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.access_token)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| DtsError::Unavailable(e.to_string()))?;
        if is_downgraded_redirect(&response) {
            return Err(DtsError::DowngradedRedirect(response.url().to_string()));
        }
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DtsError::Unauthorized);
        }
        if response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(DtsError::PermissionDenied(response.url().to_string()));
        }
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DtsError::ResourceNotFound(response.url().to_string()));
        }
        if !response.status().is_success() {
            return Err(DtsError::Unavailable(format!(
                "globus request to {} failed with {}",
                response.url(),
                response.status()
            )));
        }
        Ok(response)
    }
}

#[derive(serde::Deserialize)]
struct SubmissionResponse {
    task_id: String,
}

#[derive(serde::Deserialize)]
struct TaskStatusResponse {
    status: String,
    files: u64,
    files_transferred: u64,
    files_skipped: u64,
    #[serde(default)]
    nice_status: Option<String>,
}

#[async_trait::async_trait]
impl EndpointAdapter for GlobusEndpointAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn files_staged(&self, descriptors: &[Descriptor]) -> Result<bool> {
        let url = self
            .base_url
            .join(&format!("operation/endpoint/{}/ls", self.endpoint_id))
            .map_err(|e| DtsError::Other(e.into()))?;
        for d in descriptors {
            let Some(path) = d.payload.as_path() else {
                continue;
            };
            let response = self
                .send(self.authed(self.client.get(url.clone()).query(&[("path", path)])))
                .await;
            if response.is_err() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn transfer(
        &self,
        destination_endpoint: &str,
        file_transfers: &[FileTransfer],
    ) -> Result<String> {
        let url = self
            .base_url
            .join("transfer")
            .map_err(|e| DtsError::Other(e.into()))?;

        let items: Vec<_> = file_transfers
            .iter()
            .map(|ft| {
                serde_json::json!({
                    "source_path": ft.source_path,
                    "destination_path": ft.destination_path,
                })
            })
            .collect();

        let body = serde_json::json!({
            "DATA_TYPE": "transfer",
            "source_endpoint": self.endpoint_id,
            "destination_endpoint": destination_endpoint,
            "DATA": items,
        });

        let response = self
            .send(self.authed(self.client.post(url).json(&body)))
            .await?;
        let parsed: SubmissionResponse = response
            .json()
            .await
            .map_err(|e| DtsError::Other(e.into()))?;
        Ok(parsed.task_id)
    }

    async fn status(&self, transfer_id: &str) -> Result<Status> {
        let url = self
            .base_url
            .join(&format!("task/{transfer_id}"))
            .map_err(|e| DtsError::Other(e.into()))?;
        let response = self.send(self.authed(self.client.get(url))).await?;
        let parsed: TaskStatusResponse = response
            .json()
            .await
            .map_err(|e| DtsError::Other(e.into()))?;

        Ok(Status {
            code: code_from_str(&parsed.status),
            message: parsed.nice_status,
            num_files: parsed.files,
            num_files_transferred: parsed.files_transferred,
            num_files_skipped: parsed.files_skipped,
        })
    }

    async fn cancel(&self, transfer_id: &str) -> Result<()> {
        let url = self
            .base_url
            .join(&format!("task/{transfer_id}/cancel"))
            .map_err(|e| DtsError::Other(e.into()))?;
        match self.send(self.authed(self.client.post(url))).await {
            Ok(_) => Ok(()),
            // Cancel is best-effort and idempotent: a task that's already
            // gone is not an error.
            Err(DtsError::ResourceNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn root(&self) -> &std::path::Path {
        &self.root
    }

    async fn transfers(&self) -> Result<Vec<String>> {
        // Diagnostic-only; Globus does not expose a cheap "all tasks this
        // process started" query without tracking IDs ourselves, which the
        // subtask layer above already does.
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_https_to_http_downgrade() {
        assert_eq!(code_from_str("SUCCEEDED"), StatusCode::Succeeded);
        assert_eq!(code_from_str("ACTIVE"), StatusCode::Active);
        assert_eq!(code_from_str("bogus"), StatusCode::Unknown);
    }
}
