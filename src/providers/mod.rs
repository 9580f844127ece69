pub mod buildkite;
pub mod circleci;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{BuildEventsError, Result};
use crate::watch::{BuildInfo, JobPage, StatusTable};

pub use buildkite::{BuildLocator, BuildkiteClient};
pub use circleci::CircleCiClient;

/// Read-only view of a CI provider's build/job API, as needed by the watcher.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// How the provider addresses a build (workflow id, org/pipeline/number, ...)
    type Locator: fmt::Display + Send + Sync;

    /// Human-readable provider name, used in messages
    fn name(&self) -> &'static str;

    /// Job state vocabulary of this provider
    fn status_table(&self) -> StatusTable;

    async fn get_build(&self, locator: &Self::Locator) -> Result<BuildInfo>;

    /// Lists one page of jobs. `page_token` is `None` for the first page; a
    /// `None` or empty `next_page_token` in the result marks the last page.
    async fn list_jobs(&self, locator: &Self::Locator, page_token: Option<&str>)
        -> Result<JobPage>;
}

/// Upper bound for a single HTTP request, connect through body
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("buildevents/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| BuildEventsError::Config(format!("Failed to create HTTP client: {e}")))
}

/// Sends a request and decodes a JSON body, mapping HTTP failures onto
/// [`BuildEventsError`]. `what` names the resource for not-found errors.
pub(crate) async fn fetch_json<T>(request: reqwest::RequestBuilder, what: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let response = request.send().await?;
    let status = response.status();
    debug!("GET {} -> {status}", response.url());

    if status == StatusCode::NOT_FOUND {
        return Err(BuildEventsError::BuildNotFound(what.to_string()));
    }

    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        return Err(BuildEventsError::ApiError {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response.json().await?)
}
