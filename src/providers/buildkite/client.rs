use std::fmt;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use url::Url;

use crate::auth::Token;
use crate::error::{BuildEventsError, Result};
use crate::providers::{fetch_json, http_client, ProviderApi};
use crate::watch::{BuildInfo, Job, JobBucket, JobPage, StatusTable};

use super::types::Build;

pub const DEFAULT_BASE_URL: &str = "https://api.buildkite.com";

// https://buildkite.com/docs/pipelines/defining-steps#job-states
const STATES: &[(&str, JobBucket)] = &[
    ("passed", JobBucket::Passed),
    // canceled by a user, skipped by build skipping, or kept from running by config
    ("canceled", JobBucket::Passed),
    ("skipped", JobBucket::Passed),
    ("broken", JobBucket::Passed),
    ("not_run", JobBucket::Passed),
    ("finished", JobBucket::Passed),
    ("failed", JobBucket::Failed),
    ("timed_out", JobBucket::Failed),
    ("expired", JobBucket::Failed),
    ("waiting_failed", JobBucket::Failed),
    ("blocked_failed", JobBucket::Failed),
    ("unblocked_failed", JobBucket::Failed),
    // block step waiting for someone to unblock it
    ("blocked", JobBucket::Blocked),
    ("pending", JobBucket::Active),
    ("waiting", JobBucket::Active),
    ("unblocked", JobBucket::Active),
    ("scheduled", JobBucket::Active),
    ("limiting", JobBucket::Active),
    ("limited", JobBucket::Active),
    ("assigned", JobBucket::Active),
    ("accepted", JobBucket::Active),
    ("running", JobBucket::Active),
    ("canceling", JobBucket::Active),
    ("timing_out", JobBucket::Active),
];

/// Buildkite job vocabulary.
pub fn status_table() -> StatusTable {
    StatusTable::new("Buildkite", STATES)
}

/// Addresses one build of a Buildkite pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLocator {
    pub organization: String,
    pub pipeline: String,
    pub number: String,
}

impl fmt::Display for BuildLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.organization, self.pipeline, self.number)
    }
}

/// Minimal Buildkite REST v2 client. Jobs come embedded in the build, so
/// listing jobs is always a single page.
pub struct BuildkiteClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
}

impl BuildkiteClient {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let api_url = Url::parse(base_url)
            .map_err(|e| BuildEventsError::Config(format!("Invalid base URL: {e}")))?
            .join("v2/")
            .map_err(|e| BuildEventsError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client: http_client()?,
            api_url,
            token,
        })
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    fn build_url(&self, locator: &BuildLocator) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| BuildEventsError::Config("Buildkite base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend([
                "organizations",
                locator.organization.as_str(),
                "pipelines",
                locator.pipeline.as_str(),
                "builds",
                locator.number.as_str(),
            ]);
        Ok(url)
    }

    async fn fetch_build(&self, locator: &BuildLocator) -> Result<Build> {
        let url = self.build_url(locator)?;
        fetch_json(
            self.auth_request(self.client.get(url)),
            &format!("build {locator}"),
        )
        .await
    }
}

#[async_trait]
impl ProviderApi for BuildkiteClient {
    type Locator = BuildLocator;

    fn name(&self) -> &'static str {
        "Buildkite"
    }

    fn status_table(&self) -> StatusTable {
        status_table()
    }

    async fn get_build(&self, locator: &BuildLocator) -> Result<BuildInfo> {
        let build = self.fetch_build(locator).await?;

        Ok(BuildInfo {
            id: build.id,
            created_at: build.started_at.unwrap_or(build.created_at),
            status: build.state,
        })
    }

    async fn list_jobs(&self, locator: &BuildLocator, _page_token: Option<&str>) -> Result<JobPage> {
        let build = self.fetch_build(locator).await?;
        debug!("Build {locator} (#{}) is {}", build.number, build.state);

        Ok(JobPage {
            jobs: build
                .jobs
                .into_iter()
                .map(|job| {
                    if job.state.is_none() {
                        debug!(
                            "{} job {} ({}) has no state",
                            job.kind.as_deref().unwrap_or("unknown"),
                            job.id,
                            job.name.as_deref().unwrap_or("unnamed")
                        );
                    }
                    Job {
                        identifier: job.id,
                        state: job.state,
                    }
                })
                .collect(),
            next_page_token: None,
        })
    }
}
