use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::auth::Token;
use crate::error::{BuildEventsError, Result};
use crate::providers::{fetch_json, http_client, ProviderApi};
use crate::watch::{BuildInfo, Job, JobBucket, JobPage, StatusTable};

use super::types::{Workflow, WorkflowJobs};

pub const DEFAULT_BASE_URL: &str = "https://circleci.com";

const STATES: &[(&str, JobBucket)] = &[
    ("success", JobBucket::Passed),
    ("not_run", JobBucket::Passed),
    ("canceled", JobBucket::Passed),
    ("failed", JobBucket::Failed),
    ("infrastructure_fail", JobBucket::Failed),
    ("timedout", JobBucket::Failed),
    ("terminated-unknown", JobBucket::Failed),
    ("unauthorized", JobBucket::Failed),
    // waiting on upstream jobs, a filter, or an approval
    ("blocked", JobBucket::Blocked),
    ("on_hold", JobBucket::Blocked),
    ("queued", JobBucket::Queued),
    ("not_running", JobBucket::Queued),
    ("running", JobBucket::Active),
    ("retried", JobBucket::Active),
];

/// CircleCI job vocabulary.
pub fn status_table() -> StatusTable {
    StatusTable::new("CircleCI", STATES)
}

/// Minimal CircleCI API v2 client: workflow metadata and workflow jobs.
pub struct CircleCiClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
}

impl CircleCiClient {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let api_url = Url::parse(base_url)
            .map_err(|e| BuildEventsError::Config(format!("Invalid base URL: {e}")))?
            .join("api/v2/")
            .map_err(|e| BuildEventsError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client: http_client()?,
            api_url,
            token,
        })
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.header("Circle-Token", token.as_str())
        } else {
            request
        }
    }

    fn workflow_url(&self, workflow_id: &str, rest: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| BuildEventsError::Config("CircleCI base URL cannot be a base".into()))?
            .pop_if_empty()
            .push("workflow")
            .push(workflow_id)
            .extend(rest);
        Ok(url)
    }
}

#[async_trait]
impl ProviderApi for CircleCiClient {
    type Locator = String;

    fn name(&self) -> &'static str {
        "CircleCI"
    }

    fn status_table(&self) -> StatusTable {
        status_table()
    }

    async fn get_build(&self, workflow_id: &String) -> Result<BuildInfo> {
        let url = self.workflow_url(workflow_id, &[])?;
        let workflow: Workflow = fetch_json(
            self.auth_request(self.client.get(url)),
            &format!("workflow {workflow_id}"),
        )
        .await?;

        Ok(BuildInfo {
            id: workflow.id,
            created_at: workflow.created_at,
            status: workflow.status,
        })
    }

    async fn list_jobs(&self, workflow_id: &String, page_token: Option<&str>) -> Result<JobPage> {
        let mut url = self.workflow_url(workflow_id, &["job"])?;
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("page-token", token);
        }

        let page: WorkflowJobs = fetch_json(
            self.auth_request(self.client.get(url)),
            &format!("workflow {workflow_id}"),
        )
        .await?;

        Ok(JobPage {
            jobs: page
                .items
                .into_iter()
                .map(|job| Job {
                    identifier: job.name,
                    state: job.status,
                })
                .collect(),
            next_page_token: page.next_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const WORKFLOW_ID: &str = "5034460f-c7c4-4c43-9457-de07e2029e7b";

    fn client(server: &Server) -> CircleCiClient {
        CircleCiClient::new(&server.url(), Some(Token::from("circle-token"))).unwrap()
    }

    #[tokio::test]
    async fn test_get_build_reads_created_at() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", format!("/api/v2/workflow/{WORKFLOW_ID}").as_str())
            .match_header("Circle-Token", "circle-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"id":"{WORKFLOW_ID}","name":"build","status":"running","created_at":"2024-05-01T12:00:00Z"}}"#
            ))
            .create_async()
            .await;

        let build = client(&server).get_build(&WORKFLOW_ID.to_string()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(build.id, WORKFLOW_ID);
        assert_eq!(build.status, "running");
        assert_eq!(build.created_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[tokio::test]
    async fn test_list_jobs_passes_page_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", format!("/api/v2/workflow/{WORKFLOW_ID}/job").as_str())
            .match_query(Matcher::UrlEncoded("page-token".into(), "next-1".into()))
            .with_status(200)
            .with_body(
                r#"{"items":[{"name":"lint","status":"success","job_number":7},{"name":"deploy","status":"blocked"}],"next_page_token":"next-2"}"#,
            )
            .create_async()
            .await;

        let page = client(&server)
            .list_jobs(&WORKFLOW_ID.to_string(), Some("next-1"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(page.jobs, vec![Job::new("lint", "success"), Job::new("deploy", "blocked")]);
        assert_eq!(page.next_page_token.as_deref(), Some("next-2"));
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Any)
            .with_status(404)
            .with_body(r#"{"message":"Workflow not found"}"#)
            .create_async()
            .await;

        let result = client(&server).get_build(&"missing".to_string()).await;
        assert!(matches!(result, Err(BuildEventsError::BuildNotFound(_))));
    }

    #[tokio::test]
    async fn test_server_error_surfaces_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Any)
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let result = client(&server).list_jobs(&WORKFLOW_ID.to_string(), None).await;
        match result {
            Err(BuildEventsError::ApiError { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_status_table_buckets() {
        let table = status_table();
        assert_eq!(table.bucket("success"), Some(JobBucket::Passed));
        assert_eq!(table.bucket("failed"), Some(JobBucket::Failed));
        assert_eq!(table.bucket("blocked"), Some(JobBucket::Blocked));
        assert_eq!(table.bucket("queued"), Some(JobBucket::Queued));
        assert_eq!(table.bucket("running"), Some(JobBucket::Active));
        assert_eq!(table.bucket("something-new"), None);
    }
}
