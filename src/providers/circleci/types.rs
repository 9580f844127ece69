use chrono::{DateTime, Utc};
use serde::Deserialize;

/// CircleCI v2 workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct Workflow {
    /// Workflow UUID
    pub id: String,
    /// Aggregate status (e.g. "running", "success", "failed")
    pub status: String,
    /// When the workflow was created; the start of the trace
    pub created_at: DateTime<Utc>,
}

/// One page of `GET /workflow/{id}/job`.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowJobs {
    pub items: Vec<WorkflowJob>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// A job inside a CircleCI workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowJob {
    /// Job name; matches `$CIRCLE_JOB` of the running job
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}
