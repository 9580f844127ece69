use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Buildkite REST v2 build, including its jobs.
#[derive(Debug, Clone, Deserialize)]
pub struct Build {
    pub id: String,
    pub number: u64,
    pub state: String,
    pub created_at: DateTime<Utc>,
    /// Unset until an agent picks up the first job
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub jobs: Vec<BuildJob>,
}

/// A job (script, wait, block or trigger step) inside a Buildkite build.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildJob {
    /// Job UUID; matches `$BUILDKITE_JOB_ID` of the running job
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Missing for some wait steps
    #[serde(default)]
    pub state: Option<String>,
}
