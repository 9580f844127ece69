use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::auth::Token;

/// Fixed delay between two polls of the provider API.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Number of consecutive quiet polls required before a build is declared finished.
pub const DEFAULT_CONFIRMATIONS: u32 = 3;

/// Upper bound on a single snapshot fetch; a slower fetch counts as a transient failure.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One unit of work inside a build/workflow, as last reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Name (CircleCI) or id (Buildkite); used to recognize the watching job itself
    pub identifier: String,
    /// Provider status string; `None` when the provider omitted it
    pub state: Option<String>,
}

#[cfg(test)]
impl Job {
    pub fn new(identifier: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            state: Some(state.into()),
        }
    }
}

/// Build/workflow metadata fetched once when a watch starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: String,
}

/// One page of jobs plus the cursor of the next page, if any.
#[derive(Debug, Clone, Default)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub next_page_token: Option<String>,
}

/// Aggregate view of a job snapshot for a single poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// No job is running or waiting to start
    pub finished: bool,
    pub any_running: bool,
    pub any_failed: bool,
    pub any_blocked: bool,
}

/// Settings for one watch session.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub confirmations: u32,
    /// Job to leave out of completion accounting (the one running the watch)
    pub self_job: Option<String>,
    pub credential: Option<Token>,
}

impl WatchConfig {
    pub fn new(timeout: Duration, credential: Option<Token>) -> Self {
        Self {
            timeout,
            poll_interval: POLL_INTERVAL,
            fetch_timeout: FETCH_TIMEOUT,
            confirmations: DEFAULT_CONFIRMATIONS,
            self_job: None,
            credential,
        }
    }

    #[must_use]
    pub fn with_self_job(mut self, self_job: Option<String>) -> Self {
        self.self_job = self_job.filter(|job| !job.is_empty());
        self
    }

    #[must_use]
    pub fn with_confirmations(mut self, confirmations: u32) -> Self {
        self.confirmations = confirmations.max(1);
        self
    }
}

/// How a watch session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
    TimedOut,
}

/// Result of a watch session that managed to talk to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOutcome {
    pub verdict: Verdict,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
}

impl WatchOutcome {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    pub fn duration(&self) -> chrono::Duration {
        self.ended - self.started
    }
}
