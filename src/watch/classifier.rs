use std::collections::HashMap;

use log::{debug, warn};

use super::types::{Classification, Job};

/// What a provider job state means for build completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobBucket {
    /// Terminal and harmless: passed, skipped, canceled
    Passed,
    /// Terminal and fatal for the build
    Failed,
    /// Cannot run right now but might later (waiting on an approval or a filter)
    Blocked,
    /// Definitely still going
    Active,
    /// Accepted by the provider but not started; outcome unknown
    Queued,
}

/// Provider vocabulary: maps raw job state strings onto [`JobBucket`]s.
#[derive(Debug, Clone)]
pub struct StatusTable {
    provider: &'static str,
    buckets: HashMap<String, JobBucket>,
}

impl StatusTable {
    pub fn new(provider: &'static str, entries: &[(&str, JobBucket)]) -> Self {
        let buckets = entries
            .iter()
            .map(|(state, bucket)| ((*state).to_string(), *bucket))
            .collect();

        Self { provider, buckets }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn bucket(&self, state: &str) -> Option<JobBucket> {
        self.buckets.get(state).copied()
    }
}

/// Folds a job snapshot into a [`Classification`] using one provider's [`StatusTable`].
#[derive(Debug, Clone)]
pub struct Classifier {
    table: StatusTable,
}

impl Classifier {
    pub fn new(table: StatusTable) -> Self {
        Self { table }
    }

    /// Classifies a snapshot, skipping the job named `self_job`.
    ///
    /// The scan stops at the first active or queued job: one is enough to know
    /// the build is not finished. `any_failed`/`any_blocked` then only reflect
    /// the jobs seen before it.
    pub fn classify(&self, jobs: &[Job], self_job: Option<&str>) -> Classification {
        let mut result = Classification {
            finished: true,
            any_running: false,
            any_failed: false,
            any_blocked: false,
        };

        for job in jobs {
            if self_job == Some(job.identifier.as_str()) {
                continue;
            }

            let Some(state) = job.state.as_deref() else {
                debug!("Job {} has no state; skipping", job.identifier);
                continue;
            };

            match self.table.bucket(state) {
                Some(JobBucket::Passed) => {}
                Some(JobBucket::Failed) => result.any_failed = true,
                Some(JobBucket::Blocked) => result.any_blocked = true,
                Some(JobBucket::Active) => {
                    result.any_running = true;
                    result.finished = false;
                    return result;
                }
                Some(JobBucket::Queued) => {
                    result.finished = false;
                    return result;
                }
                None => warn!(
                    "Unrecognized {} job state {state:?} for job {}; ignoring",
                    self.table.provider(),
                    job.identifier
                ),
            }
        }

        result
    }
}
