use std::collections::BTreeMap;

use super::types::Job;

const NO_JOBS: &str = "no jobs found";
const MISSING_STATE: &str = "nil-job-state";

/// Renders job counts by state, e.g. `"2 failed, 1 running, 5 success"`.
///
/// States are sorted by name so consecutive poll lines are easy to compare.
pub fn summarize(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return NO_JOBS.to_string();
    }

    let mut count_by_state: BTreeMap<&str, usize> = BTreeMap::new();
    for job in jobs {
        *count_by_state
            .entry(job.state.as_deref().unwrap_or(MISSING_STATE))
            .or_default() += 1;
    }

    count_by_state
        .iter()
        .map(|(state, count)| format!("{count} {state}"))
        .collect::<Vec<_>>()
        .join(", ")
}
