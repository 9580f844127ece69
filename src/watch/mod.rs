//! Workflow completion watcher.
//!
//! Polls a CI provider until every job of a build (other than the watching
//! job itself) has finished, then reports whether the build passed together
//! with its start and end times.

mod classifier;
mod fetcher;
mod settle;
mod summary;
mod supervisor;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{JobBucket, StatusTable};
pub use supervisor::Watcher;
pub use types::{
    BuildInfo, Job, JobPage, Verdict, WatchConfig, WatchOutcome, DEFAULT_CONFIRMATIONS,
};
