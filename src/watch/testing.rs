//! In-memory provider used by the watcher tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::error::{BuildEventsError, Result};
use crate::providers::{circleci, ProviderApi};
use crate::watch::classifier::StatusTable;
use crate::watch::types::{BuildInfo, Job, JobPage};

/// The pages returned for one full snapshot fetch, or `Err` for a failed fetch.
pub type Tick = std::result::Result<Vec<JobPage>, ()>;

pub fn page(jobs: &[(&str, &str)], next: Option<&str>) -> JobPage {
    JobPage {
        jobs: jobs.iter().map(|(name, state)| Job::new(*name, *state)).collect(),
        next_page_token: next.map(ToString::to_string),
    }
}

pub fn tick(jobs: &[(&str, &str)]) -> Tick {
    Ok(vec![page(jobs, None)])
}

struct State {
    ticks: VecDeque<Tick>,
    last: Option<Tick>,
    current: Tick,
    page_index: usize,
    requested_tokens: Vec<Option<String>>,
    snapshots_started: usize,
}

/// Replays a scripted sequence of snapshots; the last one repeats forever.
pub struct ScriptedProvider {
    build: Option<BuildInfo>,
    failing_page: Option<usize>,
    delay: Option<Duration>,
    build_delay: Option<Duration>,
    state: Mutex<State>,
}

impl ScriptedProvider {
    pub fn new(ticks: Vec<Tick>) -> Self {
        Self {
            build: Some(BuildInfo {
                id: "wf-123".to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                status: "running".to_string(),
            }),
            failing_page: None,
            delay: None,
            build_delay: None,
            state: Mutex::new(State {
                ticks: ticks.into(),
                last: None,
                current: Ok(Vec::new()),
                page_index: 0,
                requested_tokens: Vec::new(),
                snapshots_started: 0,
            }),
        }
    }

    pub fn with_failing_page(pages: Vec<JobPage>, failing_page: usize) -> Self {
        Self {
            failing_page: Some(failing_page),
            ..Self::new(vec![Ok(pages)])
        }
    }

    pub fn without_build(mut self) -> Self {
        self.build = None;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = Some(delay);
        self
    }

    pub fn requested_tokens(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().requested_tokens.clone()
    }

    pub fn snapshots_started(&self) -> usize {
        self.state.lock().unwrap().snapshots_started
    }
}

fn server_error() -> BuildEventsError {
    BuildEventsError::ApiError {
        status: 500,
        message: "scripted failure".to_string(),
    }
}

#[async_trait]
impl ProviderApi for ScriptedProvider {
    type Locator = String;

    fn name(&self) -> &'static str {
        "Scripted"
    }

    fn status_table(&self) -> StatusTable {
        circleci::status_table()
    }

    async fn get_build(&self, locator: &String) -> Result<BuildInfo> {
        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }

        self.build
            .clone()
            .ok_or_else(|| BuildEventsError::BuildNotFound(locator.clone()))
    }

    async fn list_jobs(&self, _locator: &String, page_token: Option<&str>) -> Result<JobPage> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.requested_tokens.push(page_token.map(ToString::to_string));

        if page_token.is_none() {
            let next = match state.ticks.pop_front() {
                Some(tick) => tick,
                None => state.last.clone().unwrap_or(Ok(Vec::new())),
            };
            state.last = Some(next.clone());
            state.current = next;
            state.page_index = 0;
            state.snapshots_started += 1;
        }

        let index = state.page_index;
        state.page_index += 1;

        if self.failing_page == Some(index) {
            return Err(server_error());
        }

        match &state.current {
            Ok(pages) => Ok(pages.get(index).cloned().unwrap_or_default()),
            Err(()) => Err(server_error()),
        }
    }
}
