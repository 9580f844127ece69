use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::auth::Token;
use crate::error::{BuildEventsError, Result};
use crate::output::WatchProgress;
use crate::providers::ProviderApi;

use super::classifier::Classifier;
use super::fetcher::SnapshotFetcher;
use super::settle::{Observation, SettleDecision, SettlePolicy};
use super::summary::summarize;
use super::types::{Verdict, WatchConfig, WatchOutcome};

/// Polls a provider until a build settles or the timeout elapses.
///
/// Two alarms drive a watch: the poll ticker, which runs one
/// fetch → classify → settle cycle per tick, and the overall deadline. Ticks
/// never overlap, so the settle state has a single writer. When the deadline
/// fires first, the in-flight poll is dropped and the watch reports a timeout.
pub struct Watcher<P> {
    fetcher: SnapshotFetcher<P>,
    classifier: Classifier,
    config: WatchConfig,
}

impl<P: ProviderApi> Watcher<P> {
    pub fn new(client: P, config: WatchConfig) -> Self {
        let classifier = Classifier::new(client.status_table());

        Self {
            fetcher: SnapshotFetcher::new(client),
            classifier,
            config,
        }
    }

    /// Waits for the build identified by `locator` to finish.
    ///
    /// The deadline starts before the build metadata is fetched, so a hung
    /// provider cannot stretch the watch past its timeout.
    ///
    /// # Errors
    ///
    /// Only setup problems are errors: a missing credential, or a build that
    /// cannot be fetched at all within the fetch timeout. Failed builds, flaky
    /// polls and timeouts are reported through the returned [`WatchOutcome`].
    pub async fn watch(&self, locator: &P::Locator) -> Result<WatchOutcome> {
        let provider = self.fetcher.client().name();

        if self.config.credential.as_ref().map_or(true, Token::is_empty) {
            return Err(BuildEventsError::MissingCredential { provider });
        }

        let wall_start = Utc::now();
        let deadline = deadline_after(self.config.timeout);
        let target = format!("{provider} build {locator}");

        let build = tokio::select! {
            fetched = time::timeout(self.config.fetch_timeout, self.fetcher.fetch_build(locator)) => {
                fetched.map_err(|_| {
                    BuildEventsError::Timeout(format!(
                        "after {:?} fetching {target}",
                        self.config.fetch_timeout
                    ))
                })??
            }
            () = time::sleep_until(deadline) => {
                let outcome = self.timed_out(locator, wall_start, wall_start);
                WatchProgress::start(&target).finish(outcome.verdict);
                return Ok(outcome);
            }
        };

        let started = build.created_at;
        info!(
            "Watching {provider} build {} (status: {}), started at {started}",
            build.id, build.status
        );

        let progress = WatchProgress::start(&target);

        let outcome = tokio::select! {
            (passed, ended) = self.poll_until_settled(locator, &progress) => WatchOutcome {
                verdict: if passed { Verdict::Passed } else { Verdict::Failed },
                started,
                ended,
            },
            () = time::sleep_until(deadline) => self.timed_out(locator, started, wall_start),
        };

        progress.finish(outcome.verdict);
        Ok(outcome)
    }

    /// The end time is the wall-clock start plus the timeout, not the moment
    /// the deadline task happened to run.
    fn timed_out(
        &self,
        locator: &P::Locator,
        started: DateTime<Utc>,
        wall_start: DateTime<Utc>,
    ) -> WatchOutcome {
        warn!("Timed out after {:?} waiting for {locator}", self.config.timeout);

        let ended = chrono::Duration::from_std(self.config.timeout)
            .ok()
            .and_then(|timeout| wall_start.checked_add_signed(timeout))
            .unwrap_or_else(Utc::now);

        WatchOutcome {
            verdict: Verdict::TimedOut,
            started,
            ended,
        }
    }

    async fn poll_until_settled(
        &self,
        locator: &P::Locator,
        progress: &WatchProgress,
    ) -> (bool, DateTime<Utc>) {
        let mut settle = SettlePolicy::new(self.config.confirmations);
        let mut ticker = time::interval_at(
            Instant::now() + self.config.poll_interval,
            self.config.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let observation = self.poll_once(locator, progress).await;
            match settle.observe(observation, Utc::now()) {
                SettleDecision::Active => debug!("Build still running"),
                SettleDecision::Settling { checks_remaining } => {
                    if observation == Observation::FetchFailed {
                        progress.println(format!(
                            "Querying the {} API failed; trying {checks_remaining} more times before giving up.",
                            self.fetcher.client().name()
                        ));
                    } else {
                        progress.println(format!(
                            "Build appears finished; checking {checks_remaining} more times to make sure."
                        ));
                    }
                }
                SettleDecision::Finished { passed, ended } => return (passed, ended),
            }
        }
    }

    async fn poll_once(&self, locator: &P::Locator, progress: &WatchProgress) -> Observation {
        let prefix = format!(
            "{}: polling for jobs: ",
            Utc::now().format("%b %e %H:%M:%S%.3f")
        );

        match time::timeout(self.config.fetch_timeout, self.fetcher.fetch_jobs(locator)).await {
            Ok(Ok(jobs)) => {
                progress.set_status(&summarize(&jobs));
                progress.println(format!("{prefix}{}", summarize(&jobs)));
                Observation::Classified(
                    self.classifier
                        .classify(&jobs, self.config.self_job.as_deref()),
                )
            }
            Ok(Err(e)) => {
                warn!("Polling {locator} failed: {e}");
                progress.println(format!("{prefix}error polling: {e}"));
                Observation::FetchFailed
            }
            Err(_) => {
                warn!(
                    "Polling {locator} took longer than {:?}; abandoning this tick",
                    self.config.fetch_timeout
                );
                progress.println(format!("{prefix}error polling: request timed out"));
                Observation::FetchFailed
            }
        }
    }
}

/// Stand-in deadline for timeouts too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}
