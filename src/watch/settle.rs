use chrono::{DateTime, Utc};

use super::types::Classification;

/// What a single poll tick produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Classified(Classification),
    /// Fetching the snapshot failed; nothing is known about this tick
    FetchFailed,
}

/// Outcome of feeding one [`Observation`] to the [`SettlePolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleDecision {
    /// Jobs are still running or queued; the confirmation counter was reset
    Active,
    /// The build looks done but needs more quiet ticks to be trusted
    Settling { checks_remaining: u32 },
    Finished {
        passed: bool,
        ended: DateTime<Utc>,
    },
}

/// Debounces "looks finished" into "is finished".
///
/// Providers often leave a gap between one stage ending and the next starting,
/// during which nothing is running. The policy only declares the build finished
/// after `confirmations` consecutive quiet ticks, and reports the time of the
/// first quiet tick of that streak as the end time.
#[derive(Debug, Clone)]
pub struct SettlePolicy {
    confirmations: u32,
    checks_remaining: u32,
    tentative_ended: Option<DateTime<Utc>>,
    failed_seen: bool,
    // Per-streak: whether any tick in the current quiet streak classified cleanly
    quiet_classified: bool,
    last_blocked: bool,
}

impl SettlePolicy {
    pub fn new(confirmations: u32) -> Self {
        let confirmations = confirmations.max(1);
        Self {
            confirmations,
            checks_remaining: confirmations,
            tentative_ended: None,
            failed_seen: false,
            quiet_classified: false,
            last_blocked: false,
        }
    }

    #[cfg(test)]
    pub fn checks_remaining(&self) -> u32 {
        self.checks_remaining
    }

    #[cfg(test)]
    pub fn tentative_ended(&self) -> Option<DateTime<Utc>> {
        self.tentative_ended
    }

    pub fn observe(&mut self, observation: Observation, now: DateTime<Utc>) -> SettleDecision {
        match observation {
            Observation::Classified(classification) => {
                self.failed_seen |= classification.any_failed;

                if !classification.finished {
                    self.reset();
                    return SettleDecision::Active;
                }

                let ended = *self.tentative_ended.get_or_insert(now);
                self.quiet_classified = true;
                self.last_blocked = classification.any_blocked;
                self.checks_remaining = self.checks_remaining.saturating_sub(1);

                // A failed job never recovers, no point waiting out the streak
                if classification.any_failed {
                    return SettleDecision::Finished {
                        passed: false,
                        ended,
                    };
                }

                self.settle_or_finish(ended)
            }
            Observation::FetchFailed => {
                self.checks_remaining = self.checks_remaining.saturating_sub(1);
                let ended = self.tentative_ended.unwrap_or(now);
                self.settle_or_finish(ended)
            }
        }
    }

    fn settle_or_finish(&self, ended: DateTime<Utc>) -> SettleDecision {
        if self.checks_remaining > 0 {
            return SettleDecision::Settling {
                checks_remaining: self.checks_remaining,
            };
        }

        SettleDecision::Finished {
            passed: self.quiet_classified && !self.failed_seen && !self.last_blocked,
            ended,
        }
    }

    fn reset(&mut self) {
        self.checks_remaining = self.confirmations;
        self.tentative_ended = None;
        self.quiet_classified = false;
        self.last_blocked = false;
    }
}
