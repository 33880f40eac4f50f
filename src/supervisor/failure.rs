use std::time::Duration;

/// Uptime below which an exit counts as a fast failure (spec §3 "Failure
/// counter").
pub const RESET_UPTIME_THRESHOLD: Duration = Duration::from_secs(30);

/// Not numerically specified in spec.md; decided and documented in
/// DESIGN.md.
pub const MIN_RECENT_FAILURES_FOR_LOG: u32 = 3;
pub const MAX_RECENT_FAILURES: u32 = 5;

/// What the run-loop should do after accounting for an exit (spec §4.C
/// run-loop failure-accounting step).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FailureOutcome {
    /// uptime was ≥ 30s; `recentFailures` reset to zero.
    Reset,
    /// A fast failure below the log-dump threshold.
    Counted { recent_failures: u32 },
    /// A fast failure at or above `MIN_RECENT_FAILURES_FOR_LOG`.
    ShouldDumpLog { recent_failures: u32 },
    /// A fast failure at or above `MAX_RECENT_FAILURES`: give up.
    ShouldGiveUp { recent_failures: u32 },
}

/// Per-role `recentFailures` accounting (spec §3, §4.C).
#[derive(Debug, Default, Clone, Copy)]
pub struct FailureCounter {
    recent_failures: u32,
}

impl FailureCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recent_failures(&self) -> u32 {
        self.recent_failures
    }

    pub fn record_exit(&mut self, uptime: Duration) -> FailureOutcome {
        if uptime >= RESET_UPTIME_THRESHOLD {
            self.recent_failures = 0;
            return FailureOutcome::Reset;
        }

        self.recent_failures += 1;
        if self.recent_failures >= MAX_RECENT_FAILURES {
            FailureOutcome::ShouldGiveUp {
                recent_failures: self.recent_failures,
            }
        } else if self.recent_failures >= MIN_RECENT_FAILURES_FOR_LOG {
            FailureOutcome::ShouldDumpLog {
                recent_failures: self.recent_failures,
            }
        } else {
            FailureOutcome::Counted {
                recent_failures: self.recent_failures,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_exit_resets_counter() {
        let mut counter = FailureCounter::new();
        counter.record_exit(Duration::from_secs(1));
        assert_eq!(counter.record_exit(Duration::from_secs(60)), FailureOutcome::Reset);
        assert_eq!(counter.recent_failures(), 0);
    }

    #[test]
    fn fast_exits_escalate_to_log_dump_then_give_up() {
        let mut counter = FailureCounter::new();
        let mut outcomes = Vec::new();
        for _ in 0..MAX_RECENT_FAILURES {
            outcomes.push(counter.record_exit(Duration::from_millis(100)));
        }

        assert_eq!(
            outcomes[MIN_RECENT_FAILURES_FOR_LOG as usize - 1],
            FailureOutcome::ShouldDumpLog {
                recent_failures: MIN_RECENT_FAILURES_FOR_LOG
            }
        );
        assert_eq!(
            outcomes[MAX_RECENT_FAILURES as usize - 1],
            FailureOutcome::ShouldGiveUp {
                recent_failures: MAX_RECENT_FAILURES
            }
        );
    }
}
