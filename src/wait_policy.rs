//! How the server simulates work.
//!
//! A [`WaitPolicy`] either sleeps once for the whole duration without ever
//! looking at the cancellation token (`Coarse`), or splits the duration into
//! checkpointed sub-intervals (`Fine`). The checkpoint density bounds how long
//! a cancellation can go unnoticed: the whole duration for `Coarse`, one
//! sub-interval for `Fine`.

use std::time::Duration;

use tokio::time::sleep;

use crate::{log_debug, CancellationToken};

/// Default distance between cancellation checkpoints of a fine wait.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Result of running a [`WaitPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration elapsed.
    Completed,
    /// A checkpoint observed a cancellation request.
    Cancelled,
}

/// How the server spends a call's simulated work.
///
/// `Coarse` never observes the token until the work is over; `Fine` checks it
/// between sub-intervals and can stop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// One uninterruptible sleep covering `total`.
    Coarse { total: Duration },
    /// `total` split into sub-intervals no longer than `interval`, with a
    /// cancellation check after each.
    Fine { total: Duration, interval: Duration },
}

impl WaitPolicy {
    pub fn coarse(total: Duration) -> Self {
        Self::Coarse { total }
    }

    /// Fine wait with [`DEFAULT_CHECK_INTERVAL`].
    pub fn fine(total: Duration) -> Self {
        Self::fine_with_interval(total, DEFAULT_CHECK_INTERVAL)
    }

    /// Fine wait with an explicit checkpoint interval. A zero interval falls
    /// back to the default rather than spinning.
    pub fn fine_with_interval(total: Duration, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_CHECK_INTERVAL
        } else {
            interval
        };
        Self::Fine { total, interval }
    }

    /// Policy for a request's `interruptible` flag.
    pub fn for_request(interruptible: bool, total: Duration, interval: Duration) -> Self {
        if interruptible {
            Self::fine_with_interval(total, interval)
        } else {
            Self::coarse(total)
        }
    }

    pub fn total(&self) -> Duration {
        match *self {
            Self::Coarse { total } | Self::Fine { total, .. } => total,
        }
    }

    /// Number of cancellation checks the policy performs when not cancelled.
    /// Zero for `Coarse`; at least one for `Fine`.
    pub fn checkpoints(&self) -> u32 {
        match *self {
            Self::Coarse { .. } => 0,
            Self::Fine { total, interval } => {
                let k = total.as_nanos().div_ceil(interval.as_nanos().max(1));
                k.clamp(1, u32::MAX as u128) as u32
            }
        }
    }

    /// Longest stretch during which a cancellation request goes unobserved.
    pub fn max_cancel_latency(&self) -> Duration {
        match *self {
            Self::Coarse { total } => total,
            Self::Fine { total, .. } => total / self.checkpoints(),
        }
    }

    /// Execute the wait, consulting `token` at the policy's checkpoints.
    ///
    /// This never marks the token; the caller records whether the
    /// cancellation was honored or ignored.
    pub async fn run(&self, token: &CancellationToken) -> WaitOutcome {
        match *self {
            Self::Coarse { total } => {
                sleep(total).await;
                WaitOutcome::Completed
            }
            Self::Fine { total, .. } => {
                let k = self.checkpoints();
                let step = total / k;
                let mut elapsed = Duration::ZERO;

                for i in 1..=k {
                    // last step absorbs the division remainder
                    let this_step = if i == k { total - elapsed } else { step };
                    sleep(this_step).await;
                    elapsed += this_step;

                    if token.is_cancel_requested() {
                        log_debug!("cancellation observed at checkpoint {i}/{k} ({elapsed:?})");
                        return WaitOutcome::Cancelled;
                    }
                    log_debug!("checkpoint {i}/{k}: {elapsed:?} of {total:?} done");
                }
                WaitOutcome::Completed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use tokio::time::Instant;

    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "elapsed {elapsed:?}, expected {expected:?}"
        );
    }

    fn cancel_after(token: &CancellationToken, after: Duration) {
        let token = token.clone();
        tokio::spawn(async move {
            sleep(after).await;
            token.request_cancel();
        });
    }

    #[test]
    fn test_checkpoint_count() {
        // ---
        let total = Duration::from_secs(1);
        assert_eq!(WaitPolicy::coarse(total).checkpoints(), 0);
        assert_eq!(WaitPolicy::fine(total).checkpoints(), 10);
        assert_eq!(
            WaitPolicy::fine_with_interval(total, Duration::from_millis(300)).checkpoints(),
            4
        );
    }

    #[test]
    fn test_interval_larger_than_total_degenerates_to_one_check() {
        // ---
        let total = Duration::from_millis(500);
        let policy = WaitPolicy::fine_with_interval(total, Duration::from_secs(5));
        assert_eq!(policy.checkpoints(), 1);
        assert_eq!(policy.max_cancel_latency(), WaitPolicy::coarse(total).max_cancel_latency());
    }

    #[test]
    fn test_zero_interval_uses_default() {
        // ---
        let policy = WaitPolicy::fine_with_interval(Duration::from_secs(1), Duration::ZERO);
        assert_eq!(
            policy,
            WaitPolicy::Fine {
                total: Duration::from_secs(1),
                interval: DEFAULT_CHECK_INTERVAL
            }
        );
    }

    #[test]
    fn test_for_request_selects_by_flag() {
        // ---
        let total = Duration::from_secs(2);
        assert!(matches!(
            WaitPolicy::for_request(false, total, DEFAULT_CHECK_INTERVAL),
            WaitPolicy::Coarse { .. }
        ));
        assert!(matches!(
            WaitPolicy::for_request(true, total, DEFAULT_CHECK_INTERVAL),
            WaitPolicy::Fine { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_coarse_ignores_cancellation() {
        // ---
        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_millis(250));

        let start = Instant::now();
        let outcome = WaitPolicy::coarse(Duration::from_secs(1)).run(&token).await;

        assert_eq!(outcome, WaitOutcome::Completed);
        assert_elapsed(start, Duration::from_secs(1));
        assert!(token.is_cancel_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fine_observes_cancellation_at_next_checkpoint() {
        // ---
        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_millis(250));

        let start = Instant::now();
        let outcome = WaitPolicy::fine(Duration::from_secs(1)).run(&token).await;

        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert_elapsed(start, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fine_without_cancellation_runs_full_duration() {
        // ---
        let token = CancellationToken::new();
        let total = Duration::from_secs(1);
        let policy = WaitPolicy::fine_with_interval(total, Duration::from_millis(300));

        let start = Instant::now();
        let outcome = policy.run(&token).await;

        assert_eq!(outcome, WaitOutcome::Completed);
        assert_elapsed(start, total);
    }
}
