//! Server-side handler of the sum call.

use std::time::Duration;

use crate::{
    // ---
    log_debug,
    log_info,
    CancelState,
    CancellationToken,
    SumRequest,
    SumResponse,
    WaitOutcome,
    WaitPolicy,
    DEFAULT_CHECK_INTERVAL,
};

/// Computes `operand_a + operand_b` after simulating `work_duration` of work.
///
/// Stateless apart from its configuration; one instance serves every call.
#[derive(Debug, Clone)]
pub struct SumService {
    work_duration: Duration,
    check_interval: Duration,
}

impl SumService {
    pub fn new(work_duration: Duration, check_interval: Duration) -> Self {
        Self {
            work_duration,
            check_interval,
        }
    }

    /// Wait policy a request runs under.
    pub fn policy_for(&self, request: &SumRequest) -> WaitPolicy {
        WaitPolicy::for_request(request.interruptible, self.work_duration, self.check_interval)
    }

    /// Handle one call.
    ///
    /// Operands are validated before any waiting: a sum that does not fit in
    /// an i64 is rejected as an invalid argument instead of wrapping. The
    /// token is left in a terminal state when this returns.
    pub async fn handle(&self, request: &SumRequest, token: &CancellationToken) -> SumResponse {
        // ---
        let Some(sum) = request.operand_a.checked_add(request.operand_b) else {
            log_info!("call {}: operands overflow i64", request.call_id);
            token.mark_completed();
            return SumResponse::invalid_argument(format!(
                "{} + {} overflows a 64-bit integer",
                request.operand_a, request.operand_b
            ));
        };

        let policy = self.policy_for(request);
        log_debug!("call {}: running {policy:?}", request.call_id);

        match policy.run(token).await {
            WaitOutcome::Cancelled => {
                token.mark_honored();
                log_info!("call {}: cancellation honored", request.call_id);
                SumResponse::Cancelled
            }
            WaitOutcome::Completed => {
                if token.mark_completed() == CancelState::Ignored {
                    log_info!(
                        "call {}: cancellation arrived during an uninterruptible wait, result delivered",
                        request.call_id
                    );
                }
                log_info!("call {}: final result {sum}", request.call_id);
                SumResponse::Ok { result: sum }
            }
        }
    }
}

impl Default for SumService {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), DEFAULT_CHECK_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn service() -> SumService {
        SumService::new(Duration::from_secs(1), Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_sum_without_cancellation() {
        // ---
        let token = CancellationToken::new();
        let req = SumRequest::new(100000, 200000, true);

        let resp = service().handle(&req, &token).await;

        assert_eq!(resp, SumResponse::Ok { result: 300000 });
        assert_eq!(token.state(), CancelState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start_is_honored_by_fine_wait() {
        // ---
        let token = CancellationToken::new();
        token.request_cancel();
        let req = SumRequest::new(100000, 200000, true);

        let resp = service().handle(&req, &token).await;

        assert_eq!(resp, SumResponse::Cancelled);
        assert_eq!(token.state(), CancelState::Honored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start_is_ignored_by_coarse_wait() {
        // ---
        let token = CancellationToken::new();
        token.request_cancel();
        let req = SumRequest::new(100000, 200000, false);

        let resp = service().handle(&req, &token).await;

        assert_eq!(resp, SumResponse::Ok { result: 300000 });
        assert_eq!(token.state(), CancelState::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_is_invalid_argument() {
        // ---
        let token = CancellationToken::new();
        let req = SumRequest::new(i64::MAX, 1, false);

        let resp = service().handle(&req, &token).await;

        assert!(matches!(resp, SumResponse::Error { .. }));
        assert!(token.state().is_terminal());
    }
}
