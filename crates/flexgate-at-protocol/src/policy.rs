//! Retry policy tables.
//!
//! The reaction to each failure is data, not control flow: the command
//! executor looks up a [`ResponseOutcome`] in [`command_policy`], the binary
//! send loop looks up a [`SendFailure`] in [`SendFailure::rule`], and both
//! apply the resulting [`RetryRule`] the same way.
//!
//! | Outcome / stage     | Action          | Backoff | Recovery |
//! |---------------------|-----------------|---------|----------|
//! | `OK`                | succeed         | -       | -        |
//! | `DATA`              | return to caller| -       | -        |
//! | `ERROR`             | retry           | 500 ms  | none     |
//! | `TIMEOUT`           | retry           | 500 ms  | `AT` ping|
//! | `INVALID`           | retry           | 1000 ms | none     |
//! | send write failed   | next attempt    | 1 s     | none     |
//! | not ready           | next attempt    | 2 s     | none     |
//! | stream aborted      | next attempt    | 2 s     | none     |
//! | not confirmed       | next attempt    | 2 s     | none     |

use std::time::Duration;

use crate::responses::ResponseOutcome;

/// Extra step taken before a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Retry directly.
    None,
    /// Send a bare `AT`, read and discard its answer to resynchronise the device.
    Ping,
}

/// How to retry after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryRule {
    /// Pause before the next attempt.
    pub backoff: Duration,
    /// Recovery step run before the pause.
    pub recovery: Recovery,
}

impl RetryRule {
    const fn plain(backoff: Duration) -> Self {
        RetryRule {
            backoff,
            recovery: Recovery::None,
        }
    }
}

/// What the command executor does with an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    /// The command succeeded.
    Succeed,
    /// Hand the outcome back without retrying; the caller decides.
    ReturnToCaller,
    /// Retry when attempts remain, otherwise fail.
    Retry(RetryRule),
}

/// Backoff after an `ERROR` response.
pub const ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Backoff after a `TIMEOUT`, following the resync ping.
pub const TIMEOUT_BACKOFF: Duration = Duration::from_millis(500);

/// Backoff after an I/O failure.
pub const INVALID_BACKOFF: Duration = Duration::from_millis(1000);

/// Backoff after a failed `AT+SEND` write.
pub const SEND_WRITE_BACKOFF: Duration = Duration::from_secs(1);

/// Backoff after any other failed stage of the binary send.
pub const SEND_STAGE_BACKOFF: Duration = Duration::from_secs(2);

/// Policy for a single command exchange.
pub fn command_policy(outcome: ResponseOutcome) -> PolicyAction {
    match outcome {
        ResponseOutcome::Ok => PolicyAction::Succeed,
        ResponseOutcome::Data => PolicyAction::ReturnToCaller,
        ResponseOutcome::Error => PolicyAction::Retry(RetryRule::plain(ERROR_BACKOFF)),
        ResponseOutcome::Timeout => PolicyAction::Retry(RetryRule {
            backoff: TIMEOUT_BACKOFF,
            recovery: Recovery::Ping,
        }),
        ResponseOutcome::Invalid => PolicyAction::Retry(RetryRule::plain(INVALID_BACKOFF)),
    }
}

/// Stage at which one attempt of the binary send failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// Writing `AT+SEND=<n>` failed.
    WriteFailed,
    /// The device did not answer with `+SEND: READY`.
    NotReady,
    /// The chunk stream hit a write error or the time ceiling.
    StreamAborted,
    /// The final response after the settle period was not `OK`.
    NotConfirmed,
}

impl SendFailure {
    /// Retry rule for the outer send loop.
    pub fn rule(&self) -> RetryRule {
        match self {
            SendFailure::WriteFailed => RetryRule::plain(SEND_WRITE_BACKOFF),
            SendFailure::NotReady | SendFailure::StreamAborted | SendFailure::NotConfirmed => {
                RetryRule::plain(SEND_STAGE_BACKOFF)
            }
        }
    }

    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SendFailure::WriteFailed => "write failed",
            SendFailure::NotReady => "device not ready",
            SendFailure::StreamAborted => "stream aborted",
            SendFailure::NotConfirmed => "not confirmed",
        }
    }
}

impl std::fmt::Display for SendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_policy_table() {
        assert_eq!(command_policy(ResponseOutcome::Ok), PolicyAction::Succeed);
        assert_eq!(command_policy(ResponseOutcome::Data), PolicyAction::ReturnToCaller);
        assert_eq!(
            command_policy(ResponseOutcome::Error),
            PolicyAction::Retry(RetryRule {
                backoff: Duration::from_millis(500),
                recovery: Recovery::None
            })
        );
        assert_eq!(
            command_policy(ResponseOutcome::Timeout),
            PolicyAction::Retry(RetryRule {
                backoff: Duration::from_millis(500),
                recovery: Recovery::Ping
            })
        );
        assert_eq!(
            command_policy(ResponseOutcome::Invalid),
            PolicyAction::Retry(RetryRule {
                backoff: Duration::from_millis(1000),
                recovery: Recovery::None
            })
        );
    }

    #[test]
    fn test_send_failure_rules() {
        assert_eq!(SendFailure::WriteFailed.rule().backoff, Duration::from_secs(1));
        for stage in [
            SendFailure::NotReady,
            SendFailure::StreamAborted,
            SendFailure::NotConfirmed,
        ] {
            assert_eq!(stage.rule().backoff, Duration::from_secs(2));
            assert_eq!(stage.rule().recovery, Recovery::None);
        }
    }
}
