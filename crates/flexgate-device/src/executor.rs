//! Command execution with outcome-specific retries.

use flexgate_at_protocol::{
    command_policy, AtCommand, AtError, AtResponse, PolicyAction, Recovery, ResponseOutcome,
    AT_MAX_RETRIES, INTER_COMMAND_DELAY,
};
use flexgate_metrics::{metric_defs, metrics};
use tracing::{debug, trace, warn};

use crate::error::{DeviceError, DeviceResult};
use crate::port::AtPort;
use crate::reader::read_response;

/// Successful result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// The device answered `OK`, possibly after a data line.
    Acknowledged {
        /// Data line seen before the `OK`.
        data_line: Option<String>,
    },
    /// The device sent a data line but no terminal marker. Callers that only
    /// want the value may accept this; callers that need an acknowledgement
    /// must not.
    Data(String),
}

/// Sends commands and applies the retry policy table.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    max_attempts: u32,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor {
    /// Executor with the default attempt count.
    pub fn new() -> Self {
        Self::with_max_attempts(AT_MAX_RETRIES)
    }

    /// Executor with a custom attempt count (at least one).
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        CommandExecutor {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Execute `command`, retrying according to the policy table.
    ///
    /// A failed write returns immediately; exhausted retries return
    /// [`AtError::RetriesExhausted`].
    pub fn execute<P: AtPort + ?Sized>(
        &self,
        port: &mut P,
        command: &AtCommand,
    ) -> DeviceResult<Exchange> {
        let text = command.to_command_string();
        let mut last = ResponseOutcome::Timeout;

        for attempt in 1..=self.max_attempts {
            let response = self.exchange(port, command)?;
            last = response.outcome;

            match command_policy(response.outcome) {
                PolicyAction::Succeed => {
                    return Ok(Exchange::Acknowledged {
                        data_line: response.data_line,
                    })
                }
                PolicyAction::ReturnToCaller => {
                    return Ok(Exchange::Data(response.data_line.unwrap_or_default()))
                }
                PolicyAction::Retry(rule) => {
                    let left = self.max_attempts - attempt;
                    if left == 0 {
                        break;
                    }
                    debug!(
                        "AT '{}': {} (attempt {}/{}, {} left)",
                        text, response.outcome, attempt, self.max_attempts, left
                    );
                    metrics::counter!(
                        metric_defs::AT_RETRIES.name,
                        "outcome" => response.outcome.as_str()
                    )
                    .increment(1);
                    if rule.recovery == Recovery::Ping {
                        self.ping(port);
                    }
                    port.pause(rule.backoff);
                }
            }
        }

        warn!("AT '{}' failed after {} attempts: {}", text, self.max_attempts, last);
        Err(AtError::RetriesExhausted {
            command: text,
            attempts: self.max_attempts,
            outcome: last,
        }
        .into())
    }

    /// Execute `command` and require a terminal `OK`.
    pub fn execute_acknowledged<P: AtPort + ?Sized>(
        &self,
        port: &mut P,
        command: &AtCommand,
    ) -> DeviceResult<Option<String>> {
        match self.execute(port, command)? {
            Exchange::Acknowledged { data_line } => Ok(data_line),
            Exchange::Data(_) => Err(AtError::UnexpectedResponse {
                command: command.to_command_string(),
                outcome: ResponseOutcome::Data,
            }
            .into()),
        }
    }

    /// Send a bare `AT` and discard whatever comes back.
    pub fn ping<P: AtPort + ?Sized>(&self, port: &mut P) {
        match self.exchange(port, &AtCommand::Attention) {
            Ok(response) => trace!("AT ping: {}", response.outcome),
            Err(e) => debug!("AT ping failed: {}", e),
        }
    }

    /// One attempt: flush, write, drain, settle, read.
    fn exchange<P: AtPort + ?Sized>(
        &self,
        port: &mut P,
        command: &AtCommand,
    ) -> DeviceResult<AtResponse> {
        if let Err(e) = port.flush_buffers() {
            debug!("AT flush failed: {}", e);
        }

        debug!("AT -> {}", command);
        port.write_all(&command.encode()).map_err(DeviceError::Io)?;
        if let Err(e) = port.drain() {
            debug!("AT drain failed: {}", e);
        }
        port.pause(INTER_COMMAND_DELAY);

        Ok(read_response(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedPort;
    use std::time::Duration;

    fn power() -> AtCommand {
        AtCommand::SetPower { level: 10 }
    }

    #[test]
    fn test_ok_first_try() {
        let mut port = ScriptedPort::responsive();
        let log = port.handle();
        let exchange = CommandExecutor::new().execute(&mut port, &power()).unwrap();
        assert_eq!(exchange, Exchange::Acknowledged { data_line: None });
        assert_eq!(log.commands(), vec!["AT+POWER=10"]);
        assert_eq!(log.pauses(), vec![INTER_COMMAND_DELAY]);
    }

    #[test]
    fn test_always_error_exhausts_attempts() {
        let mut port = ScriptedPort::with_responder(|_| Some(b"ERROR\r\n".to_vec()));
        let log = port.handle();
        let err = CommandExecutor::new().execute(&mut port, &power()).unwrap_err();

        assert!(matches!(
            err,
            DeviceError::Command(AtError::RetriesExhausted {
                attempts: 5,
                outcome: ResponseOutcome::Error,
                ..
            })
        ));
        assert_eq!(log.count_command("AT+POWER=10"), 5);

        let backoffs: Vec<_> = log
            .pauses()
            .into_iter()
            .filter(|d| *d == Duration::from_millis(500))
            .collect();
        assert_eq!(backoffs.len(), 4);
        assert_eq!(log.pauses().len(), 5 + 4);
    }

    #[test]
    fn test_timeout_pings_before_retry() {
        let mut replies = vec![None, Some(b"OK\r\n".to_vec()), Some(b"OK\r\n".to_vec())].into_iter();
        let mut port = ScriptedPort::with_responder(move |_| replies.next().flatten());
        let log = port.handle();

        CommandExecutor::new().execute(&mut port, &power()).unwrap();
        assert_eq!(log.commands(), vec!["AT+POWER=10", "AT", "AT+POWER=10"]);
        assert!(log.pauses().contains(&Duration::from_millis(500)));
    }

    #[test]
    fn test_invalid_backs_off_one_second() {
        let mut port = ScriptedPort::responsive();
        port.fail_reads();
        let log = port.handle();
        let err = CommandExecutor::with_max_attempts(2)
            .execute(&mut port, &power())
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Command(AtError::RetriesExhausted {
                outcome: ResponseOutcome::Invalid,
                ..
            })
        ));
        assert!(log.pauses().contains(&Duration::from_millis(1000)));
    }

    #[test]
    fn test_data_returned_to_caller() {
        let mut port = ScriptedPort::with_responder(|_| Some(b"+FREQ: 916.0000\r\n".to_vec()));
        let executor = CommandExecutor::new();
        let cmd = AtCommand::Raw("AT+FREQ?".into());

        let exchange = executor.execute(&mut port, &cmd).unwrap();
        assert_eq!(exchange, Exchange::Data("+FREQ: 916.0000".into()));

        let err = executor.execute_acknowledged(&mut port, &cmd).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Command(AtError::UnexpectedResponse { .. })
        ));
    }

    #[test]
    fn test_data_then_ok_is_acknowledged() {
        let mut port = ScriptedPort::with_responder(|_| Some(b"+FREQ: 916.0000\r\nOK\r\n".to_vec()));
        let data = CommandExecutor::new()
            .execute_acknowledged(&mut port, &AtCommand::Raw("AT+FREQ?".into()))
            .unwrap();
        assert_eq!(data.as_deref(), Some("+FREQ: 916.0000"));
    }

    #[test]
    fn test_write_failure_returns_immediately() {
        let mut port = ScriptedPort::responsive();
        port.fail_writes();
        let log = port.handle();
        let err = CommandExecutor::new().execute(&mut port, &power()).unwrap_err();
        assert!(matches!(err, DeviceError::Io(_)));
        assert!(log.pauses().is_empty());
    }
}
