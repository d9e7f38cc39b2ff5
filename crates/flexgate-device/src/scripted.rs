//! In-memory transmitter for tests.
//!
//! [`ScriptedPort`] parses the command lines written to it, answers through a
//! responder closure, and emulates the binary phase of `AT+SEND`: once a reply
//! containing `+SEND: READY` has been queued, the next `n` written bytes are
//! collected as a payload and answered with the payload reply (`OK` by default).
//!
//! Pauses are recorded rather than slept, so protocol timing can be asserted
//! without waiting for it. The port keeps a virtual clock for
//! [`AtPort::now`] that advances by every pause and by the optional per-write
//! delay.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flexgate_at_protocol::SEND_READY_MARKER;
use parking_lot::Mutex;

use crate::port::AtPort;

/// Produces the device's reply to a command line (without terminator).
pub type Responder = Box<dyn FnMut(&str) -> Option<Vec<u8>> + Send>;

/// Everything a [`ScriptedPort`] observed.
#[derive(Debug, Clone, Default)]
struct ScriptLog {
    /// Command lines, in order.
    commands: Vec<String>,
    /// Binary payloads received after `AT+SEND`.
    payloads: Vec<Vec<u8>>,
    /// Requested pauses, in order.
    pauses: Vec<Duration>,
    /// Number of buffer discards.
    discards: usize,
}

/// Shared view of what a [`ScriptedPort`] observed, usable after the port has
/// been moved.
#[derive(Debug, Clone, Default)]
pub struct ScriptHandle(Arc<Mutex<ScriptLog>>);

impl ScriptHandle {
    /// Command lines written so far.
    pub fn commands(&self) -> Vec<String> {
        self.0.lock().commands.clone()
    }

    /// How many times exactly `command` was written.
    pub fn count_command(&self, command: &str) -> usize {
        self.0.lock().commands.iter().filter(|c| *c == command).count()
    }

    /// Payloads received so far.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.0.lock().payloads.clone()
    }

    /// Pauses requested so far.
    pub fn pauses(&self) -> Vec<Duration> {
        self.0.lock().pauses.clone()
    }

    /// Sum of all pauses.
    pub fn total_paused(&self) -> Duration {
        self.0.lock().pauses.iter().sum()
    }

    /// Whether the port saw any traffic at all.
    pub fn is_untouched(&self) -> bool {
        let log = self.0.lock();
        log.commands.is_empty() && log.payloads.is_empty() && log.discards == 0
    }
}

struct BinaryPhase {
    expected: usize,
    received: Vec<u8>,
}

/// A scripted, in-memory [`AtPort`].
pub struct ScriptedPort {
    responder: Responder,
    payload_reply: Vec<u8>,
    pending: VecDeque<u8>,
    line: Vec<u8>,
    binary: Option<BinaryPhase>,
    fail_reads: bool,
    fail_writes: bool,
    drop_payload_after: Option<usize>,
    write_delay: Duration,
    origin: Instant,
    elapsed: Duration,
    log: ScriptHandle,
}

impl std::fmt::Debug for ScriptedPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedPort")
            .field("pending", &self.pending.len())
            .field("binary", &self.binary.as_ref().map(|b| b.expected))
            .finish()
    }
}

impl ScriptedPort {
    /// A device whose replies come from `responder`.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&str) -> Option<Vec<u8>> + Send + 'static,
    {
        ScriptedPort {
            responder: Box::new(responder),
            payload_reply: b"OK\r\n".to_vec(),
            pending: VecDeque::new(),
            line: Vec::new(),
            binary: None,
            fail_reads: false,
            fail_writes: false,
            drop_payload_after: None,
            write_delay: Duration::ZERO,
            origin: Instant::now(),
            elapsed: Duration::ZERO,
            log: ScriptHandle::default(),
        }
    }

    /// A healthy device: `OK` to everything, `+SEND: READY` to `AT+SEND`.
    pub fn responsive() -> Self {
        Self::with_responder(|line| {
            if line.starts_with("AT+SEND=") {
                Some(format!("{}\r\n", SEND_READY_MARKER).into_bytes())
            } else {
                Some(b"OK\r\n".to_vec())
            }
        })
    }

    /// A device that never answers.
    pub fn silent() -> Self {
        Self::with_responder(|_| None)
    }

    /// Reply sent once a full payload has been received.
    pub fn with_payload_reply(mut self, reply: &[u8]) -> Self {
        self.payload_reply = reply.to_vec();
        self
    }

    /// Drop the link once `bytes` bytes of the next payload have arrived: the
    /// write fails and the device abandons that payload. Happens once.
    pub fn drop_payload_after(mut self, bytes: usize) -> Self {
        self.drop_payload_after = Some(bytes);
        self
    }

    /// Let every write take `delay` on the virtual clock.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Make every poll and read fail.
    pub fn fail_reads(&mut self) {
        self.fail_reads = true;
    }

    /// Make every write fail.
    pub fn fail_writes(&mut self) {
        self.fail_writes = true;
    }

    /// Queue unsolicited bytes for reading.
    pub fn inject(&mut self, data: &[u8]) {
        self.pending.extend(data);
    }

    /// Handle to the observation log.
    pub fn handle(&self) -> ScriptHandle {
        self.log.clone()
    }

    fn payload_cut_due(&self) -> bool {
        match (self.drop_payload_after, self.binary.as_ref()) {
            (Some(limit), Some(phase)) => phase.received.len() >= limit,
            _ => false,
        }
    }

    fn accept_byte(&mut self, byte: u8) {
        if let Some(phase) = self.binary.as_mut() {
            phase.received.push(byte);
            if phase.received.len() == phase.expected {
                let payload = std::mem::take(&mut phase.received);
                self.binary = None;
                self.log.0.lock().payloads.push(payload);
                self.pending.extend(self.payload_reply.iter().copied());
            }
            return;
        }

        if byte != b'\n' {
            self.line.push(byte);
            return;
        }

        let raw = std::mem::take(&mut self.line);
        let command = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
        self.log.0.lock().commands.push(command.clone());

        if let Some(reply) = (self.responder)(&command) {
            let ready = String::from_utf8_lossy(&reply).contains(SEND_READY_MARKER);
            self.pending.extend(reply);
            if ready {
                let expected = command
                    .strip_prefix("AT+SEND=")
                    .and_then(|n| n.parse::<usize>().ok())
                    .unwrap_or(0);
                if expected > 0 {
                    self.binary = Some(BinaryPhase {
                        expected,
                        received: Vec::with_capacity(expected),
                    });
                }
            }
        }
    }
}

impl AtPort for ScriptedPort {
    fn poll_readable(&mut self, _timeout: Duration) -> io::Result<bool> {
        if self.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted read failure"));
        }
        Ok(!self.pending.is_empty())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted read failure"));
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted write failure"));
        }
        self.elapsed += self.write_delay;
        for &byte in data {
            if self.payload_cut_due() {
                self.drop_payload_after = None;
                self.binary = None;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted link dropped"));
            }
            self.accept_byte(byte);
        }
        Ok(data.len())
    }

    fn drain(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn discard_buffers(&mut self) -> io::Result<()> {
        self.pending.clear();
        self.log.0.lock().discards += 1;
        Ok(())
    }

    fn pause(&mut self, duration: Duration) {
        self.elapsed += duration;
        self.log.0.lock().pauses.push(duration);
    }

    fn now(&self) -> Instant {
        self.origin + self.elapsed
    }
}
