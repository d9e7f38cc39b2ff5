//! Line assembly for AT responses.
//!
//! The device answers with `\n`-terminated lines. Carriage returns are
//! ignored, printable ASCII (32..=126) is accumulated, any other control byte
//! (below 32) is line noise that discards the partial line, and bytes from 127
//! up are dropped.
//!
//! The assembler is split into a pure transition function ([`step`]) and a
//! small buffer owner ([`LineAssembler`]) so the byte handling can be tested
//! without any I/O. The read timeout is tracked separately by [`ReadBudget`].

use bytes::BytesMut;

use crate::constants::{AT_BUFFER_SIZE, AT_TIMEOUT_MS, MAX_EMPTY_READS, POLL_SLICE};

/// Longest line the assembler keeps; further bytes are dropped.
pub const MAX_LINE_LENGTH: usize = AT_BUFFER_SIZE - 1;

/// Assembler state between bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssemblerState {
    /// Accumulating printable characters.
    #[default]
    ReadingLine,
    /// The previous byte was a carriage return.
    SawCr,
}

/// What to do with the current byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteAction {
    /// Append the byte to the line in progress.
    Append(u8),
    /// Drop the byte.
    Ignore,
    /// The line in progress is complete.
    EndLine,
    /// Discard the line in progress.
    Reset,
}

/// Pure transition function of the line assembler.
pub fn step(_state: AssemblerState, byte: u8) -> (AssemblerState, ByteAction) {
    match byte {
        b'\r' => (AssemblerState::SawCr, ByteAction::Ignore),
        b'\n' => (AssemblerState::ReadingLine, ByteAction::EndLine),
        32..=126 => (AssemblerState::ReadingLine, ByteAction::Append(byte)),
        0..=31 => (AssemblerState::ReadingLine, ByteAction::Reset),
        _ => (AssemblerState::ReadingLine, ByteAction::Ignore),
    }
}

/// A complete line produced by the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledLine {
    /// The line text, without terminator.
    pub text: String,
    /// Whether bytes were dropped because the line exceeded [`MAX_LINE_LENGTH`].
    pub truncated: bool,
}

/// Accumulates bytes into lines using [`step`].
#[derive(Debug)]
pub struct LineAssembler {
    state: AssemblerState,
    buffer: BytesMut,
    truncated: bool,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl LineAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        LineAssembler {
            state: AssemblerState::ReadingLine,
            buffer: BytesMut::with_capacity(AT_BUFFER_SIZE),
            truncated: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// Feed one byte. Returns a line when `\n` completes a non-empty one.
    pub fn push(&mut self, byte: u8) -> Option<AssembledLine> {
        let (next, action) = step(self.state, byte);
        self.state = next;

        match action {
            ByteAction::Append(b) => {
                if self.buffer.len() < MAX_LINE_LENGTH {
                    self.buffer.extend_from_slice(&[b]);
                } else {
                    self.truncated = true;
                }
                None
            }
            ByteAction::Ignore => None,
            ByteAction::Reset => {
                self.clear();
                None
            }
            ByteAction::EndLine => {
                if self.buffer.is_empty() {
                    self.truncated = false;
                    return None;
                }
                let data = self.buffer.split();
                let line = AssembledLine {
                    text: String::from_utf8_lossy(&data).into_owned(),
                    truncated: self.truncated,
                };
                self.truncated = false;
                Some(line)
            }
        }
    }

    /// Drop the line in progress.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.truncated = false;
    }
}

/// Timeout bookkeeping for one response read.
///
/// Each empty poll slice consumes [`POLL_SLICE`] from the budget and counts as
/// an empty read; each received byte refills the budget and clears the empty
/// read streak. The read is over once either the budget is spent or
/// [`MAX_EMPTY_READS`] consecutive slices came back empty, so the timeout is
/// measured from the last byte rather than from the start of the read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBudget {
    remaining_ms: u32,
    empty_reads: u32,
}

impl Default for ReadBudget {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadBudget {
    /// A full budget.
    pub fn new() -> Self {
        ReadBudget {
            remaining_ms: AT_TIMEOUT_MS,
            empty_reads: 0,
        }
    }

    /// Record a poll slice that produced no data.
    pub fn on_empty_slice(&mut self) {
        let slice = POLL_SLICE.as_millis() as u32;
        self.remaining_ms = self.remaining_ms.saturating_sub(slice);
        self.empty_reads += 1;
    }

    /// Record a received byte.
    pub fn on_byte(&mut self) {
        self.remaining_ms = AT_TIMEOUT_MS;
        self.empty_reads = 0;
    }

    /// Whether the read should give up.
    pub fn expired(&self) -> bool {
        self.remaining_ms == 0 || self.empty_reads >= MAX_EMPTY_READS
    }

    /// Milliseconds left before the budget runs out.
    pub fn remaining_ms(&self) -> u32 {
        self.remaining_ms
    }

    /// Current streak of empty slices.
    pub fn empty_reads(&self) -> u32 {
        self.empty_reads
    }
}
