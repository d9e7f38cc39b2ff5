//! Protocol constants
//!
//! Timing values and protocol markers used by the FLEX-FSK-TX AT interface.

use std::time::Duration;

// ============================================================================
// Response Reader
// ============================================================================

/// Maximum length of one assembled response line (including room for a terminator).
pub const AT_BUFFER_SIZE: usize = 1024;

/// Read budget in milliseconds, measured from the last byte received.
pub const AT_TIMEOUT_MS: u32 = 8000;

/// Length of one readability poll.
pub const POLL_SLICE: Duration = Duration::from_millis(50);

/// Consecutive empty poll slices after which the reader gives up.
pub const MAX_EMPTY_READS: u32 = 20;

// ============================================================================
// Command Executor
// ============================================================================

/// Default number of attempts for one command.
pub const AT_MAX_RETRIES: u32 = 5;

/// Settle delay after every command write, before reading the response.
pub const INTER_COMMAND_DELAY: Duration = Duration::from_millis(200);

/// Number of short reads performed after discarding the serial buffers.
pub const FLUSH_DRAIN_READS: usize = 10;

/// Delay between the short reads of the flush drain loop.
pub const FLUSH_DRAIN_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Device Initializer
// ============================================================================

/// Grace period for the device to finish booting before the first ping.
pub const BOOT_GRACE: Duration = Duration::from_secs(1);

/// Handshake attempts before the device is declared dead.
pub const INIT_ATTEMPTS: u32 = 10;

/// Pause before each ping (and before the confirming ping).
pub const INIT_PING_DELAY: Duration = Duration::from_millis(200);

/// Base unit of the escalating delay between failed handshake attempts.
pub const INIT_BACKOFF_STEP: Duration = Duration::from_millis(500);

// ============================================================================
// Binary Send
// ============================================================================

/// Attempts of the full arm → stream → confirm sequence.
pub const SEND_ATTEMPTS: u32 = 3;

/// Size of one binary payload chunk.
pub const CHUNK_SIZE: usize = 32;

/// Delay after each binary chunk.
pub const CHUNK_DELAY: Duration = Duration::from_millis(5);

/// Ceiling on the wall time spent streaming one payload.
pub const DATA_SEND_TIMEOUT: Duration = Duration::from_secs(20);

/// Time given to the device to key up and put the frame on the air.
pub const TRANSMIT_SETTLE: Duration = Duration::from_secs(5);

// ============================================================================
// Markers
// ============================================================================

/// Terminal success marker.
pub const MARKER_OK: &str = "OK";

/// Terminal failure marker.
pub const MARKER_ERROR: &str = "ERROR";

/// Prefix of a data line.
pub const DATA_PREFIX: char = '+';

/// Data line announcing that the device waits for binary payload bytes.
pub const SEND_READY_MARKER: &str = "+SEND: READY";

/// Substring of a device debug line.
pub const DEBUG_MARKER: &str = "DEBUG:";

/// Substring of the device boot banner.
pub const READY_BANNER: &str = "AT READY";

// ============================================================================
// Radio Limits
// ============================================================================

/// Lowest accepted transmit power level.
pub const MIN_POWER: u8 = 2;

/// Highest accepted transmit power level.
pub const MAX_POWER: u8 = 20;
