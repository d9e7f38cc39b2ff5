//! Device handshake.

use flexgate_at_protocol::{
    AtCommand, BOOT_GRACE, INIT_ATTEMPTS, INIT_BACKOFF_STEP, INIT_PING_DELAY,
};
use tracing::{debug, info, warn};

use crate::error::{DeviceError, DeviceResult};
use crate::executor::CommandExecutor;
use crate::port::AtPort;

/// Confirms the transmitter has booted and answers `AT` reliably.
#[derive(Debug, Clone)]
pub struct DeviceInitializer {
    executor: CommandExecutor,
    attempts: u32,
}

impl Default for DeviceInitializer {
    fn default() -> Self {
        Self::new(CommandExecutor::new())
    }
}

impl DeviceInitializer {
    /// Initializer using `executor` for its pings.
    pub fn new(executor: CommandExecutor) -> Self {
        DeviceInitializer {
            executor,
            attempts: INIT_ATTEMPTS,
        }
    }

    /// Run the handshake.
    ///
    /// Waits out the boot grace period, then pings with `AT` up to
    /// [`INIT_ATTEMPTS`] times. A successful ping is repeated once to confirm
    /// the link is stable. Failed attempts back off by
    /// `INIT_BACKOFF_STEP * attempt`.
    pub fn initialize<P: AtPort + ?Sized>(&self, port: &mut P) -> DeviceResult<()> {
        debug!("Initializer: waiting for device boot");
        if let Err(e) = port.flush_buffers() {
            debug!("Initializer: flush failed: {}", e);
        }
        port.pause(BOOT_GRACE);

        for attempt in 1..=self.attempts {
            debug!("Initializer: attempt {}/{}", attempt, self.attempts);
            if let Err(e) = port.flush_buffers() {
                debug!("Initializer: flush failed: {}", e);
            }
            port.pause(INIT_PING_DELAY);

            if self.ping(port) {
                port.pause(INIT_PING_DELAY);
                if self.ping(port) {
                    info!("Initializer: device responding (attempt {})", attempt);
                    return Ok(());
                }
                debug!("Initializer: confirmation ping failed");
            }

            if attempt < self.attempts {
                port.pause(INIT_BACKOFF_STEP * attempt);
            }
        }

        warn!("Initializer: no response after {} attempts", self.attempts);
        Err(DeviceError::InitializationFailed {
            attempts: self.attempts,
        })
    }

    fn ping<P: AtPort + ?Sized>(&self, port: &mut P) -> bool {
        match self.executor.execute_acknowledged(port, &AtCommand::Attention) {
            Ok(_) => true,
            Err(e) => {
                debug!("Initializer: ping failed: {}", e);
                false
            }
        }
    }
}
