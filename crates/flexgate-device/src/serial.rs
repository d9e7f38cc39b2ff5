//! Serial transport over a POSIX tty.
//!
//! The link is opened exclusively (`TIOCEXCL`), without becoming the
//! controlling terminal, with synchronous writes. It is put in raw 8N1 mode
//! with no flow control, `VMIN = 0` and a 500 ms inter-byte timeout. The
//! terminal settings found at open are restored when the link is dropped.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{
    cfmakeraw, cfsetspeed, tcdrain, tcflush, tcgetattr, tcsetattr, BaudRate, ControlFlags,
    FlushArg, InputFlags, SetArg, SpecialCharacterIndices, Termios,
};
use tracing::{debug, warn};

use crate::error::{DeviceError, DeviceResult};
use crate::port::AtPort;

/// Baud rates the transmitter firmware supports.
pub const SUPPORTED_BAUD_RATES: [u32; 6] = [9600, 19200, 38400, 57600, 115200, 230400];

/// Inter-byte read timeout in tenths of a second.
const READ_TIMEOUT_DECISECONDS: u8 = 5;

/// Whether `baud` is in [`SUPPORTED_BAUD_RATES`].
pub fn is_supported_baud_rate(baud: u32) -> bool {
    SUPPORTED_BAUD_RATES.contains(&baud)
}

fn baud_rate(baud: u32) -> DeviceResult<BaudRate> {
    match baud {
        9600 => Ok(BaudRate::B9600),
        19200 => Ok(BaudRate::B19200),
        38400 => Ok(BaudRate::B38400),
        57600 => Ok(BaudRate::B57600),
        115200 => Ok(BaudRate::B115200),
        230400 => Ok(BaudRate::B230400),
        other => Err(DeviceError::UnsupportedBaudRate(other)),
    }
}

/// An exclusively owned, configured serial link.
#[derive(Debug)]
pub struct SerialLink {
    file: File,
    saved: Option<Termios>,
    baud: u32,
    path: String,
}

impl SerialLink {
    /// Open and configure `path` at `baud`.
    pub fn open(path: &str, baud: u32) -> DeviceResult<Self> {
        let speed = baud_rate(baud)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_SYNC)
            .open(path)
            .map_err(|source| DeviceError::Open {
                path: path.to_string(),
                source,
            })?;

        let configure_err = |source: io::Error| DeviceError::Configure {
            path: path.to_string(),
            source,
        };

        // SAFETY: the descriptor is owned by `file` and valid for this call.
        if unsafe { libc::ioctl(file.as_raw_fd(), libc::TIOCEXCL) } < 0 {
            return Err(configure_err(io::Error::last_os_error()));
        }

        let saved = tcgetattr(&file).map_err(|e| configure_err(e.into()))?;
        let mut tty = saved.clone();

        cfmakeraw(&mut tty);
        cfsetspeed(&mut tty, speed).map_err(|e| configure_err(e.into()))?;
        tty.control_flags
            .remove(ControlFlags::CSTOPB | ControlFlags::CRTSCTS | ControlFlags::PARENB);
        tty.control_flags.remove(ControlFlags::CSIZE);
        tty.control_flags
            .insert(ControlFlags::CS8 | ControlFlags::CLOCAL | ControlFlags::CREAD);
        tty.input_flags
            .remove(InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY);
        tty.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        tty.control_chars[SpecialCharacterIndices::VTIME as usize] = READ_TIMEOUT_DECISECONDS;

        tcsetattr(&file, SetArg::TCSANOW, &tty).map_err(|e| configure_err(e.into()))?;

        debug!("SerialLink[{}]: opened at {} baud", path, baud);

        Ok(SerialLink {
            file,
            saved: Some(saved),
            baud,
            path: path.to_string(),
        })
    }

    /// Device path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Configured baud rate.
    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// Restore the saved settings and release the device.
    pub fn close(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if let Some(saved) = self.saved.take() {
            if let Err(e) = tcsetattr(&self.file, SetArg::TCSANOW, &saved) {
                warn!("SerialLink[{}]: failed to restore terminal settings: {}", self.path, e);
            } else {
                debug!("SerialLink[{}]: terminal settings restored", self.path);
            }
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.restore();
    }
}

impl AtPort for SerialLink {
    fn poll_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) => Ok(false),
            Ok(_) => Ok(fds[0]
                .revents()
                .map(|r| r.contains(PollFlags::POLLIN))
                .unwrap_or(false)),
            Err(nix::errno::Errno::EINTR) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.file.write(data)
    }

    fn drain(&mut self) -> io::Result<()> {
        tcdrain(&self.file).map_err(io::Error::from)
    }

    fn discard_buffers(&mut self) -> io::Result<()> {
        tcflush(&self.file, FlushArg::TCIOFLUSH).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_baud_rates() {
        for baud in SUPPORTED_BAUD_RATES {
            assert!(is_supported_baud_rate(baud));
            assert!(baud_rate(baud).is_ok());
        }
        assert!(!is_supported_baud_rate(4800));
        assert!(matches!(
            baud_rate(1_000_000),
            Err(DeviceError::UnsupportedBaudRate(1_000_000))
        ));
    }

    #[test]
    fn test_open_rejects_bad_baud_before_touching_device() {
        let err = SerialLink::open("/nonexistent/tty", 1234).unwrap_err();
        assert!(matches!(err, DeviceError::UnsupportedBaudRate(1234)));
    }

    #[test]
    fn test_open_missing_device() {
        let err = SerialLink::open("/nonexistent/ttyUSB9", 115200).unwrap_err();
        assert!(matches!(err, DeviceError::Open { .. }));
        assert!(err.is_transport());
    }
}
