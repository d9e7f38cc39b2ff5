//! Byte-level access to the transmitter.

use std::io;
use std::time::{Duration, Instant};

use flexgate_at_protocol::{FLUSH_DRAIN_INTERVAL, FLUSH_DRAIN_READS};

/// The operations the AT protocol needs from a serial link.
///
/// [`crate::SerialLink`] implements this over a real tty; the `test-util`
/// feature adds `ScriptedPort` over an in-memory device. Every delay of the
/// protocol goes through [`AtPort::pause`] so an implementation can decide
/// what waiting means.
pub trait AtPort {
    /// Wait up to `timeout` for input. Returns whether a read would not block.
    fn poll_readable(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Read available bytes.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Block until all written output has been transmitted.
    fn drain(&mut self) -> io::Result<()>;

    /// Discard unread input and untransmitted output.
    fn discard_buffers(&mut self) -> io::Result<()>;

    /// Sleep for `duration`.
    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Clock used for protocol deadlines. Must advance across [`AtPort::pause`].
    fn now(&self) -> Instant {
        Instant::now()
    }

    /// Write all of `data`.
    fn write_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            match self.write(data) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "serial link accepted no bytes",
                    ))
                }
                Ok(n) => data = &data[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Discard both buffers, then absorb anything still arriving with up to
    /// [`FLUSH_DRAIN_READS`] short reads.
    fn flush_buffers(&mut self) -> io::Result<()> {
        self.discard_buffers()?;
        let mut scratch = [0u8; 256];
        for _ in 0..FLUSH_DRAIN_READS {
            if !self.poll_readable(FLUSH_DRAIN_INTERVAL)? {
                break;
            }
            if self.read(&mut scratch)? == 0 {
                break;
            }
            self.pause(FLUSH_DRAIN_INTERVAL);
        }
        Ok(())
    }
}

impl<P: AtPort + ?Sized> AtPort for Box<P> {
    fn poll_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        (**self).poll_readable(timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }

    fn drain(&mut self) -> io::Result<()> {
        (**self).drain()
    }

    fn discard_buffers(&mut self) -> io::Result<()> {
        (**self).discard_buffers()
    }

    fn pause(&mut self, duration: Duration) {
        (**self).pause(duration)
    }

    fn now(&self) -> Instant {
        (**self).now()
    }
}
