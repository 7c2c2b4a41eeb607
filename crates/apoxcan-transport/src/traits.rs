use std::io::{self, Read, Write};

use crate::error::Result;

/// A byte-stream device that can be opened into independent read and write halves.
///
/// The reader half is moved onto the ingestion thread and is never shared.
/// The writer half is kept behind the session's write lock. Reads are
/// expected to block for at most the device read timeout; a read that
/// returns `Ok(0)` or fails with an error for which [`is_idle`] holds means
/// "no data yet" and is retried.
pub trait Device: Send {
    /// Read half, owned by the ingestion thread.
    type Reader: Read + Send + 'static;
    /// Write half, guarded by the session write lock.
    type Writer: Write + Send + 'static;

    /// Open the device and return its read and write halves.
    fn open(&mut self) -> Result<(Self::Reader, Self::Writer)>;

    /// Release any device-level state after both halves have been dropped.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Human-readable device name for diagnostics.
    fn name(&self) -> String;
}

/// Returns true if the error only means that no byte arrived before the read timeout.
pub fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Returns true if the error means the device is gone and further reads are pointless.
pub fn is_disconnect(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    ) {
        return true;
    }

    #[cfg(unix)]
    if let Some(code) = err.raw_os_error() {
        // Unplugged USB serial adapters surface as one of these on Linux and macOS.
        return code == libc::ENODEV || code == libc::ENXIO || code == libc::EIO;
    }

    false
}
