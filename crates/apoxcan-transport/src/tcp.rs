use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::info;

use crate::error::{Result, TransportError};
use crate::serial::DEFAULT_TIMEOUT;
use crate::traits::Device;

/// TCP bridge configuration.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Bridge address, e.g. `192.168.1.20:4001`.
    pub address: String,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Read timeout. Bounds how long `close()` can block.
    pub read_timeout: Duration,
    /// Write timeout.
    pub write_timeout: Option<Duration>,
}

impl TcpConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// The adapter behind a serial-over-TCP bridge (ser2net and friends).
#[derive(Debug, Clone)]
pub struct TcpDevice {
    config: TcpConfig,
}

impl TcpDevice {
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_config(TcpConfig::new(address))
    }

    pub fn with_config(config: TcpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    fn resolve(&self) -> Result<SocketAddr> {
        self.config
            .address
            .to_socket_addrs()
            .map_err(|source| self.open_error(source))?
            .next()
            .ok_or_else(|| {
                self.open_error(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "address resolved to nothing",
                ))
            })
    }

    fn open_error(&self, source: io::Error) -> TransportError {
        TransportError::Open {
            device: self.config.address.clone(),
            source,
        }
    }
}

impl Device for TcpDevice {
    type Reader = TcpReader;
    type Writer = TcpStream;

    fn open(&mut self) -> Result<(Self::Reader, Self::Writer)> {
        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout)
            .map_err(|source| self.open_error(source))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.config.read_timeout))?;
        stream.set_write_timeout(self.config.write_timeout)?;

        let reader = stream.try_clone()?;
        info!(%addr, "connected to tcp bridge");
        Ok((TcpReader { inner: reader }, stream))
    }

    fn name(&self) -> String {
        format!("tcp://{}", self.config.address)
    }
}

/// Read half of a [`TcpDevice`].
///
/// A serial line never reaches end-of-stream, so a closed bridge connection
/// is reported as `UnexpectedEof` instead of `Ok(0)`.
#[derive(Debug)]
pub struct TcpReader {
    inner: TcpStream,
}

impl Read for TcpReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.inner.read(buf)? {
            0 => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "tcp bridge closed the connection",
            )),
            n => Ok(n),
        }
    }
}
