use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Device;

/// Default baud rate. The FTDI bridge ignores it in FIFO mode but the
/// virtual COM port driver still requires one.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default read timeout, matching the adapter vendor's USB read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(378);

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,
    /// Line speed.
    pub baud_rate: u32,
    /// Read and write timeout. Bounds how long `close()` can block.
    pub timeout: Duration,
    /// Discard anything buffered by the driver when the port is opened.
    pub purge_on_open: bool,
}

impl SerialConfig {
    /// Configuration for `path` with default line settings.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
            purge_on_open: true,
        }
    }
}

/// The adapter exposed as a local serial port (8N1, no flow control).
#[derive(Debug, Clone)]
pub struct SerialDevice {
    config: SerialConfig,
}

impl SerialDevice {
    /// Create a device for the given port path with default settings.
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_config(SerialConfig::new(path))
    }

    /// Create a device with explicit configuration.
    pub fn with_config(config: SerialConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn open_error(&self, err: serialport::Error) -> TransportError {
        TransportError::Open {
            device: self.config.path.clone(),
            source: err.into(),
        }
    }
}

impl Device for SerialDevice {
    type Reader = Box<dyn SerialPort>;
    type Writer = Box<dyn SerialPort>;

    fn open(&mut self) -> Result<(Self::Reader, Self::Writer)> {
        let port = serialport::new(self.config.path.as_str(), self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.config.timeout)
            .open()
            .map_err(|err| self.open_error(err))?;

        if self.config.purge_on_open {
            port.clear(ClearBuffer::All)
                .map_err(|err| TransportError::Configure {
                    device: self.config.path.clone(),
                    reason: format!("unable to purge buffers: {err}"),
                })?;
            debug!(path = %self.config.path, "purged serial buffers");
        }

        let writer = port.try_clone().map_err(|err| TransportError::Configure {
            device: self.config.path.clone(),
            reason: format!("unable to clone port handle: {err}"),
        })?;

        info!(
            path = %self.config.path,
            baud = self.config.baud_rate,
            timeout = ?self.config.timeout,
            "opened serial device"
        );
        Ok((port, writer))
    }

    fn name(&self) -> String {
        self.config.path.clone()
    }
}
