use std::path::PathBuf;
use std::time::Duration;

use apoxcan_session::{RequestConfig, Session, SessionConfig};
use apoxcan_transport::{
    Device, SerialConfig, SerialDevice, TcpConfig, TcpDevice, DEFAULT_BAUD_RATE,
};
use clap::{Args, Subcommand};
use tracing::debug;

use crate::device::AdapterDevice;
use crate::exit::{session_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod board;
pub mod info;
pub mod monitor;
pub mod send;
pub mod upload;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print CAN-bus traffic received by the adapter.
    Monitor(MonitorArgs),
    /// Send one CAN-bus message.
    Send(SendArgs),
    /// Send a board command to the adapter firmware.
    Board(BoardArgs),
    /// Show adapter hardware and firmware versions.
    Info(InfoArgs),
    /// Download an Intel HEX firmware image to the adapter boot code.
    Upload(UploadArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Monitor(args) => monitor::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Board(args) => board::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Upload(args) => upload::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// How to reach the adapter.
#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Serial port of the adapter (e.g. /dev/ttyUSB0, COM3).
    #[arg(long, value_name = "PATH", conflicts_with = "tcp", required_unless_present = "tcp")]
    pub port: Option<String>,
    /// Serial line speed.
    #[arg(long, value_name = "N")]
    pub baud: Option<u32>,
    /// Address of a serial-over-TCP bridge (e.g. 192.168.1.20:4001).
    #[arg(long, value_name = "ADDR")]
    pub tcp: Option<String>,
    /// Board request timeout (e.g. 1s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "1s")]
    pub timeout: String,
}

impl DeviceArgs {
    fn device(&self) -> CliResult<AdapterDevice> {
        match (&self.port, &self.tcp) {
            (Some(path), None) => Ok(AdapterDevice::Serial(SerialDevice::with_config(
                SerialConfig {
                    baud_rate: self.baud.unwrap_or(DEFAULT_BAUD_RATE),
                    ..SerialConfig::new(path.as_str())
                },
            ))),
            (None, Some(address)) => Ok(AdapterDevice::Tcp(TcpDevice::with_config(
                TcpConfig::new(address.as_str()),
            ))),
            _ => Err(CliError::usage("exactly one of --port or --tcp is required")),
        }
    }

    /// Open a session on the selected device.
    pub fn open(&self) -> CliResult<Session<AdapterDevice>> {
        let config = SessionConfig {
            request: RequestConfig {
                timeout: parse_duration(&self.timeout)?,
                retries: 0,
            },
            ..SessionConfig::default()
        };

        let mut session = Session::with_config(self.device()?, config);
        session
            .open()
            .map_err(|err| session_error("open failed", err))?;
        debug!(device = %session.device().name(), "adapter session ready");
        Ok(session)
    }
}

/// Close a session, reporting failures to close as command errors.
pub fn close(mut session: Session<AdapterDevice>) -> CliResult<()> {
    session
        .close()
        .map_err(|err| session_error("close failed", err))
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Also print board (adapter firmware) messages.
    #[arg(long)]
    pub board: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// CAN identifier, decimal or 0x-prefixed hex.
    #[arg(long)]
    pub id: String,
    /// Use a 29-bit identifier even when the id fits in 11 bits.
    #[arg(long)]
    pub extended: bool,
    /// Send a remote transmission request.
    #[arg(long)]
    pub rtr: bool,
    /// Data bytes as hex (e.g. "AABB", "aa bb", "aa:bb").
    #[arg(long, default_value = "")]
    pub data: String,
    /// Adapter transmit flags.
    #[arg(long, value_name = "N", default_value = "0")]
    pub tx_flags: String,
}

#[derive(Args, Debug)]
pub struct BoardArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Command name (e.g. get-firmware-version) or code.
    pub command: String,
    /// Wait for the response and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the response when --wait is set.
    #[arg(long, default_value = "1s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Intel HEX firmware image.
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_number(input: &str) -> Option<u32> {
    let input = input.trim();
    match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => input.parse().ok(),
    }
}
