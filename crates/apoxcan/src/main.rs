mod cmd;
mod device;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "apoxcan", version, about = "Apox USB-CAN adapter CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). APOXCAN_LOG overrides it with a filter directive.
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "apoxcan",
            "send",
            "--tcp",
            "127.0.0.1:4001",
            "--id",
            "0x123",
            "--extended",
            "--data",
            "AABB",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.id, "0x123");
                assert!(args.extended);
                assert!(!args.rtr);
                assert_eq!(args.device.tcp.as_deref(), Some("127.0.0.1:4001"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_port_and_tcp_together() {
        let err = Cli::try_parse_from([
            "apoxcan",
            "info",
            "--port",
            "/dev/ttyUSB0",
            "--tcp",
            "127.0.0.1:4001",
        ])
        .expect_err("conflicting devices should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn requires_a_device() {
        let err = Cli::try_parse_from(["apoxcan", "monitor"]).expect_err("device is required");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_board_with_wait() {
        let cli = Cli::try_parse_from([
            "apoxcan",
            "--format",
            "json",
            "board",
            "get-firmware-version",
            "--port",
            "/dev/ttyUSB0",
            "--baud",
            "9600",
            "--wait",
            "--wait-timeout",
            "500ms",
        ])
        .expect("board args should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        match cli.command {
            Command::Board(args) => {
                assert_eq!(args.command, "get-firmware-version");
                assert!(args.wait);
                assert_eq!(args.wait_timeout, "500ms");
                assert_eq!(args.device.baud, Some(9600));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_monitor_options() {
        let cli = Cli::try_parse_from([
            "apoxcan", "monitor", "--tcp", "host:4001", "--count", "3", "--board",
        ])
        .expect("monitor args should parse");
        match cli.command {
            Command::Monitor(args) => {
                assert_eq!(args.count, Some(3));
                assert!(args.board);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn version_needs_no_device() {
        let cli = Cli::try_parse_from(["apoxcan", "version", "--extended"])
            .expect("version args should parse");
        assert!(matches!(cli.command, Command::Version(args) if args.extended));
    }
}
