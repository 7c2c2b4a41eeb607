use apoxcan_session::{command_by_name, Event, RequestConfig};
use serde::Serialize;

use crate::cmd::{close, parse_duration, parse_number, BoardArgs};
use crate::exit::{session_error, CliError, CliResult, SUCCESS};
use crate::output::{board_command, print_event, print_record, OutputFormat};

#[derive(Serialize)]
struct CommandSent {
    command: u8,
    name: String,
}

pub fn run(args: BoardArgs, format: OutputFormat) -> CliResult<i32> {
    let command = resolve_command(&args.command)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;

    let session = args.device.open()?;
    if args.wait {
        let config = RequestConfig {
            timeout: wait_timeout,
            retries: 0,
        };
        let response = session
            .request_board_with(command, &config)
            .map_err(|err| session_error("board request failed", err))?;
        close(session)?;
        print_event(&Event::Board(response), format);
        return Ok(SUCCESS);
    }

    session
        .send_board_command(command)
        .map_err(|err| session_error("send failed", err))?;
    close(session)?;

    let out = CommandSent {
        command,
        name: board_command(command),
    };
    print_record(
        &out,
        &[("command", out.name.clone()), ("status", "sent".to_string())],
        format,
    );
    Ok(SUCCESS)
}

/// Resolve a command name or a 7-bit command code.
fn resolve_command(input: &str) -> CliResult<u8> {
    if let Some(code) = command_by_name(input) {
        return Ok(code);
    }
    parse_number(input)
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code <= 0x7F)
        .ok_or_else(|| CliError::usage(format!("unknown board command: {input}")))
}

#[cfg(test)]
mod tests {
    use apoxcan_session::command::{GET_FIRMWARE_VERSION, WHICH_CODE_IS_RUNNING};

    use super::*;

    #[test]
    fn resolves_names_and_codes() {
        assert_eq!(resolve_command("get-firmware-version").unwrap(), GET_FIRMWARE_VERSION);
        assert_eq!(resolve_command("GET_FIRMWARE_VERSION").unwrap(), GET_FIRMWARE_VERSION);
        assert_eq!(resolve_command("0x00").unwrap(), WHICH_CODE_IS_RUNNING);
        assert_eq!(resolve_command("66").unwrap(), 66);
    }

    #[test]
    fn rejects_unknown_and_out_of_range() {
        assert!(resolve_command("launch-rocket").is_err());
        assert!(resolve_command("0x80").is_err());
        assert!(resolve_command("300").is_err());
    }
}
