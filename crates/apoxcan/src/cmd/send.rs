use apoxcan_session::message::MAX_CAN_DATA;
use apoxcan_session::OutboundCanBusMessage;
use serde::Serialize;

use crate::cmd::{close, parse_number, SendArgs};
use crate::exit::{session_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{hex, print_record, OutputFormat};

#[derive(Serialize)]
struct SentOutput {
    id: u32,
    extended: bool,
    rtr: bool,
    tx_flags: u8,
    data: Vec<u8>,
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let message = build_message(&args)?;
    // Reject bad input before touching the device.
    message
        .validate()
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid message: {err}")))?;

    let session = args.device.open()?;
    session
        .send_can_bus_message(&message)
        .map_err(|err| session_error("send failed", err))?;
    close(session)?;

    let out = SentOutput {
        id: message.id,
        extended: message.extended,
        rtr: message.rtr,
        tx_flags: message.tx_flags,
        data: message.data.clone(),
    };
    print_record(
        &out,
        &[
            ("id", format!("0x{:X}", out.id)),
            ("extended", out.extended.to_string()),
            ("rtr", out.rtr.to_string()),
            ("tx_flags", format!("0x{:02X}", out.tx_flags)),
            ("data", hex(&out.data)),
        ],
        format,
    );
    Ok(SUCCESS)
}

fn build_message(args: &SendArgs) -> CliResult<OutboundCanBusMessage> {
    let id = parse_number(&args.id)
        .ok_or_else(|| CliError::usage(format!("invalid CAN id: {}", args.id)))?;
    let tx_flags = parse_number(&args.tx_flags)
        .and_then(|flags| u8::try_from(flags).ok())
        .ok_or_else(|| CliError::usage(format!("invalid transmit flags: {}", args.tx_flags)))?;
    let data = parse_hex(&args.data)?;

    let mut message = OutboundCanBusMessage::new(id, data)
        .with_rtr(args.rtr)
        .with_tx_flags(tx_flags);
    if args.extended {
        message = message.with_extended(true);
    }
    Ok(message)
}

/// Parse hex bytes, ignoring whitespace and `:`/`-`/`,` separators.
fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && !matches!(b, b':' | b'-' | b','))
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::usage(format!(
            "hex data must have an even number of digits: {input:?}"
        )));
    }

    let bytes = digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(text, 16).ok()
        })
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| CliError::usage(format!("invalid hex data: {input:?}")))?;

    if bytes.len() > MAX_CAN_DATA {
        return Err(CliError::new(
            DATA_INVALID,
            format!("too much data ({} bytes), maximum {MAX_CAN_DATA} bytes", bytes.len()),
        ));
    }
    Ok(bytes)
}
