use std::io::IsTerminal;

use apoxcan_session::{command_name, BoardMessage, CanBusMessage, ErrorEvent, ErrorSource, Event};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

pub fn print_event(event: &Event, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(event),
        OutputFormat::Table => {
            let [kind, id, detail, data] = event_columns(event);
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "ID", "DETAIL", "DATA"])
                .add_row(vec![kind, id, detail, data]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", event_line(event)),
    }
}

/// Print a result record: one JSON object, a two-column table, or `key=value` pairs.
pub fn print_record<T: Serialize>(record: &T, fields: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(record),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (name, value) in fields {
                table.add_row(vec![name.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line = fields
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{line}");
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn event_columns(event: &Event) -> [String; 4] {
    match event {
        Event::CanBus(message) => [
            "can".to_string(),
            can_id(message),
            can_flags(message),
            hex(&message.data),
        ],
        Event::Board(message) => [
            board_kind(message).to_string(),
            format!("0x{:02X}", message.id),
            board_command(message.command),
            hex(&message.data),
        ],
        Event::Error(error) => [
            "error".to_string(),
            error_byte(error),
            source_name(error.source).to_string(),
            error.message.clone(),
        ],
    }
}

pub fn event_line(event: &Event) -> String {
    match event {
        Event::CanBus(message) => format!(
            "can id={} {} len={} data=[{}] ts={}",
            can_id(message),
            can_flags(message),
            message.data.len(),
            hex(&message.data),
            message.timestamp
        ),
        Event::Board(message) => format!(
            "{} command={} data=[{}]",
            board_kind(message),
            board_command(message.command),
            hex(&message.data)
        ),
        Event::Error(error) => format!(
            "error source={} byte={} {}",
            source_name(error.source),
            error_byte(error),
            error.message
        ),
    }
}

fn can_id(message: &CanBusMessage) -> String {
    if message.extended {
        format!("0x{:08X}", message.id)
    } else {
        format!("0x{:03X}", message.id)
    }
}

fn can_flags(message: &CanBusMessage) -> String {
    let mut flags = vec![if message.extended { "ext" } else { "std" }];
    if message.rtr {
        flags.push("rtr");
    }
    if message.flags != 0 {
        return format!("{} flags=0x{:02X}", flags.join(","), message.flags);
    }
    flags.join(",")
}

fn board_kind(message: &BoardMessage) -> &'static str {
    if message.is_emergency() {
        "emergency"
    } else {
        "board"
    }
}

pub fn board_command(command: u8) -> String {
    match command_name(command) {
        Some(name) => format!("{name}(0x{command:02X})"),
        None => format!("0x{command:02X}"),
    }
}

fn source_name(source: ErrorSource) -> &'static str {
    match source {
        ErrorSource::Protocol => "protocol",
        ErrorSource::Message => "message",
        ErrorSource::Transport => "transport",
    }
}

fn error_byte(error: &ErrorEvent) -> String {
    error
        .byte
        .map(|byte| format!("0x{byte:02X}"))
        .unwrap_or_else(|| "-".to_string())
}

/// Space-separated upper-case hex.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
