use apoxcan_session::RunningCode;
use apoxcan_transport::Device;
use serde::Serialize;

use crate::cmd::{close, InfoArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct InfoOutput {
    device: String,
    running_code: RunningCode,
    hardware_version: String,
    firmware_version: String,
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let session = args.device.open()?;

    let running_code = session
        .running_code()
        .map_err(|err| session_error("running code query failed", err))?;
    let hardware_version = session
        .hardware_version()
        .map_err(|err| session_error("hardware version query failed", err))?;
    let firmware_version = session
        .firmware_version()
        .map_err(|err| session_error("firmware version query failed", err))?;
    let device = session.device().name();
    close(session)?;

    let out = InfoOutput {
        device,
        running_code,
        hardware_version,
        firmware_version,
    };
    print_record(
        &out,
        &[
            ("device", out.device.clone()),
            ("running_code", running_code_name(out.running_code).to_string()),
            ("hardware_version", out.hardware_version.clone()),
            ("firmware_version", out.firmware_version.clone()),
        ],
        format,
    );
    Ok(SUCCESS)
}

fn running_code_name(code: RunningCode) -> &'static str {
    match code {
        RunningCode::Main => "main",
        RunningCode::Boot => "boot",
    }
}
