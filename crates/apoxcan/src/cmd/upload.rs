use apoxcan_session::firmware::BLOCK_SIZE;
use apoxcan_session::{FirmwareImage, RunningCode};
use serde::Serialize;
use tracing::info;

use crate::cmd::{close, UploadArgs};
use crate::exit::{firmware_error, session_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct UploadOutput {
    file: String,
    blocks: usize,
    bytes: usize,
}

pub fn run(args: UploadArgs, format: OutputFormat) -> CliResult<i32> {
    let image = FirmwareImage::from_file(&args.file).map_err(|err| {
        firmware_error(&format!("failed reading {}", args.file.display()), err)
    })?;

    let session = args.device.open()?;
    let running = session
        .running_code()
        .map_err(|err| session_error("running code query failed", err))?;
    if running != RunningCode::Boot {
        return Err(CliError::new(
            FAILURE,
            "adapter is running main code; firmware can only be downloaded to boot code",
        ));
    }

    info!(file = %args.file.display(), "downloading firmware");
    let blocks = session
        .upload_firmware(&image)
        .map_err(|err| session_error("upload failed", err))?;
    close(session)?;

    let out = UploadOutput {
        file: args.file.display().to_string(),
        blocks,
        bytes: blocks * BLOCK_SIZE,
    };
    print_record(
        &out,
        &[
            ("file", out.file.clone()),
            ("blocks", out.blocks.to_string()),
            ("bytes", out.bytes.to_string()),
        ],
        format,
    );
    Ok(SUCCESS)
}
