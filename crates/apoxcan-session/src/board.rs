//! Request/response exchanges with the adapter firmware.
//!
//! The adapter answers a board command with a response message (id `0x00`)
//! carrying the same command code. Emergency messages never count as answers. Answers are picked out of the board queue, so a
//! consumer draining that queue concurrently can steal them.

use std::time::Duration;

use apoxcan_transport::Device;
use serde::Serialize;
use tracing::debug;

use crate::command::{
    command_name, BOOT_CODE_RUNNING, GET_FIRMWARE_VERSION, GET_HARDWARE_VERSION,
    MAIN_CODE_RUNNING, MAIN_CODE_STARTED, RESET_MICRO, SWITCH_TO_MAIN_CODE, WHICH_CODE_IS_RUNNING,
};
use crate::error::{Result, SessionError};
use crate::message::BoardMessage;
use crate::session::Session;

/// Default time to wait for each board response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Retries used when asking which code is running.
const RUNNING_CODE_RETRIES: u32 = 2;

/// Timeout and retry policy for a board request.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// How long to wait for a response after each send.
    pub timeout: Duration,
    /// How many times to resend after a timeout.
    pub retries: u32,
}

impl RequestConfig {
    /// Longest time a request can wait across all attempts.
    pub fn total_wait(&self) -> Duration {
        self.timeout
            .saturating_mul(self.retries.saturating_add(1))
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retries: 0,
        }
    }
}

/// Firmware the adapter is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningCode {
    Main,
    Boot,
}

impl<D: Device> Session<D> {
    /// Send a board command and wait for the response with the same command code.
    /// Emergency messages that arrive first stay queued.
    pub fn request_board(&self, command: u8) -> Result<BoardMessage> {
        let config = self.config().request.clone();
        self.request_board_with(command, &config)
    }

    /// [`request_board`](Self::request_board) with an explicit timeout and retry policy.
    pub fn request_board_with(&self, command: u8, config: &RequestConfig) -> Result<BoardMessage> {
        self.request_board_matching(command, config, |message| {
            message.is_response_to(command)
        })
    }

    /// Send a board command and wait for the first board message accepted by `matcher`.
    ///
    /// The command is resent after each timeout, up to `config.retries` times.
    pub fn request_board_matching(
        &self,
        command: u8,
        config: &RequestConfig,
        mut matcher: impl FnMut(&BoardMessage) -> bool,
    ) -> Result<BoardMessage> {
        for attempt in 0..=config.retries {
            if attempt > 0 {
                debug!(
                    command = command_name(command).unwrap_or("unknown"),
                    attempt, "no response, resending board command"
                );
            }
            self.send_board_command(command)?;
            if let Some(message) = self
                .dispatcher()
                .take_board_matching(&mut matcher, config.timeout)
            {
                return Ok(message);
            }
        }

        Err(SessionError::Timeout {
            command,
            after: config.total_wait(),
        })
    }

    /// Hardware version string.
    pub fn hardware_version(&self) -> Result<String> {
        self.request_board(GET_HARDWARE_VERSION)
            .map(|message| response_text(&message))
    }

    /// Firmware version string.
    pub fn firmware_version(&self) -> Result<String> {
        self.request_board(GET_FIRMWARE_VERSION)
            .map(|message| response_text(&message))
    }

    /// Ask which firmware is running.
    pub fn running_code(&self) -> Result<RunningCode> {
        let config = RequestConfig {
            retries: RUNNING_CODE_RETRIES,
            ..self.config().request.clone()
        };
        let message = self.request_board_with(WHICH_CODE_IS_RUNNING, &config)?;

        match message.data.first() {
            Some(&MAIN_CODE_RUNNING) => Ok(RunningCode::Main),
            Some(&BOOT_CODE_RUNNING) => Ok(RunningCode::Boot),
            Some(other) => Err(SessionError::UnexpectedResponse {
                command: WHICH_CODE_IS_RUNNING,
                reason: format!("unexpected running code 0x{other:02X}"),
            }),
            None => Err(SessionError::UnexpectedResponse {
                command: WHICH_CODE_IS_RUNNING,
                reason: "empty response".to_string(),
            }),
        }
    }

    /// Make sure main code is running, leaving boot code if needed.
    ///
    /// Returns the code that was running before the call.
    pub fn switch_to_main_code(&self) -> Result<RunningCode> {
        let running = self.running_code()?;
        if running == RunningCode::Boot {
            let config = RequestConfig {
                retries: 0,
                ..self.config().request.clone()
            };
            self.request_board_matching(SWITCH_TO_MAIN_CODE, &config, |message| {
                message.is_emergency() && message.data.first() == Some(&MAIN_CODE_STARTED)
            })?;
            debug!("adapter switched to main code");
        }
        Ok(running)
    }

    /// Reset the adapter micro-controller. Does not wait for it to come back.
    pub fn reset(&self) -> Result<()> {
        self.send_board_command(RESET_MICRO)
    }
}

fn response_text(message: &BoardMessage) -> String {
    String::from_utf8_lossy(&message.data)
        .trim_end_matches('\0')
        .to_string()
}
