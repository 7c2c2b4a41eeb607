//! Adapter firmware command codes.

/// Which firmware is running: main (`0xCC`) or boot (`0x55`).
pub const WHICH_CODE_IS_RUNNING: u8 = 0x00;
pub const RESET_CPU: u8 = 0x01;
pub const GET_TX_ERR_CNT: u8 = 0x02;
pub const GET_RX_ERR_CNT: u8 = 0x03;
pub const GET_CANSTAT: u8 = 0x04;
pub const GET_COMSTAT: u8 = 0x05;
pub const GET_MSGFILTER1: u8 = 0x06;
pub const GET_MSGFILTER2: u8 = 0x07;
pub const SET_MSGFILTER1: u8 = 0x08;
pub const SET_MSGFILTER2: u8 = 0x09;
pub const IS_RCV_BUFFER_EMPTY: u8 = 0x0A;
pub const IS_TX_BUFFER_EMPTY: u8 = 0x0B;
pub const IS_TX_PENDING: u8 = 0x0C;
pub const GET_CANCON: u8 = 0x0D;
pub const GET_CIOCON: u8 = 0x0E;
pub const SET_SYNC_COUNT: u8 = 0x10;
pub const SET_SYNC_MSG: u8 = 0x11;
pub const TURN_SYNC_ON: u8 = 0x12;
pub const TURN_SYNC_OFF: u8 = 0x13;
pub const SET_CONFIG_MODE: u8 = 0x20;
pub const SET_LOOPBACK_MODE: u8 = 0x21;
pub const SET_NORMAL_MODE: u8 = 0x22;
pub const SET_SLEEP_MODE: u8 = 0x23;
pub const SET_LISTEN_MODE: u8 = 0x24;
pub const ABORT_ALL_TX: u8 = 0x26;
pub const SET_BAUD_1MEG: u8 = 0x30;
pub const SET_BAUD_500K: u8 = 0x31;
pub const SET_BAUD_250K: u8 = 0x32;
pub const SET_BAUD_125K: u8 = 0x33;
pub const GET_BAUD_REGS: u8 = 0x34;
pub const RESET_MICRO: u8 = 0x42;
pub const GET_HARDWARE_VERSION: u8 = 0x43;
pub const GET_FIRMWARE_VERSION: u8 = 0x44;
/// Ends a firmware download (`'E'`).
pub const END_DOWNLOAD: u8 = 0x45;
/// Asks the boot code to jump to main code (`'R'`).
pub const SWITCH_TO_MAIN_CODE: u8 = 0x52;
/// Starts a firmware download (`'S'`).
pub const START_DOWNLOAD: u8 = 0x53;

/// `WHICH_CODE_IS_RUNNING` answer for main code.
pub const MAIN_CODE_RUNNING: u8 = 0xCC;
/// `WHICH_CODE_IS_RUNNING` answer for boot code.
pub const BOOT_CODE_RUNNING: u8 = 0x55;
/// Emergency code sent once main code has started.
pub const MAIN_CODE_STARTED: u8 = 0x63;

const COMMANDS: &[(u8, &str)] = &[
    (WHICH_CODE_IS_RUNNING, "which-code-is-running"),
    (RESET_CPU, "reset-cpu"),
    (GET_TX_ERR_CNT, "get-tx-err-cnt"),
    (GET_RX_ERR_CNT, "get-rx-err-cnt"),
    (GET_CANSTAT, "get-canstat"),
    (GET_COMSTAT, "get-comstat"),
    (GET_MSGFILTER1, "get-msgfilter1"),
    (GET_MSGFILTER2, "get-msgfilter2"),
    (SET_MSGFILTER1, "set-msgfilter1"),
    (SET_MSGFILTER2, "set-msgfilter2"),
    (IS_RCV_BUFFER_EMPTY, "is-rcv-buffer-empty"),
    (IS_TX_BUFFER_EMPTY, "is-tx-buffer-empty"),
    (IS_TX_PENDING, "is-tx-pending"),
    (GET_CANCON, "get-cancon"),
    (GET_CIOCON, "get-ciocon"),
    (SET_SYNC_COUNT, "set-sync-count"),
    (SET_SYNC_MSG, "set-sync-msg"),
    (TURN_SYNC_ON, "turn-sync-on"),
    (TURN_SYNC_OFF, "turn-sync-off"),
    (SET_CONFIG_MODE, "set-config-mode"),
    (SET_LOOPBACK_MODE, "set-loopback-mode"),
    (SET_NORMAL_MODE, "set-normal-mode"),
    (SET_SLEEP_MODE, "set-sleep-mode"),
    (SET_LISTEN_MODE, "set-listen-mode"),
    (ABORT_ALL_TX, "abort-all-tx"),
    (SET_BAUD_1MEG, "set-baud-1meg"),
    (SET_BAUD_500K, "set-baud-500k"),
    (SET_BAUD_250K, "set-baud-250k"),
    (SET_BAUD_125K, "set-baud-125k"),
    (GET_BAUD_REGS, "get-baud-regs"),
    (RESET_MICRO, "reset-micro"),
    (GET_HARDWARE_VERSION, "get-hardware-version"),
    (GET_FIRMWARE_VERSION, "get-firmware-version"),
    (END_DOWNLOAD, "end-download"),
    (SWITCH_TO_MAIN_CODE, "switch-to-main-code"),
    (START_DOWNLOAD, "start-download"),
];

/// Name of a known command code.
pub fn command_name(command: u8) -> Option<&'static str> {
    COMMANDS
        .iter()
        .find(|(code, _)| *code == command)
        .map(|(_, name)| *name)
}

/// Look up a command code by name. Accepts `-` or `_` separators in any case.
pub fn command_by_name(name: &str) -> Option<u8> {
    let wanted = name.trim().to_ascii_lowercase().replace('_', "-");
    COMMANDS
        .iter()
        .find(|(_, known)| *known == wanted)
        .map(|(code, _)| *code)
}
