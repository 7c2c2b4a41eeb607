//! Firmware images and the bootloader download sequence.
//!
//! An Intel HEX file is loaded into a 64 KiB image pre-filled with `0xFF`.
//! The image is sent as 64-byte blocks, skipping blocks that are still
//! entirely `0xFF`, between a START_DOWNLOAD and an END_DOWNLOAD command.

use std::path::Path;

use apoxcan_transport::Device;
use tracing::{debug, info};

use crate::command::{END_DOWNLOAD, START_DOWNLOAD};
use crate::error::{FirmwareError, Result};
use crate::session::Session;

/// Size of the adapter's program memory.
pub const IMAGE_SIZE: usize = 0x1_0000;
/// Bytes of image data per download block.
pub const BLOCK_SIZE: usize = 64;
/// Download block payload size: 16-bit address + data.
pub const BLOCK_PAYLOAD_SIZE: usize = BLOCK_SIZE + 2;

/// The last block is reserved by the bootloader; data aimed at it is ignored.
const RESERVED_FROM: u32 = (IMAGE_SIZE - BLOCK_SIZE) as u32;

const RECORD_DATA: u8 = 0x00;
const RECORD_EOF: u8 = 0x01;
const RECORD_EXTENDED_LINEAR_ADDRESS: u8 = 0x04;

/// A 64 KiB program image.
#[derive(Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl std::fmt::Debug for FirmwareImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirmwareImage")
            .field("live_blocks", &self.blocks().count())
            .finish()
    }
}

/// One download block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareBlock {
    pub address: u16,
    pub data: [u8; BLOCK_SIZE],
}

impl FirmwareBlock {
    /// Download payload: `[address lo, address hi, data...]`.
    pub fn payload(&self) -> [u8; BLOCK_PAYLOAD_SIZE] {
        let mut payload = [0u8; BLOCK_PAYLOAD_SIZE];
        payload[..2].copy_from_slice(&self.address.to_le_bytes());
        payload[2..].copy_from_slice(&self.data);
        payload
    }
}

impl Default for FirmwareImage {
    fn default() -> Self {
        Self::empty()
    }
}

impl FirmwareImage {
    /// An erased image: every byte `0xFF`.
    pub fn empty() -> Self {
        Self {
            data: vec![0xFF; IMAGE_SIZE],
        }
    }

    /// Read and parse an Intel HEX file.
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, FirmwareError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_intel_hex(&text)
    }

    /// Parse Intel HEX text.
    ///
    /// Understands data, extended linear address and end-of-file records;
    /// other record types are skipped, as are lines not starting with `:`.
    /// Every record's checksum is verified. Data outside the image or in the
    /// reserved last block is dropped.
    pub fn from_intel_hex(text: &str) -> std::result::Result<Self, FirmwareError> {
        let mut image = Self::empty();
        let mut upper: u32 = 0;
        let mut records = 0usize;

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let Some(hex) = raw.trim().strip_prefix(':') else {
                continue;
            };

            let record = decode_record(hex, line)?;
            records += 1;

            match record.kind {
                RECORD_DATA => {
                    let base = (upper << 16) | u32::from(record.address);
                    for (offset, &byte) in record.data.iter().enumerate() {
                        let address = base.saturating_add(offset as u32);
                        if address < RESERVED_FROM {
                            image.data[address as usize] = byte;
                        }
                    }
                }
                RECORD_EXTENDED_LINEAR_ADDRESS => {
                    let [hi, lo] = record.data[..] else {
                        return Err(FirmwareError::InvalidRecord {
                            line,
                            reason: format!(
                                "extended linear address record has {} data bytes, expected 2",
                                record.data.len()
                            ),
                        });
                    };
                    upper = u32::from(u16::from_be_bytes([hi, lo]));
                }
                RECORD_EOF => break,
                other => debug!(line, record_type = other, "skipping hex record"),
            }
        }

        debug!(records, "parsed hex file");
        Ok(image)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Blocks holding at least one programmed (non-`0xFF`) byte, in address order.
    pub fn blocks(&self) -> impl Iterator<Item = FirmwareBlock> + '_ {
        self.data
            .chunks_exact(BLOCK_SIZE)
            .enumerate()
            .filter(|(_, chunk)| chunk.iter().any(|&b| b != 0xFF))
            .map(|(index, chunk)| {
                let mut data = [0u8; BLOCK_SIZE];
                data.copy_from_slice(chunk);
                FirmwareBlock {
                    address: (index * BLOCK_SIZE) as u16,
                    data,
                }
            })
    }
}

struct Record {
    address: u16,
    kind: u8,
    data: Vec<u8>,
}

fn decode_record(hex: &str, line: usize) -> std::result::Result<Record, FirmwareError> {
    let invalid = |reason: String| FirmwareError::InvalidRecord { line, reason };

    if hex.len() % 2 != 0 {
        return Err(invalid("odd number of hex digits".to_string()));
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| invalid(format!("invalid hex digits at column {}", i + 2)))
        })
        .collect::<std::result::Result<Vec<u8>, _>>()?;

    // count, address (2), type, checksum
    if bytes.len() < 5 {
        return Err(invalid("record too short".to_string()));
    }
    let count = usize::from(bytes[0]);
    if bytes.len() != count + 5 {
        return Err(invalid(format!(
            "record declares {count} data bytes but carries {}",
            bytes.len() - 5
        )));
    }

    let (body, checksum) = bytes.split_at(bytes.len() - 1);
    let sum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    let expected = sum.wrapping_neg();
    if expected != checksum[0] {
        return Err(FirmwareError::Checksum {
            line,
            expected,
            found: checksum[0],
        });
    }

    Ok(Record {
        address: u16::from_be_bytes([bytes[1], bytes[2]]),
        kind: bytes[3],
        data: bytes[4..4 + count].to_vec(),
    })
}

impl<D: Device> Session<D> {
    /// Download a firmware image to the adapter bootloader.
    ///
    /// The adapter must be running boot code. Returns the number of blocks sent.
    pub fn upload_firmware(&self, image: &FirmwareImage) -> Result<usize> {
        self.send_board_command(START_DOWNLOAD)?;

        let mut sent = 0usize;
        for block in image.blocks() {
            self.write(&block.payload())?;
            sent += 1;
        }

        self.send_board_command(END_DOWNLOAD)?;
        info!(blocks = sent, "firmware uploaded");
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;

    /// Build a record line with a correct checksum.
    fn record(address: u16, kind: u8, data: &[u8]) -> String {
        let mut bytes = vec![data.len() as u8];
        bytes.extend(address.to_be_bytes());
        bytes.push(kind);
        bytes.extend_from_slice(data);
        let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        bytes.push(sum.wrapping_neg());
        let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
        format!(":{hex}")
    }

    #[test]
    fn parses_known_record() {
        // Classic example record from the Intel HEX format description.
        let text = ":10010000214601360121470136007EFE09D2190140\n:00000001FF\n";
        let image = FirmwareImage::from_intel_hex(text).unwrap();
        assert_eq!(
            &image.as_bytes()[0x100..0x110],
            &[
                0x21, 0x46, 0x01, 0x36, 0x01, 0x21, 0x47, 0x01, 0x36, 0x00, 0x7E, 0xFE, 0x09,
                0xD2, 0x19, 0x01
            ]
        );
        assert_eq!(image.as_bytes()[0xFF], 0xFF);
        assert_eq!(image.as_bytes()[0x110], 0xFF);
    }

    #[test]
    fn skips_non_record_lines_and_stops_at_eof() {
        let text = format!(
            "; comment\r\n{}\r\n\r\n{}\r\n{}\r\n",
            record(0x0000, RECORD_DATA, &[0x01, 0x02]),
            record(0x0000, RECORD_EOF, &[]),
            record(0x0040, RECORD_DATA, &[0x03]),
        );
        let image = FirmwareImage::from_intel_hex(&text).unwrap();
        assert_eq!(&image.as_bytes()[..3], &[0x01, 0x02, 0xFF]);
        assert_eq!(image.as_bytes()[0x40], 0xFF);
    }

    #[test]
    fn extended_linear_address_moves_data_out_of_image() {
        let text = [
            record(0x0000, RECORD_EXTENDED_LINEAR_ADDRESS, &[0x00, 0x01]),
            record(0x0000, RECORD_DATA, &[0xAA]),
            record(0x0000, RECORD_EXTENDED_LINEAR_ADDRESS, &[0x00, 0x00]),
            record(0x0010, RECORD_DATA, &[0xBB]),
        ]
        .join("\n");

        let image = FirmwareImage::from_intel_hex(&text).unwrap();
        assert_eq!(image.as_bytes()[0x0000], 0xFF);
        assert_eq!(image.as_bytes()[0x0010], 0xBB);
        assert_eq!(image.blocks().count(), 1);
    }

    #[test]
    fn reserved_last_block_is_ignored() {
        let text = [
            record(0xFFBF, RECORD_DATA, &[0x11]),
            record(0xFFC0, RECORD_DATA, &[0x22, 0x33]),
        ]
        .join("\n");

        let image = FirmwareImage::from_intel_hex(&text).unwrap();
        assert_eq!(image.as_bytes()[0xFFBF], 0x11);
        assert_eq!(image.as_bytes()[0xFFC0], 0xFF);
        assert_eq!(image.as_bytes()[0xFFC1], 0xFF);
    }

    #[test]
    fn rejects_bad_checksum() {
        let err = FirmwareImage::from_intel_hex(":0100000001FF\n").unwrap_err();
        assert!(matches!(
            err,
            FirmwareError::Checksum {
                line: 1,
                expected: 0xFE,
                found: 0xFF
            }
        ));
    }

    #[test]
    fn rejects_malformed_records() {
        for text in [":0100000001", ":01000000ZZFE", ":020000000101FC0", ":0200000001FD"] {
            let err = FirmwareImage::from_intel_hex(text).unwrap_err();
            assert!(
                matches!(err, FirmwareError::InvalidRecord { line: 1, .. }),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn blocks_skip_erased_regions() {
        let text = [
            record(0x0000, RECORD_DATA, &[0x01]),
            record(0x0080, RECORD_DATA, &[0x02]),
            record(0x00BF, RECORD_DATA, &[0x03]),
        ]
        .join("\n");
        let image = FirmwareImage::from_intel_hex(&text).unwrap();

        let blocks: Vec<FirmwareBlock> = image.blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].address, 0x0000);
        assert_eq!(blocks[1].address, 0x0080);

        let payload = blocks[1].payload();
        assert_eq!(payload.len(), BLOCK_PAYLOAD_SIZE);
        assert_eq!(&payload[..3], &[0x80, 0x00, 0x02]);
        assert_eq!(payload[BLOCK_PAYLOAD_SIZE - 1], 0x03);
    }

    #[test]
    fn empty_image_has_no_blocks() {
        assert_eq!(FirmwareImage::empty().blocks().count(), 0);
    }

    #[test]
    fn upload_sequence_on_the_wire() {
        let text = [
            record(0x0100, RECORD_DATA, &[0x10, 0x20]),
            record(0x2000, RECORD_DATA, &[0x30]),
        ]
        .join("\n");
        let image = FirmwareImage::from_intel_hex(&text).unwrap();

        let device = MockDevice::new();
        let handle = device.handle();
        let mut session = Session::new(device);
        session.open().unwrap();

        assert_eq!(session.upload_firmware(&image).unwrap(), 2);

        let payloads = handle.written_payloads();
        assert_eq!(payloads.len(), 4);
        assert_eq!(payloads[0], vec![0x00, 0x80 | START_DOWNLOAD]);
        assert_eq!(&payloads[1][..4], &[0x00, 0x01, 0x10, 0x20]);
        assert_eq!(payloads[1].len(), BLOCK_PAYLOAD_SIZE);
        assert_eq!(&payloads[2][..3], &[0x00, 0x20, 0x30]);
        assert_eq!(payloads[3], vec![0x00, 0x80 | END_DOWNLOAD]);
    }

    #[test]
    fn upload_on_closed_session_fails_before_sending() {
        let device = MockDevice::new();
        let handle = device.handle();
        let session = Session::new(device);
        let err = session.upload_firmware(&FirmwareImage::empty()).unwrap_err();
        assert!(matches!(err, crate::SessionError::NotOpen));
        assert_eq!(handle.writes(), 0);
    }

    #[test]
    fn from_file_reads_hex() {
        let path = std::env::temp_dir().join(format!("apoxcan-fw-{}.hex", std::process::id()));
        std::fs::write(&path, record(0x0000, RECORD_DATA, &[0x5A])).unwrap();
        let image = FirmwareImage::from_file(&path).unwrap();
        assert_eq!(image.as_bytes()[0], 0x5A);
        let _ = std::fs::remove_file(&path);

        assert!(matches!(
            FirmwareImage::from_file(path.with_extension("missing")),
            Err(FirmwareError::Io(_))
        ));
    }
}
