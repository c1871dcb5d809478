//! CRC-16/CCITT checksums.
//!
//! Polynomial: 0x1021, Initial: 0x0000, No reflection, No final XOR
//!
//! File transfers and screenshots checksum different byte ranges. Both are
//! kept as separate functions.

use crc::{Algorithm, Crc};

pub const PRIME_CRC16: Algorithm<u16> = crc::CRC_16_XMODEM;

const CRC: Crc<u16> = Crc::<u16>::new(&PRIME_CRC16);

/// Offset of the CRC field in file transfer frames
pub const FILE_CRC_OFFSET: usize = 8;

/// Trailing bytes of a file frame left out of its checksum
pub const FILE_CRC_TRAILER: usize = 6;

/// Offset where the checksummed region of a screenshot reply starts
pub const SCREEN_CRC_START: usize = 8;

/// Calculate the CRC of `data`
pub fn crc16(data: &[u8]) -> u16 {
    CRC.checksum(data)
}

/// CRC of a file transfer frame: bytes `[0, len - 6)`, with the CRC field
/// itself counted as zero
pub fn file_crc(frame: &[u8]) -> u16 {
    let end = frame.len().saturating_sub(FILE_CRC_TRAILER);
    let field_start = FILE_CRC_OFFSET.min(end);
    let field_end = (FILE_CRC_OFFSET + 2).min(end);

    let mut digest = CRC.digest();
    digest.update(&frame[..field_start]);
    digest.update(&[0u8; 2][..field_end - field_start]);
    digest.update(&frame[field_end..end]);
    digest.finalize()
}

/// CRC of a screenshot reply: everything from the format byte on
pub fn screen_crc(reply: &[u8]) -> u16 {
    crc16(reply.get(SCREEN_CRC_START..).unwrap_or_default())
}
