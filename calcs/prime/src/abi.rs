//! Request payloads and reply parsers.
//!
//! Payloads are whole virtual packets; fragmentation happens below.

use chrono::{Datelike, NaiveDateTime, Timelike};
use hpcalcs_core::{HpError, Result, ScreenshotFormat, VarEntry};
use prime_protocol::cmd::{self, frame, HEADER_LEN};
use prime_protocol::{file_crc, screen_crc, FILE_CRC_OFFSET};
use tracing::{debug, warn};

use crate::types::PrimeType;

/// Byte order mark stripped from text files before sending
const UTF16LE_BOM: [u8; 2] = [0xFF, 0xFE];

/// Size of the screenshot reply header: frame header, CRC, format, markers
pub const SCREEN_HEADER_LEN: usize = 13;

/// Fixed part of a file frame: frame header, type, name length, CRC
pub const FILE_HEADER_LEN: usize = 10;

pub fn check_ready() -> Vec<u8> {
    vec![cmd::CHECK_READY]
}

pub fn get_infos() -> Vec<u8> {
    vec![cmd::GET_INFOS]
}

pub fn recv_screen(format: ScreenshotFormat) -> Vec<u8> {
    vec![cmd::RECV_SCREEN, format.into()]
}

pub fn recv_backup() -> Vec<u8> {
    vec![cmd::RECV_BACKUP]
}

/// Set the clock; the year must fit the calculator's one byte offset from 2000
pub fn set_date_time(time: NaiveDateTime) -> Result<Vec<u8>> {
    let year = u8::try_from(time.year() - 2000).map_err(|_| HpError::SplitTimestamp)?;
    Ok(frame(
        cmd::SET_DATE_TIME,
        &[
            0x00,
            0x00,
            year,
            time.month() as u8,
            time.day() as u8,
            time.hour() as u8,
            time.minute() as u8,
            time.second() as u8,
            0x00,
            0x00,
        ],
    ))
}

pub fn send_key(code: u8) -> Vec<u8> {
    frame(cmd::SEND_KEY, &[code])
}

pub fn send_keys(codes: &[u8]) -> Vec<u8> {
    frame(cmd::SEND_KEY, codes)
}

pub fn send_chat(text: &str) -> Vec<u8> {
    let body: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
    frame(cmd::SEND_CHAT, &body)
}

/// Frame a named file body with its checksum patched in
fn file_frame(code: u8, var_type: u8, name: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let name_len =
        u8::try_from(name.len()).map_err(|_| HpError::InvalidParameter("name too long"))?;

    let mut body = Vec::with_capacity(4 + name.len() + data.len());
    body.extend_from_slice(&[var_type, name_len, 0x00, 0x00]);
    body.extend_from_slice(name);
    body.extend_from_slice(data);

    let mut out = frame(code, &body);
    let crc = file_crc(&out);
    out[FILE_CRC_OFFSET..FILE_CRC_OFFSET + 2].copy_from_slice(&crc.to_be_bytes());
    Ok(out)
}

pub fn send_file(file: &VarEntry) -> Result<Vec<u8>> {
    let mut data = file.data.as_slice();
    if PrimeType::from(file.var_type).is_text() {
        if let Some(rest) = data.strip_prefix(&UTF16LE_BOM) {
            debug!("stripping byte order mark");
            data = rest;
        }
    }
    file_frame(cmd::SEND_FILE, file.var_type, &file.name_utf16le(), data)
}

pub fn recv_file(request: &VarEntry) -> Result<Vec<u8>> {
    file_frame(cmd::REQ_FILE, request.var_type, &request.name_utf16le(), &[])
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Validate a screenshot reply and strip its header
pub fn parse_screen(reply: &[u8], format: ScreenshotFormat) -> Result<Vec<u8>> {
    if reply.len() < SCREEN_HEADER_LEN {
        return Err(HpError::PacketFormat(format!(
            "screenshot reply too short: {} bytes",
            reply.len()
        )));
    }
    let expected = u16::from_le_bytes([reply[6], reply[7]]);
    let computed = screen_crc(reply);
    if expected != computed {
        return Err(HpError::PacketFormat(format!(
            "screenshot CRC mismatch: got {expected:#06x}, computed {computed:#06x}"
        )));
    }
    if reply[8] != u8::from(format) {
        return Err(HpError::PacketFormat(format!(
            "screenshot format {:#04x}, requested {:#04x}",
            reply[8],
            u8::from(format)
        )));
    }
    if reply[9..13] != [0xFF; 4] {
        return Err(HpError::PacketFormat("screenshot marker mismatch".into()));
    }
    Ok(reply[SCREEN_HEADER_LEN..].to_vec())
}

/// Parse one file frame. `None` is the end of transfer marker.
///
/// A checksum mismatch flags the entry invalid instead of failing.
pub fn parse_file(reply: &[u8]) -> Result<Option<VarEntry>> {
    if reply.first() == Some(&cmd::RECV_BACKUP) {
        debug!("end of transfer");
        return Ok(None);
    }
    if reply.len() < FILE_HEADER_LEN {
        return Err(HpError::PacketFormat(format!(
            "file reply too short: {} bytes",
            reply.len()
        )));
    }
    let var_type = reply[HEADER_LEN];
    let name_end = FILE_HEADER_LEN + reply[HEADER_LEN + 1] as usize;
    let expected = u16::from_le_bytes([reply[FILE_CRC_OFFSET], reply[FILE_CRC_OFFSET + 1]]);
    let name = reply
        .get(FILE_HEADER_LEN..name_end)
        .ok_or_else(|| HpError::PacketFormat("file name overruns reply".into()))?;

    let mut entry = VarEntry::with_data_and_name(
        &decode_utf16le(name),
        var_type,
        &reply[name_end..],
    );
    let computed = file_crc(reply);
    if expected != computed {
        warn!(
            name = %entry.name,
            "file CRC mismatch: got {expected:#06x}, computed {computed:#06x}"
        );
        entry.invalid = true;
    }
    Ok(Some(entry))
}

/// Strip the frame header of a chat reply
pub fn parse_chat(reply: &[u8]) -> Result<String> {
    reply
        .get(HEADER_LEN..)
        .map(decode_utf16le)
        .ok_or_else(|| HpError::PacketFormat("chat reply too short".into()))
}
