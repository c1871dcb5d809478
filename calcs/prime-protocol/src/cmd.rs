//! Command codes.
//!
//! A framed command starts with its code, then [`PROTOCOL_VERSION`], then a
//! big-endian u32 body length, then the body.

pub const CHECK_READY: u8 = 0xFF;
pub const GET_INFOS: u8 = 0xFA;
pub const RECV_SCREEN: u8 = 0xFC;
pub const RECV_BACKUP: u8 = 0xF9;
pub const REQ_FILE: u8 = 0xF8;
pub const RECV_FILE: u8 = 0xF7;
pub const SEND_FILE: u8 = 0xF7;
pub const RECV_CHAT: u8 = 0xF2;
pub const SEND_CHAT: u8 = 0xF2;
pub const SEND_KEY: u8 = 0xEC;
pub const SET_DATE_TIME: u8 = 0xE7;

/// Marker following the command code of every framed message
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Command code, version marker and body length
pub const HEADER_LEN: usize = 6;

/// Frame `body` as `[cmd, 0x01, len BE, body]`
pub fn frame(cmd: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.push(cmd);
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        assert_eq!(
            frame(SEND_KEY, &[0x1E]),
            vec![0xEC, 0x01, 0x00, 0x00, 0x00, 0x01, 0x1E]
        );
        assert_eq!(frame(GET_INFOS, &[]), vec![0xFA, 0x01, 0, 0, 0, 0]);
    }
}
