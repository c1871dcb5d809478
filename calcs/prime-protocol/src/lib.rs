//! Packet layers of the HP Prime USB HID protocol.
//!
//! ## Protocol Overview
//!
//! Every HID report carries one sequence byte and up to 63 payload bytes.
//! Logical messages ("virtual packets") of any length are split into as many
//! reports as needed and reassembled on the other side. Most replies announce
//! their length in a 6-byte header (command, 0x01, big-endian u32), which is
//! how the receiver knows when to stop reading.
//!
//! Checksums are CRC-16/XMODEM.

pub mod cmd;
pub mod crc;
pub mod rpkt;
pub mod vpkt;

pub use self::crc::*;
pub use rpkt::*;
pub use vpkt::*;
