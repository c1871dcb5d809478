//! Raw packets: one HID report each.
//!
//! Host reports are 65 bytes: report number, sequence byte, 63 payload
//! bytes. Device reports arrive as 64 bytes, sequence byte first.

use hpcalcs_core::{CableHandle, Result};
use tracing::{trace, Level};

/// Host report: report number + 64 data bytes
pub const RAW_REPORT_SIZE: usize = 65;

/// Device report, and the read size that does not signal end of message
pub const RAW_DATA_SIZE: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawPacket {
    /// Number of meaningful bytes in `data`
    pub size: usize,
    pub data: [u8; RAW_REPORT_SIZE],
}

impl Default for RawPacket {
    fn default() -> Self {
        Self {
            size: 0,
            data: [0; RAW_REPORT_SIZE],
        }
    }
}

impl RawPacket {
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// True when a device read came back shorter than a full report
    pub fn is_short(&self) -> bool {
        self.size < RAW_DATA_SIZE
    }
}

/// Hex dump `bytes` at trace level, 16 per line
pub fn hexdump(direction: &str, bytes: &[u8]) {
    if !tracing::enabled!(Level::TRACE) {
        return;
    }
    trace!("{direction} {} bytes", bytes.len());
    for (i, line) in bytes.chunks(16).enumerate() {
        trace!("{direction} {:04x}: {}", i * 16, hex::encode(line));
    }
}

/// Write a packet verbatim
pub fn send_raw(cable: &mut CableHandle, pkt: &RawPacket) -> Result<()> {
    hexdump("OUT", pkt.bytes());
    cable.send(pkt.bytes())
}

/// Read one device report with the cable's read timeout.
///
/// A short read is not an error; the returned size says how much arrived.
pub fn recv_raw(cable: &mut CableHandle) -> Result<RawPacket> {
    let mut pkt = RawPacket::default();
    pkt.size = cable.recv(&mut pkt.data[..RAW_DATA_SIZE])?;
    hexdump("IN", pkt.bytes());
    Ok(pkt)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use hpcalcs_core::{Cable, CableInfo, HpError, NUL_INFO};

    use super::*;

    struct OneShot {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        reply: Vec<u8>,
    }

    impl Cable for OneShot {
        fn info(&self) -> &'static CableInfo {
            &NUL_INFO
        }
        fn open(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn send(&mut self, data: &[u8]) -> Result<()> {
            self.sent.lock().unwrap().push(data.to_vec());
            Ok(())
        }
        fn recv(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            let n = self.reply.len().min(buf.len());
            buf[..n].copy_from_slice(&self.reply[..n]);
            Ok(n)
        }
    }

    #[test]
    fn send_forwards_only_meaningful_bytes() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut cable = CableHandle::new(Box::new(OneShot {
            sent: sent.clone(),
            reply: vec![],
        }));
        cable.open().unwrap();

        let mut pkt = RawPacket::default();
        pkt.data[2] = 0xFF;
        pkt.size = 3;
        send_raw(&mut cable, &pkt).unwrap();
        assert_eq!(sent.lock().unwrap()[0], vec![0x00, 0x00, 0xFF]);
    }

    #[test]
    fn recv_reports_short_reads() {
        let mut cable = CableHandle::new(Box::new(OneShot {
            sent: Arc::default(),
            reply: vec![0x00, 0xFF],
        }));
        cable.open().unwrap();

        let pkt = recv_raw(&mut cable).unwrap();
        assert_eq!(pkt.bytes(), &[0x00, 0xFF]);
        assert!(pkt.is_short());
    }

    #[test]
    fn recv_never_exceeds_device_report() {
        let mut cable = CableHandle::new(Box::new(OneShot {
            sent: Arc::default(),
            reply: vec![7; 100],
        }));
        cable.open().unwrap();

        let pkt = recv_raw(&mut cable).unwrap();
        assert_eq!(pkt.size, RAW_DATA_SIZE);
        assert!(!pkt.is_short());
    }

    #[test]
    fn closed_cable_fails() {
        let mut cable = CableHandle::new(Box::new(OneShot {
            sent: Arc::default(),
            reply: vec![],
        }));
        assert!(matches!(recv_raw(&mut cable), Err(HpError::CableNotOpen)));
    }
}
