//! HP Prime calculator driver

use chrono::NaiveDateTime;
use hpcalcs_core::{
    Backup, Calc, CableHandle, CalcInfo, CalcInfos, CalcModel, CalcOps, Result, ScreenshotFormat,
    VarEntry,
};
use prime_protocol::{cmd, recv_data, send_data, send_extended_init, ProtocolMode, VirtualPacket};
use tracing::{debug, error, info};

pub mod abi;
pub mod types;

pub use types::PrimeType;

/// Static calculator info
pub static INFO: CalcInfo = CalcInfo {
    model: CalcModel::Prime,
    name: "HP Prime",
    description: "HP Prime Graphing Calculator",
    ops: CalcOps::all(),
};

/// Request/reply driver for the HP Prime.
///
/// The only session state is the sequence numbering negotiated on the link.
#[derive(Debug, Default)]
pub struct Prime {
    mode: ProtocolMode,
}

impl Prime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ProtocolMode {
        self.mode
    }

    fn send(&self, cable: &mut CableHandle, payload: Vec<u8>) -> Result<()> {
        // the command byte only matters for receiving
        let pkt = VirtualPacket::new(payload.first().copied().unwrap_or_default(), payload);
        send_data(cable, self.mode, &pkt).inspect_err(|e| error!("send failed: {e}"))
    }

    fn recv(&self, cable: &mut CableHandle, cmd: u8) -> Result<Vec<u8>> {
        recv_data(cable, self.mode, cmd)
            .map(VirtualPacket::into_data)
            .inspect_err(|e| error!("recv of {cmd:#04x} reply failed: {e}"))
    }
}

impl Calc for Prime {
    fn info(&self) -> &'static CalcInfo {
        &INFO
    }

    fn check_ready(&mut self, cable: &mut CableHandle) -> Result<Vec<u8>> {
        self.send(cable, abi::check_ready())?;
        self.recv(cable, cmd::CHECK_READY)
    }

    fn get_infos(&mut self, cable: &mut CableHandle) -> Result<CalcInfos> {
        self.send(cable, abi::get_infos())?;
        let data = self.recv(cable, cmd::GET_INFOS)?;
        Ok(CalcInfos { data })
    }

    fn set_date_time(&mut self, cable: &mut CableHandle, time: NaiveDateTime) -> Result<()> {
        debug!(%time, "set date and time");
        self.send(cable, abi::set_date_time(time)?)
    }

    fn recv_screen(&mut self, cable: &mut CableHandle, format: ScreenshotFormat) -> Result<Vec<u8>> {
        self.send(cable, abi::recv_screen(format))?;
        let reply = self.recv(cable, cmd::RECV_SCREEN)?;
        abi::parse_screen(&reply, format)
    }

    fn send_file(&mut self, cable: &mut CableHandle, file: &VarEntry) -> Result<()> {
        self.send(cable, abi::send_file(file)?)?;
        // acknowledged like a readiness check
        let ack = self.recv(cable, cmd::CHECK_READY)?;
        debug!(ack = ?ack, "file acknowledged");
        Ok(())
    }

    fn recv_file(&mut self, cable: &mut CableHandle, request: &VarEntry) -> Result<Option<VarEntry>> {
        self.send(cable, abi::recv_file(request)?)?;
        let reply = self.recv(cable, cmd::RECV_FILE)?;
        abi::parse_file(&reply)
    }

    fn recv_backup(&mut self, cable: &mut CableHandle) -> Result<Backup> {
        self.send(cable, abi::recv_backup())?;

        let mut backup = Backup::default();
        loop {
            match self
                .recv(cable, cmd::RECV_FILE)
                .and_then(|reply| abi::parse_file(&reply))
            {
                Ok(Some(entry)) => {
                    debug!(name = %entry.name, size = entry.size(), "backup entry");
                    backup.entries.push(entry);
                },
                Ok(None) => break,
                Err(e) => {
                    error!(
                        "backup interrupted after {} entries: {e}",
                        backup.entries.len()
                    );
                    backup.error = Some(e);
                    break;
                },
            }
        }
        info!(entries = backup.entries.len(), "backup received");
        Ok(backup)
    }

    fn send_key(&mut self, cable: &mut CableHandle, code: u8) -> Result<()> {
        self.send(cable, abi::send_key(code))
    }

    fn send_keys(&mut self, cable: &mut CableHandle, codes: &[u8]) -> Result<()> {
        self.send(cable, abi::send_keys(codes))
    }

    fn send_chat(&mut self, cable: &mut CableHandle, text: &str) -> Result<()> {
        self.send(cable, abi::send_chat(text))
    }

    fn recv_chat(&mut self, cable: &mut CableHandle) -> Result<String> {
        let reply = self.recv(cable, cmd::RECV_CHAT)?;
        abi::parse_chat(&reply)
    }

    fn enable_extended_protocol(&mut self, cable: &mut CableHandle) -> Result<()> {
        send_extended_init(cable)?;
        self.mode = ProtocolMode::Extended;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use hpcalcs_core::{Cable, CableInfo, HpError, NUL_INFO};
    use prime_protocol::PAYLOAD_SIZE;

    use super::*;
    use crate::abi::tests::{device_file, device_screen};

    #[derive(Default)]
    struct Wire {
        sent: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
    }

    impl Wire {
        /// Queue one device message, split into sequenced reports
        fn reply(&mut self, msg: &[u8]) {
            let mut chunks: Vec<&[u8]> = msg.chunks(PAYLOAD_SIZE).collect();
            if chunks.is_empty() {
                chunks.push(&[]);
            }
            for (i, chunk) in chunks.into_iter().enumerate() {
                let mut pkt = vec![ProtocolMode::Legacy.expected_recv_seq(i)];
                pkt.extend_from_slice(chunk);
                self.replies.push_back(pkt);
            }
        }

        /// Host messages with report number and sequence bytes removed
        fn sent_payloads(&self) -> Vec<u8> {
            self.sent.iter().flat_map(|pkt| pkt[2..].to_vec()).collect()
        }
    }

    struct ScriptedCable(Arc<Mutex<Wire>>);

    impl Cable for ScriptedCable {
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
            self.0.lock().unwrap().sent.push(data.to_vec());
            Ok(())
        }
        fn recv(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            let Some(reply) = self.0.lock().unwrap().replies.pop_front() else {
                return Ok(0);
            };
            buf[..reply.len()].copy_from_slice(&reply);
            Ok(reply.len())
        }
    }

    fn setup() -> (CableHandle, Arc<Mutex<Wire>>) {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let mut cable = CableHandle::new(Box::new(ScriptedCable(wire.clone())));
        cable.open().unwrap();
        (cable, wire)
    }

    #[test]
    fn check_ready_round_trip() {
        let (mut cable, wire) = setup();
        wire.lock().unwrap().reply(&[0xFF]);

        let reply = Prime::new().check_ready(&mut cable).unwrap();
        assert_eq!(reply, vec![0xFF]);
        assert_eq!(wire.lock().unwrap().sent, vec![vec![0x00, 0x00, 0xFF]]);
    }

    #[test]
    fn get_infos_returns_whole_reply() {
        let (mut cable, wire) = setup();
        let mut reply = vec![0xFA, 0x01, 0x00, 0x00, 0x00, 0x50];
        reply.extend((0..0x50).map(|i| i as u8));
        wire.lock().unwrap().reply(&reply);

        let infos = Prime::new().get_infos(&mut cable).unwrap();
        assert_eq!(infos.data, reply);
    }

    #[test]
    fn screenshot_spanning_many_packets() {
        let (mut cable, wire) = setup();
        let image: Vec<u8> = (0..5000).map(|i| (i % 251) as u8).collect();
        wire.lock()
            .unwrap()
            .reply(&device_screen(ScreenshotFormat::Png320x240x4.into(), &image));

        let png = Prime::new()
            .recv_screen(&mut cable, ScreenshotFormat::Png320x240x4)
            .unwrap();
        assert_eq!(png, image);
        assert_eq!(wire.lock().unwrap().sent, vec![vec![0x00, 0x00, 0xFC, 9]]);
    }

    #[test]
    fn recv_file_marks_corrupt_entry() {
        let (mut cable, wire) = setup();
        let mut reply = device_file("Prog", 6, b"EXPORT Prog() BEGIN END;");
        reply[20] ^= 0x01;
        wire.lock().unwrap().reply(&reply);

        let request = VarEntry::with_data_and_name("Prog", 6, &[]);
        let entry = Prime::new()
            .recv_file(&mut cable, &request)
            .unwrap()
            .unwrap();
        assert!(entry.invalid);
        assert_eq!(entry.name, "Prog");
    }

    #[test]
    fn recv_file_missing_is_none() {
        let (mut cable, wire) = setup();
        wire.lock().unwrap().reply(&[0xF9]);

        let request = VarEntry::with_data_and_name("Nope", 6, &[]);
        assert!(Prime::new()
            .recv_file(&mut cable, &request)
            .unwrap()
            .is_none());
    }

    #[test]
    fn backup_collects_until_end_marker() {
        let (mut cable, wire) = setup();
        {
            let mut wire = wire.lock().unwrap();
            wire.reply(&device_file("A", 0x0A, &[1; 8]));
            wire.reply(&device_file("L1", 0x03, &[2; 100]));
            wire.reply(&[0xF9]);
        }

        let backup = Prime::new().recv_backup(&mut cable).unwrap();
        assert!(backup.is_complete());
        let names: Vec<_> = backup.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["A", "L1"]);
        assert_eq!(wire.lock().unwrap().sent, vec![vec![0x00, 0x00, 0xF9]]);
    }

    #[test]
    fn backup_salvages_entries_before_failure() {
        let (mut cable, wire) = setup();
        {
            let mut wire = wire.lock().unwrap();
            wire.reply(&device_file("F1", 6, b"one"));
            wire.reply(&device_file("F2", 6, b"two"));
            // third file lost its version marker
            let mut broken = device_file("F3", 6, b"three");
            broken[1] = 0x00;
            wire.reply(&broken);
            wire.reply(&device_file("F4", 6, b"four"));
            wire.reply(&device_file("F5", 6, b"five"));
        }

        let backup = Prime::new().recv_backup(&mut cable).unwrap();
        assert_eq!(backup.entries.len(), 2);
        assert_eq!(backup.entries[1].name, "F2");
        assert!(matches!(backup.error, Some(HpError::PacketFormat(_))));
    }

    #[test]
    fn send_file_waits_for_ack() {
        let (mut cable, wire) = setup();
        wire.lock().unwrap().reply(&[0x00]);

        let file = VarEntry::with_data_and_name("P", 6, &[0xFF, 0xFE, b'X', 0]);
        Prime::new().send_file(&mut cable, &file).unwrap();

        let wire = wire.lock().unwrap();
        assert!(wire.replies.is_empty());
        let sent = wire.sent_payloads();
        assert_eq!(&sent[..6], &[0xF7, 0x01, 0, 0, 0, 8]);
        assert_eq!(&sent[12..], &[b'X', 0]);
    }

    #[test]
    fn fire_and_forget_commands_read_nothing() {
        let (mut cable, wire) = setup();
        let mut prime = Prime::new();
        prime.send_key(&mut cable, 0x2A).unwrap();
        prime.send_keys(&mut cable, &[1, 2]).unwrap();
        prime.send_chat(&mut cable, "ok").unwrap();

        let wire = wire.lock().unwrap();
        assert_eq!(wire.sent.len(), 3);
        assert_eq!(wire.sent[0], vec![0, 0, 0xEC, 0x01, 0, 0, 0, 1, 0x2A]);
        assert_eq!(wire.sent[2][2], 0xF2);
    }

    #[test]
    fn chat_reply_is_decoded() {
        let (mut cable, wire) = setup();
        wire.lock()
            .unwrap()
            .reply(&abi::send_chat("hello calculator"));
        let text = Prime::new().recv_chat(&mut cable).unwrap();
        assert_eq!(text, "hello calculator");
    }

    #[test]
    fn extended_protocol_renumbers_host_packets() {
        let (mut cable, wire) = setup();
        let mut prime = Prime::new();
        prime.enable_extended_protocol(&mut cable).unwrap();
        assert_eq!(prime.mode(), ProtocolMode::Extended);

        {
            let mut wire = wire.lock().unwrap();
            wire.replies.push_back(vec![0xFE, 0x00]);
            wire.reply(&[0xFF]);
        }
        assert_eq!(prime.check_ready(&mut cable).unwrap(), vec![0xFF]);

        let wire = wire.lock().unwrap();
        assert_eq!(wire.sent[0], vec![0x00, 0xFF, 0xEC, 0, 0, 0, 0, 0]);
        assert_eq!(wire.sent[1], vec![0x00, 0x01, 0xFF]);
    }

    #[test]
    fn set_date_time_sends_frame() {
        let (mut cable, wire) = setup();
        let time = chrono::NaiveDate::from_ymd_opt(2030, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap();
        Prime::new().set_date_time(&mut cable, time).unwrap();
        assert_eq!(
            wire.lock().unwrap().sent_payloads(),
            vec![0xE7, 0x01, 0, 0, 0, 0x0A, 0, 0, 30, 12, 31, 23, 59, 58, 0, 0]
        );
    }
}
