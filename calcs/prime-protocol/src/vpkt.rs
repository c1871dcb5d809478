//! Virtual packets: logical messages split across raw packets.
//!
//! There is no "more data follows" flag on the wire. The receiver stops on
//! a short read or once the size predicted from the first packet has
//! arrived, whichever comes first.

use hpcalcs_core::{CableHandle, HpError, Result};
use tracing::{debug, error, info, warn};

use crate::cmd;
use crate::rpkt::{recv_raw, send_raw, RawPacket, RAW_DATA_SIZE};

/// Payload bytes carried by one raw packet
pub const PAYLOAD_SIZE: usize = 63;

/// Largest message a reply may announce. Bigger predictions come from
/// corrupt headers and are refused before anything is allocated.
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// Sequence numbering in use on the link
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProtocolMode {
    /// Host sequence 0..=0xFE, device packets starting with 0xFF are noise
    #[default]
    Legacy,
    /// Negotiated with [`send_extended_init`]. Host sequence starts at 1 and
    /// wraps from 0xFD to 2; device packets starting with 0xFE are noise too.
    Extended,
}

impl ProtocolMode {
    pub fn first_seq(self) -> u8 {
        match self {
            Self::Legacy => 0x00,
            Self::Extended => 0x01,
        }
    }

    pub fn next_seq(self, seq: u8) -> u8 {
        let next = seq.wrapping_add(1);
        match self {
            Self::Legacy if next == 0xFF => 0x00,
            Self::Extended if next == 0xFE => 0x02,
            _ => next,
        }
    }

    /// Sequence byte the device puts on its `count`th packet
    pub fn expected_recv_seq(self, count: usize) -> u8 {
        match self {
            Self::Legacy => (count % 0xFF) as u8,
            Self::Extended => (count % 0xFE) as u8,
        }
    }

    /// Out-of-band packets that are dropped during reassembly
    pub fn is_spurious(self, first: u8) -> bool {
        match self {
            Self::Legacy => first == 0xFF,
            Self::Extended => first == 0xFF || first == 0xFE,
        }
    }
}

/// One logical message and the command it belongs to
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VirtualPacket {
    pub cmd: u8,
    pub data: Vec<u8>,
}

impl VirtualPacket {
    pub fn new(cmd: u8, data: Vec<u8>) -> Self {
        Self { cmd, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Hand the payload over to the caller
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Raw packets of one message, produced lazily
pub struct Fragments<'a> {
    remaining: &'a [u8],
    seq: u8,
    mode: ProtocolMode,
    done: bool,
}

impl<'a> Fragments<'a> {
    pub fn new(data: &'a [u8], mode: ProtocolMode) -> Self {
        Self {
            remaining: data,
            seq: mode.first_seq(),
            mode,
            done: false,
        }
    }
}

impl Iterator for Fragments<'_> {
    type Item = RawPacket;

    fn next(&mut self) -> Option<RawPacket> {
        if self.done {
            return None;
        }
        let take = self.remaining.len().min(PAYLOAD_SIZE);
        let (chunk, rest) = self.remaining.split_at(take);

        let mut raw = RawPacket::default();
        raw.data[1] = self.seq;
        raw.data[2..2 + take].copy_from_slice(chunk);
        raw.size = take + 2;

        self.remaining = rest;
        self.seq = self.mode.next_seq(self.seq);
        // an empty message still goes out as one empty packet
        self.done = take < PAYLOAD_SIZE || rest.is_empty();
        Some(raw)
    }
}

/// Send a message, aborting on the first failed raw packet
pub fn send_data(cable: &mut CableHandle, mode: ProtocolMode, pkt: &VirtualPacket) -> Result<()> {
    let q = pkt.len() / PAYLOAD_SIZE;
    let r = pkt.len() % PAYLOAD_SIZE;
    debug!(cmd = format_args!("{:#04x}", pkt.cmd), q, r, "send data");

    for (i, raw) in Fragments::new(&pkt.data, mode).enumerate() {
        send_raw(cable, &raw).inspect_err(|e| warn!("send {} failed: {e}", i + 1))?;
    }
    Ok(())
}

/// Receive the reply to `cmd`, predicting its size with [`data_size`]
pub fn recv_data(cable: &mut CableHandle, mode: ProtocolMode, cmd: u8) -> Result<VirtualPacket> {
    recv_data_with(cable, mode, cmd, |head| data_size(cmd, head))
}

/// Receive a message whose total size `predict` derives from the payload of
/// the first accepted packet.
///
/// The result is always exactly the predicted size: extra bytes are cut,
/// missing bytes are zero filled with a warning.
pub fn recv_data_with(
    cable: &mut CableHandle,
    mode: ProtocolMode,
    cmd: u8,
    mut predict: impl FnMut(&[u8]) -> Result<usize>,
) -> Result<VirtualPacket> {
    let mut data = Vec::new();
    let mut expected = 0usize;
    let mut count = 0usize;

    loop {
        let raw = recv_raw(cable)?;
        if raw.size > 0 {
            let seq = raw.data[0];
            if mode.is_spurious(seq) {
                warn!("skipping packet starting with {seq:#04x}");
                continue;
            }
            let want = mode.expected_recv_seq(count);
            if seq != want {
                error!("packet out of sequence, got {seq:#04x}, expected {want:#04x}");
                return Err(HpError::PacketFormat(format!(
                    "packet out of sequence, got {seq:#04x}, expected {want:#04x}"
                )));
            }
            count += 1;

            if count == 1 {
                expected = predict(&raw.data[1..RAW_DATA_SIZE])?;
                if expected > MAX_MESSAGE_SIZE {
                    error!("predicted size {expected} exceeds {MAX_MESSAGE_SIZE} bytes");
                    return Err(HpError::PacketFormat(format!(
                        "announced size {expected} exceeds {MAX_MESSAGE_SIZE} bytes"
                    )));
                }
            }

            let payload = &raw.data[1..raw.size];
            data.try_reserve(payload.len()).map_err(|_| HpError::Malloc)?;
            data.extend_from_slice(payload);
        }

        if raw.is_short() {
            debug!("stopping on short packet");
            break;
        }
        if data.len() >= expected {
            debug!("stopping, expected size reached");
            break;
        }
    }

    if expected <= data.len() {
        debug!(from = data.len(), to = expected, "shortening packet");
    } else {
        warn!(
            "expected {expected} bytes but only got {} bytes, output corrupted",
            data.len()
        );
        data.try_reserve(expected - data.len())
            .map_err(|_| HpError::Malloc)?;
    }
    data.resize(expected, 0);
    Ok(VirtualPacket { cmd, data })
}

/// Predict the total size of the reply to `cmd` from its first bytes
pub fn data_size(cmd: u8, head: &[u8]) -> Result<usize> {
    match cmd {
        cmd::CHECK_READY => Ok(1),
        cmd::GET_INFOS | cmd::RECV_SCREEN | cmd::RECV_BACKUP | cmd::RECV_FILE | cmd::RECV_CHAT => {
            match head {
                [tag, cmd::PROTOCOL_VERSION, a, b, c, d, ..] => {
                    if *tag != cmd {
                        warn!("command in packet {tag:#04x} does not match the expected command {cmd:#04x}");
                    }
                    usize::try_from(u32::from_be_bytes([*a, *b, *c, *d]))
                        .ok()
                        .and_then(|len| len.checked_add(cmd::HEADER_LEN))
                        .ok_or_else(|| {
                            HpError::PacketFormat(format!("reply to {cmd:#04x} is too long"))
                        })
                },
                // end of a file transfer
                [cmd::RECV_BACKUP, ..] if matches!(cmd, cmd::RECV_FILE | cmd::RECV_BACKUP) => {
                    Ok(1)
                },
                _ => {
                    error!("expected {:#04x} as second data byte", cmd::PROTOCOL_VERSION);
                    Err(HpError::PacketFormat(format!(
                        "reply to {cmd:#04x} lacks the version marker"
                    )))
                },
            }
        },
        _ => {
            error!("unknown command {cmd:#04x}, size undetermined");
            Ok(0)
        },
    }
}

/// Switch the device to [`ProtocolMode::Extended`] sequence numbering
pub fn send_extended_init(cable: &mut CableHandle) -> Result<()> {
    let mut raw = RawPacket::default();
    raw.data[1] = 0xFF;
    raw.data[2] = cmd::SEND_KEY;
    raw.size = 8;
    send_raw(cable, &raw)
        .inspect(|_| info!("extended protocol init sent"))
        .inspect_err(|e| warn!("extended protocol init failed: {e}"))
}
