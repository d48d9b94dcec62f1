//! Wire format of the 64-byte stream packets
//!
//! ```text
//! byte 0         bytes 1..63
//! +-----------+  +------------------------------+
//! | LLLLLL TT |  | payload                      |
//! +-----------+  +------------------------------+
//!   TT     = packet type (text, data0, data1, data2)
//!   LLLLLL = payload length, data packets only
//! ```
//!
//! Text packets carry a NUL-terminated string instead of a length. Device
//! identification uses two reserved header patterns outside this scheme.

use thiserror::Error;

pub use rawhid_transport::REPORT_SIZE as PACKET_SIZE;

/// Payload bytes available after the header
pub const PAYLOAD_CAPACITY: usize = PACKET_SIZE - 1;

/// Identification query marker (host → device), repeated in bytes 0..2.
/// Backspace never starts a normal text transmission.
pub const TX_ID: u8 = 0x08;

/// Identification response marker (device → host), byte 0 only.
/// Reads as a text packet claiming 63 bytes, which text packets never do.
pub const RX_ID: u8 = 0xFC;

const TYPE_MASK: u8 = 0x03;
const LENGTH_SHIFT: u32 = 2;

/// Packet type from the low two header bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Text = 0,
    Data0 = 1,
    Data1 = 2,
    Data2 = 3,
}

impl PacketType {
    pub const ALL: [PacketType; 4] = [Self::Text, Self::Data0, Self::Data1, Self::Data2];

    fn from_bits(bits: u8) -> Self {
        match bits & TYPE_MASK {
            0 => Self::Text,
            1 => Self::Data0,
            2 => Self::Data1,
            _ => Self::Data2,
        }
    }

    /// Data stream carried by this packet type, `None` for text
    pub fn stream(self) -> Option<StreamId> {
        match self {
            Self::Text => None,
            Self::Data0 => Some(StreamId::Data0),
            Self::Data1 => Some(StreamId::Data1),
            Self::Data2 => Some(StreamId::Data2),
        }
    }
}

/// One of the three binary data streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamId {
    Data0,
    Data1,
    Data2,
}

impl StreamId {
    pub const ALL: [StreamId; 3] = [Self::Data0, Self::Data1, Self::Data2];

    /// Channel index 0..=2 as used on the command line
    pub fn index(self) -> usize {
        match self {
            Self::Data0 => 0,
            Self::Data1 => 1,
            Self::Data2 => 2,
        }
    }

    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Self::Data0),
            1 => Some(Self::Data1),
            2 => Some(Self::Data2),
            _ => None,
        }
    }

    pub fn packet_type(self) -> PacketType {
        match self {
            Self::Data0 => PacketType::Data0,
            Self::Data1 => PacketType::Data1,
            Self::Data2 => PacketType::Data2,
        }
    }
}

/// Packet decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Error: got invalid packet length from header: {0}")]
    MalformedLength(usize),

    #[error("Error reading. Got incomplete packet! Length = {0}")]
    Incomplete(usize),
}

/// Decoded header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: PacketType,
    /// Length field; only meaningful for data packets
    pub length: usize,
}

impl Header {
    /// Build a header, rejecting lengths that do not fit the payload
    pub fn new(kind: PacketType, length: usize) -> Result<Self, PacketError> {
        if length > PAYLOAD_CAPACITY {
            return Err(PacketError::MalformedLength(length));
        }
        Ok(Self { kind, length })
    }

    pub fn encode(self) -> u8 {
        // length <= 63 is guaranteed by `new`
        (self.kind as u8) | ((self.length as u8) << LENGTH_SHIFT)
    }

    pub fn decode(byte: u8) -> Self {
        Self {
            kind: PacketType::from_bits(byte),
            length: usize::from(byte >> LENGTH_SHIFT),
        }
    }
}

/// A classified inbound packet, borrowing its payload from the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    /// Console text, without the terminating NUL
    Text(&'a [u8]),
    /// Binary stream data, exactly `length` bytes
    Data { stream: StreamId, payload: &'a [u8] },
}

/// Classify a received buffer
///
/// Buffers shorter than a full packet are rejected as incomplete. Data
/// packets whose length field exceeds the payload area are malformed and
/// must not reach any sink.
pub fn classify(buf: &[u8]) -> Result<Packet<'_>, PacketError> {
    if buf.len() < PACKET_SIZE {
        return Err(PacketError::Incomplete(buf.len()));
    }
    let body = &buf[1..PACKET_SIZE];
    let header = Header::decode(buf[0]);

    match header.kind.stream() {
        None => {
            let len = body.iter().position(|&b| b == 0).unwrap_or(PAYLOAD_CAPACITY);
            Ok(Packet::Text(&body[..len]))
        }
        Some(stream) => {
            if header.length > PAYLOAD_CAPACITY {
                return Err(PacketError::MalformedLength(header.length));
            }
            Ok(Packet::Data {
                stream,
                payload: &body[..header.length],
            })
        }
    }
}

/// Encode a data packet for `stream`
pub fn build_data_packet(stream: StreamId, payload: &[u8]) -> Result<[u8; PACKET_SIZE], PacketError> {
    let header = Header::new(stream.packet_type(), payload.len())?;
    let mut packet = [0u8; PACKET_SIZE];
    packet[0] = header.encode();
    packet[1..=payload.len()].copy_from_slice(payload);
    Ok(packet)
}

/// Identification query: TX_ID in bytes 0..2, zero-filled
pub fn build_identity_query() -> [u8; PACKET_SIZE] {
    let mut packet = [0u8; PACKET_SIZE];
    packet[..3].fill(TX_ID);
    packet
}

/// Device identity from an identification response, if `buf` is one
pub fn parse_identity_response(buf: &[u8]) -> Option<u8> {
    match buf {
        [RX_ID, identity, ..] => Some(*identity),
        _ => None,
    }
}

/// Split an outbound payload into zero-padded packets
///
/// An empty payload yields no packets.
pub fn chunk(payload: &[u8]) -> Vec<[u8; PACKET_SIZE]> {
    payload
        .chunks(PACKET_SIZE)
        .map(|piece| {
            let mut packet = [0u8; PACKET_SIZE];
            packet[..piece.len()].copy_from_slice(piece);
            packet
        })
        .collect()
}
