// SPDX-License-Identifier: Apache-2.0 OR MIT
//! AIMF wire format
//!
//! All multi-byte fields are network byte order. A packet is a fixed header
//! followed by zero or more messages filling the declared packet length.
//!
//! ## Packet Header (4 bytes)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 2 | packet length (including this header) |
//! | 2 | 2 | packet sequence number |
//!
//! ## Message Header (11 bytes)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | message type (1 = HELLO) |
//! | 1 | 1 | validity time (time code) |
//! | 2 | 2 | message size (including this header) |
//! | 4 | 4 | originator address |
//! | 8 | 1 | time to live |
//! | 9 | 2 | message sequence number |
//!
//! ## HELLO Payload (2 + 8k bytes)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | hello interval (time code) |
//! | 1 | 1 | willingness |
//! | 2 + 8n | 4 | association n group |
//! | 6 + 8n | 4 | association n source |
//!
//! ## Time code
//!
//! Intervals are packed into one byte as a 4-bit mantissa `a` (high nibble)
//! and 4-bit exponent `b` (low nibble): `seconds = C * (1 + a/16) * 2^b`
//! with `C = 1/16 s`. Encoding rounds up, so a decoded interval is never
//! shorter than the one encoded.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Base unit of the time code in seconds
pub const TIME_CODE_UNIT: f64 = 0.0625;

/// Largest interval the time code represents (code 0xFF)
pub const TIME_CODE_MAX_SECS: f64 = 3968.0;

pub const PACKET_HEADER_SIZE: usize = 4;
pub const MESSAGE_HEADER_SIZE: usize = 11;
pub const HELLO_FIXED_SIZE: usize = 2;
pub const ASSOCIATION_SIZE: usize = 8;

// Message types
pub const HELLO_MESSAGE: u8 = 1;

/// Errors that can occur while decoding or encoding AIMF packets
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Buffer too short: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Declared packet length {0} is smaller than the packet header")]
    PacketLengthTooSmall(u16),

    #[error("Declared message size {0} is smaller than the message header")]
    MessageSizeTooSmall(u16),

    #[error("Message of {size} bytes at offset {offset} overruns packet length {packet_length}")]
    MessageOverrun {
        offset: usize,
        size: usize,
        packet_length: usize,
    },

    #[error("HELLO payload of {0} bytes is not 2 + 8k")]
    HelloPayloadSize(usize),

    #[error("Encoded size {0} exceeds the 16-bit length field")]
    TooLarge(usize),
}

/// Encode an interval in seconds as a time code
///
/// Intervals shorter than the base unit (and NaN) encode as 0x00; intervals
/// longer than [`TIME_CODE_MAX_SECS`] saturate at 0xFF.
pub fn seconds_to_emf(seconds: f64) -> u8 {
    if seconds.is_nan() || seconds < TIME_CODE_UNIT {
        return 0x00;
    }
    if seconds > TIME_CODE_MAX_SECS {
        return 0xFF;
    }

    let ratio = seconds / TIME_CODE_UNIT;

    // largest b such that ratio >= 2^b
    let mut b: u32 = 0;
    while b < 15 && ratio >= f64::from(1u32 << (b + 1)) {
        b += 1;
    }

    let mut a = (16.0 * (ratio / f64::from(1u32 << b) - 1.0)).ceil() as u32;
    if a == 16 {
        b += 1;
        a = 0;
    }
    if b > 15 {
        return 0xFF;
    }

    ((a << 4) | b) as u8
}

/// Decode a time code into seconds
pub fn emf_to_seconds(code: u8) -> f64 {
    let a = f64::from(code >> 4);
    let b = u32::from(code & 0x0F);
    TIME_CODE_UNIT * (1.0 + a / 16.0) * f64::from(1u32 << b)
}

pub fn duration_to_emf(duration: Duration) -> u8 {
    seconds_to_emf(duration.as_secs_f64())
}

pub fn emf_to_duration(code: u8) -> Duration {
    Duration::from_secs_f64(emf_to_seconds(code))
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn read_ipv4(data: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    )
}

fn check_len(data: &[u8], expected: usize) -> Result<(), WireError> {
    if data.len() < expected {
        return Err(WireError::Truncated {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PacketHeader {
    pub packet_length: u16,
    pub sequence_number: u16,
}

impl PacketHeader {
    pub fn parse(data: &[u8]) -> Result<Self, WireError> {
        check_len(data, PACKET_HEADER_SIZE)?;
        Ok(Self {
            packet_length: read_u16(data, 0),
            sequence_number: read_u16(data, 2),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.packet_length.to_be_bytes());
        out.extend_from_slice(&self.sequence_number.to_be_bytes());
    }
}

/// Message header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessageHeader {
    pub message_type: u8,
    /// Validity time of the information carried (time code)
    pub vtime: u8,
    pub message_size: u16,
    pub originator: Ipv4Addr,
    pub ttl: u8,
    pub sequence_number: u16,
}

impl MessageHeader {
    pub fn parse(data: &[u8]) -> Result<Self, WireError> {
        check_len(data, MESSAGE_HEADER_SIZE)?;
        Ok(Self {
            message_type: data[0],
            vtime: data[1],
            message_size: read_u16(data, 2),
            originator: read_ipv4(data, 4),
            ttl: data[8],
            sequence_number: read_u16(data, 9),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(self.message_type);
        out.push(self.vtime);
        out.extend_from_slice(&self.message_size.to_be_bytes());
        out.extend_from_slice(&self.originator.octets());
        out.push(self.ttl);
        out.extend_from_slice(&self.sequence_number.to_be_bytes());
    }

    /// Validity time decoded from the time code
    pub fn validity(&self) -> Duration {
        emf_to_duration(self.vtime)
    }

    pub fn type_name(&self) -> &'static str {
        match self.message_type {
            HELLO_MESSAGE => "HELLO",
            _ => "Unknown",
        }
    }
}

/// A (group, source) pair as carried in a HELLO
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HelloAssociation {
    pub group: Ipv4Addr,
    pub source: Ipv4Addr,
}

/// HELLO message payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hello {
    /// Sender's hello interval (time code)
    pub htime: u8,
    pub willingness: u8,
    pub associations: Vec<HelloAssociation>,
}

impl Hello {
    pub fn serialized_size(&self) -> usize {
        HELLO_FIXED_SIZE + ASSOCIATION_SIZE * self.associations.len()
    }

    /// Parse a HELLO payload occupying exactly `data`
    pub fn parse(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < HELLO_FIXED_SIZE || (data.len() - HELLO_FIXED_SIZE) % ASSOCIATION_SIZE != 0
        {
            return Err(WireError::HelloPayloadSize(data.len()));
        }

        let associations = data[HELLO_FIXED_SIZE..]
            .chunks_exact(ASSOCIATION_SIZE)
            .map(|chunk| HelloAssociation {
                group: read_ipv4(chunk, 0),
                source: read_ipv4(chunk, 4),
            })
            .collect();

        Ok(Self {
            htime: data[0],
            willingness: data[1],
            associations,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(self.htime);
        out.push(self.willingness);
        for assoc in &self.associations {
            out.extend_from_slice(&assoc.group.octets());
            out.extend_from_slice(&assoc.source.octets());
        }
    }
}

/// Type-specific message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MessageBody {
    Hello(Hello),
    /// A message type this implementation does not understand; kept so it
    /// can be skipped by size
    Unknown(Vec<u8>),
}

impl MessageBody {
    fn serialized_size(&self) -> usize {
        match self {
            MessageBody::Hello(hello) => hello.serialized_size(),
            MessageBody::Unknown(payload) => payload.len(),
        }
    }
}

/// A message header together with its body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub header: MessageHeader,
    pub body: MessageBody,
}

impl Message {
    /// Build a HELLO message; the size field is filled from the body
    pub fn hello(originator: Ipv4Addr, vtime: u8, ttl: u8, sequence_number: u16, hello: Hello) -> Self {
        let body = MessageBody::Hello(hello);
        let message_size = (MESSAGE_HEADER_SIZE + body.serialized_size()).min(u16::MAX as usize) as u16;
        Self {
            header: MessageHeader {
                message_type: HELLO_MESSAGE,
                vtime,
                message_size,
                originator,
                ttl,
                sequence_number,
            },
            body,
        }
    }

    pub fn serialized_size(&self) -> usize {
        MESSAGE_HEADER_SIZE + self.body.serialized_size()
    }

    /// Parse one message from the front of `data`; returns it with its size
    pub fn parse(data: &[u8]) -> Result<(Self, usize), WireError> {
        let header = MessageHeader::parse(data)?;
        let size = header.message_size as usize;
        if size < MESSAGE_HEADER_SIZE {
            return Err(WireError::MessageSizeTooSmall(header.message_size));
        }
        check_len(data, size)?;

        let payload = &data[MESSAGE_HEADER_SIZE..size];
        let body = match header.message_type {
            HELLO_MESSAGE => MessageBody::Hello(Hello::parse(payload)?),
            _ => MessageBody::Unknown(payload.to_vec()),
        };

        Ok((Self { header, body }, size))
    }

    /// Serialize, writing the computed size into the header
    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        let size = self.serialized_size();
        let message_size = u16::try_from(size).map_err(|_| WireError::TooLarge(size))?;
        MessageHeader {
            message_size,
            ..self.header
        }
        .write(out);
        match &self.body {
            MessageBody::Hello(hello) => hello.write(out),
            MessageBody::Unknown(payload) => out.extend_from_slice(payload),
        }
        Ok(())
    }
}

/// A complete AIMF packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Packet {
    pub header: PacketHeader,
    pub messages: Vec<Message>,
}

impl Packet {
    /// Build a packet; the length field is filled from the messages
    pub fn new(sequence_number: u16, messages: Vec<Message>) -> Self {
        let length = PACKET_HEADER_SIZE + messages.iter().map(Message::serialized_size).sum::<usize>();
        Self {
            header: PacketHeader {
                packet_length: length.min(u16::MAX as usize) as u16,
                sequence_number,
            },
            messages,
        }
    }

    pub fn serialized_size(&self) -> usize {
        PACKET_HEADER_SIZE
            + self
                .messages
                .iter()
                .map(Message::serialized_size)
                .sum::<usize>()
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let size = self.serialized_size();
        let packet_length = u16::try_from(size).map_err(|_| WireError::TooLarge(size))?;

        let mut out = Vec::with_capacity(size);
        PacketHeader {
            packet_length,
            ..self.header
        }
        .write(&mut out);
        for message in &self.messages {
            message.write(&mut out)?;
        }
        Ok(out)
    }

    /// Decode a packet, never reading past its declared length
    ///
    /// Bytes after the declared length are ignored. Any inconsistency
    /// between declared sizes and available bytes rejects the whole packet.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let header = PacketHeader::parse(data)?;
        let packet_length = header.packet_length as usize;
        if packet_length < PACKET_HEADER_SIZE {
            return Err(WireError::PacketLengthTooSmall(header.packet_length));
        }
        check_len(data, packet_length)?;

        let data = &data[..packet_length];
        let mut offset = PACKET_HEADER_SIZE;
        let mut messages = Vec::new();

        while offset < packet_length {
            let remaining = &data[offset..];
            if remaining.len() >= MESSAGE_HEADER_SIZE {
                let declared = read_u16(remaining, 2) as usize;
                if declared > remaining.len() {
                    return Err(WireError::MessageOverrun {
                        offset,
                        size: declared,
                        packet_length,
                    });
                }
            }
            let (message, size) = Message::parse(remaining)?;
            messages.push(message);
            offset += size;
        }

        Ok(Self { header, messages })
    }
}
