//! Wire-level types shared by the record and fragment codecs.

use std::fmt;

use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

/// Largest plaintext payload a single record may carry.
pub const MAX_PLAINTEXT: usize = 16_384;

/// Largest protected payload a single record may carry. Allows for
/// explicit nonce/IV, MAC, padding and AEAD tag on top of the plaintext.
pub const MAX_CIPHERTEXT: usize = MAX_PLAINTEXT + 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Unknown(v) => write!(f, "Unknown({})", v),
            other => write!(f, "{:?}", other),
        }
    }
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    DTLS1_0,
    DTLS1_2,
    Unknown(u16),
}

impl ProtocolVersion {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0xFEFF => ProtocolVersion::DTLS1_0,
            0xFEFD => ProtocolVersion::DTLS1_2,
            _ => ProtocolVersion::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ProtocolVersion::DTLS1_0 => 0xFEFF,
            ProtocolVersion::DTLS1_2 => 0xFEFD,
            ProtocolVersion::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, value) = be_u16(input)?;
        Ok((input, Self::from_u16(value)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.as_u16().to_be_bytes());
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::DTLS1_0 => write!(f, "DTLS 1.0"),
            ProtocolVersion::DTLS1_2 => write!(f, "DTLS 1.2"),
            ProtocolVersion::Unknown(v) => write!(f, "Unknown(0x{:04X})", v),
        }
    }
}

/// Epoch and sequence number of one record.
///
/// The sequence number is direction scoped. On the wire the legacy header
/// carries the epoch in 2 bytes followed by the low 48 bits of the sequence
/// number; the unified header carries only the low 2 epoch bits and the low
/// 16 sequence bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Sequence {
    pub epoch: u16,
    pub sequence_number: u64,
}

impl Sequence {
    /// The 8-byte epoch+sequence form used in legacy headers and MAC/AAD input.
    pub fn wire_bytes(&self) -> [u8; 8] {
        let mut out = [0; 8];
        out[..2].copy_from_slice(&self.epoch.to_be_bytes());
        out[2..].copy_from_slice(&self.sequence_number.to_be_bytes()[2..]);
        out
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.epoch, self.sequence_number)
    }
}
