use thiserror::Error;

use crate::types::{ContentType, ProtocolVersion};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Record header too short or malformed")]
    BadHeader,

    #[error("Unsupported or malformed unified record header")]
    BadHeaderFormat,

    #[error("Expected protocol version {0} but got: {1}")]
    VersionMismatch(ProtocolVersion, ProtocolVersion),

    #[error("Expected epoch {0} but got: {1}")]
    BadEpoch(u16, u16),

    #[error("Record sequence {1} is below the accepted floor {0}")]
    BadSequence(u64, u64),

    #[error("Epoch is not allowed to wrap")]
    WrappedEpoch,

    #[error("Record length {0} exceeds the maximum ciphertext size")]
    OversizedRecord(usize),

    #[error("Expected handshake message sequence {0} but got: {1}")]
    WrongMessageSequence(u16, u16),

    #[error("Fragment offset {1} does not extend the reassembly buffer at {0}")]
    BadFragmentOffset(u32, u32),

    #[error("Fragment is inconsistent with the declared message length")]
    BadFragmentLength,

    #[error("Declared handshake length {0} exceeds the maximum message size")]
    MessageTooLarge(u32),

    #[error("Record failed to decrypt")]
    Decrypt,

    #[error("Unexpected content type {0}")]
    UnexpectedContentType(ContentType),

    #[error("Too many records in one packet")]
    TooManyRecords,

    #[error("Cipher misuse: {0}")]
    Crypto(String),

    #[error("Transport: {0}")]
    Io(#[from] std::io::Error),
}
