#![forbid(unsafe_code)]
#![warn(clippy::all)]

//! A DTLS record-layer shim for driving protocol tests.
//!
//! `dshim` implements the record and handshake-fragment wire formats of DTLS
//! (the legacy 13-byte header and the DTLS 1.3 unified header with encrypted
//! record numbers), strict in-order fragment reassembly, and a packet
//! coalescing buffer. It is a *test* peer: where a production receiver would
//! silently drop questionable input, this crate fails with an error and
//! raises an alert so the implementation under test cannot hide bugs.
//!
//! The outbound path can also misbehave on purpose. [`FragmentationPolicy`]
//! toggles reordering, duplication, overlap and corruption of handshake
//! fragments for negative testing; all toggles are off by default and the
//! default path carries no adversarial branching.

#[macro_use]
extern crate log;

mod alert;
mod buffer;
mod cipher;
mod config;
mod connection;
mod error;
mod fragment;
mod packet;
mod record;
mod rng;
mod track;
mod transport;
mod types;
mod util;

pub use alert::{Alert, AlertRecorder, AlertSink, NullAlertSink};
pub use buffer::{Buf, BufferPool};
pub use cipher::{AeadCipher, BlockCipher, Cipher, MaskKey};
pub use config::{Config, ConfigBuilder, Version};
pub use connection::Connection;
pub use error::Error;
pub use fragment::{
    Defragmenter, FragmentHeader, FragmentationPolicy, Fragmenter, DEFAULT_MAX_FRAGMENT_LEN,
    FRAGMENT_HEADER_LEN, MAX_MESSAGE_LEN, MESSAGE_HEADER_LEN,
};
pub use packet::PendingPacket;
pub use record::{
    flags, is_unified, mask_wire_sequence, RecordHeader, UnifiedHeader, PLAINTEXT_HEADER_LEN,
    UNIFIED_HEADER_LEN,
};
pub use rng::SeededRng;
pub use track::{reconstruct_sequence, EpochTracker};
pub use transport::{memory_pair, MemoryTransport, Transport};
pub use types::{ContentType, ProtocolVersion, Sequence, MAX_CIPHERTEXT, MAX_PLAINTEXT};
