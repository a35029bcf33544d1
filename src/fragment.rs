//! Handshake message fragmentation and reassembly.
//!
//! A logical handshake message is a 4-byte header (type + 24-bit length)
//! followed by its body. On the wire it travels as one or more fragments,
//! each with its own 12-byte header repeating the message type, total
//! length and message sequence number plus the fragment's offset and
//! length.
//!
//! Reassembly is strict: fragments must arrive in order and extend the
//! scratch buffer exactly contiguously. Delivery is assumed reliable and
//! ordered here; a production stack would buffer out-of-order fragments,
//! this shim fails instead so the peer's emission order is observable.

use std::fmt;

use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::IResult;

use crate::buffer::Buf;
use crate::rng::SeededRng;
use crate::util::put_u24;
use crate::Error;

/// Length of the logical message header: type + 24-bit length.
pub const MESSAGE_HEADER_LEN: usize = 4;

/// Length of the wire fragment header.
pub const FRAGMENT_HEADER_LEN: usize = 12;

/// Largest handshake message body the reassembler accepts.
pub const MAX_MESSAGE_LEN: usize = 65_536;

/// Default cap on fragment payloads.
pub const DEFAULT_MAX_FRAGMENT_LEN: usize = 1024;

/// Wire header of one handshake fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FragmentHeader {
    pub msg_type: u8,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl FragmentHeader {
    pub fn parse(input: &[u8]) -> IResult<&[u8], FragmentHeader> {
        let (input, msg_type) = be_u8(input)?;
        let (input, length) = be_u24(input)?;
        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;

        Ok((
            input,
            FragmentHeader {
                msg_type,
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.msg_type);
        put_u24(output, self.length);
        output.extend_from_slice(&self.message_seq.to_be_bytes());
        put_u24(output, self.fragment_offset);
        put_u24(output, self.fragment_length);
    }
}

/// How outbound handshake messages are split into fragments.
///
/// The adversarial toggles are for negative testing and compose freely;
/// all of them default to off and the default split has no adversarial
/// branching at all.
#[derive(Debug, Clone)]
pub struct FragmentationPolicy {
    /// Largest fragment payload.
    pub max_fragment_len: usize,
    /// Emit zero-length fragments at both message boundaries.
    pub empty_boundary_fragments: bool,
    /// Emit fragments in reverse order.
    pub reverse_order: bool,
    /// Emit fragments in a random permutation. Deterministic when the
    /// connection RNG is seeded.
    pub shuffle: bool,
    /// Re-emit every fragment shifted forward by half its length.
    pub overlapping_fragments: bool,
    /// Emit the entire fragment sequence twice, as a retransmit would.
    pub duplicate_message: bool,
    /// Flip a bit in the last byte of every fragment payload.
    pub corrupt_fragments: bool,
}

impl Default for FragmentationPolicy {
    fn default() -> Self {
        FragmentationPolicy {
            max_fragment_len: DEFAULT_MAX_FRAGMENT_LEN,
            empty_boundary_fragments: false,
            reverse_order: false,
            shuffle: false,
            overlapping_fragments: false,
            duplicate_message: false,
            corrupt_fragments: false,
        }
    }
}

/// Splits logical handshake messages into wire fragments.
pub struct Fragmenter {
    policy: FragmentationPolicy,
}

impl Fragmenter {
    pub fn new(policy: FragmentationPolicy) -> Self {
        Fragmenter { policy }
    }

    pub fn policy(&self) -> &FragmentationPolicy {
        &self.policy
    }

    /// Split a complete message (4-byte header + body) into fragment
    /// byte strings, all carrying `message_seq`.
    pub fn fragment(
        &self,
        message: &[u8],
        message_seq: u16,
        rng: &mut SeededRng,
    ) -> Result<Vec<Buf>, Error> {
        if message.len() < MESSAGE_HEADER_LEN {
            return Err(Error::BadFragmentLength);
        }

        let msg_type = message[0];
        let total = u32::from_be_bytes([0, message[1], message[2], message[3]]);
        let body = &message[MESSAGE_HEADER_LEN..];
        if body.len() != total as usize {
            return Err(Error::BadFragmentLength);
        }

        // (offset, length) pieces in emission order.
        let mut pieces: Vec<(u32, u32)> = Vec::new();

        if self.policy.empty_boundary_fragments {
            pieces.push((0, 0));
        }
        if body.is_empty() {
            pieces.push((0, 0));
        } else {
            let max = self.policy.max_fragment_len.max(1);
            for (i, chunk) in body.chunks(max).enumerate() {
                pieces.push(((i * max) as u32, chunk.len() as u32));
            }
        }
        if self.policy.empty_boundary_fragments {
            pieces.push((total, 0));
        }

        if self.policy.overlapping_fragments {
            let mut overlapped = Vec::with_capacity(pieces.len() * 2);
            for (offset, length) in pieces {
                overlapped.push((offset, length));
                if length > 0 {
                    let shifted = offset + length / 2;
                    overlapped.push((shifted, length.min(total - shifted)));
                }
            }
            pieces = overlapped;
        }

        if self.policy.reverse_order {
            pieces.reverse();
        }
        if self.policy.shuffle {
            rng.shuffle(&mut pieces);
        }
        if self.policy.duplicate_message {
            let again = pieces.clone();
            pieces.extend(again);
        }

        let mut fragments = Vec::with_capacity(pieces.len());
        for (fragment_offset, fragment_length) in pieces {
            let header = FragmentHeader {
                msg_type,
                length: total,
                message_seq,
                fragment_offset,
                fragment_length,
            };

            let mut out = Vec::with_capacity(FRAGMENT_HEADER_LEN + fragment_length as usize);
            header.serialize(&mut out);
            let start = fragment_offset as usize;
            let end = start + fragment_length as usize;
            out.extend_from_slice(&body[start..end]);

            if self.policy.corrupt_fragments && fragment_length > 0 {
                let last = out.len() - 1;
                out[last] ^= 0x01;
            }

            fragments.push(Buf::from_slice(&out));
        }

        Ok(fragments)
    }
}

impl fmt::Debug for Fragmenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragmenter")
            .field("policy", &self.policy)
            .finish()
    }
}

/// Reassembles in-order fragments into complete handshake messages.
#[derive(Debug, Default)]
pub struct Defragmenter {
    next_message_seq: u16,
    scratch: Buf,
    total_length: Option<u32>,
}

impl Defragmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The message sequence number the next fragment must carry.
    pub fn expected_message_seq(&self) -> u16 {
        self.next_message_seq
    }

    /// Feed one fragment. Returns the complete message (4-byte header +
    /// body) once the declared length is exactly covered.
    ///
    /// All validation happens before any mutation, so a failed fragment
    /// leaves the reassembly state untouched.
    pub fn add_fragment(
        &mut self,
        header: &FragmentHeader,
        payload: &[u8],
    ) -> Result<Option<Vec<u8>>, Error> {
        if payload.len() != header.fragment_length as usize {
            return Err(Error::BadFragmentLength);
        }
        if header.message_seq != self.next_message_seq {
            return Err(Error::WrongMessageSequence(
                self.next_message_seq,
                header.message_seq,
            ));
        }

        let total = match self.total_length {
            None => {
                if header.length as usize > MAX_MESSAGE_LEN {
                    return Err(Error::MessageTooLarge(header.length));
                }
                header.length
            }
            Some(total) => {
                // Fragments of one message must agree on type and total.
                if header.length != total || header.msg_type != self.scratch[0] {
                    return Err(Error::BadFragmentLength);
                }
                total
            }
        };

        let expected_offset = match self.total_length {
            None => 0,
            Some(_) => (self.scratch.len() - MESSAGE_HEADER_LEN) as u32,
        };
        if header.fragment_offset != expected_offset {
            return Err(Error::BadFragmentOffset(
                expected_offset,
                header.fragment_offset,
            ));
        }
        if header.fragment_offset as u64 + header.fragment_length as u64 > total as u64 {
            return Err(Error::BadFragmentLength);
        }

        if self.total_length.is_none() {
            self.total_length = Some(total);
            self.scratch.push(header.msg_type);
            self.scratch.extend_from_slice(&total.to_be_bytes()[1..]);
        }
        self.scratch.extend_from_slice(payload);

        if self.scratch.len() == MESSAGE_HEADER_LEN + total as usize {
            let message = std::mem::take(&mut self.scratch).into_vec();
            self.total_length = None;
            self.next_message_seq = self.next_message_seq.wrapping_add(1);
            trace!(
                "Reassembled handshake message type {} ({} bytes)",
                message[0],
                message.len()
            );
            return Ok(Some(message));
        }

        Ok(None)
    }
}
