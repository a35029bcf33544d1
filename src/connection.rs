//! The connection: one peer's record-layer state.
//!
//! A [`Connection`] exclusively owns its transport, both per-direction
//! epoch/sequence trackers, the installed ciphers, the fragment reassembly
//! scratch and the pending packet buffer. All operations are synchronous
//! call-and-return; nothing here is shared or locked.
//!
//! Validation fails closed. Malformed headers, version or epoch mismatches,
//! sequence numbers below the floor and broken fragments all surface as
//! errors (with the matching alert pushed to the [`AlertSink`]) instead of
//! being silently dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use tinyvec::ArrayVec;

use crate::alert::{Alert, AlertSink};
use crate::buffer::{Buf, BufferPool};
use crate::cipher::Cipher;
use crate::config::{Config, Version};
use crate::fragment::{Defragmenter, FragmentHeader, Fragmenter, MAX_MESSAGE_LEN};
use crate::packet::PendingPacket;
use crate::record::{
    self, flags, RecordHeader, UnifiedHeader, PLAINTEXT_HEADER_LEN, UNIFIED_HEADER_LEN,
};
use crate::rng::SeededRng;
use crate::track::{reconstruct_sequence, EpochTracker};
use crate::transport::Transport;
use crate::types::{ContentType, ProtocolVersion, Sequence, MAX_CIPHERTEXT, MAX_PLAINTEXT};
use crate::Error;

/// Cap on records decoded from one packet.
const MAX_RECORDS_PER_PACKET: usize = 32;

/// Receive scratch size; comfortably above the largest packet a peer may
/// legally coalesce.
const RECV_BUFFER_LEN: usize = 65_536;

/// Byte range of one record within the receive scratch.
#[derive(Debug, Clone, Copy, Default)]
struct RecordSpan {
    start: usize,
    end: usize,
}

pub struct Connection<T: Transport> {
    config: Arc<Config>,
    transport: T,
    alert: Box<dyn AlertSink>,
    rng: SeededRng,
    buffers_free: BufferPool,

    read: EpochTracker,
    write: EpochTracker,
    read_cipher: Cipher,
    write_cipher: Cipher,

    fragmenter: Fragmenter,
    defragment: Defragmenter,

    /// Message sequence for the next outbound handshake message.
    next_message_seq_tx: u16,

    pending: PendingPacket,
    version_negotiated: bool,

    /// Scratch for one incoming packet.
    recv: Buf,
    /// Decoded records not yet handed to the caller.
    queue_rx: VecDeque<(ContentType, Vec<u8>)>,
    /// Complete reassembled handshake messages.
    queue_handshake: VecDeque<Vec<u8>>,
}

impl<T: Transport> Connection<T> {
    pub fn new(config: Arc<Config>, transport: T, alert: Box<dyn AlertSink>) -> Self {
        let rng = SeededRng::new(config.rng_seed());
        let fragmenter = Fragmenter::new(config.fragmentation().clone());
        let pending = PendingPacket::new(config.max_packet());

        let mut recv = Buf::new();
        recv.resize(RECV_BUFFER_LEN, 0);

        Connection {
            config,
            transport,
            alert,
            rng,
            buffers_free: BufferPool::default(),
            read: EpochTracker::new(),
            write: EpochTracker::new(),
            read_cipher: Cipher::Null,
            write_cipher: Cipher::Null,
            fragmenter,
            defragment: Defragmenter::new(),
            next_message_seq_tx: 0,
            pending,
            version_negotiated: false,
            recv,
            queue_rx: VecDeque::new(),
            queue_handshake: VecDeque::new(),
        }
    }

    pub fn read_epoch(&self) -> u16 {
        self.read.epoch()
    }

    pub fn write_epoch(&self) -> u16 {
        self.write.epoch()
    }

    /// The sequence number the next outbound record will carry.
    pub fn write_sequence(&self) -> u64 {
        self.write.next_sequence()
    }

    /// Record that version negotiation completed, ending the special
    /// treatment of pre-negotiation alert records.
    pub fn mark_version_negotiated(&mut self) {
        self.version_negotiated = true;
    }

    /// Install a new read cipher and enter the next read epoch.
    pub fn advance_read_epoch(&mut self, cipher: Cipher) -> Result<(), Error> {
        self.read.advance_epoch()?;
        self.read_cipher = cipher;
        debug!("Read epoch now {} with {:?}", self.read.epoch(), self.read_cipher);
        Ok(())
    }

    /// Install a new write cipher and enter the next write epoch.
    pub fn advance_write_epoch(&mut self, cipher: Cipher) -> Result<(), Error> {
        self.write.advance_epoch()?;
        self.write_cipher = cipher;
        debug!("Write epoch now {} with {:?}", self.write.epoch(), self.write_cipher);
        Ok(())
    }

    /// Queue one record carrying `payload`. The record joins the pending
    /// packet; call [`flush`][Self::flush] to put the packet on the wire.
    pub fn write_record(&mut self, content_type: ContentType, payload: &[u8]) -> Result<(), Error> {
        if payload.len() > MAX_PLAINTEXT {
            return Err(Error::OversizedRecord(payload.len()));
        }

        let unified = self.config.version() == Version::Dtls13 && self.write.epoch() > 0;
        let bytes = if unified {
            self.encode_unified_record(content_type, payload)?
        } else {
            self.encode_legacy_record(content_type, payload)?
        };

        // The record is emitted; the write counter moves by exactly one.
        self.write.next_write();

        let must_flush = self.config.flush_every_record();
        self.pending.pack(&mut self.transport, &bytes, must_flush)
    }

    /// Queue a ChangeCipherSpec record. It coalesces with surrounding
    /// handshake records like any other.
    pub fn write_change_cipher_spec(&mut self) -> Result<(), Error> {
        self.write_record(ContentType::ChangeCipherSpec, &[1])
    }

    /// Split a handshake message into fragments per the configured policy
    /// and queue a record per fragment.
    pub fn write_handshake(&mut self, msg_type: u8, body: &[u8]) -> Result<(), Error> {
        if body.len() > MAX_MESSAGE_LEN {
            return Err(Error::MessageTooLarge(body.len() as u32));
        }

        let mut message = self.buffers_free.pop();
        message.push(msg_type);
        message.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        message.extend_from_slice(body);

        let message_seq = self.next_message_seq_tx;
        let fragments = self.fragmenter.fragment(&message, message_seq, &mut self.rng);
        self.buffers_free.push(message);
        let fragments = fragments?;
        self.next_message_seq_tx = self.next_message_seq_tx.wrapping_add(1);

        debug!(
            "Sending handshake type {} seq {} as {} fragments",
            msg_type,
            message_seq,
            fragments.len()
        );
        for fragment in &fragments {
            self.write_record(ContentType::Handshake, fragment)?;
        }
        Ok(())
    }

    /// Flush the pending packet to the transport. No-op when empty.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.pending.flush(&mut self.transport)
    }

    /// Return the next decoded record, reading packets as needed.
    pub fn read_record(&mut self) -> Result<(ContentType, Vec<u8>), Error> {
        loop {
            if let Some(record) = self.queue_rx.pop_front() {
                return Ok(record);
            }
            self.read_packet()?;
        }
    }

    /// Return the next complete handshake message (4-byte header + body).
    ///
    /// Any record of another content type arriving meanwhile is a protocol
    /// violation and fails with `UnexpectedContentType`.
    pub fn read_handshake(&mut self) -> Result<Vec<u8>, Error> {
        loop {
            if let Some(message) = self.queue_handshake.pop_front() {
                return Ok(message);
            }
            let (content_type, payload) = self.read_record()?;
            if content_type != ContentType::Handshake {
                self.alert.send_alert(Alert::UnexpectedMessage);
                return Err(Error::UnexpectedContentType(content_type));
            }
            self.process_handshake_record(&payload)?;
        }
    }

    /// Read one packet and decode every record in it.
    fn read_packet(&mut self) -> Result<(), Error> {
        let n = self.transport.read(self.recv.as_mut())?;
        trace!("Read packet of {} bytes", n);

        // Find record boundaries first so a truncated tail fails before
        // any tracker state has advanced.
        let spans = split_records(&self.recv[..n])?;

        for span in spans {
            // The only copy: packet slice into a pooled buffer.
            let mut block = self.buffers_free.pop();
            block.extend_from_slice(&self.recv[span.start..span.end]);
            let result = self.process_record(&block);
            self.buffers_free.push(block);
            result?;
        }
        Ok(())
    }

    fn process_record(&mut self, block: &[u8]) -> Result<(), Error> {
        if record::is_unified(block[0]) {
            self.process_unified(block)
        } else {
            self.process_legacy(block)
        }
    }

    fn process_legacy(&mut self, block: &[u8]) -> Result<(), Error> {
        let (body, header) = RecordHeader::parse(block).map_err(|_| Error::BadHeader)?;

        if matches!(header.content_type, ContentType::Unknown(_)) {
            debug!("Record with unknown content type {}", header.content_type);
            return Err(Error::BadHeader);
        }

        let expected = self.expected_version(header.content_type);
        if header.version != expected {
            self.alert.send_alert(Alert::ProtocolVersion);
            return Err(Error::VersionMismatch(expected, header.version));
        }

        if header.length as usize > MAX_CIPHERTEXT {
            self.alert.send_alert(Alert::RecordOverflow);
            return Err(Error::OversizedRecord(header.length as usize));
        }

        if let Err(e) = self
            .read
            .validate_and_advance(header.sequence.epoch, header.sequence.sequence_number)
        {
            self.alert.send_alert(Alert::IllegalParameter);
            return Err(e);
        }

        let payload = match self.read_cipher.open_legacy(
            &header.sequence,
            header.content_type,
            header.version,
            body,
        ) {
            Ok(payload) => payload,
            Err(e) => {
                if matches!(e, Error::Decrypt) {
                    self.alert.send_alert(Alert::BadRecordMac);
                }
                return Err(e);
            }
        };

        trace!(
            "Record {} {} ({} bytes)",
            header.content_type,
            header.sequence,
            payload.len()
        );
        self.queue_rx.push_back((header.content_type, payload));
        Ok(())
    }

    fn process_unified(&mut self, block: &[u8]) -> Result<(), Error> {
        let (header, body) = UnifiedHeader::parse(block)?;

        let epoch = self.read.epoch();
        if header.epoch_bits != (epoch & 0b11) as u8 {
            self.alert.send_alert(Alert::IllegalParameter);
            return Err(Error::BadEpoch(epoch, header.epoch_bits as u16));
        }

        if header.length as usize > MAX_CIPHERTEXT {
            self.alert.send_alert(Alert::RecordOverflow);
            return Err(Error::OversizedRecord(header.length as usize));
        }

        // The AAD is the header with the true (unmasked) sequence bits.
        let mut header_bytes = [0u8; UNIFIED_HEADER_LEN];
        header_bytes.copy_from_slice(&block[..UNIFIED_HEADER_LEN]);

        let mut wire_sequence = header.wire_sequence;
        if self.config.mask_sequence_numbers() {
            if let Some(mask_key) = self.read_cipher.mask_key() {
                let mask = mask_key.mask(body).map_err(|_| Error::BadHeaderFormat)?;
                record::mask_wire_sequence(&mut header_bytes, mask);
                wire_sequence ^= u16::from_be_bytes(mask);
            }
        }

        let sequence_number = reconstruct_sequence(self.read.next_sequence(), wire_sequence);

        if let Err(e) = self.read.validate_and_advance(epoch, sequence_number) {
            self.alert.send_alert(Alert::IllegalParameter);
            return Err(e);
        }

        let inner = match self
            .read_cipher
            .open_unified(sequence_number, &header_bytes, body)
        {
            Ok(inner) => inner,
            Err(e) => {
                if matches!(e, Error::Decrypt) {
                    self.alert.send_alert(Alert::BadRecordMac);
                }
                return Err(e);
            }
        };

        let (content_type, content) = match record::decode_inner(&inner) {
            Some(decoded) => decoded,
            None => {
                debug!("Protected record carried no content type");
                return Err(Error::Decrypt);
            }
        };

        trace!(
            "Record {} {}:{} ({} bytes)",
            content_type,
            epoch,
            sequence_number,
            content.len()
        );
        self.queue_rx.push_back((content_type, content.to_vec()));
        Ok(())
    }

    /// One handshake record may pack several fragments back to back.
    fn process_handshake_record(&mut self, payload: &[u8]) -> Result<(), Error> {
        let mut rest = payload;
        while !rest.is_empty() {
            let (after_header, header) =
                FragmentHeader::parse(rest).map_err(|_| Error::BadHeader)?;
            let len = header.fragment_length as usize;
            if after_header.len() < len {
                return Err(Error::BadFragmentLength);
            }
            let (body, remaining) = after_header.split_at(len);

            if let Some(message) = self.defragment.add_fragment(&header, body)? {
                self.queue_handshake.push_back(message);
            }
            rest = remaining;
        }
        Ok(())
    }

    fn encode_legacy_record(
        &mut self,
        content_type: ContentType,
        payload: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let sequence = Sequence {
            epoch: self.write.epoch(),
            sequence_number: self.write.next_sequence(),
        };
        let version = self.config.wire_version();

        let protected =
            self.write_cipher
                .seal_legacy(&mut self.rng, &sequence, content_type, version, payload)?;
        if protected.len() > MAX_CIPHERTEXT {
            return Err(Error::OversizedRecord(protected.len()));
        }

        let header = RecordHeader {
            content_type,
            version,
            sequence,
            length: protected.len() as u16,
        };

        let mut out = Vec::with_capacity(PLAINTEXT_HEADER_LEN + protected.len());
        header.serialize(&mut out);
        out.extend_from_slice(&protected);
        Ok(out)
    }

    fn encode_unified_record(
        &mut self,
        content_type: ContentType,
        payload: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let sequence_number = self.write.next_sequence();
        let epoch = self.write.epoch();

        let mut inner = Vec::with_capacity(payload.len() + 1);
        record::encode_inner(payload, content_type, &mut inner);

        let length = inner.len() + self.write_cipher.seal_overhead();
        if length > MAX_CIPHERTEXT {
            return Err(Error::OversizedRecord(length));
        }

        let header = UnifiedHeader {
            epoch_bits: (epoch & 0b11) as u8,
            wire_sequence: (sequence_number & 0xFFFF) as u16,
            length: length as u16,
        };
        let mut out = Vec::with_capacity(UNIFIED_HEADER_LEN + length);
        header.serialize(&mut out);

        let protected = self
            .write_cipher
            .seal_unified(sequence_number, &out, &inner)?;

        if self.config.mask_sequence_numbers() {
            if let Some(mask_key) = self.write_cipher.mask_key() {
                let mask = mask_key.mask(&protected)?;
                record::mask_wire_sequence(&mut out, mask);
            }
        }

        out.extend_from_slice(&protected);
        Ok(out)
    }

    fn expected_version(&self, content_type: ContentType) -> ProtocolVersion {
        if !self.version_negotiated && content_type == ContentType::Alert {
            if let Some(version) = self.config.pre_negotiation_alert_version() {
                return version;
            }
        }
        self.config.wire_version()
    }
}

/// Find the boundaries of every record in one packet.
fn split_records(packet: &[u8]) -> Result<ArrayVec<[RecordSpan; MAX_RECORDS_PER_PACKET]>, Error> {
    let mut spans: ArrayVec<[RecordSpan; MAX_RECORDS_PER_PACKET]> = ArrayVec::new();
    let mut offset = 0;

    while offset < packet.len() {
        let end = offset + record_end(&packet[offset..])?;
        if spans.try_push(RecordSpan { start: offset, end }).is_some() {
            return Err(Error::TooManyRecords);
        }
        offset = end;
    }

    Ok(spans)
}

/// Total length of the record at the start of `packet`.
///
/// Handles every unified header shape here, even ones the strict decode
/// later rejects, so the packet splits at the right boundaries first.
fn record_end(packet: &[u8]) -> Result<usize, Error> {
    let first = packet[0];

    if record::is_unified(first) {
        let seq_len = if first & flags::SEQ_16BIT != 0 { 2 } else { 1 };
        let has_length = first & flags::LENGTH_BIT != 0;
        let header_len = 1 + seq_len + if has_length { 2 } else { 0 };

        if packet.len() < header_len {
            return Err(Error::BadHeaderFormat);
        }
        let content_len = if has_length {
            u16::from_be_bytes([packet[header_len - 2], packet[header_len - 1]]) as usize
        } else {
            packet.len() - header_len
        };

        let end = header_len + content_len;
        if packet.len() < end {
            return Err(Error::BadHeaderFormat);
        }
        Ok(end)
    } else {
        if packet.len() < PLAINTEXT_HEADER_LEN {
            return Err(Error::BadHeader);
        }
        let length = u16::from_be_bytes([packet[11], packet[12]]) as usize;

        let end = PLAINTEXT_HEADER_LEN + length;
        if packet.len() < end {
            return Err(Error::BadHeader);
        }
        Ok(end)
    }
}
