//! Pending-record buffer.
//!
//! Encoded records accumulate here in emission order and leave in a single
//! transport write, so a whole handshake flight (including its
//! ChangeCipherSpec record) can share one network packet up to the
//! configured cap.

use crate::buffer::Buf;
use crate::transport::Transport;
use crate::Error;

#[derive(Debug)]
pub struct PendingPacket {
    buf: Buf,
    max_packet: usize,
}

impl PendingPacket {
    pub fn new(max_packet: usize) -> Self {
        PendingPacket {
            buf: Buf::new(),
            max_packet,
        }
    }

    /// Bytes currently awaiting a flush.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Queue one encoded record.
    ///
    /// If the record would push the packet past the cap, the packet built
    /// so far is flushed first. `must_flush` forces the record out
    /// immediately; used when the receiver relies on packet boundaries to
    /// delimit records.
    pub fn pack<T: Transport>(
        &mut self,
        transport: &mut T,
        record: &[u8],
        must_flush: bool,
    ) -> Result<(), Error> {
        if !self.buf.is_empty() && self.buf.len() + record.len() > self.max_packet {
            trace!(
                "Flushing {} pending bytes ahead of a {} byte record",
                self.buf.len(),
                record.len()
            );
            self.flush(transport)?;
        }
        self.buf.extend_from_slice(record);

        if must_flush {
            self.flush(transport)?;
        }
        Ok(())
    }

    /// Write the accumulated packet in one transport write and clear it.
    /// Does nothing when empty.
    pub fn flush<T: Transport>(&mut self, transport: &mut T) -> Result<(), Error> {
        if self.buf.is_empty() {
            return Ok(());
        }
        transport.write(&self.buf)?;
        self.buf.clear();
        Ok(())
    }
}
