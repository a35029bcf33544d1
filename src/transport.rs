//! Packet-oriented blocking transport.
//!
//! The connection does not own sockets; it reads and writes whole packets
//! through this trait. Delivery is assumed reliable and ordered, which is
//! the surrounding test driver's contract to uphold. Blocking and deadline
//! enforcement are likewise the driver's concern.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use crate::Error;

pub trait Transport {
    /// Read one packet into `buf`, returning its length.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error>;

    /// Write one packet.
    fn write(&mut self, packet: &[u8]) -> Result<(), Error>;
}

impl Transport for std::net::UdpSocket {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        Ok(self.recv(buf)?)
    }

    fn write(&mut self, packet: &[u8]) -> Result<(), Error> {
        self.send(packet)?;
        Ok(())
    }
}

type PacketQueue = Rc<RefCell<VecDeque<Vec<u8>>>>;

/// One end of an in-memory packet pipe.
///
/// Not `Send`; both ends must live on the same thread.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    rx: PacketQueue,
    tx: PacketQueue,
}

impl MemoryTransport {
    /// Packets written to the peer end but not yet read here.
    pub fn pending(&self) -> usize {
        self.rx.borrow().len()
    }
}

/// Create a connected pair of in-memory transports.
pub fn memory_pair() -> (MemoryTransport, MemoryTransport) {
    let a_to_b: PacketQueue = Rc::new(RefCell::new(VecDeque::new()));
    let b_to_a: PacketQueue = Rc::new(RefCell::new(VecDeque::new()));

    let a = MemoryTransport {
        rx: Rc::clone(&b_to_a),
        tx: Rc::clone(&a_to_b),
    };
    let b = MemoryTransport {
        rx: a_to_b,
        tx: b_to_a,
    };
    (a, b)
}

impl Transport for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let packet = self
            .rx
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "no packet queued"))?;
        if packet.len() > buf.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "packet larger than read buffer").into());
        }
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(packet.len())
    }

    fn write(&mut self, packet: &[u8]) -> Result<(), Error> {
        self.tx.borrow_mut().push_back(packet.to_vec());
        Ok(())
    }
}
