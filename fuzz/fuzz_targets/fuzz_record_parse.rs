#![no_main]

//! Fuzz target for record-layer packet decoding.
//!
//! Feeds arbitrary packets through the full decode path: record boundary
//! scanning, header validation, sequence tracking and fragment reassembly.
//! Runs the input both raw and wrapped in a well-formed legacy record
//! header so the deeper handshake paths get coverage too.

use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

use dshim::{memory_pair, Config, Connection, NullAlertSink, Transport, Version};

/// Legacy record header length
const PLAINTEXT_HEADER_LEN: usize = 13;
/// Largest fragment a single record may carry
const MAX_FRAGMENT_SIZE: usize = 16384;

fuzz_target!(|data: &[u8]| {
    for version in [Version::Dtls12, Version::Dtls13] {
        let config = Arc::new(Config::builder().version(version).build());

        // Raw input as one packet.
        let (mut wire, transport) = memory_pair();
        let mut conn = Connection::new(Arc::clone(&config), transport, Box::new(NullAlertSink));
        let _ = wire.write(data);
        while conn.read_record().is_ok() {}

        // Input wrapped as the fragment of a handshake record.
        if data.is_empty() {
            continue;
        }
        let frag_len = data.len().min(MAX_FRAGMENT_SIZE);

        let mut record = Vec::with_capacity(PLAINTEXT_HEADER_LEN + frag_len);
        record.push(22u8); // handshake
        record.extend_from_slice(&[0xFE, 0xFD]); // DTLS 1.2 version
        record.extend_from_slice(&[0, 0]); // epoch 0
        record.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // sequence 0
        record.extend_from_slice(&(frag_len as u16).to_be_bytes());
        record.extend_from_slice(&data[..frag_len]);

        let (mut wire, transport) = memory_pair();
        let mut conn = Connection::new(Arc::clone(&config), transport, Box::new(NullAlertSink));
        let _ = wire.write(&record);
        while conn.read_handshake().is_ok() {}
    }
});
