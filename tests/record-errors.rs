//! Validation failures on incoming records, and the alerts they raise.

mod common;

use common::*;
use dshim::{
    Alert, Config, ContentType, Error, ProtocolVersion, RecordHeader, Sequence, Transport,
};

/// A raw legacy record with the given header fields and payload.
fn raw_record(
    content_type: ContentType,
    version: ProtocolVersion,
    epoch: u16,
    sequence_number: u64,
    payload: &[u8],
) -> Vec<u8> {
    let header = RecordHeader {
        content_type,
        version,
        sequence: Sequence {
            epoch,
            sequence_number,
        },
        length: payload.len() as u16,
    };
    let mut out = Vec::new();
    header.serialize(&mut out);
    out.extend_from_slice(payload);
    out
}

#[test]
fn version_mismatch_raises_exactly_one_alert() {
    let _ = env_logger::try_init();

    let mut p = pair(Config::default());

    let packet = raw_record(
        ContentType::Handshake,
        ProtocolVersion::DTLS1_0,
        0,
        0,
        &[0; 12],
    );
    p.raw_to_server.write(&packet).unwrap();

    let err = p.server.read_record().unwrap_err();
    assert!(matches!(
        err,
        Error::VersionMismatch(ProtocolVersion::DTLS1_2, ProtocolVersion::DTLS1_0)
    ));
    assert_eq!(p.server_alerts.take(), vec![Alert::ProtocolVersion]);
}

#[test]
fn pre_negotiation_alert_may_use_other_version() {
    let _ = env_logger::try_init();

    let config = Config::builder()
        .pre_negotiation_alert_version(ProtocolVersion::DTLS1_0)
        .build();
    let mut p = pair(config);

    // An alert record in the override version is accepted pre-negotiation.
    let packet = raw_record(ContentType::Alert, ProtocolVersion::DTLS1_0, 0, 0, &[2, 70]);
    p.raw_to_server.write(&packet).unwrap();
    let (content_type, payload) = p.server.read_record().unwrap();
    assert_eq!(content_type, ContentType::Alert);
    assert_eq!(payload, [2, 70]);

    // Once negotiated, the same record fails the version check.
    p.server.mark_version_negotiated();
    let packet = raw_record(ContentType::Alert, ProtocolVersion::DTLS1_0, 0, 1, &[2, 70]);
    p.raw_to_server.write(&packet).unwrap();
    assert!(matches!(
        p.server.read_record().unwrap_err(),
        Error::VersionMismatch(..)
    ));
}

#[test]
fn wrong_epoch_raises_illegal_parameter() {
    let _ = env_logger::try_init();

    let mut p = pair(Config::default());

    let packet = raw_record(
        ContentType::Handshake,
        ProtocolVersion::DTLS1_2,
        1,
        0,
        &[0; 12],
    );
    p.raw_to_server.write(&packet).unwrap();

    assert!(matches!(
        p.server.read_record().unwrap_err(),
        Error::BadEpoch(0, 1)
    ));
    assert_eq!(p.server_alerts.take(), vec![Alert::IllegalParameter]);
}

#[test]
fn sequence_gaps_are_tolerated_but_decrease_is_not() {
    let _ = env_logger::try_init();

    let mut p = pair(Config::default());

    // Sequence 7 with 0..=6 never seen: accepted.
    let packet = raw_record(
        ContentType::ApplicationData,
        ProtocolVersion::DTLS1_2,
        0,
        7,
        b"gap",
    );
    p.raw_to_server.write(&packet).unwrap();
    assert_eq!(p.server.read_record().unwrap().1, b"gap");

    // Sequence 5 is now below the floor.
    let packet = raw_record(
        ContentType::ApplicationData,
        ProtocolVersion::DTLS1_2,
        0,
        5,
        b"late",
    );
    p.raw_to_server.write(&packet).unwrap();
    assert!(matches!(
        p.server.read_record().unwrap_err(),
        Error::BadSequence(8, 5)
    ));
    assert_eq!(p.server_alerts.take(), vec![Alert::IllegalParameter]);
}

#[test]
fn oversized_record_raises_record_overflow() {
    let _ = env_logger::try_init();

    let mut p = pair(Config::default());

    let packet = raw_record(
        ContentType::ApplicationData,
        ProtocolVersion::DTLS1_2,
        0,
        0,
        &[0; 20_000],
    );
    p.raw_to_server.write(&packet).unwrap();

    assert!(matches!(
        p.server.read_record().unwrap_err(),
        Error::OversizedRecord(20_000)
    ));
    assert_eq!(p.server_alerts.take(), vec![Alert::RecordOverflow]);
}

#[test]
fn truncated_header_is_rejected() {
    let _ = env_logger::try_init();

    let mut p = pair(Config::default());

    p.raw_to_server.write(&[0x16, 0xFE, 0xFD, 0x00]).unwrap();
    assert!(matches!(
        p.server.read_record().unwrap_err(),
        Error::BadHeader
    ));
}

#[test]
fn unknown_content_type_is_rejected() {
    let _ = env_logger::try_init();

    let mut p = pair(Config::default());

    let packet = raw_record(
        ContentType::Unknown(0x42),
        ProtocolVersion::DTLS1_2,
        0,
        0,
        &[],
    );
    p.raw_to_server.write(&packet).unwrap();
    assert!(matches!(
        p.server.read_record().unwrap_err(),
        Error::BadHeader
    ));
}

#[test]
fn unsupported_unified_shape_is_rejected() {
    let _ = env_logger::try_init();

    let mut p = pair(Config::default());

    // Unified header with 8-bit sequence number (S=0): splittable, but the
    // strict decode refuses it.
    p.raw_to_server.write(&[0x24, 0x07, 0x00, 0x02, 1, 2]).unwrap();
    assert!(matches!(
        p.server.read_record().unwrap_err(),
        Error::BadHeaderFormat
    ));
}

#[test]
fn bad_record_mac_raises_alert() {
    let _ = env_logger::try_init();

    let mut p = pair(Config::default());
    let (c1, c2) = aead_legacy_ciphers();
    p.client.advance_write_epoch(c1).unwrap();
    p.server.advance_read_epoch(c2).unwrap();

    p.client
        .write_record(ContentType::ApplicationData, b"secret")
        .unwrap();
    p.client.flush().unwrap();

    // Corrupt the last ciphertext byte in flight.
    let mut buf = [0u8; 2048];
    let n = p.client_to_server.read(&mut buf).unwrap();
    let mut packet = buf[..n].to_vec();
    let last = packet.len() - 1;
    packet[last] ^= 0x01;
    p.raw_to_server.write(&packet).unwrap();

    assert!(matches!(p.server.read_record().unwrap_err(), Error::Decrypt));
    assert_eq!(p.server_alerts.take(), vec![Alert::BadRecordMac]);
}
