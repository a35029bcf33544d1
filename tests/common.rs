//! Shared helpers for integration tests.

use std::sync::Arc;

use dshim::{
    memory_pair, AeadCipher, AlertRecorder, BlockCipher, Cipher, Config, Connection, MaskKey,
    MemoryTransport,
};

pub struct Pair {
    pub client: Connection<MemoryTransport>,
    pub server: Connection<MemoryTransport>,
    pub client_alerts: AlertRecorder,
    pub server_alerts: AlertRecorder,
    /// Watches packets the client has sent but the server not yet read.
    pub client_to_server: MemoryTransport,
    /// Injects raw packets the server will read next.
    pub raw_to_server: MemoryTransport,
}

/// Two connections over an in-memory packet pipe, with recording alert
/// sinks on both sides.
pub fn pair(config: Config) -> Pair {
    let config = Arc::new(config);
    let (a, b) = memory_pair();
    let client_to_server = b.clone();
    let raw_to_server = a.clone();

    let client_alerts = AlertRecorder::new();
    let server_alerts = AlertRecorder::new();

    let client = Connection::new(Arc::clone(&config), a, Box::new(client_alerts.clone()));
    let server = Connection::new(config, b, Box::new(server_alerts.clone()));

    Pair {
        client,
        server,
        client_alerts,
        server_alerts,
        client_to_server,
        raw_to_server,
    }
}

/// Matching AES-GCM ciphers for one direction of a legacy connection.
pub fn aead_legacy_ciphers() -> (Cipher, Cipher) {
    let key = [0x42; 16];
    let salt = [0x01, 0x02, 0x03, 0x04];
    (
        Cipher::Aead(AeadCipher::legacy(key, salt).expect("aead")),
        Cipher::Aead(AeadCipher::legacy(key, salt).expect("aead")),
    )
}

/// Matching AES-GCM ciphers with mask keys for one direction of a
/// unified-header connection.
pub fn aead_unified_ciphers() -> (Cipher, Cipher) {
    let key = [0x42; 16];
    let iv = [0x24; 12];
    let sn_key = [0x77; 16];
    (
        Cipher::Aead(AeadCipher::unified(key, iv, MaskKey::new(sn_key)).expect("aead")),
        Cipher::Aead(AeadCipher::unified(key, iv, MaskKey::new(sn_key)).expect("aead")),
    )
}

/// Matching CBC+HMAC ciphers for one direction of a legacy connection.
pub fn block_ciphers() -> (Cipher, Cipher) {
    let enc_key = [0x11; 16];
    let mac_key = [0x22; 32];
    (
        Cipher::Block(BlockCipher::new(enc_key, &mac_key).expect("block")),
        Cipher::Block(BlockCipher::new(enc_key, &mac_key).expect("block")),
    )
}
