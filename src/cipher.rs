//! Record protection for the shim.
//!
//! The cipher in use is a closed set of three variants. Which one is
//! installed decides the shape of the protected record: the block variant
//! prepends an explicit CBC IV, the AEAD variant prepends an explicit nonce
//! in legacy records and nothing in unified records, and the null variant
//! passes payloads through untouched (used to drive peers with record
//! protection disabled).
//!
//! Key derivation is not this crate's concern; the surrounding test driver
//! installs ready-made keys per negotiated cipher suite.

use aes::cipher::{
    block_padding::NoPadding, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
};
use aes::Aes128;
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, Nonce};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::rng::SeededRng;
use crate::types::{ContentType, ProtocolVersion, Sequence};
use crate::Error;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// AEAD tag length (AES-GCM).
const TAG_LEN: usize = 16;
/// Explicit nonce prepended to legacy AEAD records.
const EXPLICIT_NONCE_LEN: usize = 8;
/// CBC block and explicit IV length.
const BLOCK_LEN: usize = 16;
/// HMAC-SHA256 output length.
const MAC_LEN: usize = 32;
/// Ciphertext sample length consumed by the record-number mask.
pub(crate) const MASK_SAMPLE_LEN: usize = 16;

/// Keyed generator for the record-number XOR mask.
///
/// The mask is the leading bytes of AES-ECB over the first 16 ciphertext
/// bytes following the unified header.
pub struct MaskKey {
    aes: Aes128,
}

impl MaskKey {
    pub fn new(mut key: [u8; 16]) -> Self {
        let aes = Aes128::new(&key.into());
        key.zeroize();
        MaskKey { aes }
    }

    /// Compute the 2-byte mask for a 16-bit wire sequence number.
    pub fn mask(&self, sample: &[u8]) -> Result<[u8; 2], Error> {
        if sample.len() < MASK_SAMPLE_LEN {
            return Err(Error::Crypto(format!(
                "record-number mask needs a {} byte sample, got {}",
                MASK_SAMPLE_LEN,
                sample.len()
            )));
        }
        let mut block = aes::Block::clone_from_slice(&sample[..MASK_SAMPLE_LEN]);
        self.aes.encrypt_block(&mut block);
        Ok([block[0], block[1]])
    }
}

impl std::fmt::Debug for MaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskKey").finish()
    }
}

/// AES-128-GCM record protection.
pub struct AeadCipher {
    aead: Aes128Gcm,
    iv: [u8; 12],
    mask: Option<MaskKey>,
}

impl AeadCipher {
    /// AEAD for legacy records: 4-byte implicit salt, 8-byte explicit nonce
    /// taken from the record sequence.
    pub fn legacy(key: [u8; 16], salt: [u8; 4]) -> Result<Self, Error> {
        let mut iv = [0; 12];
        iv[..4].copy_from_slice(&salt);
        Self::build(key, iv, None)
    }

    /// AEAD for unified records: 12-byte IV XORed with the sequence number,
    /// plus the record-number mask key.
    pub fn unified(key: [u8; 16], iv: [u8; 12], mask: MaskKey) -> Result<Self, Error> {
        Self::build(key, iv, Some(mask))
    }

    fn build(mut key: [u8; 16], iv: [u8; 12], mask: Option<MaskKey>) -> Result<Self, Error> {
        let aead = Aes128Gcm::new_from_slice(&key)
            .map_err(|_| Error::Crypto("bad AEAD key length".to_string()))?;
        key.zeroize();
        Ok(AeadCipher { aead, iv, mask })
    }

    /// Nonce for unified records: iv XOR (0 || sequence_number).
    fn xor_nonce(&self, sequence_number: u64) -> [u8; 12] {
        let mut nonce = self.iv;
        let seq_bytes = sequence_number.to_be_bytes();
        for i in 0..8 {
            nonce[4 + i] ^= seq_bytes[i];
        }
        nonce
    }

    /// Nonce for legacy records: salt || explicit.
    fn explicit_nonce(&self, explicit: &[u8]) -> [u8; 12] {
        let mut nonce = [0; 12];
        nonce[..4].copy_from_slice(&self.iv[..4]);
        nonce[4..].copy_from_slice(explicit);
        nonce
    }
}

impl Drop for AeadCipher {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

/// AES-128-CBC with HMAC-SHA256, MAC-then-encrypt, explicit per-record IV.
pub struct BlockCipher {
    enc_key: [u8; 16],
    mac: HmacSha256,
}

impl BlockCipher {
    pub fn new(enc_key: [u8; 16], mac_key: &[u8]) -> Result<Self, Error> {
        let mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
            .map_err(|_| Error::Crypto("bad MAC key length".to_string()))?;
        Ok(BlockCipher { enc_key, mac })
    }

    fn compute_mac(&self, pseudo_header: &[u8], payload: &[u8]) -> [u8; MAC_LEN] {
        let mut mac = self.mac.clone();
        mac.update(pseudo_header);
        mac.update(payload);
        mac.finalize().into_bytes().into()
    }
}

impl Drop for BlockCipher {
    fn drop(&mut self) {
        self.enc_key.zeroize();
    }
}

/// The installed record protection.
pub enum Cipher {
    Null,
    Block(BlockCipher),
    Aead(AeadCipher),
}

impl Cipher {
    pub fn is_null(&self) -> bool {
        matches!(self, Cipher::Null)
    }

    /// The mask key for record-number protection, when the variant has one.
    pub fn mask_key(&self) -> Option<&MaskKey> {
        match self {
            Cipher::Aead(aead) => aead.mask.as_ref(),
            _ => None,
        }
    }

    /// Ciphertext expansion when sealing a unified record.
    pub(crate) fn seal_overhead(&self) -> usize {
        match self {
            Cipher::Null => 0,
            Cipher::Aead(_) => TAG_LEN,
            // Block ciphers never protect unified records; seal_unified
            // rejects them before this matters.
            Cipher::Block(_) => 0,
        }
    }

    /// Protect a legacy-format record payload.
    pub fn seal_legacy(
        &self,
        rng: &mut SeededRng,
        sequence: &Sequence,
        content_type: ContentType,
        version: ProtocolVersion,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        match self {
            Cipher::Null => Ok(plaintext.to_vec()),
            Cipher::Aead(aead) => {
                let explicit = sequence.wire_bytes();
                let nonce = aead.explicit_nonce(&explicit);
                let aad = legacy_pseudo_header(sequence, content_type, version, plaintext.len());
                let ciphertext = aead
                    .aead
                    .encrypt(
                        Nonce::from_slice(&nonce),
                        Payload {
                            msg: plaintext,
                            aad: &aad,
                        },
                    )
                    .map_err(|_| Error::Crypto("AEAD seal failed".to_string()))?;

                let mut out = Vec::with_capacity(EXPLICIT_NONCE_LEN + ciphertext.len());
                out.extend_from_slice(&explicit);
                out.extend_from_slice(&ciphertext);
                Ok(out)
            }
            Cipher::Block(block) => {
                let pseudo_header =
                    legacy_pseudo_header(sequence, content_type, version, plaintext.len());
                let tag = block.compute_mac(&pseudo_header, plaintext);

                let mut content = Vec::with_capacity(plaintext.len() + MAC_LEN + BLOCK_LEN);
                content.extend_from_slice(plaintext);
                content.extend_from_slice(&tag);

                // TLS CBC padding: pad_len + 1 bytes, each valued pad_len.
                let pad_len = (BLOCK_LEN - (content.len() + 1) % BLOCK_LEN) % BLOCK_LEN;
                content.resize(content.len() + pad_len + 1, pad_len as u8);

                let mut iv = [0u8; BLOCK_LEN];
                rng.fill(&mut iv);

                let ciphertext = Aes128CbcEnc::new(&block.enc_key.into(), &iv.into())
                    .encrypt_padded_vec_mut::<NoPadding>(&content);

                let mut out = Vec::with_capacity(BLOCK_LEN + ciphertext.len());
                out.extend_from_slice(&iv);
                out.extend_from_slice(&ciphertext);
                Ok(out)
            }
        }
    }

    /// Recover a legacy-format record payload.
    pub fn open_legacy(
        &self,
        sequence: &Sequence,
        content_type: ContentType,
        version: ProtocolVersion,
        protected: &[u8],
    ) -> Result<Vec<u8>, Error> {
        match self {
            Cipher::Null => Ok(protected.to_vec()),
            Cipher::Aead(aead) => {
                let plaintext_len = protected
                    .len()
                    .checked_sub(EXPLICIT_NONCE_LEN + TAG_LEN)
                    .ok_or(Error::Decrypt)?;
                let (explicit, ciphertext) = protected.split_at(EXPLICIT_NONCE_LEN);
                let nonce = aead.explicit_nonce(explicit);
                let aad = legacy_pseudo_header(sequence, content_type, version, plaintext_len);
                aead.aead
                    .decrypt(
                        Nonce::from_slice(&nonce),
                        Payload {
                            msg: ciphertext,
                            aad: &aad,
                        },
                    )
                    .map_err(|_| Error::Decrypt)
            }
            Cipher::Block(block) => {
                if protected.len() < 2 * BLOCK_LEN || (protected.len() - BLOCK_LEN) % BLOCK_LEN != 0
                {
                    return Err(Error::Decrypt);
                }
                let (iv, ciphertext) = protected.split_at(BLOCK_LEN);
                // split_at guarantees the length, so this always succeeds.
                let iv: [u8; BLOCK_LEN] = iv.try_into().unwrap();

                let padded = Aes128CbcDec::new(&block.enc_key.into(), &iv.into())
                    .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
                    .map_err(|_| Error::Decrypt)?;

                // Padding: last byte is pad_len, followed backwards by
                // pad_len more copies of itself.
                let pad_len = *padded.last().ok_or(Error::Decrypt)? as usize;
                let content_len = padded
                    .len()
                    .checked_sub(pad_len + 1)
                    .ok_or(Error::Decrypt)?;
                if padded[content_len..].iter().any(|b| *b as usize != pad_len) {
                    return Err(Error::Decrypt);
                }

                let plaintext_len = content_len.checked_sub(MAC_LEN).ok_or(Error::Decrypt)?;
                let (plaintext, tag) = padded[..content_len].split_at(plaintext_len);

                let pseudo_header =
                    legacy_pseudo_header(sequence, content_type, version, plaintext_len);
                let expected = block.compute_mac(&pseudo_header, plaintext);
                if tag != expected.as_slice() {
                    return Err(Error::Decrypt);
                }

                Ok(plaintext.to_vec())
            }
        }
    }

    /// Protect a unified-format inner plaintext. The AAD is the record
    /// header with the unmasked sequence bytes.
    pub fn seal_unified(
        &self,
        sequence_number: u64,
        header: &[u8],
        inner: &[u8],
    ) -> Result<Vec<u8>, Error> {
        match self {
            Cipher::Null => Ok(inner.to_vec()),
            Cipher::Aead(aead) => {
                let nonce = aead.xor_nonce(sequence_number);
                aead.aead
                    .encrypt(
                        Nonce::from_slice(&nonce),
                        Payload {
                            msg: inner,
                            aad: header,
                        },
                    )
                    .map_err(|_| Error::Crypto("AEAD seal failed".to_string()))
            }
            Cipher::Block(_) => Err(Error::Crypto(
                "unified records require an AEAD or null cipher".to_string(),
            )),
        }
    }

    /// Recover a unified-format inner plaintext.
    pub fn open_unified(
        &self,
        sequence_number: u64,
        header: &[u8],
        protected: &[u8],
    ) -> Result<Vec<u8>, Error> {
        match self {
            Cipher::Null => Ok(protected.to_vec()),
            Cipher::Aead(aead) => {
                let nonce = aead.xor_nonce(sequence_number);
                aead.aead
                    .decrypt(
                        Nonce::from_slice(&nonce),
                        Payload {
                            msg: protected,
                            aad: header,
                        },
                    )
                    .map_err(|_| Error::Decrypt)
            }
            Cipher::Block(_) => Err(Error::Crypto(
                "unified records require an AEAD or null cipher".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Cipher::Null => "Null",
            Cipher::Block(_) => "Block",
            Cipher::Aead(_) => "Aead",
        };
        write!(f, "Cipher::{}", name)
    }
}

/// The 13-byte MAC/AAD pseudo header: epoch+sequence, type, version, length.
fn legacy_pseudo_header(
    sequence: &Sequence,
    content_type: ContentType,
    version: ProtocolVersion,
    plaintext_len: usize,
) -> [u8; 13] {
    let mut out = [0; 13];
    out[..8].copy_from_slice(&sequence.wire_bytes());
    out[8] = content_type.as_u8();
    out[9..11].copy_from_slice(&version.as_u16().to_be_bytes());
    out[11..13].copy_from_slice(&(plaintext_len as u16).to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(epoch: u16, sequence_number: u64) -> Sequence {
        Sequence {
            epoch,
            sequence_number,
        }
    }

    #[test]
    fn null_cipher_passes_through() {
        let cipher = Cipher::Null;
        let mut rng = SeededRng::new(Some(1));
        let sealed = cipher
            .seal_legacy(
                &mut rng,
                &seq(0, 0),
                ContentType::Handshake,
                ProtocolVersion::DTLS1_2,
                b"hello",
            )
            .unwrap();
        assert_eq!(sealed, b"hello");
    }

    #[test]
    fn aead_legacy_roundtrip() {
        let cipher = Cipher::Aead(AeadCipher::legacy([7; 16], [1, 2, 3, 4]).unwrap());
        let mut rng = SeededRng::new(Some(1));
        let s = seq(1, 42);

        let sealed = cipher
            .seal_legacy(
                &mut rng,
                &s,
                ContentType::ApplicationData,
                ProtocolVersion::DTLS1_2,
                b"some payload",
            )
            .unwrap();
        assert_ne!(&sealed[EXPLICIT_NONCE_LEN..], b"some payload");

        let opened = cipher
            .open_legacy(
                &s,
                ContentType::ApplicationData,
                ProtocolVersion::DTLS1_2,
                &sealed,
            )
            .unwrap();
        assert_eq!(opened, b"some payload");
    }

    #[test]
    fn aead_legacy_detects_tamper() {
        let cipher = Cipher::Aead(AeadCipher::legacy([7; 16], [1, 2, 3, 4]).unwrap());
        let mut rng = SeededRng::new(Some(1));
        let s = seq(1, 42);

        let mut sealed = cipher
            .seal_legacy(
                &mut rng,
                &s,
                ContentType::ApplicationData,
                ProtocolVersion::DTLS1_2,
                b"some payload",
            )
            .unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert!(matches!(
            cipher.open_legacy(
                &s,
                ContentType::ApplicationData,
                ProtocolVersion::DTLS1_2,
                &sealed
            ),
            Err(Error::Decrypt)
        ));
    }

    #[test]
    fn block_legacy_roundtrip() {
        let cipher = Cipher::Block(BlockCipher::new([9; 16], &[8; 32]).unwrap());
        let mut rng = SeededRng::new(Some(99));
        let s = seq(1, 7);

        let sealed = cipher
            .seal_legacy(
                &mut rng,
                &s,
                ContentType::Handshake,
                ProtocolVersion::DTLS1_2,
                b"finished",
            )
            .unwrap();
        assert_eq!(sealed.len() % BLOCK_LEN, 0);

        let opened = cipher
            .open_legacy(&s, ContentType::Handshake, ProtocolVersion::DTLS1_2, &sealed)
            .unwrap();
        assert_eq!(opened, b"finished");
    }

    #[test]
    fn block_rejects_bad_mac() {
        let cipher = Cipher::Block(BlockCipher::new([9; 16], &[8; 32]).unwrap());
        let mut rng = SeededRng::new(Some(99));
        let s = seq(1, 7);

        let sealed = cipher
            .seal_legacy(
                &mut rng,
                &s,
                ContentType::Handshake,
                ProtocolVersion::DTLS1_2,
                b"finished",
            )
            .unwrap();

        // Same bytes attributed to a different sequence number.
        assert!(matches!(
            cipher.open_legacy(
                &seq(1, 8),
                ContentType::Handshake,
                ProtocolVersion::DTLS1_2,
                &sealed
            ),
            Err(Error::Decrypt)
        ));
    }

    #[test]
    fn aead_unified_roundtrip() {
        let mask = MaskKey::new([3; 16]);
        let cipher = Cipher::Aead(AeadCipher::unified([7; 16], [5; 12], mask).unwrap());

        let header = [0x2C, 0xAA, 0xBB, 0x00, 0x20];
        let sealed = cipher.seal_unified(77, &header, b"inner plaintext\x16").unwrap();
        let opened = cipher.open_unified(77, &header, &sealed).unwrap();
        assert_eq!(opened, b"inner plaintext\x16");

        // A different sequence number produces a different nonce.
        assert!(matches!(
            cipher.open_unified(78, &header, &sealed),
            Err(Error::Decrypt)
        ));
    }

    #[test]
    fn mask_is_deterministic_and_keyed() {
        let sample = [0xAB; 16];
        let m1 = MaskKey::new([1; 16]).mask(&sample).unwrap();
        let m2 = MaskKey::new([1; 16]).mask(&sample).unwrap();
        let m3 = MaskKey::new([2; 16]).mask(&sample).unwrap();
        assert_eq!(m1, m2);
        assert_ne!(m1, m3);
    }

    #[test]
    fn mask_requires_full_sample() {
        let mask = MaskKey::new([1; 16]);
        assert!(mask.mask(&[0u8; 15]).is_err());
    }
}
