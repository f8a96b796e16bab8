//! Compression and symmetric encryption primitives, plus the fixed
//! composition applied to everything Courrier persists.
//!
//! Written content always goes through `compress -> base64 -> encrypt`
//! ([`seal`]) and is read back through the exact inverse chain ([`open`]).
//! Attachment bytes skip compression and only go through
//! `base64 -> encrypt` ([`seal_raw`] / [`open_raw`]).

use std::io::Read;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use rand::RngCore;

use crate::constants::NONCE_SIZE;
use crate::error::{CodecError, CryptoError};

pub type SymmetricKey = [u8; 32];

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Gzip-compress a byte sequence. Exact inverse of [`decompress`].
pub fn compress(plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(plaintext, Compression::default());
    let mut compressed = Vec::new();
    encoder.read_to_end(&mut compressed)?;
    Ok(compressed)
}

pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Seal plaintext content for storage: `compress -> base64 -> encrypt`,
/// then base64-armor the result so it fits a TEXT column and the JSON wire.
pub fn seal(key: &SymmetricKey, plaintext: &[u8]) -> Result<String, CodecError> {
    let compressed = compress(plaintext)?;
    let armored = BASE64.encode(&compressed);
    let encrypted = encrypt(key, armored.as_bytes())?;
    Ok(BASE64.encode(&encrypted))
}

/// Inverse of [`seal`]. The chain order is fixed; decompressing before
/// decrypting is a defect, not an alternative.
pub fn open(key: &SymmetricKey, sealed: &str) -> Result<Vec<u8>, CodecError> {
    let encrypted = BASE64.decode(sealed)?;
    let armored = decrypt(key, &encrypted)?;
    let compressed = BASE64.decode(String::from_utf8(armored)?.as_bytes())?;
    decompress(&compressed)
}

/// Seal raw attachment bytes: `base64 -> encrypt`, no compression.
pub fn seal_raw(key: &SymmetricKey, raw: &[u8]) -> Result<Vec<u8>, CodecError> {
    let armored = BASE64.encode(raw);
    Ok(encrypt(key, armored.as_bytes())?)
}

/// Inverse of [`seal_raw`].
pub fn open_raw(key: &SymmetricKey, sealed: &[u8]) -> Result<Vec<u8>, CodecError> {
    let armored = decrypt(key, sealed)?;
    Ok(BASE64.decode(String::from_utf8(armored)?.as_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress_roundtrip() {
        let data = b"Bonjour, this line repeats. Bonjour, this line repeats.";

        let compressed = compress(data).unwrap();
        let decompressed = decompress(&compressed).unwrap();

        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_compress_empty_roundtrip() {
        let compressed = compress(b"").unwrap();
        assert_eq!(decompress(&compressed).unwrap(), b"");
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_symmetric_key();
        let plaintext = b"Le courrier passe toujours";

        let encrypted = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &encrypted).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_fresh_nonce_every_call() {
        let key = generate_symmetric_key();
        let a = encrypt(&key, b"same input").unwrap();
        let b = encrypt(&key, b"same input").unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = generate_symmetric_key();
        let key2 = generate_symmetric_key();

        let encrypted = encrypt(&key1, b"secret").unwrap();
        assert!(decrypt(&key2, &encrypted).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = generate_symmetric_key();

        let mut encrypted = encrypt(&key, b"important").unwrap();
        let len = encrypted.len();
        encrypted[len - 1] ^= 0xFF;

        assert!(decrypt(&key, &encrypted).is_err());
    }

    #[test]
    fn test_blob_shorter_than_nonce_fails() {
        let key = generate_symmetric_key();
        assert!(decrypt(&key, &[]).is_err());
        assert!(decrypt(&key, &[0u8; NONCE_SIZE - 1]).is_err());
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = generate_symmetric_key();
        let sealed = seal(&key, "hello".as_bytes()).unwrap();

        // Never stored in plaintext.
        assert_ne!(sealed, "hello");
        assert_eq!(open(&key, &sealed).unwrap(), b"hello");
    }

    #[test]
    fn test_seal_is_randomized() {
        let key = generate_symmetric_key();
        assert_ne!(
            seal(&key, b"hello").unwrap(),
            seal(&key, b"hello").unwrap()
        );
    }

    #[test]
    fn test_open_rejects_garbage() {
        let key = generate_symmetric_key();
        assert!(open(&key, "not-base64!!!").is_err());
        assert!(open(&key, &BASE64.encode(b"tooshort")).is_err());
    }

    #[test]
    fn test_seal_raw_roundtrip() {
        let key = generate_symmetric_key();
        let raw = vec![0u8, 1, 2, 255, 254, 253];

        let sealed = seal_raw(&key, &raw).unwrap();
        assert_eq!(open_raw(&key, &sealed).unwrap(), raw);
    }
}
