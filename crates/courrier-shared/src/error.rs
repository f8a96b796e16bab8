use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,
}

/// Errors from the full seal/open chain (compression, armoring, cipher).
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Decoded content is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
