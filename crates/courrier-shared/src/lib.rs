//! # courrier-shared
//!
//! Wire types and the content codec shared by every Courrier component.
//!
//! The codec is the heart of the crate: every message body and attachment
//! filename is compressed, base64-armored, then sealed with
//! XChaCha20-Poly1305 before it touches the store, and the inverse chain is
//! applied on every read.

pub mod codec;
pub mod constants;
pub mod types;

mod error;

pub use error::{CodecError, CryptoError};
