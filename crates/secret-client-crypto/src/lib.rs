#![doc = include_str!("../README.md")]

mod symmetric;
pub use symmetric::{EncryptedPayload, SessionKey, AES_BLOCK_SIZE};
mod dh;
pub use dh::{DhKeyPair, DH_KEY_SIZE};
mod error;
pub use error::CryptoError;
pub(crate) use error::Result;
