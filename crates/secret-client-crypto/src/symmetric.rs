//! AES-128-CBC with PKCS#7 padding, keyed by a negotiated [`SessionKey`].

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::{error::CryptoError, Result};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES block size, which is also the IV size.
pub const AES_BLOCK_SIZE: usize = 16;

/// A 128-bit AES key shared with the service after a successful key exchange.
#[derive(Clone)]
pub struct SessionKey(Zeroizing<[u8; 16]>);

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey").finish_non_exhaustive()
    }
}

impl From<Zeroizing<[u8; 16]>> for SessionKey {
    fn from(key: Zeroizing<[u8; 16]>) -> Self {
        SessionKey(key)
    }
}

/// Output of [`SessionKey::encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// The random IV, sent to the peer as the session parameters.
    pub iv: Vec<u8>,
    /// The padded ciphertext.
    pub ciphertext: Vec<u8>,
}

impl SessionKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Encrypt `plaintext` under a freshly generated IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload> {
        let mut iv = [0u8; AES_BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        self.encrypt_with_iv(plaintext, iv)
    }

    fn encrypt_with_iv(
        &self,
        plaintext: &[u8],
        iv: [u8; AES_BLOCK_SIZE],
    ) -> Result<EncryptedPayload> {
        let cipher = Aes128CbcEnc::new_from_slices(&self.0[..], &iv).map_err(|_| {
            CryptoError::InvalidLength {
                expected: AES_BLOCK_SIZE,
                got: iv.len(),
            }
        })?;

        Ok(EncryptedPayload {
            iv: iv.to_vec(),
            ciphertext: cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        })
    }

    /// Decrypt `ciphertext` that was encrypted under `iv`.
    pub fn decrypt(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if iv.len() != AES_BLOCK_SIZE {
            return Err(CryptoError::InvalidLength {
                expected: AES_BLOCK_SIZE,
                got: iv.len(),
            });
        }

        let cipher = Aes128CbcDec::new_from_slices(&self.0[..], iv).map_err(|_| {
            CryptoError::InvalidLength {
                expected: AES_BLOCK_SIZE,
                got: iv.len(),
            }
        })?;

        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::Decrypt)
    }
}
