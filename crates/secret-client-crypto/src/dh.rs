use std::sync::OnceLock;

use hkdf::Hkdf;
use num_bigint::BigUint;
use num_traits::One;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{error::CryptoError, symmetric::SessionKey, Result};

/// Size in bytes of the group prime, and therefore of padded public keys and shared secrets.
pub const DH_KEY_SIZE: usize = 128;

/// RFC 2409 section 6.2, second Oakley group.
const OAKLEY_GROUP_2_PRIME: &[u8] = b"\
    FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
    29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
    EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
    E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
    EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE65381\
    FFFFFFFFFFFFFFFF";

const OAKLEY_GROUP_2_GENERATOR: u32 = 2;

fn prime() -> &'static BigUint {
    static PRIME: OnceLock<BigUint> = OnceLock::new();
    PRIME.get_or_init(|| {
        BigUint::parse_bytes(OAKLEY_GROUP_2_PRIME, 16).expect("group prime is valid hex")
    })
}

/// An ephemeral Diffie-Hellman key pair over the second Oakley group.
///
/// The private exponent is kept as big-endian bytes and zeroized on drop.
pub struct DhKeyPair {
    private: Zeroizing<Vec<u8>>,
    public: Vec<u8>,
}

impl std::fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyPair")
            .field("public", &self.public.len())
            .finish_non_exhaustive()
    }
}

impl DhKeyPair {
    /// Generate a new key pair from a random exponent.
    pub fn generate() -> Self {
        let mut private = Zeroizing::new(vec![0u8; DH_KEY_SIZE]);
        rand::thread_rng().fill_bytes(&mut private);

        let exponent = BigUint::from_bytes_be(&private);
        let public = BigUint::from(OAKLEY_GROUP_2_GENERATOR).modpow(&exponent, prime());

        DhKeyPair {
            private,
            public: left_pad(public.to_bytes_be()),
        }
    }

    /// The public key as big-endian bytes, padded to [`DH_KEY_SIZE`].
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Combine this key pair with the peer's public key and derive the AES session key.
    ///
    /// The shared secret is left-padded to [`DH_KEY_SIZE`] bytes and expanded with
    /// HKDF-SHA256 using no salt and empty info.
    pub fn derive_session_key(&self, peer_public: &[u8]) -> Result<SessionKey> {
        if peer_public.is_empty() || peer_public.len() > DH_KEY_SIZE {
            return Err(CryptoError::InvalidPublicKey);
        }

        let prime = prime();
        let peer = BigUint::from_bytes_be(peer_public);
        let one = BigUint::one();
        if peer <= one || peer >= prime - &one {
            return Err(CryptoError::InvalidPublicKey);
        }

        let exponent = BigUint::from_bytes_be(&self.private);
        let shared = Zeroizing::new(left_pad(peer.modpow(&exponent, prime).to_bytes_be()));

        let hkdf = Hkdf::<Sha256>::new(None, &shared);
        let mut key = Zeroizing::new([0u8; 16]);
        hkdf.expand(&[], &mut key[..])
            .map_err(|_| CryptoError::KeyDerivation)?;

        Ok(SessionKey::from(key))
    }
}

fn left_pad(bytes: Vec<u8>) -> Vec<u8> {
    if bytes.len() >= DH_KEY_SIZE {
        return bytes;
    }
    let mut padded = vec![0u8; DH_KEY_SIZE - bytes.len()];
    padded.extend_from_slice(&bytes);
    padded
}
