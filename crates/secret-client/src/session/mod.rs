//! Transfer sessions negotiated with the secret service.

use std::fmt;

use secret_client_crypto::SessionKey;
use serde::{Deserialize, Serialize};

mod manager;
pub use manager::SessionManager;

/// Session algorithms understood by this client, named as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Secrets travel unencrypted.
    #[serde(rename = "plain")]
    Plain,
    /// Diffie-Hellman over the 1024-bit Oakley group, HKDF-SHA256 and AES-128-CBC.
    #[serde(rename = "dh-ietf1024-sha256-aes128-cbc-pkcs7")]
    DhIetf1024Sha256Aes128CbcPkcs7,
}

impl Algorithm {
    /// The algorithm name passed to `OpenSession`.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Plain => "plain",
            Algorithm::DhIetf1024Sha256Aes128CbcPkcs7 => "dh-ietf1024-sha256-aes128-cbc-pkcs7",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An open session with the service.
///
/// Encrypted sessions carry the derived AES key; plain sessions carry none.
#[derive(Debug, Clone)]
pub struct Session {
    path: String,
    algorithm: Algorithm,
    key: Option<SessionKey>,
}

impl Session {
    /// A session that moves secrets in the clear.
    pub fn plain(path: impl Into<String>) -> Self {
        Session {
            path: path.into(),
            algorithm: Algorithm::Plain,
            key: None,
        }
    }

    /// An encrypted session using `key`.
    pub fn with_key(path: impl Into<String>, key: SessionKey) -> Self {
        Session {
            path: path.into(),
            algorithm: Algorithm::DhIetf1024Sha256Aes128CbcPkcs7,
            key: Some(key),
        }
    }

    /// Object path of the session on the service.
    pub fn path(&self) -> &str {
        &self.path
    }

    #[allow(missing_docs)]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The AES key, for encrypted sessions.
    pub fn key(&self) -> Option<&SessionKey> {
        self.key.as_ref()
    }
}
