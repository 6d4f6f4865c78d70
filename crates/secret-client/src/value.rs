use std::sync::Arc;

use zeroize::Zeroizing;

/// Content type of plain text secrets.
pub const TEXT_PLAIN: &str = "text/plain";

/// A secret payload together with its content type.
///
/// Values are immutable and cheap to clone: clones share the same buffer, which is zeroized
/// when the last clone is dropped.
#[derive(Clone)]
pub struct SecretValue {
    inner: Arc<Inner>,
}

struct Inner {
    secret: Zeroizing<Vec<u8>>,
    content_type: String,
}

impl SecretValue {
    /// Create a value from raw bytes.
    pub fn new(secret: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self::from_zeroizing(Zeroizing::new(secret.into()), content_type.into())
    }

    /// Create a `text/plain` value.
    pub fn new_text(text: &str) -> Self {
        Self::new(text.as_bytes(), TEXT_PLAIN)
    }

    pub(crate) fn from_zeroizing(secret: Zeroizing<Vec<u8>>, content_type: String) -> Self {
        Self {
            inner: Arc::new(Inner {
                secret,
                content_type,
            }),
        }
    }

    /// The secret bytes.
    pub fn get(&self) -> &[u8] {
        &self.inner.secret
    }

    /// The secret as text, if it is `text/plain` and valid UTF-8.
    pub fn get_text(&self) -> Option<&str> {
        if self.content_type() != TEXT_PLAIN {
            return None;
        }
        std::str::from_utf8(self.get()).ok()
    }

    #[allow(missing_docs)]
    pub fn content_type(&self) -> &str {
        &self.inner.content_type
    }
}

impl PartialEq for SecretValue {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get() && self.content_type() == other.content_type()
    }
}

impl Eq for SecretValue {}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretValue")
            .field("content_type", &self.content_type())
            .field("len", &self.get().len())
            .finish()
    }
}
