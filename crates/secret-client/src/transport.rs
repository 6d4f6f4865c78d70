use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::wire::WireValue;

/// Default object path of the secret service.
pub const SERVICE_PATH: &str = "/org/freedesktop/secrets";
/// Interface of the service object.
pub const SERVICE_INTERFACE: &str = "org.freedesktop.Secret.Service";
/// Interface of item objects.
pub const ITEM_INTERFACE: &str = "org.freedesktop.Secret.Item";
/// Interface of session objects.
pub const SESSION_INTERFACE: &str = "org.freedesktop.Secret.Session";
/// Standard interface used to write properties.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Remote error name for an unsupported method argument, e.g. an unknown session algorithm.
pub const NOT_SUPPORTED_ERROR: &str = "org.freedesktop.DBus.Error.NotSupported";
/// Remote error name for a session path the service no longer knows.
pub const NO_SESSION_ERROR: &str = "org.freedesktop.Secret.Error.NoSession";

/// An error reported by the transport or by the remote side of a call.
///
/// The secret client never interprets these beyond the two names above; they reach the caller
/// unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{name}: {message}")]
pub struct TransportError {
    /// Bus error name, e.g. `org.freedesktop.DBus.Error.ServiceUnknown`.
    pub name: String,
    /// Human readable description.
    pub message: String,
}

impl TransportError {
    #[allow(missing_docs)]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    #[allow(missing_docs)]
    pub fn is_not_supported(&self) -> bool {
        self.name == NOT_SUPPORTED_ERROR
    }

    #[allow(missing_docs)]
    pub fn is_no_session(&self) -> bool {
        self.name == NO_SESSION_ERROR
    }
}

/// A method invocation on a remote object.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    #[allow(missing_docs)]
    pub object_path: String,
    #[allow(missing_docs)]
    pub interface: String,
    #[allow(missing_docs)]
    pub method: String,
    /// Input arguments, in signature order.
    pub args: Vec<WireValue>,
}

impl MethodCall {
    #[allow(missing_docs)]
    pub fn new(
        object_path: impl Into<String>,
        interface: impl Into<String>,
        method: impl Into<String>,
        args: Vec<WireValue>,
    ) -> Self {
        Self {
            object_path: object_path.into(),
            interface: interface.into(),
            method: method.into(),
            args,
        }
    }
}

/// This trait defines the interface the secret client uses to reach the service. It is up to
/// the platform to implement it on top of a bus connection, along with any proxy creation,
/// property caching and thread synchronization that requires.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Invoke a method and return its output arguments.
    ///
    /// The token is the one the caller's operation runs under. Implementations that can abort
    /// an in-flight call should do so once it is cancelled; the client stops waiting for the
    /// reply either way.
    async fn call(
        &self,
        call: MethodCall,
        cancellation: &CancellationToken,
    ) -> Result<Vec<WireValue>, TransportError>;

    /// Read a property from the transport's cache without a round trip.
    ///
    /// Returns `None` when the property is not cached.
    fn cached_property(&self, object_path: &str, interface: &str, name: &str)
        -> Option<WireValue>;
}
