#![doc = include_str!("../README.md")]

mod codec;
pub use codec::{attributes_from_wire, attributes_to_wire, decode_secret, encode_secret, Attributes};
mod error;
pub use error::{Error, Result};
mod item;
pub use item::ItemProxy;
mod operation;
pub use operation::{AsyncResult, OperationKind};
mod service;
pub use service::Service;
pub mod session;
pub use session::{Algorithm, Session, SessionManager};
mod settings;
pub use settings::ServiceSettings;
pub mod transport;
pub use transport::{MethodCall, Transport, TransportError};
mod value;
pub use value::{SecretValue, TEXT_PLAIN};
pub mod wire;
pub use wire::WireValue;

pub use tokio_util::sync::CancellationToken;
