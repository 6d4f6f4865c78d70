//! Conversions between client-side values and their wire representation.

mod attributes;
pub use attributes::{attributes_from_wire, attributes_to_wire, Attributes};
mod secret;
pub use secret::{decode_secret, encode_secret};
