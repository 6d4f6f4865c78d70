#![doc = include_str!("../README.md")]

mod service;
pub use service::{MockItem, MockSecretService, SESSION_PREFIX};
