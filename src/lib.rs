//! HAP accessory runtime library.
//!
//! Exposes the pure-logic modules (crypto, TLV8, accessory data model,
//! pairing state machine, BLE/IP transports) for integration testing and
//! external inspection. Hardware and network I/O are reached only through
//! the port traits in [`ports`]; concrete GATT/TCP/settings backends are
//! the caller's responsibility.

#![deny(unused_must_use)]

pub mod config;
pub mod error;
pub mod ports;
pub mod time;

pub mod crypto;
pub mod model;
pub mod pairing;
pub mod tlv;
pub mod transport;

pub use error::{Error, Result};
