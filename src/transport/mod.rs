//! The two transports a HAP controller reaches this accessory through
//! (spec.md §4.6 BLE, §4.7 IP). Both are thin protocol layers over the
//! same domain core — [`crate::pairing::PairingEngine`] and
//! [`crate::model::Db`] — translating PDU/HTTP framing into the calls
//! those modules already expose.

pub mod ble;
pub mod ip;
