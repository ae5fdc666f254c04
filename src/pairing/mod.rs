//! Pairing (spec.md §3, §4.5): the Pairings table, a Pair-Verify session,
//! and the Path × Method × State dispatch engine that drives Pair-Setup,
//! Pair-Verify, Pair-Resume and pairings-table management to completion.

pub mod controller;
pub mod engine;
pub mod session;

pub use controller::{Controller, Pairings, Perm, MAX_ID_LEN, MAX_PAIRINGS};
pub use engine::{Path, PairingEngine};
pub use session::{Phase, Session};
