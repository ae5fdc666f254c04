//! Port traits — the hexagonal boundary between the HAP domain core and the
//! outside world named in spec.md §1 as out-of-scope "external
//! collaborators": the GATT stack, the TCP acceptor, mDNS, the persistent
//! settings backend, and the device's entropy source.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ domain code (crypto, model, pairing)
//! ```
//!
//! Driven adapters (a real GATT stack, a TCP socket, flash-backed
//! settings) implement these traits; the pairing engine and transports
//! consume them via generics or `&mut dyn Trait`, so the domain core never
//! touches hardware or a network socket directly.

use crate::config::Config;

// ───────────────────────────────────────────────────────────────
// Settings port (driven adapter: domain ↔ persistent key-value store)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value settings store keyed by the short strings in
/// spec.md §6 (`nm`, `md`, `sv`, `p0`..`pF`, ...).
///
/// # Security
///
/// Implementations SHOULD encrypt the long-term secret key (`sk`) and the
/// SRP verifier (`sv`) at rest. Writes MUST be atomic — a partial write on
/// power loss must never leave `Config::init` reading a corrupted blob
/// (spec.md §7: "missing or invalid `cn` triggers a full manufacturing
/// reset", which is the recovery path for exactly this case).
pub trait SettingsPort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, key: &str, buf: &mut [u8]) -> Result<usize, SettingsError>;

    /// Write a value atomically.
    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), SettingsError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, key: &str) -> Result<(), SettingsError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, key: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsError {
    NotFound,
    Full,
    IoError,
    Corrupted,
}

impl core::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "value corrupted"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Random source (driven adapter: domain ↔ entropy source)
// ───────────────────────────────────────────────────────────────

/// The only source of randomness the crypto/pairing code ever touches.
/// On a real device this wraps the hardware RNG (spec.md §9: "no module
/// initialisers perform I/O; initialisation order is explicit in boot
/// code" — the caller constructs and injects the concrete `RandomPort`).
pub trait RandomPort {
    fn fill(&mut self, buf: &mut [u8]);
}

// ───────────────────────────────────────────────────────────────
// Transport-refresh notification (driven adapter: domain → mDNS/adv)
// ───────────────────────────────────────────────────────────────

/// Called by [`Config::update`](crate::config::Config::update) whenever a
/// change requires the transports to re-announce themselves (new pairing
/// state, new configuration number, new GSN). A BLE adapter re-polls its
/// advertisement state machine; an IP adapter republishes its mDNS TXT
/// record. Both are out-of-scope external collaborators — this trait is
/// the only contact point.
pub trait AnnouncePort {
    fn refresh(&mut self, cfg: &Config);
}

/// An `AnnouncePort` that does nothing; used where no transport is wired
/// up (unit tests, or a device that only cares about the pairing engine).
#[derive(Default)]
pub struct NullAnnouncePort;

impl AnnouncePort for NullAnnouncePort {
    fn refresh(&mut self, _cfg: &Config) {}
}
