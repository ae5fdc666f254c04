//! Pair-Verify session state (spec.md §3 Session): the per-connection
//! record that carries a controller from an authenticated Pair-Verify
//! through to encrypted session traffic.

use crate::pairing::controller::MAX_ID_LEN;
use crate::time::Millis;

/// A session's lifecycle: unauthenticated Pair-Verify exchange in
/// progress, or secured with both directional traffic keys derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Verifying,
    Secured,
}

/// One Pair-Verify/Pair-Resume session. Exactly one is tracked by
/// [`crate::pairing::engine::PairingEngine`] at a time — this runtime
/// targets a single concurrent controller connection per transport
/// (spec.md §9 Open Question, resolved in DESIGN.md).
pub struct Session {
    pub id: u32,
    pub phase: Phase,
    pub last_activity: Millis,

    /// This accessory's ephemeral Curve25519 keypair for the exchange.
    pub eph_secret: [u8; 32],
    pub eph_public: [u8; 32],
    /// Controller's ephemeral Curve25519 public key, once received.
    pub peer_eph_public: [u8; 32],

    /// `X25519(eph_secret, peer_eph_public)`.
    pub shared_secret: [u8; 32],
    /// HKDF of `shared_secret` used only to encrypt the M2/M3 sub-TLVs.
    pub handshake_key: [u8; 32],

    /// Directional traffic keys, valid once `phase == Secured`.
    pub accessory_to_controller_key: [u8; 32],
    pub controller_to_accessory_key: [u8; 32],
    pub send_count: u64,
    pub recv_count: u64,

    /// Identifier of the controller this session authenticated as.
    pub controller_id: [u8; MAX_ID_LEN],
    pub controller_id_len: u8,

    /// Resumable session id handed out after a successful Pair-Verify
    /// (spec.md §4.5 VerifyM3), consumed by a later Pair-Resume M1.
    pub resume_id: [u8; 8],

    /// Set by a Remove-Pairing handler when it removes the controller
    /// that owns this very session — the transport must disconnect after
    /// flushing the response (spec.md §4.5 RemoveM1 "delayed disconnect").
    pub pending_disconnect: bool,
}

impl Session {
    pub fn new(id: u32, now: Millis) -> Self {
        Self {
            id,
            phase: Phase::Verifying,
            last_activity: now,
            eph_secret: [0; 32],
            eph_public: [0; 32],
            peer_eph_public: [0; 32],
            shared_secret: [0; 32],
            handshake_key: [0; 32],
            accessory_to_controller_key: [0; 32],
            controller_to_accessory_key: [0; 32],
            send_count: 0,
            recv_count: 0,
            controller_id: [0; MAX_ID_LEN],
            controller_id_len: 0,
            resume_id: [0; 8],
            pending_disconnect: false,
        }
    }

    pub fn controller_id(&self) -> &[u8] {
        &self.controller_id[..self.controller_id_len as usize]
    }

    pub fn set_controller_id(&mut self, id: &[u8]) {
        let n = id.len().min(MAX_ID_LEN);
        self.controller_id[..n].copy_from_slice(&id[..n]);
        self.controller_id_len = n as u8;
    }

    pub fn touch(&mut self, now: Millis) {
        self.last_activity = now;
    }

    pub fn is_idle_timed_out(&self, now: Millis, timeout_ms: u64) -> bool {
        now.saturating_sub(self.last_activity) > timeout_ms
    }

    pub fn is_secured(&self) -> bool {
        self.phase == Phase::Secured
    }
}
