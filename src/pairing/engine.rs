//! HAP pairing state machine (spec.md §4.5): the dispatcher over
//! Path × Method × State that drives Pair-Setup, Pair-Verify, Pair-Resume
//! and pairings-table management to completion.
//!
//! Nonce strings and HKDF salt/info labels are transcribed verbatim from
//! the HAP accessory protocol's key-derivation schedule; every
//! `"\0\0\0\0xx-MsgNN"` nonce below is built from its 8-byte ASCII suffix
//! via [`crate::crypto::aead::nonce_from_counter`].

use crate::config::Config;
use crate::crypto::bignum::{Modulus, Wide, K};
use crate::crypto::{aead, curve25519, ed25519, hkdf, srp};
use crate::error::PairError;
use crate::pairing::controller::{Pairings, Perm, MAX_ID_LEN};
use crate::pairing::session::{Phase, Session};
use crate::ports::{AnnouncePort, RandomPort, SettingsPort};
use crate::time::Millis;
use crate::tlv::buffer::Buf;
use crate::tlv::codec::{self, Tag};

type Result<T> = core::result::Result<T, PairError>;

/// The three HTTP/GATT resources the pairing engine is reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Path {
    Setup,
    Verify,
    Pairings,
}

const STATE_M1: u8 = 1;
const STATE_M2: u8 = 2;
const STATE_M3: u8 = 3;
const STATE_M4: u8 = 4;
const STATE_M5: u8 = 5;
const STATE_M6: u8 = 6;

const METHOD_PAIR_SETUP: u8 = 0;
const METHOD_ADD_PAIRING: u8 = 3;
const METHOD_REMOVE_PAIRING: u8 = 4;
const METHOD_LIST_PAIRINGS: u8 = 5;

const MAX_SETUP_ATTEMPTS: u32 = 100;
const SUB_TLV_CAP: usize = 256;

fn device_id_string(device_id: &[u8; 6], out: &mut [u8; 17]) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    for (i, byte) in device_id.iter().enumerate() {
        out[i * 3] = HEX[(byte >> 4) as usize];
        out[i * 3 + 1] = HEX[(byte & 0x0f) as usize];
        if i != 5 {
            out[i * 3 + 2] = b':';
        }
    }
}

fn write_error<const N: usize>(rsp: &mut Buf<N>, state: u8, err: PairError) {
    rsp.clear();
    let _ = codec::write_byte(rsp, Tag::State as u8, state);
    let _ = codec::write_byte(rsp, Tag::Error as u8, err as u8);
}

fn derive32(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; 32]> {
    let okm = hkdf::derive(ikm, salt, info, 32).map_err(|_| PairError::Unknown)?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&okm[..32]);
    Ok(out)
}

/// Encrypt `plain` with ChaCha20-Poly1305, appending the 16-byte tag —
/// the exact shape every Pair-Setup/Verify/Resume `EncryptedData` TLV
/// element carries.
fn encrypt_sub_tlv(key: &[u8; 32], nonce_suffix: &[u8; 8], plain: &[u8]) -> Result<Buf<SUB_TLV_CAP>> {
    let mut buf: Buf<SUB_TLV_CAP> = Buf::new();
    buf.append(plain).map_err(|_| PairError::Unknown)?;
    let nonce = aead::nonce_from_counter(nonce_suffix);
    let tag = aead::seal(key, &nonce, &[], buf.as_bytes_mut());
    buf.append(&tag).map_err(|_| PairError::Unknown)?;
    Ok(buf)
}

/// Decrypt an `EncryptedData` TLV payload (ciphertext ∥ 16-byte tag) in
/// place. Fails with `Authentication` on tag mismatch.
fn decrypt_sub_tlv(key: &[u8; 32], nonce_suffix: &[u8; 8], combined: &[u8]) -> Result<Buf<SUB_TLV_CAP>> {
    if combined.len() < aead::TAG_LEN_BYTES {
        return Err(PairError::Unknown);
    }
    let split = combined.len() - aead::TAG_LEN_BYTES;
    let mut tag = [0u8; aead::TAG_LEN_BYTES];
    tag.copy_from_slice(&combined[split..]);
    let mut buf: Buf<SUB_TLV_CAP> = Buf::from_slice(&combined[..split]).map_err(|_| PairError::Unknown)?;
    let nonce = aead::nonce_from_counter(nonce_suffix);
    if !aead::open(key, &nonce, &[], buf.as_bytes_mut(), &tag) {
        return Err(PairError::Authentication);
    }
    Ok(buf)
}

/// Path-level access policy (spec.md §4.5): Setup is only reachable while
/// unpaired, Verify has no precondition, Pairings requires a secured
/// session held by an admin controller.
fn check_policy(path: Path, secured: bool, is_admin: bool) -> Result<()> {
    match path {
        Path::Setup if secured => Err(PairError::Unavailable),
        Path::Pairings if !secured || !is_admin => Err(PairError::Authentication),
        _ => Ok(()),
    }
}

/// Owns the Pairings table and the single in-flight Pair-Verify/Resume
/// session this runtime tracks (spec.md §9 Open Question: one concurrent
/// controller connection per transport — see DESIGN.md).
pub struct PairingEngine<'m> {
    modulus: &'m Modulus,
    pairings: Pairings,
    srp_host: Option<srp::Host<'m>>,
    session: Option<Session>,
    next_session_id: u32,
    setup_attempts: u32,
}

impl<'m> PairingEngine<'m> {
    pub fn new(modulus: &'m Modulus) -> Self {
        Self {
            modulus,
            pairings: Pairings::new(),
            srp_host: None,
            session: None,
            next_session_id: 1,
            setup_attempts: 0,
        }
    }

    pub fn pairings(&self) -> &Pairings {
        &self.pairings
    }

    pub fn is_paired(&self) -> bool {
        !self.pairings.is_empty()
    }

    /// The current Pair-Verify/Resume session, if any — the transport
    /// layers read this for AEAD framing (`send_count`/`recv_count`,
    /// traffic keys) and permission enforcement once a session is secured.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Controller permission for the currently secured session, if any —
    /// used by both transports to gate admin-only operations and to
    /// distinguish a merely-secured session from one belonging to an
    /// authorized controller.
    pub fn session_controller_perm(&self) -> Option<Perm> {
        let session = self.session.as_ref()?;
        Some(self.pairings.find(session.controller_id())?.perm())
    }

    fn session_is_secured(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_secured)
    }

    fn session_is_admin(&self) -> bool {
        let Some(session) = &self.session else { return false };
        self.pairings.find(session.controller_id()).is_some_and(|c| c.is_admin())
    }

    /// Clears the pairings table and any in-flight session — called on a
    /// manufacturing reset (spec.md §3 "Reset(manufacturing) clears
    /// pairings"; see DESIGN.md "Config/Pairings reset coupling").
    pub fn clear_pairings(&mut self) {
        self.pairings = Pairings::new();
        self.session = None;
        self.srp_host = None;
    }

    /// Single entry point for `/pair-setup`, `/pair-verify`, `/pairings`
    /// (IP) or their BLE characteristic equivalents. Writes a complete
    /// TLV8 response (including an `Error` element on failure) into `rsp`.
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch<const N: usize>(
        &mut self,
        path: Path,
        body: &[u8],
        rsp: &mut Buf<N>,
        cfg: &mut Config,
        rng: &mut dyn RandomPort,
        announce: &mut dyn AnnouncePort,
        settings: &mut dyn SettingsPort,
        now: Millis,
    ) {
        rsp.clear();
        if let Some(session) = &mut self.session {
            session.touch(now);
        }

        if let Err(e) = check_policy(path, self.session_is_secured(), self.session_is_admin()) {
            write_error(rsp, STATE_M1, e);
            return;
        }

        let outcome = match path {
            Path::Setup => self.dispatch_setup(body, rsp, cfg, rng, announce, settings),
            Path::Verify => self.dispatch_verify(body, rsp, cfg, rng, now),
            Path::Pairings => self.dispatch_pairings(body, rsp),
        };
        if let Err(e) = outcome {
            let state = codec::find_byte(body, Tag::State as u8).ok().flatten().unwrap_or(STATE_M1);
            write_error(rsp, state.saturating_add(1), e);
        }
    }

    fn dispatch_setup<const N: usize>(
        &mut self,
        body: &[u8],
        rsp: &mut Buf<N>,
        cfg: &mut Config,
        rng: &mut dyn RandomPort,
        announce: &mut dyn AnnouncePort,
        settings: &mut dyn SettingsPort,
    ) -> Result<()> {
        let state = codec::find_byte(body, Tag::State as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
        match state {
            STATE_M1 => self.setup_m1(body, rsp, cfg, rng),
            STATE_M3 => self.setup_m3(body, rsp),
            STATE_M5 => self.setup_m5(body, rsp, cfg, announce, settings),
            _ => Err(PairError::Unknown),
        }
    }

    fn setup_m1<const N: usize>(&mut self, body: &[u8], rsp: &mut Buf<N>, cfg: &mut Config, rng: &mut dyn RandomPort) -> Result<()> {
        let _method = codec::find_byte(body, Tag::Method as u8).ok().flatten().unwrap_or(METHOD_PAIR_SETUP);

        self.setup_attempts += 1;
        if self.setup_attempts > MAX_SETUP_ATTEMPTS {
            return Err(PairError::MaxTries);
        }
        if self.srp_host.is_some() {
            return Err(PairError::Busy);
        }

        let v = Wide::<K>::from_be_bytes(&cfg.srp_verifier).map_err(|_| PairError::Unknown)?;
        let verifier = srp::Verifier { salt: cfg.srp_salt, v };
        let mut b_secret = [0u8; 64];
        rng.fill(&mut b_secret);
        let host = srp::Host::open(self.modulus, b"Pair-Setup", &verifier, &b_secret).map_err(|_| PairError::Unknown)?;

        let mut pub_bytes = [0u8; srp::MODULUS_BYTES];
        host.public_key().to_be_bytes(&mut pub_bytes).map_err(|_| PairError::Unknown)?;
        let salt = *host.salt();
        self.srp_host = Some(host);

        codec::write_byte(rsp, Tag::State as u8, STATE_M2).map_err(|_| PairError::Unknown)?;
        codec::write_value(rsp, Tag::PublicKey as u8, &pub_bytes).map_err(|_| PairError::Unknown)?;
        codec::write_value(rsp, Tag::Salt as u8, &salt).map_err(|_| PairError::Unknown)
    }

    fn setup_m3<const N: usize>(&mut self, body: &[u8], rsp: &mut Buf<N>) -> Result<()> {
        let a_bytes: Buf<{ srp::MODULUS_BYTES }> =
            codec::read_value(body, Tag::PublicKey as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
        let a_pub = Wide::<K>::from_be_bytes(a_bytes.as_bytes()).map_err(|_| PairError::Unknown)?;
        let proof: Buf<{ srp::KEY_LEN }> =
            codec::read_value(body, Tag::Proof as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
        let mut claimed = [0u8; srp::KEY_LEN];
        claimed.copy_from_slice(proof.as_bytes());

        let Some(host) = self.srp_host.as_mut() else { return Err(PairError::Unknown) };
        let set_ok = host.set_a(&a_pub);
        if !set_ok {
            self.srp_host = None;
            return Err(PairError::Authentication);
        }
        let host = self.srp_host.as_ref().expect("just set");
        if !host.verify_proof(&claimed) {
            self.srp_host = None;
            return Err(PairError::Authentication);
        }
        let hamk = host.proof_hamk().ok_or(PairError::Unknown)?;

        codec::write_byte(rsp, Tag::State as u8, STATE_M4).map_err(|_| PairError::Unknown)?;
        codec::write_value(rsp, Tag::Proof as u8, &hamk).map_err(|_| PairError::Unknown)
    }

    fn setup_m5<const N: usize>(
        &mut self,
        body: &[u8],
        rsp: &mut Buf<N>,
        cfg: &mut Config,
        announce: &mut dyn AnnouncePort,
        settings: &mut dyn SettingsPort,
    ) -> Result<()> {
        let srp_key = match self.srp_host.as_ref().and_then(srp::Host::session_key) {
            Some(k) => *k,
            None => return Err(PairError::Unknown),
        };

        let result = setup_m5_body(body, &srp_key, cfg);
        let (device_id_str, ciphertext, ios_id, ios_ltpk) = match result {
            Ok(v) => v,
            Err(e) => {
                self.srp_host = None;
                return Err(e);
            }
        };

        if let Err(e) = self.pairings.add(ios_id.as_bytes(), ios_ltpk, Perm::Admin) {
            self.srp_host = None;
            return Err(e);
        }
        let _ = device_id_str;

        codec::write_byte(rsp, Tag::State as u8, STATE_M6).map_err(|_| PairError::Unknown)?;
        codec::write_value(rsp, Tag::EncryptedData as u8, ciphertext.as_bytes()).map_err(|_| PairError::Unknown)?;

        self.srp_host = None;
        self.setup_attempts = 0;
        cfg.status_flags.set_paired(true);
        cfg.update(announce, settings);
        Ok(())
    }

    fn dispatch_verify<const N: usize>(
        &mut self,
        body: &[u8],
        rsp: &mut Buf<N>,
        cfg: &mut Config,
        rng: &mut dyn RandomPort,
        now: Millis,
    ) -> Result<()> {
        let state = codec::find_byte(body, Tag::State as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
        match state {
            STATE_M1 => {
                if codec::find(body, Tag::SessionId as u8).map_err(|_| PairError::Unknown)?.is_some() {
                    self.resume_m1(body, rsp, rng, now)
                } else {
                    self.verify_m1(body, rsp, cfg, rng, now)
                }
            }
            STATE_M3 => self.verify_m3(body, rsp, now),
            _ => Err(PairError::Unknown),
        }
    }

    fn verify_m1<const N: usize>(
        &mut self,
        body: &[u8],
        rsp: &mut Buf<N>,
        cfg: &mut Config,
        rng: &mut dyn RandomPort,
        now: Millis,
    ) -> Result<()> {
        let peer_pub: Buf<32> =
            codec::read_value(body, Tag::PublicKey as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
        let mut peer_eph_public = [0u8; 32];
        peer_eph_public.copy_from_slice(peer_pub.as_bytes());

        let mut session = Session::new(self.next_session_id, now);
        self.next_session_id = self.next_session_id.wrapping_add(1).max(1);
        rng.fill(&mut session.eph_secret);
        session.eph_public = curve25519::scalarmult(&session.eph_secret, &curve25519::BASE_POINT);
        session.peer_eph_public = peer_eph_public;
        session.shared_secret = curve25519::scalarmult(&session.eph_secret, &peer_eph_public);
        session.handshake_key = derive32(&session.shared_secret, b"Pair-Verify-Encrypt-Salt", b"Pair-Verify-Encrypt-Info")?;

        let mut device_id_str = [0u8; 17];
        device_id_string(&cfg.device_id, &mut device_id_str);
        let mut info: Buf<{ 32 + 17 + 32 }> = Buf::new();
        info.append(&session.eph_public).map_err(|_| PairError::Unknown)?;
        info.append(&device_id_str).map_err(|_| PairError::Unknown)?;
        info.append(&peer_eph_public).map_err(|_| PairError::Unknown)?;
        let signature = ed25519::sign(info.as_bytes(), &cfg.ltsk);

        let mut sub: Buf<SUB_TLV_CAP> = Buf::new();
        codec::write_value(&mut sub, Tag::Identifier as u8, &device_id_str).map_err(|_| PairError::Unknown)?;
        codec::write_value(&mut sub, Tag::Signature as u8, &signature).map_err(|_| PairError::Unknown)?;
        let ciphertext = encrypt_sub_tlv(&session.handshake_key, b"PV-Msg02", sub.as_bytes())?;

        codec::write_byte(rsp, Tag::State as u8, STATE_M2).map_err(|_| PairError::Unknown)?;
        codec::write_value(rsp, Tag::PublicKey as u8, &session.eph_public).map_err(|_| PairError::Unknown)?;
        codec::write_value(rsp, Tag::EncryptedData as u8, ciphertext.as_bytes()).map_err(|_| PairError::Unknown)?;

        self.session = Some(session);
        Ok(())
    }

    fn verify_m3<const N: usize>(&mut self, body: &[u8], rsp: &mut Buf<N>, now: Millis) -> Result<()> {
        let (handshake_key, peer_eph_public, own_eph_public) = match self.session.as_ref() {
            Some(s) => (s.handshake_key, s.peer_eph_public, s.eph_public),
            None => return Err(PairError::Unknown),
        };

        let encrypted: Buf<SUB_TLV_CAP> =
            codec::read_value(body, Tag::EncryptedData as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
        let inner = match decrypt_sub_tlv(&handshake_key, b"PV-Msg03", encrypted.as_bytes()) {
            Ok(v) => v,
            Err(e) => {
                self.session = None;
                return Err(e);
            }
        };

        let peer_id: Buf<MAX_ID_LEN> =
            codec::read_value(inner.as_bytes(), Tag::Identifier as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
        let peer_sig: Buf<64> =
            codec::read_value(inner.as_bytes(), Tag::Signature as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;

        let Some(controller) = self.pairings.find(peer_id.as_bytes()) else {
            self.session = None;
            return Err(PairError::Authentication);
        };

        let mut info: Buf<{ 32 + MAX_ID_LEN + 32 }> = Buf::new();
        info.append(&peer_eph_public).map_err(|_| PairError::Unknown)?;
        info.append(peer_id.as_bytes()).map_err(|_| PairError::Unknown)?;
        info.append(&own_eph_public).map_err(|_| PairError::Unknown)?;
        let mut sig_arr = [0u8; 64];
        sig_arr.copy_from_slice(peer_sig.as_bytes());
        if !ed25519::verify(info.as_bytes(), controller.public_key(), &sig_arr) {
            self.session = None;
            return Err(PairError::Authentication);
        }

        let shared_secret = self.session.as_ref().expect("checked above").shared_secret;
        let a2c = derive32(&shared_secret, b"Control-Salt", b"Control-Read-Encryption-Key")?;
        let c2a = derive32(&shared_secret, b"Control-Salt", b"Control-Write-Encryption-Key")?;
        let resume = hkdf::derive(&shared_secret, b"Pair-Verify-ResumeSessionID-Salt", b"Pair-Verify-ResumeSessionID-Info", 8)
            .map_err(|_| PairError::Unknown)?;

        let session = self.session.as_mut().expect("checked above");
        session.set_controller_id(peer_id.as_bytes());
        session.accessory_to_controller_key = a2c;
        session.controller_to_accessory_key = c2a;
        session.resume_id.copy_from_slice(&resume[..8]);
        session.phase = Phase::Secured;
        session.touch(now);

        codec::write_byte(rsp, Tag::State as u8, STATE_M4).map_err(|_| PairError::Unknown)
    }

    fn resume_m1<const N: usize>(&mut self, body: &[u8], rsp: &mut Buf<N>, rng: &mut dyn RandomPort, now: Millis) -> Result<()> {
        let session_id: Buf<8> =
            codec::read_value(body, Tag::SessionId as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;

        let shared_secret = match self.session.as_ref() {
            Some(s) if s.resume_id == session_id.as_bytes() => s.shared_secret,
            _ => {
                self.session = None;
                return Err(PairError::Authentication);
            }
        };

        let request_key = derive32(&shared_secret, session_id.as_bytes(), b"Pair-Resume-Request-Info")?;
        let encrypted: Buf<SUB_TLV_CAP> =
            codec::read_value(body, Tag::EncryptedData as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
        if let Err(e) = decrypt_sub_tlv(&request_key, b"PR-Msg01", encrypted.as_bytes()) {
            self.session = None;
            return Err(e);
        }

        let mut new_id = [0u8; 8];
        rng.fill(&mut new_id);
        let response_key = derive32(&shared_secret, &new_id, b"Pair-Resume-Response-Info")?;
        let ciphertext = encrypt_sub_tlv(&response_key, b"PR-Msg02", &[])?;

        let mut combined_salt: Buf<16> = Buf::new();
        let old_resume_id = self.session.as_ref().expect("checked above").resume_id;
        combined_salt.append(&old_resume_id).map_err(|_| PairError::Unknown)?;
        combined_salt.append(&new_id).map_err(|_| PairError::Unknown)?;
        let fresh_secret = derive32(&shared_secret, combined_salt.as_bytes(), b"Pair-Resume-Shared-Secret-Info")?;
        let a2c = derive32(&fresh_secret, b"Control-Salt", b"Control-Read-Encryption-Key")?;
        let c2a = derive32(&fresh_secret, b"Control-Salt", b"Control-Write-Encryption-Key")?;

        let session = self.session.as_mut().expect("checked above");
        session.shared_secret = fresh_secret;
        session.accessory_to_controller_key = a2c;
        session.controller_to_accessory_key = c2a;
        session.resume_id = new_id;
        session.phase = Phase::Secured;
        session.touch(now);

        codec::write_byte(rsp, Tag::State as u8, STATE_M2).map_err(|_| PairError::Unknown)?;
        codec::write_value(rsp, Tag::SessionId as u8, &new_id).map_err(|_| PairError::Unknown)?;
        codec::write_value(rsp, Tag::EncryptedData as u8, ciphertext.as_bytes()).map_err(|_| PairError::Unknown)
    }

    fn dispatch_pairings<const N: usize>(&mut self, body: &[u8], rsp: &mut Buf<N>) -> Result<()> {
        let method = codec::find_byte(body, Tag::Method as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
        match method {
            METHOD_ADD_PAIRING => self.add_pairing_m1(body, rsp),
            METHOD_REMOVE_PAIRING => self.remove_pairing_m1(body, rsp),
            METHOD_LIST_PAIRINGS => self.list_pairings_m1(rsp),
            _ => Err(PairError::Unknown),
        }
    }

    fn add_pairing_m1<const N: usize>(&mut self, body: &[u8], rsp: &mut Buf<N>) -> Result<()> {
        let id: Buf<MAX_ID_LEN> =
            codec::read_value(body, Tag::Identifier as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
        let pubkey: Buf<32> =
            codec::read_value(body, Tag::PublicKey as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
        let perm_byte = codec::find_byte(body, Tag::Permissions as u8).map_err(|_| PairError::Unknown)?.unwrap_or(0);
        let mut pk = [0u8; 32];
        pk.copy_from_slice(pubkey.as_bytes());

        match self.pairings.find(id.as_bytes()) {
            Some(existing) if existing.public_key() == &pk => {}
            Some(_) => return Err(PairError::Unknown),
            None => self.pairings.add(id.as_bytes(), pk, Perm::from_byte(perm_byte))?,
        }
        codec::write_byte(rsp, Tag::State as u8, STATE_M2).map_err(|_| PairError::Unknown)
    }

    fn remove_pairing_m1<const N: usize>(&mut self, body: &[u8], rsp: &mut Buf<N>) -> Result<()> {
        let id: Buf<MAX_ID_LEN> =
            codec::read_value(body, Tag::Identifier as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
        self.pairings.remove(id.as_bytes());
        if let Some(session) = &mut self.session {
            if session.controller_id() == id.as_bytes() {
                session.pending_disconnect = true;
            }
        }
        codec::write_byte(rsp, Tag::State as u8, STATE_M2).map_err(|_| PairError::Unknown)
    }

    fn list_pairings_m1<const N: usize>(&mut self, rsp: &mut Buf<N>) -> Result<()> {
        codec::write_byte(rsp, Tag::State as u8, STATE_M2).map_err(|_| PairError::Unknown)?;
        let mut first = true;
        for controller in self.pairings.iter() {
            if !first {
                codec::write_separator(rsp).map_err(|_| PairError::Unknown)?;
            }
            first = false;
            codec::write_value(rsp, Tag::Identifier as u8, controller.id()).map_err(|_| PairError::Unknown)?;
            codec::write_value(rsp, Tag::PublicKey as u8, controller.public_key()).map_err(|_| PairError::Unknown)?;
            codec::write_byte(rsp, Tag::Permissions as u8, controller.perm() as u8).map_err(|_| PairError::Unknown)?;
        }
        Ok(())
    }
}

/// The M5 sub-TLV parse/verify/build pipeline, factored out of
/// [`PairingEngine::setup_m5`] so it never needs `&mut self` — it only
/// reads the SRP session key and the accessory's long-term identity.
/// Returns the decoded device-id string, the encrypted M6 sub-TLV, and the
/// controller's identifier/long-term public key for the caller to insert.
#[allow(clippy::type_complexity)]
fn setup_m5_body(
    body: &[u8],
    srp_key: &[u8; srp::KEY_LEN],
    cfg: &Config,
) -> Result<([u8; 17], Buf<SUB_TLV_CAP>, Buf<MAX_ID_LEN>, [u8; 32])> {
    let encrypted: Buf<SUB_TLV_CAP> =
        codec::read_value(body, Tag::EncryptedData as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
    let encrypt_key = derive32(srp_key, b"Pair-Setup-Encrypt-Salt", b"Pair-Setup-Encrypt-Info")?;
    let inner = decrypt_sub_tlv(&encrypt_key, b"PS-Msg05", encrypted.as_bytes())?;

    let ios_id: Buf<MAX_ID_LEN> =
        codec::read_value(inner.as_bytes(), Tag::Identifier as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
    let ios_ltpk: Buf<32> =
        codec::read_value(inner.as_bytes(), Tag::PublicKey as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;
    let ios_sig: Buf<64> =
        codec::read_value(inner.as_bytes(), Tag::Signature as u8).map_err(|_| PairError::Unknown)?.ok_or(PairError::Unknown)?;

    let ios_x = derive32(srp_key, b"Pair-Setup-Controller-Sign-Salt", b"Pair-Setup-Controller-Sign-Info")?;
    let mut ios_ltpk_arr = [0u8; 32];
    ios_ltpk_arr.copy_from_slice(ios_ltpk.as_bytes());
    let mut ios_sig_arr = [0u8; 64];
    ios_sig_arr.copy_from_slice(ios_sig.as_bytes());

    let mut ios_info: Buf<{ 32 + MAX_ID_LEN + 32 }> = Buf::new();
    ios_info.append(&ios_x).map_err(|_| PairError::Unknown)?;
    ios_info.append(ios_id.as_bytes()).map_err(|_| PairError::Unknown)?;
    ios_info.append(&ios_ltpk_arr).map_err(|_| PairError::Unknown)?;
    if !ed25519::verify(ios_info.as_bytes(), &ios_ltpk_arr, &ios_sig_arr) {
        return Err(PairError::Authentication);
    }

    let acc_x = derive32(srp_key, b"Pair-Setup-Accessory-Sign-Salt", b"Pair-Setup-Accessory-Sign-Info")?;
    let mut device_id_str = [0u8; 17];
    device_id_string(&cfg.device_id, &mut device_id_str);
    let mut acc_info: Buf<{ 32 + 17 + 32 }> = Buf::new();
    acc_info.append(&acc_x).map_err(|_| PairError::Unknown)?;
    acc_info.append(&device_id_str).map_err(|_| PairError::Unknown)?;
    acc_info.append(&cfg.ltpk).map_err(|_| PairError::Unknown)?;
    let signature = ed25519::sign(acc_info.as_bytes(), &cfg.ltsk);

    let mut sub: Buf<SUB_TLV_CAP> = Buf::new();
    codec::write_value(&mut sub, Tag::Identifier as u8, &device_id_str).map_err(|_| PairError::Unknown)?;
    codec::write_value(&mut sub, Tag::PublicKey as u8, &cfg.ltpk).map_err(|_| PairError::Unknown)?;
    codec::write_value(&mut sub, Tag::Signature as u8, &signature).map_err(|_| PairError::Unknown)?;
    let ciphertext = encrypt_sub_tlv(&encrypt_key, b"PS-Msg06", sub.as_bytes())?;

    Ok((device_id_str, ciphertext, ios_id, ios_ltpk_arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConfigDefaults};
    use crate::ports::{SettingsError, SettingsPort};
    use std::collections::HashMap;

    struct FixedRng(u8);
    impl RandomPort for FixedRng {
        fn fill(&mut self, buf: &mut [u8]) {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = self.0.wrapping_add(i as u8);
            }
        }
    }

    #[derive(Default)]
    struct MemSettings(HashMap<std::string::String, std::vec::Vec<u8>>);
    impl SettingsPort for MemSettings {
        fn read(&self, key: &str, buf: &mut [u8]) -> core::result::Result<usize, SettingsError> {
            match self.0.get(key) {
                Some(v) => {
                    let n = v.len().min(buf.len());
                    buf[..n].copy_from_slice(&v[..n]);
                    Ok(n)
                }
                None => Err(SettingsError::NotFound),
            }
        }
        fn write(&mut self, key: &str, data: &[u8]) -> core::result::Result<(), SettingsError> {
            self.0.insert(key.to_string(), data.to_vec());
            Ok(())
        }
        fn delete(&mut self, key: &str) -> core::result::Result<(), SettingsError> {
            self.0.remove(key);
            Ok(())
        }
        fn exists(&self, key: &str) -> bool {
            self.0.contains_key(key)
        }
    }

    fn provisioned_config(modulus: &Modulus) -> Config {
        let mut rng = FixedRng(11);
        let mut settings = MemSettings::default();
        let mut cfg = Config::init(&mut settings, &mut rng, &ConfigDefaults::default());
        let salt = [9u8; srp::SALT_LEN];
        let verifier = srp::Verifier::new(modulus, b"Pair-Setup", b"123-45-678", salt);
        cfg.srp_salt = salt;
        let _ = verifier.v.to_be_bytes(&mut cfg.srp_verifier);
        let (pk, sk) = ed25519::keypair_from_seed(&[3u8; 32]);
        cfg.ltpk = pk;
        cfg.ltsk = sk;
        cfg
    }

    #[test]
    fn setup_m1_issues_salt_and_public_key() {
        let modulus = Modulus::hap_3072();
        let mut engine = PairingEngine::new(&modulus);
        let mut cfg = provisioned_config(&modulus);
        let mut rng = FixedRng(1);
        let mut announce = crate::ports::NullAnnouncePort;
        let mut settings = MemSettings::default();

        let mut req: Buf<16> = Buf::new();
        codec::write_byte(&mut req, Tag::State as u8, STATE_M1).unwrap();
        codec::write_byte(&mut req, Tag::Method as u8, METHOD_PAIR_SETUP).unwrap();

        let mut rsp: Buf<512> = Buf::new();
        engine.dispatch(Path::Setup, req.as_bytes(), &mut rsp, &mut cfg, &mut rng, &mut announce, &mut settings, Millis(0));

        assert_eq!(codec::find_byte(&rsp, Tag::State as u8).unwrap(), Some(STATE_M2));
        assert!(codec::find(&rsp, Tag::PublicKey as u8).unwrap().is_some());
        assert!(codec::find(&rsp, Tag::Salt as u8).unwrap().is_some());
    }

    #[test]
    fn setup_requires_unsecured_session() {
        let modulus = Modulus::hap_3072();
        let mut engine = PairingEngine::new(&modulus);
        engine.session = Some(Session::new(1, Millis(0)));
        engine.session.as_mut().unwrap().phase = Phase::Secured;

        let mut cfg = provisioned_config(&modulus);
        let mut rng = FixedRng(1);
        let mut announce = crate::ports::NullAnnouncePort;
        let mut settings = MemSettings::default();
        let mut rsp: Buf<64> = Buf::new();
        engine.dispatch(Path::Setup, &[], &mut rsp, &mut cfg, &mut rng, &mut announce, &mut settings, Millis(0));
        assert_eq!(codec::find_byte(&rsp, Tag::Error as u8).unwrap(), Some(PairError::Unavailable as u8));
    }

    #[test]
    fn pairings_path_rejects_unsecured_session() {
        let modulus = Modulus::hap_3072();
        let mut engine = PairingEngine::new(&modulus);
        let mut cfg = provisioned_config(&modulus);
        let mut rng = FixedRng(1);
        let mut announce = crate::ports::NullAnnouncePort;
        let mut settings = MemSettings::default();
        let mut rsp: Buf<64> = Buf::new();
        engine.dispatch(Path::Pairings, &[], &mut rsp, &mut cfg, &mut rng, &mut announce, &mut settings, Millis(0));
        assert_eq!(codec::find_byte(&rsp, Tag::Error as u8).unwrap(), Some(PairError::Authentication as u8));
    }

    #[test]
    fn list_pairings_reports_each_controller() {
        let modulus = Modulus::hap_3072();
        let mut engine = PairingEngine::new(&modulus);
        engine.pairings.add(b"controller-a", [1; 32], Perm::Admin).unwrap();
        let mut rsp: Buf<128> = Buf::new();
        engine.list_pairings_m1(&mut rsp).unwrap();
        assert_eq!(codec::find(&rsp, Tag::Identifier as u8).unwrap(), Some(b"controller-a".as_ref()));
    }

    #[test]
    fn full_setup_and_verify_handshake_secures_a_session() {
        let modulus = Modulus::hap_3072();
        let mut engine = PairingEngine::new(&modulus);
        let mut cfg = provisioned_config(&modulus);
        let mut rng_host = FixedRng(5);
        let mut announce = crate::ports::NullAnnouncePort;
        let mut settings = MemSettings::default();

        // M1
        let mut m1: Buf<16> = Buf::new();
        codec::write_byte(&mut m1, Tag::State as u8, STATE_M1).unwrap();
        let mut m2: Buf<512> = Buf::new();
        engine.dispatch(Path::Setup, m1.as_bytes(), &mut m2, &mut cfg, &mut rng_host, &mut announce, &mut settings, Millis(0));
        let b_pub: Buf<{ srp::MODULUS_BYTES }> = codec::read_value(&m2, Tag::PublicKey as u8).unwrap().unwrap();
        let salt: Buf<{ srp::SALT_LEN }> = codec::read_value(&m2, Tag::Salt as u8).unwrap().unwrap();
        let mut salt_arr = [0u8; srp::SALT_LEN];
        salt_arr.copy_from_slice(salt.as_bytes());

        // Controller-side SRP (User) to build a valid M3.
        let a_secret = [6u8; 64];
        let mut user = srp::User::new(&modulus, b"Pair-Setup", b"123-45-678", salt_arr, &a_secret).unwrap();
        let b_pub_wide = Wide::<K>::from_be_bytes(b_pub.as_bytes()).unwrap();
        assert!(user.set_b(&b_pub_wide));
        let proof_m = user.proof_m().unwrap();

        let mut m3: Buf<512> = Buf::new();
        codec::write_byte(&mut m3, Tag::State as u8, STATE_M3).unwrap();
        let mut a_pub_bytes = [0u8; srp::MODULUS_BYTES];
        user.public_key().to_be_bytes(&mut a_pub_bytes).unwrap();
        codec::write_value(&mut m3, Tag::PublicKey as u8, &a_pub_bytes).unwrap();
        codec::write_value(&mut m3, Tag::Proof as u8, &proof_m).unwrap();

        let mut m4: Buf<512> = Buf::new();
        engine.dispatch(Path::Setup, m3.as_bytes(), &mut m4, &mut cfg, &mut rng_host, &mut announce, &mut settings, Millis(0));
        assert_eq!(codec::find_byte(&m4, Tag::State as u8).unwrap(), Some(STATE_M4));
        let hamk: Buf<{ srp::KEY_LEN }> = codec::read_value(&m4, Tag::Proof as u8).unwrap().unwrap();
        let mut hamk_arr = [0u8; srp::KEY_LEN];
        hamk_arr.copy_from_slice(hamk.as_bytes());
        assert!(user.verify_hamk(&hamk_arr));

        // M5: controller signs its long-term identity with its own Ed25519 key.
        let (controller_ltpk, controller_ltsk) = ed25519::keypair_from_seed(&[42u8; 32]);
        let srp_key = *user.session_key().unwrap();
        let ios_x = derive32(&srp_key, b"Pair-Setup-Controller-Sign-Salt", b"Pair-Setup-Controller-Sign-Info").unwrap();
        let controller_id = b"iOSController01";
        let mut ios_info: Buf<{ 32 + MAX_ID_LEN + 32 }> = Buf::new();
        ios_info.append(&ios_x).unwrap();
        ios_info.append(controller_id).unwrap();
        ios_info.append(&controller_ltpk).unwrap();
        let ios_sig = ed25519::sign(ios_info.as_bytes(), &controller_ltsk);

        let mut sub: Buf<SUB_TLV_CAP> = Buf::new();
        codec::write_value(&mut sub, Tag::Identifier as u8, controller_id).unwrap();
        codec::write_value(&mut sub, Tag::PublicKey as u8, &controller_ltpk).unwrap();
        codec::write_value(&mut sub, Tag::Signature as u8, &ios_sig).unwrap();
        let encrypt_key = derive32(&srp_key, b"Pair-Setup-Encrypt-Salt", b"Pair-Setup-Encrypt-Info").unwrap();
        let ciphertext = encrypt_sub_tlv(&encrypt_key, b"PS-Msg05", sub.as_bytes()).unwrap();

        let mut m5: Buf<512> = Buf::new();
        codec::write_byte(&mut m5, Tag::State as u8, STATE_M5).unwrap();
        codec::write_value(&mut m5, Tag::EncryptedData as u8, ciphertext.as_bytes()).unwrap();

        let mut m6: Buf<512> = Buf::new();
        engine.dispatch(Path::Setup, m5.as_bytes(), &mut m6, &mut cfg, &mut rng_host, &mut announce, &mut settings, Millis(0));
        assert_eq!(codec::find_byte(&m6, Tag::State as u8).unwrap(), Some(STATE_M6));
        assert_eq!(engine.pairings().count(), 1);
        assert!(cfg.status_flags.is_paired());

        // Now Pair-Verify: controller sends its ephemeral X25519 public key.
        let mut rng_verify = FixedRng(9);
        let controller_eph_secret = [8u8; 32];
        let controller_eph_pub = curve25519::scalarmult(&controller_eph_secret, &curve25519::BASE_POINT);
        let mut v1: Buf<64> = Buf::new();
        codec::write_byte(&mut v1, Tag::State as u8, STATE_M1).unwrap();
        codec::write_value(&mut v1, Tag::PublicKey as u8, &controller_eph_pub).unwrap();

        let mut v2: Buf<512> = Buf::new();
        engine.dispatch(Path::Verify, v1.as_bytes(), &mut v2, &mut cfg, &mut rng_verify, &mut announce, &mut settings, Millis(10));
        assert_eq!(codec::find_byte(&v2, Tag::State as u8).unwrap(), Some(STATE_M2));
        let accessory_eph_pub: Buf<32> = codec::read_value(&v2, Tag::PublicKey as u8).unwrap().unwrap();
        let mut acc_eph_arr = [0u8; 32];
        acc_eph_arr.copy_from_slice(accessory_eph_pub.as_bytes());

        let shared = curve25519::scalarmult(&controller_eph_secret, &acc_eph_arr);
        let mut verify_info: Buf<{ 32 + MAX_ID_LEN + 32 }> = Buf::new();
        verify_info.append(&acc_eph_arr).unwrap();
        verify_info.append(controller_id).unwrap();
        verify_info.append(&controller_eph_pub).unwrap();
        let verify_sig = ed25519::sign(verify_info.as_bytes(), &controller_ltsk);
        let mut v3_sub: Buf<SUB_TLV_CAP> = Buf::new();
        codec::write_value(&mut v3_sub, Tag::Identifier as u8, controller_id).unwrap();
        codec::write_value(&mut v3_sub, Tag::Signature as u8, &verify_sig).unwrap();
        let handshake_key = derive32(&shared, b"Pair-Verify-Encrypt-Salt", b"Pair-Verify-Encrypt-Info").unwrap();
        let v3_ciphertext = encrypt_sub_tlv(&handshake_key, b"PV-Msg03", v3_sub.as_bytes()).unwrap();

        let mut v3: Buf<512> = Buf::new();
        codec::write_byte(&mut v3, Tag::State as u8, STATE_M3).unwrap();
        codec::write_value(&mut v3, Tag::EncryptedData as u8, v3_ciphertext.as_bytes()).unwrap();

        let mut v4: Buf<64> = Buf::new();
        engine.dispatch(Path::Verify, v3.as_bytes(), &mut v4, &mut cfg, &mut rng_verify, &mut announce, &mut settings, Millis(20));
        assert_eq!(codec::find_byte(&v4, Tag::State as u8).unwrap(), Some(STATE_M4));
        assert!(engine.session_is_secured());
        assert!(engine.session_is_admin());
    }
}
