//! HAP over Bluetooth LE (spec.md §4.6): PDU framing, the per-connection
//! Procedure dispatcher, and the advertisement state machine a GATT
//! adapter drives.
//!
//! The continuation-PDU reassembler below is adapted from the teacher
//! firmware's chunked-transfer reassembler: an `active` flag plus a fixed
//! accumulator buffer, fed one PDU at a time and reset between requests
//! (see DESIGN.md).

use crate::config::Config;
use crate::crypto::{aead, sha512};
use crate::error::HapStatus;
use crate::model::property::MAX_PROPERTY_LEN;
use crate::model::{Characteristic, Db, Permissions, PropertyType};
use crate::time::Millis;
use crate::tlv::codec;
use crate::tlv::Buf;

// ---------------------------------------------------------------------------
// PDU opcodes and status codes (HAP-BLE PDU, spec.md §4.6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    CharSignatureRead = 0x01,
    CharWrite = 0x02,
    CharRead = 0x03,
    CharTimedWrite = 0x04,
    CharExecuteWrite = 0x05,
    SvcSignatureRead = 0x06,
    CharConfiguration = 0x07,
    ProtoConfiguration = 0x08,
}

impl Opcode {
    fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x01 => Self::CharSignatureRead,
            0x02 => Self::CharWrite,
            0x03 => Self::CharRead,
            0x04 => Self::CharTimedWrite,
            0x05 => Self::CharExecuteWrite,
            0x06 => Self::SvcSignatureRead,
            0x07 => Self::CharConfiguration,
            0x08 => Self::ProtoConfiguration,
            _ => return None,
        })
    }
}

/// The PDU status byte — a small fixed enumeration distinct from (and
/// coarser than) the IP transport's [`HapStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PduStatus {
    Success = 0x00,
    UnsupportedPdu = 0x01,
    MaxProcedures = 0x02,
    InsufficientAuthorization = 0x03,
    InvalidInstanceId = 0x04,
    InsufficientAuthentication = 0x05,
    InvalidRequest = 0x06,
}

impl From<HapStatus> for PduStatus {
    fn from(status: HapStatus) -> Self {
        match status {
            HapStatus::Success => Self::Success,
            HapStatus::InsufficientAuthorization => Self::InsufficientAuthorization,
            HapStatus::InsufficientAuthentication => Self::InsufficientAuthentication,
            HapStatus::UnsupportedPdu => Self::UnsupportedPdu,
            HapStatus::ResourceNotExist => Self::InvalidInstanceId,
            _ => Self::InvalidRequest,
        }
    }
}

const CONTROL_FRAGMENT: u8 = 0x80;
const CONTROL_RESPONSE_FIRST: u8 = 0x02;

pub const MAX_BODY_LEN: usize = 512;
pub const MAX_PDU_FRAGMENT: usize = 244;
pub const PROCEDURE_TIMEOUT_MS: u64 = 10_000;
pub const TIMED_WRITE_EXPIRY_MS: u64 = 10_000;

// ---------------------------------------------------------------------------
// Value-TLV chunking (extractValue / formatValue, spec.md §8)
// ---------------------------------------------------------------------------

const TLV_VALUE: u8 = 0x01;
const CFG_TAG_PROPERTIES: u8 = 0x01;
const CFG_TAG_BROADCAST_INTERVAL: u8 = 0x02;
const PROTO_TAG_BEK: u8 = 0x01;
const PROTO_TAG_AAI: u8 = 0x02;
const PROTO_TAG_GSN: u8 = 0x03;
const PROTO_TAG_CONFIG_NUM: u8 = 0x04;

/// `extractValue()`: unwrap a PDU body's Value-TLV element, reassembling a
/// 255-byte-chunked run if the value is longer than one element.
pub fn extract_value<const N: usize>(body: &[u8]) -> Result<Buf<N>, HapStatus> {
    codec::read_value(body, TLV_VALUE).map_err(HapStatus::from)?.ok_or(HapStatus::InvalidRequest)
}

/// `formatValue()`: the mutual inverse of [`extract_value`].
pub fn format_value<const N: usize>(value: &[u8]) -> Result<Buf<N>, HapStatus> {
    let mut buf = Buf::new();
    codec::write_value(&mut buf, TLV_VALUE, value).map_err(HapStatus::from)?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Continuation-PDU reassembly (request) and fragmentation (response)
// ---------------------------------------------------------------------------

/// A HAP-BLE request once fully reassembled across continuation PDUs.
pub struct Request {
    pub opcode: Opcode,
    pub tid: u8,
    pub iid: u16,
    pub body: Buf<MAX_BODY_LEN>,
}

/// Reassembles continuation PDUs sharing a transaction id into one
/// [`Request`]. Grounded on the teacher's chunk reassembler: an `active`
/// flag plus an accumulator buffer, `feed()`/`reset()` driven, rebuilt
/// here on [`Buf`] instead of an allocated `Vec`.
pub struct RequestAssembler {
    active: bool,
    opcode: u8,
    tid: u8,
    iid: u16,
    expected_len: usize,
    buffer: Buf<MAX_BODY_LEN>,
}

impl RequestAssembler {
    pub fn new() -> Self {
        Self { active: false, opcode: 0, tid: 0, iid: 0, expected_len: 0, buffer: Buf::new() }
    }

    pub fn reset(&mut self) {
        self.active = false;
        self.buffer.clear();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feed one raw PDU. Returns `Ok(Some(request))` once the declared
    /// body length has been reassembled, `Ok(None)` while more
    /// continuation PDUs are expected.
    pub fn feed(&mut self, pdu: &[u8]) -> Result<Option<Request>, HapStatus> {
        let control = *pdu.first().ok_or(HapStatus::InvalidRequest)?;
        let is_continuation = control & CONTROL_FRAGMENT != 0;

        if is_continuation {
            if !self.active {
                return Err(HapStatus::InvalidRequest);
            }
            let tid = *pdu.get(1).ok_or(HapStatus::InvalidRequest)?;
            if tid != self.tid {
                self.reset();
                return Err(HapStatus::InvalidRequest);
            }
            self.buffer.append(&pdu[2..]).map_err(HapStatus::from)?;
        } else {
            if pdu.len() < 7 {
                return Err(HapStatus::InvalidRequest);
            }
            let body_len = u16::from_le_bytes([pdu[5], pdu[6]]) as usize;
            self.buffer.clear();
            self.buffer.append(&pdu[7..]).map_err(HapStatus::from)?;
            self.active = true;
            self.opcode = pdu[1];
            self.tid = pdu[2];
            self.iid = u16::from_le_bytes([pdu[3], pdu[4]]);
            self.expected_len = body_len;
        }

        if self.buffer.len() >= self.expected_len {
            let opcode = Opcode::from_byte(self.opcode).ok_or(HapStatus::UnsupportedPdu)?;
            let request = Request { opcode, tid: self.tid, iid: self.iid, body: self.buffer.clone() };
            self.reset();
            Ok(Some(request))
        } else {
            Ok(None)
        }
    }
}

impl Default for RequestAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a response (status byte + body) into PDUs no larger than `mtu`:
/// the first carries the full 5-byte header, later ones a 2-byte
/// continuation header — the inverse of [`RequestAssembler::feed`].
pub fn fragment_response(
    tid: u8,
    status: PduStatus,
    body: &[u8],
    mtu: usize,
    out: &mut heapless::Vec<Buf<MAX_PDU_FRAGMENT>, 8>,
) -> Result<(), HapStatus> {
    out.clear();

    let first_room = mtu.saturating_sub(5);
    let first_len = body.len().min(first_room);
    let mut pdu: Buf<MAX_PDU_FRAGMENT> = Buf::new();
    pdu.append(&[CONTROL_RESPONSE_FIRST, tid, status as u8]).map_err(HapStatus::from)?;
    pdu.append(&(body.len() as u16).to_le_bytes()).map_err(HapStatus::from)?;
    pdu.append(&body[..first_len]).map_err(HapStatus::from)?;
    out.push(pdu).map_err(|_| HapStatus::OutOfResources)?;

    let mut rest = &body[first_len..];
    while !rest.is_empty() {
        let chunk_room = mtu.saturating_sub(2);
        let chunk_len = rest.len().min(chunk_room.max(1));
        let mut pdu: Buf<MAX_PDU_FRAGMENT> = Buf::new();
        pdu.append(&[CONTROL_FRAGMENT, tid]).map_err(HapStatus::from)?;
        pdu.append(&rest[..chunk_len]).map_err(HapStatus::from)?;
        out.push(pdu).map_err(|_| HapStatus::OutOfResources)?;
        rest = &rest[chunk_len..];
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Procedure lifecycle and permission enforcement (spec.md §3 Procedure)
// ---------------------------------------------------------------------------

/// An in-flight Procedure: one opcode dispatch, abandoned if not completed
/// within [`PROCEDURE_TIMEOUT_MS`] of its first PDU.
pub struct Procedure {
    started_at: Millis,
}

impl Procedure {
    pub fn start(now: Millis) -> Self {
        Self { started_at: now }
    }

    pub fn is_timed_out(&self, now: Millis) -> bool {
        now.saturating_sub(self.started_at) > PROCEDURE_TIMEOUT_MS
    }
}

fn check_read_permission(perm: Permissions, secured: bool) -> Result<(), HapStatus> {
    if perm.has(Permissions::UNAUTH_READ) || (perm.has(Permissions::PAIRED_READ) && secured) {
        Ok(())
    } else {
        Err(HapStatus::InsufficientAuthentication)
    }
}

fn check_write_permission(perm: Permissions, secured: bool) -> Result<(), HapStatus> {
    if perm.has(Permissions::UNAUTH_WRITE) || (perm.has(Permissions::PAIRED_WRITE) && secured) {
        Ok(())
    } else {
        Err(HapStatus::InsufficientAuthentication)
    }
}

// ---------------------------------------------------------------------------
// Opcode handlers
// ---------------------------------------------------------------------------

fn char_signature_read(db: &mut Db, aid: u64, iid: u16, body: &mut Buf<MAX_BODY_LEN>) -> HapStatus {
    let Some(ch) = db.find_characteristic_mut(aid, iid) else { return HapStatus::ResourceNotExist };
    for ptype in [PropertyType::CharType, PropertyType::Format, PropertyType::Permissions, PropertyType::Description, PropertyType::Event] {
        if let Some(prop) = ch.property(ptype) {
            if codec::write_value(body, ptype as u8, prop.value()).is_err() {
                return HapStatus::OutOfResources;
            }
        }
    }
    HapStatus::Success
}

fn svc_signature_read(db: &mut Db, aid: u64, iid: u16, body: &mut Buf<MAX_BODY_LEN>) -> HapStatus {
    let Some(accessory) = db.find_accessory(aid) else { return HapStatus::ResourceNotExist };
    let Some(svc) = accessory.find_service(iid) else { return HapStatus::ResourceNotExist };
    if codec::write_value(body, PropertyType::SvcType as u8, &svc.uuid()).is_err() {
        return HapStatus::OutOfResources;
    }
    for linked in svc.linked_services() {
        if codec::write_value(body, PropertyType::SvcLinked as u8, &linked.to_le_bytes()).is_err() {
            return HapStatus::OutOfResources;
        }
    }
    HapStatus::Success
}

fn char_read(db: &mut Db, aid: u64, iid: u16, secured: bool, body: &mut Buf<MAX_BODY_LEN>) -> HapStatus {
    let Some(ch) = db.find_characteristic_mut(aid, iid) else { return HapStatus::ResourceNotExist };
    if let Err(e) = check_read_permission(ch.perm(), secured) {
        return e;
    }
    let mut value: Buf<MAX_PROPERTY_LEN> = Buf::new();
    if let Err(e) = ch.read(&mut value) {
        return e;
    }
    match format_value::<MAX_BODY_LEN>(value.as_bytes()) {
        Ok(tlv) => match body.append(tlv.as_bytes()) {
            Ok(()) => HapStatus::Success,
            Err(e) => HapStatus::from(e),
        },
        Err(e) => e,
    }
}

fn char_write(request: &Request, db: &mut Db, aid: u64, secured: bool) -> HapStatus {
    let Some(ch) = db.find_characteristic_mut(aid, request.iid) else { return HapStatus::ResourceNotExist };
    if let Err(e) = check_write_permission(ch.perm(), secured) {
        return e;
    }
    let value: Buf<MAX_PROPERTY_LEN> = match extract_value(request.body.as_bytes()) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match ch.write(value.as_bytes()) {
        Ok(()) => HapStatus::Success,
        Err(e) => e,
    }
}

fn char_timed_write(request: &Request, db: &mut Db, aid: u64, secured: bool, now: Millis) -> HapStatus {
    let Some(ch) = db.find_characteristic_mut(aid, request.iid) else { return HapStatus::ResourceNotExist };
    if let Err(e) = check_write_permission(ch.perm(), secured) {
        return e;
    }
    let value: Buf<MAX_PROPERTY_LEN> = match extract_value(request.body.as_bytes()) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match ch.begin_timed_write(value.as_bytes(), now.add_ms(TIMED_WRITE_EXPIRY_MS).0) {
        Ok(()) => HapStatus::Success,
        Err(e) => e,
    }
}

fn char_execute_write(request: &Request, db: &mut Db, aid: u64, now: Millis) -> HapStatus {
    let Some(ch) = db.find_characteristic_mut(aid, request.iid) else { return HapStatus::ResourceNotExist };
    match ch.commit_timed_write(now.0) {
        Ok(()) => HapStatus::Success,
        Err(e) => e,
    }
}

fn char_configuration(request: &Request, ch: &mut Characteristic, body: &mut Buf<MAX_BODY_LEN>) -> HapStatus {
    if !request.body.is_empty() {
        let flags = codec::find_byte(request.body.as_bytes(), CFG_TAG_PROPERTIES).ok().flatten().unwrap_or(0);
        let interval_s = codec::find_byte(request.body.as_bytes(), CFG_TAG_BROADCAST_INTERVAL).ok().flatten().unwrap_or(0);
        if let Err(e) = ch.set_connected_event(flags & 0x01 != 0) {
            return e;
        }
        if let Err(e) = ch.set_broadcast_event(flags & 0x02 != 0, u32::from(interval_s) * 1000) {
            return e;
        }
    }
    match ch.property(PropertyType::Event) {
        Some(prop) => match codec::write_value(body, PropertyType::Event as u8, prop.value()) {
            Ok(()) => HapStatus::Success,
            Err(_) => HapStatus::OutOfResources,
        },
        None => HapStatus::Success,
    }
}

/// Derive the Broadcast Encryption Key from the accessory's long-term
/// Ed25519 key pair — the same HKDF-over-long-term-key shape
/// `pairing::engine` uses for every other session key, applied here with
/// labels scoped to broadcast notifications instead of a pairing session.
pub fn derive_broadcast_key(cfg: &Config) -> [u8; 32] {
    let mut ikm = [0u8; 96];
    ikm[..64].copy_from_slice(&cfg.ltsk);
    ikm[64..].copy_from_slice(&cfg.ltpk);
    let okm = crate::crypto::hkdf::derive(&ikm, b"Broadcast-Encryption-Key", b"Broadcast-Encryption-Key", 32)
        .unwrap_or([0u8; 64]);
    let mut key = [0u8; 32];
    key.copy_from_slice(&okm[..32]);
    key
}

fn protocol_configuration(cfg: &Config, body: &mut Buf<MAX_BODY_LEN>) -> HapStatus {
    let bek = derive_broadcast_key(cfg);
    let writes = [
        codec::write_value(body, PROTO_TAG_BEK, &bek),
        codec::write_value(body, PROTO_TAG_AAI, &cfg.device_id),
        codec::write_value(body, PROTO_TAG_GSN, &cfg.gsn.to_le_bytes()),
        codec::write_value(body, PROTO_TAG_CONFIG_NUM, &cfg.config_num.to_le_bytes()),
    ];
    if writes.iter().any(Result::is_err) {
        return HapStatus::OutOfResources;
    }
    HapStatus::Success
}

/// Dispatch one fully reassembled request against the accessory addressed
/// by `aid`, returning the PDU status byte and response body.
pub fn handle_request(request: &Request, db: &mut Db, cfg: &Config, aid: u64, session_secured: bool, now: Millis) -> (PduStatus, Buf<MAX_BODY_LEN>) {
    let mut body: Buf<MAX_BODY_LEN> = Buf::new();
    let status = match request.opcode {
        Opcode::CharSignatureRead => char_signature_read(db, aid, request.iid, &mut body),
        Opcode::CharRead => char_read(db, aid, request.iid, session_secured, &mut body),
        Opcode::CharWrite => char_write(request, db, aid, session_secured),
        Opcode::CharTimedWrite => char_timed_write(request, db, aid, session_secured, now),
        Opcode::CharExecuteWrite => char_execute_write(request, db, aid, now),
        Opcode::SvcSignatureRead => svc_signature_read(db, aid, request.iid, &mut body),
        Opcode::CharConfiguration => match db.find_characteristic_mut(aid, request.iid) {
            Some(ch) => char_configuration(request, ch, &mut body),
            None => HapStatus::ResourceNotExist,
        },
        Opcode::ProtoConfiguration => protocol_configuration(cfg, &mut body),
    };
    (status.into(), body)
}

/// Ties reassembly, the Procedure timeout, dispatch and fragmentation
/// together — the single entry point a GATT write-characteristic handler
/// calls per incoming PDU.
pub struct Connection {
    assembler: RequestAssembler,
    procedure: Option<Procedure>,
}

impl Connection {
    pub fn new() -> Self {
        Self { assembler: RequestAssembler::new(), procedure: None }
    }

    /// Feed one raw PDU. Returns `Ok(true)` once `out` holds a complete
    /// fragmented response, `Ok(false)` while still accumulating.
    #[allow(clippy::too_many_arguments)]
    pub fn feed(
        &mut self,
        pdu: &[u8],
        db: &mut Db,
        cfg: &Config,
        aid: u64,
        session_secured: bool,
        mtu: usize,
        now: Millis,
        out: &mut heapless::Vec<Buf<MAX_PDU_FRAGMENT>, 8>,
    ) -> Result<bool, HapStatus> {
        if let Some(p) = &self.procedure {
            if p.is_timed_out(now) {
                self.procedure = None;
                self.assembler.reset();
            }
        }
        let Some(request) = self.assembler.feed(pdu)? else {
            self.procedure.get_or_insert_with(|| Procedure::start(now));
            return Ok(false);
        };
        let (status, body) = handle_request(&request, db, cfg, aid, session_secured, now);
        self.procedure = None;
        fragment_response(request.tid, status, body.as_bytes(), mtu, out)?;
        Ok(true)
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Advertisement state machine (spec.md §4.6)
// ---------------------------------------------------------------------------

pub const NOTIF_MIN_DWELL_MS: u64 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvState {
    None,
    Regular,
    Notif,
    Update,
}

const AD_TYPE_MANUFACTURER: u8 = 0xFF;
const APPLE_COMPANY_ID: u16 = 0x004C;
const HAP_SUBTYPE_REGULAR: u8 = 0x06;
const HAP_SUBTYPE_NOTIFY: u8 = 0x11;
const HAP_COMPATIBLE_VERSION: u8 = 0x02;

/// Build the "Regular" advertisement: 1-byte flags, a 21-byte HAP
/// manufacturer-data structure, and a 3-byte shortened-name structure.
pub fn build_regular_advertisement(cfg: &Config) -> heapless::Vec<u8, 32> {
    let mut out: heapless::Vec<u8, 32> = heapless::Vec::new();
    let _ = out.push(0x06);

    let digest = sha512::digest(&[cfg.setup_code.as_bytes()]);
    let mut setup_hash = [0u8; 3];
    setup_hash.copy_from_slice(&digest[..3]);

    let _ = out.push(20);
    let _ = out.push(AD_TYPE_MANUFACTURER);
    let _ = out.extend_from_slice(&APPLE_COMPANY_ID.to_le_bytes());
    let _ = out.push(HAP_SUBTYPE_REGULAR);
    let _ = out.push(cfg.status_flags.0);
    let _ = out.extend_from_slice(&cfg.device_id);
    let _ = out.extend_from_slice(&(cfg.category as u16).to_le_bytes());
    let _ = out.extend_from_slice(&cfg.gsn.to_le_bytes());
    let _ = out.push((cfg.config_num & 0xFF) as u8);
    let _ = out.push(HAP_COMPATIBLE_VERSION);
    let _ = out.extend_from_slice(&setup_hash);

    let first_char = cfg.name.as_bytes().first().copied().unwrap_or(b'H');
    let _ = out.push(2);
    let _ = out.push(0x08);
    let _ = out.push(first_char);

    out
}

/// Build the "Notif" advertisement for a single-byte characteristic value
/// change: a 26-byte manufacturer-data structure carrying
/// `GSN ∥ IID ∥ value`, ChaCha20-Poly1305-sealed under the broadcast key
/// with a nonce derived from the current GSN (spec.md §4.2 nonce
/// construction, reused here via [`aead::nonce_from_seq`]). Callers must
/// hold this state for at least [`NOTIF_MIN_DWELL_MS`] before reverting to
/// Regular, and must call [`Config::bump_gsn`] once per distinct change.
pub fn build_notif_advertisement(cfg: &Config, broadcast_key: &[u8; 32], iid: u16, value: u8) -> heapless::Vec<u8, 32> {
    let mut plaintext = [0u8; 5];
    plaintext[0..2].copy_from_slice(&cfg.gsn.to_le_bytes());
    plaintext[2..4].copy_from_slice(&iid.to_le_bytes());
    plaintext[4] = value;

    let nonce = aead::nonce_from_seq(u64::from(cfg.gsn));
    let mut ciphertext = plaintext;
    let tag = aead::seal(broadcast_key, &nonce, &[], &mut ciphertext);

    let mut out: heapless::Vec<u8, 32> = heapless::Vec::new();
    let _ = out.push(25);
    let _ = out.push(AD_TYPE_MANUFACTURER);
    let _ = out.extend_from_slice(&APPLE_COMPANY_ID.to_le_bytes());
    let _ = out.push(HAP_SUBTYPE_NOTIFY);
    let _ = out.extend_from_slice(&ciphertext);
    let _ = out.extend_from_slice(&tag);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Category, ConfigDefaults};
    use crate::model::{Accessory, Format, Service};
    use crate::ports::{RandomPort, SettingsError, SettingsPort};
    use std::collections::HashMap;

    struct FixedRng(u8);
    impl RandomPort for FixedRng {
        fn fill(&mut self, buf: &mut [u8]) {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = self.0.wrapping_add(i as u8);
            }
        }
    }

    struct MemSettings(HashMap<std::string::String, std::vec::Vec<u8>>);
    impl MemSettings {
        fn new() -> Self {
            Self(HashMap::new())
        }
    }
    impl SettingsPort for MemSettings {
        fn read(&self, key: &str, buf: &mut [u8]) -> Result<usize, SettingsError> {
            match self.0.get(key) {
                Some(v) => {
                    let n = v.len().min(buf.len());
                    buf[..n].copy_from_slice(&v[..n]);
                    Ok(n)
                }
                None => Err(SettingsError::NotFound),
            }
        }
        fn write(&mut self, key: &str, data: &[u8]) -> Result<(), SettingsError> {
            self.0.insert(key.to_string(), data.to_vec());
            Ok(())
        }
        fn delete(&mut self, key: &str) -> Result<(), SettingsError> {
            self.0.remove(key);
            Ok(())
        }
        fn exists(&self, key: &str) -> bool {
            self.0.contains_key(key)
        }
    }

    fn test_cfg() -> Config {
        let mut settings = MemSettings::new();
        let mut rng = FixedRng(4);
        Config::init(&mut settings, &mut rng, &ConfigDefaults::default())
    }

    fn test_db() -> (Db, u64, u16) {
        let mut db = Db::new();
        let mut acc = Accessory::new();
        let mut svc = Service::new(crate::model::uuid::short(0x43)).primary(true);
        svc.add(
            Characteristic::new(crate::model::uuid::short(0x25), Format::Bool, Permissions(Permissions::PAIRED_READ | Permissions::PAIRED_WRITE))
                .with_value(&[0]),
        )
        .unwrap();
        acc.add(svc).unwrap();
        let aid = db.add(acc).unwrap();
        db.assign_iids();
        let iid = db.find_accessory(aid).unwrap().services().next().unwrap().characteristics().next().unwrap().iid();
        (db, aid, iid)
    }

    #[test]
    fn extract_and_format_are_mutual_inverses() {
        let value = [0x42u8; 300];
        let formatted: Buf<320> = format_value(&value).unwrap();
        let recovered: Buf<300> = extract_value(formatted.as_bytes()).unwrap();
        assert_eq!(recovered.as_bytes(), &value[..]);
    }

    #[test]
    fn reassembler_handles_first_pdu_plus_continuation() {
        let mut first: std::vec::Vec<u8> = std::vec::Vec::new();
        first.push(0x00);
        first.push(Opcode::CharWrite as u8);
        first.push(7);
        first.extend_from_slice(&9u16.to_le_bytes());
        first.extend_from_slice(&10u16.to_le_bytes());
        first.extend_from_slice(&[0xAB; 6]);

        let mut cont: std::vec::Vec<u8> = std::vec::Vec::new();
        cont.push(CONTROL_FRAGMENT);
        cont.push(7);
        cont.extend_from_slice(&[0xAB; 4]);

        let mut assembler = RequestAssembler::new();
        assert!(assembler.feed(&first).unwrap().is_none());
        let request = assembler.feed(&cont).unwrap().unwrap();
        assert_eq!(request.tid, 7);
        assert_eq!(request.iid, 9);
        assert_eq!(request.body.as_bytes(), &[0xAB; 10]);
    }

    #[test]
    fn fragment_response_splits_across_mtu() {
        let body = [0xCDu8; 600];
        let mut fragments: heapless::Vec<Buf<MAX_PDU_FRAGMENT>, 8> = heapless::Vec::new();
        fragment_response(5, PduStatus::Success, &body, MAX_PDU_FRAGMENT, &mut fragments).unwrap();
        assert!(fragments.len() > 1);
        let mut total = 0;
        for (i, frag) in fragments.iter().enumerate() {
            total += if i == 0 { frag.len() - 5 } else { frag.len() - 2 };
        }
        assert_eq!(total, body.len());
    }

    #[test]
    fn unauthenticated_read_without_unauth_permission_is_rejected() {
        let (mut db, aid, iid) = test_db();
        let mut body: Buf<MAX_BODY_LEN> = Buf::new();
        let status = char_read(&mut db, aid, iid, false, &mut body);
        assert_eq!(status, HapStatus::InsufficientAuthentication);
    }

    #[test]
    fn secured_read_and_write_round_trip() {
        let (mut db, aid, iid) = test_db();
        let value = format_value::<MAX_BODY_LEN>(&[1]).unwrap();
        let request = Request { opcode: Opcode::CharWrite, tid: 1, iid, body: value };
        assert_eq!(char_write(&request, &mut db, aid, true), HapStatus::Success);

        let mut body: Buf<MAX_BODY_LEN> = Buf::new();
        assert_eq!(char_read(&mut db, aid, iid, true, &mut body), HapStatus::Success);
        let recovered: Buf<8> = extract_value(body.as_bytes()).unwrap();
        assert_eq!(recovered.as_bytes(), &[1]);
    }

    #[test]
    fn timed_write_commits_through_the_pending_buffer() {
        let mut db = Db::new();
        let mut acc = Accessory::new();
        let mut svc = Service::new(crate::model::uuid::short(0x43)).primary(true);
        svc.add(
            Characteristic::new(
                crate::model::uuid::short(0x25),
                Format::Uint8,
                Permissions(Permissions::PAIRED_WRITE | Permissions::TIMED_WRITE),
            )
            .with_value(&[0]),
        )
        .unwrap();
        acc.add(svc).unwrap();
        let aid = db.add(acc).unwrap();
        db.assign_iids();
        let iid = db.find_accessory(aid).unwrap().services().next().unwrap().characteristics().next().unwrap().iid();

        let value = format_value::<MAX_BODY_LEN>(&[9]).unwrap();
        let request = Request { opcode: Opcode::CharTimedWrite, tid: 1, iid, body: value };
        assert_eq!(char_timed_write(&request, &mut db, aid, true, Millis(0)), HapStatus::Success);

        let exec = Request { opcode: Opcode::CharExecuteWrite, tid: 1, iid, body: Buf::new() };
        assert_eq!(char_execute_write(&exec, &mut db, aid, Millis(TIMED_WRITE_EXPIRY_MS + 1)), HapStatus::OperationTimedOut);
    }

    #[test]
    fn procedure_timeout_arithmetic() {
        let proc = Procedure::start(Millis(0));
        assert!(!proc.is_timed_out(Millis(PROCEDURE_TIMEOUT_MS)));
        assert!(proc.is_timed_out(Millis(PROCEDURE_TIMEOUT_MS + 1)));
    }

    #[test]
    fn regular_advertisement_is_exactly_25_bytes() {
        let cfg = test_cfg();
        let adv = build_regular_advertisement(&cfg);
        assert_eq!(adv.len(), 25);
        assert_eq!(adv[1], 20);
        assert_eq!(adv[2], AD_TYPE_MANUFACTURER);
    }

    #[test]
    fn notif_advertisement_is_exactly_26_bytes_and_decrypts() {
        let cfg = test_cfg();
        let key = derive_broadcast_key(&cfg);
        let adv = build_notif_advertisement(&cfg, &key, 9, 1);
        assert_eq!(adv.len(), 26);

        let mut ciphertext = [0u8; 5];
        ciphertext.copy_from_slice(&adv[5..10]);
        let mut tag = [0u8; 16];
        tag.copy_from_slice(&adv[10..26]);
        let nonce = aead::nonce_from_seq(u64::from(cfg.gsn));
        assert!(aead::open(&key, &nonce, &[], &mut ciphertext, &tag));
        assert_eq!(u16::from_le_bytes([ciphertext[2], ciphertext[3]]), 9);
        assert_eq!(ciphertext[4], 1);
    }

    #[test]
    fn category_other_is_not_bridge() {
        assert_ne!(Category::Other as u16, Category::Bridge as u16);
    }

    #[test]
    fn config_defaults_are_reachable_for_tests() {
        let _ = ConfigDefaults::default();
    }
}
