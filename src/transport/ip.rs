//! HAP IP transport (spec.md §4.7): HTTP/1.1 request/response framing,
//! the post-Pair-Verify AEAD byte-stream encryption, and the
//! `/accessories`, `/characteristics`, `/identify`, `/pair-setup`,
//! `/pair-verify`, `/pairings` routes.
//!
//! The BLE transport (`transport::ble`) stays inside fixed-capacity `Buf`
//! arenas because it's bounded by a GATT MTU and a constrained peripheral.
//! This side of the protocol runs on a host with a TCP socket and an
//! allocator, so it works directly in `Vec<u8>`/`serde_json::Value` the
//! way the accessory's JSON surface (spec.md §4.7) is naturally expressed.

use std::string::{String, ToString};
use std::vec::Vec;

use serde_json::{json, Map, Value};

use crate::config::Config;
use crate::crypto::aead;
use crate::error::HapStatus;
use crate::model::characteristic::Permissions;
use crate::model::db::Db;
use crate::model::property::Format;
use crate::pairing::engine::{PairingEngine, Path as PairingPath};
use crate::pairing::session::Session;
use crate::ports::{AnnouncePort, RandomPort, SettingsPort};
use crate::time::Millis;
use crate::tlv::Buf as TlvBuf;

/// Largest Pair-Setup/Pair-Verify/Pairings TLV8 body this transport will
/// buffer. IP has no GATT MTU, but a request this large is never
/// legitimate (spec.md §4.5's biggest message is a `Pairings` listing of
/// a nearly-full 16-slot table).
const MAX_TLV_BODY: usize = 2048;

/// Plaintext bytes per encrypted frame (spec.md §4.7 security layer).
const MAX_FRAME_PLAINTEXT: usize = 1024;

// ---------------------------------------------------------------------------
// HTTP/1.1 request parsing
// ---------------------------------------------------------------------------

pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Accumulates raw bytes from the socket until one full HTTP/1.1 request
/// (headers plus `Content-Length` body, if any) is available, then hands
/// it back and drops the consumed prefix — the same "feed an accumulator,
/// emit when complete" shape as the BLE transport's PDU reassembler.
#[derive(Default)]
pub struct RequestAssembler {
    buf: Vec<u8>,
}

impl RequestAssembler {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Result<Option<HttpRequest>, HapStatus> {
        self.buf.extend_from_slice(bytes);
        let header_end = match find_subslice(&self.buf, b"\r\n\r\n") {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let header_bytes = &self.buf[..header_end];
        let headers = std::str::from_utf8(header_bytes).map_err(|_| HapStatus::InvalidRequest)?;
        let mut lines = headers.split("\r\n");
        let request_line = lines.next().ok_or(HapStatus::InvalidRequest)?;
        let mut parts = request_line.split_whitespace();
        let method = parts.next().ok_or(HapStatus::InvalidRequest)?.to_string();
        let target = parts.next().ok_or(HapStatus::InvalidRequest)?;
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (target.to_string(), String::new()),
        };

        let mut content_length = 0usize;
        let mut content_type = String::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim();
                let value = value.trim();
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.parse().map_err(|_| HapStatus::InvalidRequest)?;
                } else if name.eq_ignore_ascii_case("content-type") {
                    content_type = value.to_string();
                }
            }
        }

        let body_start = header_end + 4;
        if self.buf.len() < body_start + content_length {
            return Ok(None);
        }
        if content_length > MAX_TLV_BODY * 2 {
            return Err(HapStatus::OutOfResources);
        }
        let body = self.buf[body_start..body_start + content_length].to_vec();
        self.buf.drain(..body_start + content_length);

        Ok(Some(HttpRequest { method, path, query, content_type, body }))
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse `id=1.9,1.10` into `(aid, iid)` pairs (spec.md §4.7
/// `GET /characteristics`).
fn parse_char_ids(query: &str) -> Vec<(u64, u16)> {
    let id_param = query.split('&').find_map(|kv| kv.strip_prefix("id=")).unwrap_or("");
    id_param
        .split(',')
        .filter_map(|pair| {
            let (aid, iid) = pair.split_once('.')?;
            Some((aid.parse().ok()?, iid.parse().ok()?))
        })
        .collect()
}

fn query_flag(query: &str, key: &str) -> bool {
    query.split('&').any(|kv| {
        kv.strip_prefix(key).and_then(|rest| rest.strip_prefix('=')).map(|v| v == "1" || v == "true").unwrap_or(false)
    })
}

// ---------------------------------------------------------------------------
// HTTP/1.1 response building
// ---------------------------------------------------------------------------

pub fn build_response(status: u16, reason: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("HTTP/1.1 {status} {reason}\r\n").as_bytes());
    out.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}

fn no_content() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"HTTP/1.1 204 No Content\r\n\r\n");
    out
}

fn json_response(status: u16, reason: &str, value: &Value) -> Vec<u8> {
    build_response(status, reason, "application/hap+json", value.to_string().as_bytes())
}

fn tlv_response(body: &[u8]) -> Vec<u8> {
    build_response(200, "OK", "application/pairing+tlv8", body)
}

/// The `EVENT/1.0` pseudo-response HAP sends unsolicited on a subscribed
/// connection to push a characteristic-value change (spec.md §4.7,
/// driven by `PollEventQueue::drain`, see below).
pub fn build_event(value: &Value) -> Vec<u8> {
    let body = value.to_string();
    let mut out = Vec::new();
    out.extend_from_slice(b"EVENT/1.0 200 OK\r\n");
    out.extend_from_slice(b"Content-Type: application/hap+json\r\n");
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body.as_bytes());
    out
}

// ---------------------------------------------------------------------------
// Post-Pair-Verify AEAD byte-stream security layer
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` as one or more `<= 1024`-byte frames: a 2-byte LE
/// length (used as AAD), the ciphertext, then a 16-byte Poly1305 tag
/// (spec.md §4.7 "HTTP security session"). Consumes `session.send_count`.
pub fn encrypt_frames(session: &mut Session, plaintext: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in plaintext.chunks(MAX_FRAME_PLAINTEXT) {
        let len = (chunk.len() as u16).to_le_bytes();
        let nonce = aead::nonce_from_seq(session.send_count);
        session.send_count += 1;
        let mut buf = chunk.to_vec();
        let tag = aead::seal(&session.accessory_to_controller_key, &nonce, &len, &mut buf);
        out.extend_from_slice(&len);
        out.extend_from_slice(&buf);
        out.extend_from_slice(&tag);
    }
    out
}

/// Accumulates raw encrypted bytes from the socket and decrypts every
/// complete frame, consuming `session.recv_count`. Returns `None` (and
/// keeps buffering) until at least one full frame is available; a failed
/// tag check is fatal to the connection (spec.md §7).
#[derive(Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn feed(&mut self, bytes: &[u8], session: &mut Session) -> Result<Vec<u8>, HapStatus> {
        self.buf.extend_from_slice(bytes);
        let mut plaintext = Vec::new();
        loop {
            if self.buf.len() < 2 {
                break;
            }
            let len = u16::from_le_bytes([self.buf[0], self.buf[1]]) as usize;
            let frame_len = 2 + len + aead::TAG_LEN_BYTES;
            if self.buf.len() < frame_len {
                break;
            }
            let aad = [self.buf[0], self.buf[1]];
            let mut ciphertext = self.buf[2..2 + len].to_vec();
            let mut tag = [0u8; 16];
            tag.copy_from_slice(&self.buf[2 + len..frame_len]);

            let nonce = aead::nonce_from_seq(session.recv_count);
            session.recv_count += 1;
            if !aead::open(&session.controller_to_accessory_key, &nonce, &aad, &mut ciphertext, &tag) {
                return Err(HapStatus::InvalidRequest);
            }
            plaintext.extend_from_slice(&ciphertext);
            self.buf.drain(..frame_len);
        }
        Ok(plaintext)
    }
}

// ---------------------------------------------------------------------------
// JSON <-> characteristic value conversion
// ---------------------------------------------------------------------------

fn decode_value_to_json(format: Format, bytes: &[u8]) -> Value {
    match format {
        Format::Bool => json!(bytes.first().copied().unwrap_or(0) != 0),
        Format::Uint8 => json!(bytes.first().copied().unwrap_or(0)),
        Format::Uint16 => json!(u16::from_le_bytes(bytes.try_into().unwrap_or([0; 2]))),
        Format::Uint32 | Format::Iid => json!(u32::from_le_bytes(bytes.try_into().unwrap_or([0; 4]))),
        Format::Uint64 => json!(u64::from_le_bytes(bytes.try_into().unwrap_or([0; 8]))),
        Format::Int => json!(i32::from_le_bytes(bytes.try_into().unwrap_or([0; 4]))),
        Format::Float => json!(f32::from_le_bytes(bytes.try_into().unwrap_or([0; 4]))),
        Format::String => json!(String::from_utf8_lossy(bytes).to_string()),
        Format::Data | Format::Tlv | Format::Uuid | Format::FormatTag | Format::Unit | Format::Null => {
            json!(base64_encode(bytes))
        }
    }
}

fn encode_json_value(format: Format, value: &Value) -> Option<Vec<u8>> {
    match format {
        Format::Bool => {
            let truthy = match value {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_u64().map(|v| v != 0).unwrap_or(false),
                _ => return None,
            };
            Some(vec![u8::from(truthy)])
        }
        Format::Uint8 => Some(vec![u8::try_from(value.as_u64()?).ok()?]),
        Format::Uint16 => Some((u16::try_from(value.as_u64()?).ok()?).to_le_bytes().to_vec()),
        Format::Uint32 | Format::Iid => Some((u32::try_from(value.as_u64()?).ok()?).to_le_bytes().to_vec()),
        Format::Uint64 => Some(value.as_u64()?.to_le_bytes().to_vec()),
        Format::Int => Some((i32::try_from(value.as_i64()?).ok()?).to_le_bytes().to_vec()),
        Format::Float => Some((value.as_f64()? as f32).to_le_bytes().to_vec()),
        Format::String => Some(value.as_str()?.as_bytes().to_vec()),
        Format::Data | Format::Tlv | Format::Uuid | Format::FormatTag | Format::Unit | Format::Null => {
            base64_decode(value.as_str()?)
        }
    }
}

/// Minimal base64 codec for `Data`/`Tlv` characteristic values in JSON —
/// HAP's IP surface encodes opaque byte values this way (spec.md §4.7).
fn base64_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::new();
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();
        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[(((b0 & 0x03) << 4) | (b1.unwrap_or(0) >> 4)) as usize] as char);
        out.push(if let Some(b1) = b1 { ALPHABET[(((b1 & 0x0f) << 2) | (b2.unwrap_or(0) >> 6)) as usize] as char } else { '=' });
        out.push(if let Some(b2) = b2 { ALPHABET[(b2 & 0x3f) as usize] as char } else { '=' });
    }
    out
}

fn base64_decode(s: &str) -> Option<Vec<u8>> {
    fn val(c: u8) -> Option<u8> {
        match c {
            b'A'..=b'Z' => Some(c - b'A'),
            b'a'..=b'z' => Some(c - b'a' + 26),
            b'0'..=b'9' => Some(c - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }
    let chars: Vec<u8> = s.bytes().filter(|&b| b != b'=').collect();
    let mut out = Vec::new();
    for chunk in chars.chunks(4) {
        let vals: Vec<u8> = chunk.iter().map(|&c| val(c)).collect::<Option<_>>()?;
        out.push((vals[0] << 2) | (vals.get(1).copied().unwrap_or(0) >> 4));
        if vals.len() > 2 {
            out.push((vals[1] << 4) | (vals[2] >> 2));
        }
        if vals.len() > 3 {
            out.push((vals[2] << 6) | vals[3]);
        }
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// Permission enforcement (mirrors transport::ble's gate, spec.md §3)
// ---------------------------------------------------------------------------

fn check_read_permission(perm: Permissions, secured: bool) -> Result<(), HapStatus> {
    if secured && perm.has(Permissions::PAIRED_READ) {
        return Ok(());
    }
    if perm.has(Permissions::UNAUTH_READ) {
        return Ok(());
    }
    Err(HapStatus::InsufficientAuthentication)
}

fn check_write_permission(perm: Permissions, secured: bool) -> Result<(), HapStatus> {
    if secured && perm.has(Permissions::PAIRED_WRITE) {
        return Ok(());
    }
    if perm.has(Permissions::UNAUTH_WRITE) {
        return Ok(());
    }
    Err(HapStatus::InsufficientAuthentication)
}

// ---------------------------------------------------------------------------
// /accessories, /characteristics
// ---------------------------------------------------------------------------

fn accessories_body(db: &Db) -> Value {
    let accessories: Vec<Value> = db
        .accessories()
        .map(|acc| {
            let services: Vec<Value> = acc
                .services()
                .map(|svc| {
                    let characteristics: Vec<Value> = svc
                        .characteristics()
                        .map(|ch| {
                            json!({
                                "iid": ch.iid(),
                                "type": uuid_hex(&ch.uuid()),
                                "perms": perm_strings(ch.perm()),
                                "format": format_name(ch.format()),
                                "value": decode_value_to_json(ch.format(), ch.value()),
                            })
                        })
                        .collect();
                    json!({
                        "iid": svc.iid(),
                        "type": uuid_hex(&svc.uuid()),
                        "primary": svc.is_primary(),
                        "hidden": svc.is_hidden(),
                        "linked": svc.linked_services(),
                        "characteristics": characteristics,
                    })
                })
                .collect();
            json!({ "aid": acc.aid(), "services": services })
        })
        .collect();
    json!({ "accessories": accessories })
}

fn uuid_hex(uuid: &[u8; 16]) -> String {
    if crate::model::uuid::is_short(uuid) {
        format!("{:02X}{:02X}{:02X}{:02X}", uuid[0], uuid[1], uuid[2], uuid[3])
    } else {
        uuid.iter().map(|b| format!("{b:02x}")).collect()
    }
}

fn format_name(format: Format) -> &'static str {
    match format {
        Format::Null => "null",
        Format::Bool => "bool",
        Format::Uint8 => "uint8",
        Format::Uint16 => "uint16",
        Format::Uint32 => "uint32",
        Format::Uint64 => "uint64",
        Format::Int => "int",
        Format::Float => "float",
        Format::String => "string",
        Format::Data => "data",
        Format::Tlv => "tlv8",
        Format::Uuid => "uuid",
        Format::FormatTag => "format",
        Format::Unit => "unit",
        Format::Iid => "iid",
    }
}

fn perm_strings(perm: Permissions) -> Vec<&'static str> {
    let table: &[(u16, &str)] = &[
        (Permissions::PAIRED_READ, "pr"),
        (Permissions::PAIRED_WRITE, "pw"),
        (Permissions::UNAUTH_READ, "rd"),
        (Permissions::UNAUTH_WRITE, "wr"),
        (Permissions::CONNECTED_EVENT, "ev"),
        (Permissions::DISCONNECTED_EVENT, "de"),
        (Permissions::BROADCAST_NOTIFY, "bn"),
        (Permissions::ADDITIONAL_AUTH, "aa"),
        (Permissions::TIMED_WRITE, "tw"),
        (Permissions::HIDDEN, "hd"),
    ];
    table.iter().filter(|(flag, _)| perm.has(*flag)).map(|(_, name)| *name).collect()
}

fn get_characteristics(db: &mut Db, query: &str, secured: bool) -> (u16, Value) {
    let want_meta = query_flag(query, "meta");
    let want_perms = query_flag(query, "perms");
    let want_type = query_flag(query, "type");
    let mut any_error = false;
    let entries: Vec<Value> = parse_char_ids(query)
        .into_iter()
        .map(|(aid, iid)| {
            let Some(ch) = db.find_characteristic_mut(aid, iid) else {
                any_error = true;
                return json!({ "aid": aid, "iid": iid, "status": HapStatus::ResourceNotExist as i32 });
            };
            if let Err(status) = check_read_permission(ch.perm(), secured) {
                any_error = true;
                return json!({ "aid": aid, "iid": iid, "status": status as i32 });
            }
            let mut rsp: TlvBuf<{ crate::model::property::MAX_PROPERTY_LEN }> = TlvBuf::new();
            if ch.read(&mut rsp).is_err() {
                any_error = true;
                return json!({ "aid": aid, "iid": iid, "status": HapStatus::CannotRead as i32 });
            }
            let mut obj = Map::new();
            obj.insert("aid".into(), json!(aid));
            obj.insert("iid".into(), json!(iid));
            obj.insert("value".into(), decode_value_to_json(ch.format(), rsp.as_bytes()));
            if want_type {
                obj.insert("type".into(), json!(uuid_hex(&ch.uuid())));
            }
            if want_perms {
                obj.insert("perms".into(), json!(perm_strings(ch.perm())));
            }
            if want_meta {
                obj.insert("format".into(), json!(format_name(ch.format())));
            }
            Value::Object(obj)
        })
        .collect();
    let status = if any_error { 207 } else { 200 };
    (status, json!({ "characteristics": entries }))
}

fn put_characteristics(db: &mut Db, body: &[u8], secured: bool, now: Millis) -> (u16, Option<Value>) {
    let Ok(parsed) = serde_json::from_slice::<Value>(body) else {
        return (400, None);
    };
    let Some(items) = parsed.get("characteristics").and_then(Value::as_array) else {
        return (400, None);
    };

    let mut any_error = false;
    let mut statuses = Vec::with_capacity(items.len());
    for item in items {
        let (Some(aid), Some(iid)) = (
            item.get("aid").and_then(Value::as_u64),
            item.get("iid").and_then(Value::as_u64).and_then(|v| u16::try_from(v).ok()),
        ) else {
            any_error = true;
            statuses.push(json!({ "status": HapStatus::InvalidValue as i32 }));
            continue;
        };
        let status = apply_one_write(db, aid, iid, item, secured, now);
        if status != HapStatus::Success {
            any_error = true;
        }
        statuses.push(json!({ "aid": aid, "iid": iid, "status": status as i32 }));
    }

    if any_error {
        (207, Some(json!({ "characteristics": statuses })))
    } else {
        (204, None)
    }
}

/// Applies one `/characteristics` write item. A `pid` cookie without a
/// `value` is the execute-write half of a timed write (spec.md §3
/// Characteristic pending-write buffer); `pid` alongside `value` is the
/// prepare half.
fn apply_one_write(db: &mut Db, aid: u64, iid: u16, item: &Value, secured: bool, now: Millis) -> HapStatus {
    let Some(ch) = db.find_characteristic_mut(aid, iid) else {
        return HapStatus::ResourceNotExist;
    };

    if let Some(ev) = item.get("ev").and_then(Value::as_bool) {
        if ch.set_connected_event(ev).is_err() {
            return HapStatus::NotificationNotSupported;
        }
    }

    let has_pid = item.get("pid").is_some();
    let Some(value) = item.get("value") else {
        return if has_pid {
            match ch.commit_timed_write(now.0) {
                Ok(()) => HapStatus::Success,
                Err(status) => status,
            }
        } else {
            HapStatus::Success
        };
    };

    if let Err(status) = check_write_permission(ch.perm(), secured) {
        return status;
    }
    let Some(bytes) = encode_json_value(ch.format(), value) else {
        return HapStatus::InvalidValue;
    };

    if has_pid {
        return match ch.begin_timed_write(&bytes, now.add_ms(10_000).0) {
            Ok(()) => HapStatus::Success,
            Err(status) => status,
        };
    }
    match ch.write(&bytes) {
        Ok(()) => HapStatus::Success,
        Err(status) => status,
    }
}

// ---------------------------------------------------------------------------
// /identify
// ---------------------------------------------------------------------------

fn identify(cfg: &Config) -> Vec<u8> {
    if cfg.status_flags.is_paired() {
        json_response(400, "Bad Request", &json!({ "status": HapStatus::InsufficientAuthorization as i32 }))
    } else {
        no_content()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
pub fn route(
    req: &HttpRequest,
    engine: &mut PairingEngine,
    db: &mut Db,
    cfg: &mut Config,
    rng: &mut dyn RandomPort,
    announce: &mut dyn AnnouncePort,
    settings: &mut dyn SettingsPort,
    now: Millis,
) -> Vec<u8> {
    let secured = engine.session().is_some_and(Session::is_secured);

    match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/pair-setup") => dispatch_pairing(engine, PairingPath::Setup, &req.body, cfg, rng, announce, settings, now),
        ("POST", "/pair-verify") => dispatch_pairing(engine, PairingPath::Verify, &req.body, cfg, rng, announce, settings, now),
        ("POST", "/pairings") => dispatch_pairing(engine, PairingPath::Pairings, &req.body, cfg, rng, announce, settings, now),
        ("POST", "/identify") => identify(cfg),
        ("GET", "/accessories") => {
            if !secured {
                return json_response(470, "Connection Authorization Required", &json!({}));
            }
            json_response(200, "OK", &accessories_body(db))
        }
        ("GET", "/characteristics") => {
            let (status, body) = get_characteristics(db, &req.query, secured);
            let reason = if status == 200 { "OK" } else { "Multi-Status" };
            json_response(status, reason, &body)
        }
        ("PUT", "/characteristics") => match put_characteristics(db, &req.body, secured, now) {
            (204, _) => no_content(),
            (status, Some(body)) => json_response(status, "Multi-Status", &body),
            (status, None) => json_response(status, "Bad Request", &json!({ "status": HapStatus::InvalidValue as i32 })),
        },
        _ => build_response(404, "Not Found", "text/plain", b"not found"),
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_pairing(
    engine: &mut PairingEngine,
    path: PairingPath,
    body: &[u8],
    cfg: &mut Config,
    rng: &mut dyn RandomPort,
    announce: &mut dyn AnnouncePort,
    settings: &mut dyn SettingsPort,
    now: Millis,
) -> Vec<u8> {
    let mut rsp: TlvBuf<MAX_TLV_BODY> = TlvBuf::new();
    engine.dispatch(path, body, &mut rsp, cfg, rng, announce, settings, now);
    tlv_response(rsp.as_bytes())
}

// ---------------------------------------------------------------------------
// Event push queue (spec.md §4.7: unsolicited `EVENT/1.0` on a subscribed
// connection whenever a characteristic with `ev` enabled changes).
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct EventQueue {
    pending: Vec<(u64, u16, Value)>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    pub fn push(&mut self, aid: u64, iid: u16, value: Value) {
        self.pending.retain(|(a, i, _)| *a != aid || *i != iid);
        self.pending.push((aid, iid, value));
    }

    /// Drain every pending change into one `EVENT/1.0` frame, or `None`
    /// if nothing changed since the last poll.
    pub fn drain_as_event(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            return None;
        }
        let characteristics: Vec<Value> = self
            .pending
            .drain(..)
            .map(|(aid, iid, value)| json!({ "aid": aid, "iid": iid, "value": value }))
            .collect();
        Some(build_event(&json!({ "characteristics": characteristics })))
    }
}
