//! HAP Runtime — Demo Accessory
//!
//! Boots one accessory (Accessory Information, Protocol Information,
//! Pairing, and a demo Lightbulb service) and serves it over the HAP IP
//! transport on a TCP socket. The BLE transport (`hap_runtime::transport::ble`)
//! is the same protocol core wired to a GATT stack instead of a socket —
//! out of scope for this host demo binary, which exists to exercise the
//! pairing engine and IP transport end to end.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  main (this binary)                      │
//! │                                                           │
//! │   FileSettings   Splitmix64Rng   LogAnnouncePort          │
//! │   (SettingsPort) (RandomPort)    (AnnouncePort)           │
//! │                                                           │
//! │   ──────────────── Port Trait Boundary ────────────────   │
//! │                                                           │
//! │   Config   Db   PairingEngine   transport::ip             │
//! └──────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use burster::Limiter;
use log::{info, warn, Level, LevelFilter, Metadata, Record};

use hap_runtime::config::{Category, Config, ConfigDefaults};
use hap_runtime::crypto::bignum::Modulus;
use hap_runtime::model::db::Db;
use hap_runtime::model::{accessory::Accessory, services};
use hap_runtime::pairing::engine::PairingEngine;
use hap_runtime::ports::{AnnouncePort, RandomPort, SettingsError, SettingsPort};
use hap_runtime::time::{Clock, Millis, StdClock};
use hap_runtime::transport::ip;

// ── Logging ───────────────────────────────────────────────────
//
// Constrained targets wire `log` to a UART/flash sink; this demo wires it
// to stderr so the boot sequence and every accepted connection are visible.

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging() {
    log::set_logger(&LOGGER).expect("logger already set");
    log::set_max_level(LevelFilter::Info);
}

// ── Settings port: a single length-prefixed key/value blob on disk ─────
//
// `serde`'s std-collection impls (HashMap, etc.) aren't in this crate's
// feature set (`serde = { features = ["derive"] }` only), so this encodes
// its own tiny on-disk table rather than pulling those features in just
// for the demo binary's persistence needs.

struct FileSettings {
    path: PathBuf,
    table: std::collections::HashMap<String, Vec<u8>>,
}

impl FileSettings {
    fn open(path: PathBuf) -> Self {
        let table = std::fs::read(&path).ok().map(|bytes| decode_table(&bytes)).unwrap_or_default();
        Self { path, table }
    }

    fn flush(&self) {
        let _ = std::fs::write(&self.path, encode_table(&self.table));
    }
}

fn encode_table(table: &std::collections::HashMap<String, Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in table {
        out.extend_from_slice(&(key.len() as u32).to_le_bytes());
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value);
    }
    out
}

fn decode_table(bytes: &[u8]) -> std::collections::HashMap<String, Vec<u8>> {
    let mut table = std::collections::HashMap::new();
    let mut cursor = 0usize;
    while cursor + 4 <= bytes.len() {
        let key_len = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        if cursor + key_len > bytes.len() {
            break;
        }
        let key = match std::str::from_utf8(&bytes[cursor..cursor + key_len]) {
            Ok(s) => s.to_string(),
            Err(_) => break,
        };
        cursor += key_len;
        if cursor + 4 > bytes.len() {
            break;
        }
        let val_len = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        if cursor + val_len > bytes.len() {
            break;
        }
        table.insert(key, bytes[cursor..cursor + val_len].to_vec());
        cursor += val_len;
    }
    table
}

impl SettingsPort for FileSettings {
    fn read(&self, key: &str, buf: &mut [u8]) -> std::result::Result<usize, SettingsError> {
        let value = self.table.get(key).ok_or(SettingsError::NotFound)?;
        let n = value.len().min(buf.len());
        buf[..n].copy_from_slice(&value[..n]);
        Ok(n)
    }

    fn write(&mut self, key: &str, data: &[u8]) -> std::result::Result<(), SettingsError> {
        self.table.insert(key.to_string(), data.to_vec());
        self.flush();
        Ok(())
    }

    fn delete(&mut self, key: &str) -> std::result::Result<(), SettingsError> {
        self.table.remove(key);
        self.flush();
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }
}

// ── Random port: splitmix64, seeded from the host clock ─────────
//
// A real accessory wires this to its hardware RNG (see `ports::RandomPort`
// docs); this demo has no such peripheral, so it falls back to a
// deterministic-from-seed generator seeded once at boot. Not suitable for
// anything but local experimentation.

struct Splitmix64 {
    state: u64,
}

impl Splitmix64 {
    fn seeded() -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E3779B97F4A7C15);
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

impl RandomPort for Splitmix64 {
    fn fill(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

// ── Announce port: logs what a real mDNS/advertisement adapter would push

struct LogAnnouncePort;

impl AnnouncePort for LogAnnouncePort {
    fn refresh(&mut self, cfg: &Config) {
        info!("announce: cn={} gsn={} paired={}", cfg.config_num, cfg.gsn, cfg.status_flags.is_paired());
    }
}

// ── Per-process request rate limiter ─────────────────────────────
//
// Grounded on the teacher's RPC session rate limiter (10 tokens/sec, burst
// 10) — here it gates the whole IP transport rather than one RPC session,
// since this demo serves one connection at a time.

fn process_clock() -> Duration {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed()
}

fn build_accessory(cfg: &Config) -> Result<Db> {
    let mut db = Db::new();
    let mut accessory = Accessory::new();
    accessory
        .add(services::accessory_information(
            &cfg.manufacturer,
            &cfg.model,
            &cfg.serial_number,
            &cfg.firmware_revision,
            &cfg.hardware_revision,
        ))
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    accessory.add(services::protocol_information()).map_err(|e| anyhow::anyhow!("{e}"))?;
    accessory.add(services::pairing_service()).map_err(|e| anyhow::anyhow!("{e}"))?;
    accessory.add(services::lightbulb_service(false)).map_err(|e| anyhow::anyhow!("{e}"))?;
    db.add(accessory).map_err(|e| anyhow::anyhow!("{e}"))?;
    db.assign_iids();
    Ok(db)
}

fn handle_connection(
    mut stream: TcpStream,
    engine: &mut PairingEngine,
    db: &mut Db,
    cfg: &mut Config,
    rng: &mut dyn RandomPort,
    announce: &mut dyn AnnouncePort,
    settings: &mut dyn SettingsPort,
    clock: &StdClock,
    limiter: &mut burster::TokenBucket<fn() -> Duration>,
) -> std::io::Result<()> {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown".into());
    info!("connection from {peer}");

    let mut http = ip::RequestAssembler::new();
    let mut frames = ip::FrameAssembler::new();
    let mut raw = [0u8; 4096];

    loop {
        let n = stream.read(&mut raw)?;
        if n == 0 {
            info!("{peer} disconnected");
            return Ok(());
        }

        let plaintext = if let Some(session) = engine.session_mut().filter(|s| s.is_secured()) {
            match frames.feed(&raw[..n], session) {
                Ok(bytes) => bytes,
                Err(status) => {
                    warn!("{peer}: AEAD frame rejected ({status}), closing connection");
                    return Ok(());
                }
            }
        } else {
            raw[..n].to_vec()
        };

        let mut first_chunk = Some(plaintext);
        loop {
            let fed = first_chunk.take().unwrap_or_default();
            let request = match http.feed(&fed) {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(status) => {
                    warn!("{peer}: malformed request ({status}), closing connection");
                    return Ok(());
                }
            };

            if limiter.try_consume(1).is_err() {
                let response = ip::build_response(429, "Too Many Requests", "text/plain", b"rate limited");
                stream.write_all(&response)?;
                continue;
            }

            let now = Millis(clock.now().0);
            let response = ip::route(&request, engine, db, cfg, rng, announce, settings, now);
            let wire = if let Some(session) = engine.session_mut().filter(|s| s.is_secured()) {
                ip::encrypt_frames(session, &response)
            } else {
                response
            };
            stream.write_all(&wire)?;
        }
    }
}

fn main() -> Result<()> {
    init_logging();
    info!("HAP Runtime v{}", env!("CARGO_PKG_VERSION"));

    let defaults = ConfigDefaults {
        name: "Demo Lightbulb",
        model: "HAP-Demo1,1",
        manufacturer: "HAP Runtime Engineering",
        serial_number: "HAPDEMO0001",
        firmware_revision: env!("CARGO_PKG_VERSION"),
        hardware_revision: "host-1.0",
        category: Category::Other,
        tcp_port: 0,
        setup_code: "123-45-678",
    };

    let settings_path = std::env::temp_dir().join("hap-runtime-demo-settings.bin");
    let mut settings = FileSettings::open(settings_path);
    let mut rng = Splitmix64::seeded();
    let mut cfg = Config::init(&mut settings, &mut rng, &defaults);
    info!("config loaded: cn={} paired={}", cfg.config_num, cfg.status_flags.is_paired());

    let mut db = build_accessory(&cfg).context("building the demo accessory tree")?;

    let modulus = Modulus::hap_3072();
    let mut engine = PairingEngine::new(&modulus);
    let mut announce = LogAnnouncePort;
    let clock = StdClock::new();
    let mut limiter = burster::TokenBucket::new_with_time_provider(10, 10, process_clock as fn() -> Duration);

    let listener = TcpListener::bind(("0.0.0.0", cfg.tcp_port)).context("binding the HAP IP listener")?;
    cfg.tcp_port = listener.local_addr()?.port();
    info!("listening on 0.0.0.0:{} — setup code {}", cfg.tcp_port, cfg.setup_code);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        if let Err(e) =
            handle_connection(stream, &mut engine, &mut db, &mut cfg, &mut rng, &mut announce, &mut settings, &clock, &mut limiter)
        {
            warn!("connection error: {e}");
        }
    }

    Ok(())
}
