//! Characteristic (spec.md §3, §4.4): a named, UUID-identified group of
//! Properties with read/write handlers and event bookkeeping.

use crate::error::HapStatus;
use crate::model::property::{Format, Property, PropertyType, MAX_PROPERTY_LEN};
use crate::model::uuid::Uuid;
use crate::tlv::Buf;

type Result<T> = core::result::Result<T, HapStatus>;

/// Characteristic permission flags (spec.md §3): `pr`=paired-read,
/// `pw`=paired-write, `rd`=unauthenticated-read, `wr`=unauthenticated-write,
/// `ev`=connected-event, `de`=disconnected-event, `bn`=broadcast-notify,
/// `aa`=additional-authorization, `tw`=timed-write, `hd`=hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions(pub u16);

impl Permissions {
    pub const PAIRED_READ: u16 = 1 << 0;
    pub const PAIRED_WRITE: u16 = 1 << 1;
    pub const UNAUTH_READ: u16 = 1 << 2;
    pub const UNAUTH_WRITE: u16 = 1 << 3;
    pub const CONNECTED_EVENT: u16 = 1 << 4;
    pub const DISCONNECTED_EVENT: u16 = 1 << 5;
    pub const BROADCAST_NOTIFY: u16 = 1 << 6;
    pub const ADDITIONAL_AUTH: u16 = 1 << 7;
    pub const TIMED_WRITE: u16 = 1 << 8;
    pub const HIDDEN: u16 = 1 << 9;

    pub fn has(self, flag: u16) -> bool {
        self.0 & flag != 0
    }
}

/// Indication routing decision produced by [`Characteristic::indicate`]
/// (spec.md §5): which platform event hook the transport layer should
/// drive next. The hook itself lives outside this crate's scope (the GATT
/// indication / broadcast-advertisement machinery is an external
/// collaborator per spec.md §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indication {
    None,
    Connected,
    Broadcast,
    Disconnected,
}

pub type ReadFn = fn(&mut Characteristic, &mut Buf<MAX_PROPERTY_LEN>) -> Result<()>;
pub type WriteFn = fn(&mut Characteristic, &[u8]) -> Result<()>;

/// A timed-write payload staged by a `tw`-flagged write, committed or
/// discarded by its expiry (spec.md §3 Characteristic "pending-write
/// buffer with an expiry timestamp").
pub struct PendingWrite {
    buf: Buf<MAX_PROPERTY_LEN>,
    pub expires_at_ms: u64,
}

pub struct Characteristic {
    iid: u16,
    type_uuid: Uuid,
    format: Format,
    perm: Permissions,
    value: Buf<MAX_PROPERTY_LEN>,
    description: Option<&'static str>,
    connected_event_enabled: bool,
    broadcast_event_enabled: bool,
    broadcast_interval_ms: u32,
    on_read: Option<ReadFn>,
    on_write: Option<WriteFn>,
    pending_write: Option<PendingWrite>,
}

impl Characteristic {
    pub fn new(type_uuid: Uuid, format: Format, perm: Permissions) -> Self {
        Self {
            iid: 0,
            type_uuid,
            format,
            perm,
            value: Buf::new(),
            description: None,
            connected_event_enabled: false,
            broadcast_event_enabled: false,
            broadcast_interval_ms: 0,
            on_read: None,
            on_write: None,
            pending_write: None,
        }
    }

    pub fn with_value(mut self, bytes: &[u8]) -> Self {
        self.value.clear();
        let _ = self.value.append(bytes);
        self
    }

    pub fn with_description(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_on_read(mut self, f: ReadFn) -> Self {
        self.on_read = Some(f);
        self
    }

    pub fn with_on_write(mut self, f: WriteFn) -> Self {
        self.on_write = Some(f);
        self
    }

    pub fn iid(&self) -> u16 {
        self.iid
    }

    /// Assigned once by [`crate::model::db::Db::assign_iids`].
    pub(crate) fn set_iid(&mut self, iid: u16) {
        self.iid = iid;
    }

    pub fn uuid(&self) -> Uuid {
        self.type_uuid
    }

    pub fn perm(&self) -> Permissions {
        self.perm
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn value(&self) -> &[u8] {
        self.value.as_bytes()
    }

    /// Project one of this Characteristic's attributes as a [`Property`]
    /// view (see `model::property` module docs). Returns `None` for
    /// optional attributes that weren't configured.
    pub fn property(&self, ptype: PropertyType) -> Option<Property> {
        match ptype {
            PropertyType::Value => Property::new(PropertyType::Value, self.format, self.value.as_bytes()),
            PropertyType::Format => Property::new(PropertyType::Format, Format::FormatTag, &[self.format as u8]),
            PropertyType::Permissions => {
                Property::new(PropertyType::Permissions, Format::Uint16, &self.perm.0.to_le_bytes())
            }
            PropertyType::CharIid => Property::new(PropertyType::CharIid, Format::Iid, &self.iid.to_le_bytes()),
            PropertyType::CharType => Property::new(PropertyType::CharType, Format::Uuid, &self.type_uuid),
            PropertyType::Description => {
                let d = self.description?;
                Property::new(PropertyType::Description, Format::String, d.as_bytes())
            }
            PropertyType::Event => {
                let flags: u8 = u8::from(self.connected_event_enabled) | (u8::from(self.broadcast_event_enabled) << 1);
                Property::new(PropertyType::Event, Format::Uint8, &[flags])
            }
            _ => None,
        }
    }

    /// `Read(op, req, rsp)` (spec.md §4.4): default copies the Value bytes
    /// into `rsp`; a custom `on_read` handler overrides this entirely.
    pub fn read(&mut self, rsp: &mut Buf<MAX_PROPERTY_LEN>) -> Result<()> {
        if let Some(f) = self.on_read {
            return f(self, rsp);
        }
        rsp.append(self.value.as_bytes()).map_err(|_| HapStatus::OutOfResources)
    }

    /// `Write(op, req, rsp)` (spec.md §4.4): default accepts a payload
    /// whose length equals the declared Value length.
    pub fn write(&mut self, req: &[u8]) -> Result<()> {
        if let Some(f) = self.on_write {
            return f(self, req);
        }
        if req.len() != self.value.len() {
            return Err(HapStatus::InvalidValue);
        }
        self.value.clear();
        self.value.append(req).map_err(|_| HapStatus::InvalidValue)
    }

    /// `ConnectedEvent(sess, enable)` (spec.md §4.4).
    pub fn set_connected_event(&mut self, enable: bool) -> Result<()> {
        if enable && !self.perm.has(Permissions::CONNECTED_EVENT) {
            return Err(HapStatus::NotificationNotSupported);
        }
        self.connected_event_enabled = enable;
        Ok(())
    }

    /// `BroadcastEvent(sess, enable, interval)` (spec.md §4.4).
    pub fn set_broadcast_event(&mut self, enable: bool, interval_ms: u32) -> Result<()> {
        if enable && !self.perm.has(Permissions::BROADCAST_NOTIFY) {
            return Err(HapStatus::NotificationNotSupported);
        }
        self.broadcast_event_enabled = enable;
        self.broadcast_interval_ms = interval_ms;
        Ok(())
    }

    /// `Indicate()` (spec.md §4.4): chooses which platform hook applies
    /// once application code has updated `value`, without performing the
    /// I/O itself (that belongs to the transport adapters, spec.md §1).
    pub fn indicate(&self) -> Indication {
        if self.connected_event_enabled {
            Indication::Connected
        } else if self.broadcast_event_enabled {
            Indication::Broadcast
        } else if self.perm.has(Permissions::DISCONNECTED_EVENT) {
            Indication::Disconnected
        } else {
            Indication::None
        }
    }

    /// Stage a timed-write payload (spec.md §3 Procedure / Characteristic
    /// pending-write buffer).
    pub fn begin_timed_write(&mut self, payload: &[u8], expires_at_ms: u64) -> Result<()> {
        if !self.perm.has(Permissions::TIMED_WRITE) {
            return Err(HapStatus::InvalidRequest);
        }
        let buf = Buf::from_slice(payload).map_err(|_| HapStatus::InvalidValue)?;
        self.pending_write = Some(PendingWrite { buf, expires_at_ms });
        Ok(())
    }

    /// Commit a previously staged timed write if it hasn't expired.
    pub fn commit_timed_write(&mut self, now_ms: u64) -> Result<()> {
        let pending = self.pending_write.take().ok_or(HapStatus::InvalidRequest)?;
        if now_ms > pending.expires_at_ms {
            return Err(HapStatus::OperationTimedOut);
        }
        self.write(pending.buf.as_bytes())
    }

    pub fn discard_timed_write(&mut self) {
        self.pending_write = None;
    }
}
