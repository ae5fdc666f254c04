//! Monotonic time source.
//!
//! Session/Procedure timeouts (spec.md §3, §5) and the advertisement dwell
//! timer (§4.6) all need a monotonic clock. On the target device this
//! wraps `embassy_time::Instant`; on host builds (tests, the demo binary)
//! it wraps `std::time::Instant`. Both are exposed behind the same
//! millisecond-resolution API so the rest of the crate never branches on
//! target.

#[cfg(not(target_os = "espidf"))]
use std::time::Instant as StdInstant;

/// Monotonic timestamp in milliseconds since an arbitrary epoch (boot, or
/// process start on host builds). Never compared across processes/reboots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Millis(pub u64);

impl Millis {
    pub const ZERO: Millis = Millis(0);

    pub fn saturating_sub(self, other: Millis) -> u64 {
        self.0.saturating_sub(other.0)
    }

    pub fn add_ms(self, ms: u64) -> Millis {
        Millis(self.0.saturating_add(ms))
    }
}

/// Monotonic clock. A real device wires this to `embassy_time::Instant`;
/// host builds and tests use [`StdClock`].
pub trait Clock {
    fn now(&self) -> Millis;
}

#[cfg(not(target_os = "espidf"))]
pub struct StdClock {
    start: StdInstant,
}

#[cfg(not(target_os = "espidf"))]
impl StdClock {
    pub fn new() -> Self {
        Self {
            start: StdInstant::now(),
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl Clock for StdClock {
    fn now(&self) -> Millis {
        Millis(self.start.elapsed().as_millis() as u64)
    }
}

#[cfg(target_os = "espidf")]
pub struct DeviceClock {
    start: embassy_time::Instant,
}

#[cfg(target_os = "espidf")]
impl DeviceClock {
    pub fn new() -> Self {
        Self {
            start: embassy_time::Instant::now(),
        }
    }
}

#[cfg(target_os = "espidf")]
impl Clock for DeviceClock {
    fn now(&self) -> Millis {
        Millis(embassy_time::Instant::now().duration_since(self.start).as_millis())
    }
}
