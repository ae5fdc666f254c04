//! Mandatory HAP services (spec.md §3 "the first accessory always exposes
//! the Accessory-Information service"; §4.5 pairing characteristics) and a
//! demo application characteristic, grounded on
//! `original_source/Hap/HapAppleServices.h` and
//! `original_source/Hap/HapAppleCharacteristics.h`'s short-UUID catalogue.

use crate::model::characteristic::{Characteristic, Permissions};
use crate::model::property::Format;
use crate::model::service::Service;
use crate::model::uuid::short;

// Accessory Information (UUID 0x3E) characteristic types.
const TYPE_IDENTIFY: u32 = 0x14;
const TYPE_MANUFACTURER: u32 = 0x20;
const TYPE_MODEL: u32 = 0x21;
const TYPE_NAME: u32 = 0x23;
const TYPE_SERIAL_NUMBER: u32 = 0x30;
const TYPE_FIRMWARE_REVISION: u32 = 0x52;
const TYPE_HARDWARE_REVISION: u32 = 0x53;

const SVC_ACCESSORY_INFORMATION: u32 = 0x3E;
const SVC_PROTOCOL_INFORMATION: u32 = 0xA2;
const TYPE_VERSION: u32 = 0x37;

// Pairing service and characteristic types (HAP R2 public characteristic
// UUID table; not present in the retrieved original_source pairing header,
// which only covers the TLV state machine, not its GATT/HTTP exposure).
const SVC_PAIRING: u32 = 0x55;
const TYPE_PAIR_SETUP: u32 = 0x4C;
const TYPE_PAIR_VERIFY: u32 = 0x4E;
const TYPE_PAIRING_FEATURES: u32 = 0x4F;
const TYPE_PAIRING_PAIRINGS: u32 = 0x50;

const TYPE_ON: u32 = 0x25;
const SVC_LIGHTBULB: u32 = 0x43;

fn string_char(type_id: u32, value: &str) -> Characteristic {
    Characteristic::new(short(type_id), Format::String, Permissions(Permissions::PAIRED_READ)).with_value(value.as_bytes())
}

/// Accessory Information service: `Identify`, `Manufacturer`, `Model`,
/// `Name`, `SerialNumber`, `FirmwareRevision`, `HardwareRevision`.
pub fn accessory_information(manufacturer: &str, model: &str, serial: &str, firmware: &str, hardware: &str) -> Service {
    let mut svc = Service::new(short(SVC_ACCESSORY_INFORMATION)).primary(true);
    svc.add(Characteristic::new(short(TYPE_IDENTIFY), Format::Bool, Permissions(Permissions::PAIRED_WRITE)).with_value(&[0]))
        .unwrap();
    svc.add(string_char(TYPE_MANUFACTURER, manufacturer)).unwrap();
    svc.add(string_char(TYPE_MODEL, model)).unwrap();
    svc.add(string_char(TYPE_NAME, model)).unwrap();
    svc.add(string_char(TYPE_SERIAL_NUMBER, serial)).unwrap();
    svc.add(string_char(TYPE_FIRMWARE_REVISION, firmware)).unwrap();
    svc.add(string_char(TYPE_HARDWARE_REVISION, hardware)).unwrap();
    svc
}

/// HAP Protocol Information service: the single `Version` characteristic,
/// fixed at `"1.1.0"` for every HAP R2 accessory.
pub fn protocol_information() -> Service {
    let mut svc = Service::new(short(SVC_PROTOCOL_INFORMATION));
    svc.add(
        Characteristic::new(short(TYPE_VERSION), Format::String, Permissions(Permissions::PAIRED_READ))
            .with_value(b"1.1.0"),
    )
    .unwrap();
    svc
}

/// Pairing service: `Pair Setup`, `Pair Verify`, `Pairing Features`,
/// `Pairing Pairings` — the four characteristics the pairing dispatcher
/// (spec.md §4.5) is reached through on the IP/BLE transports.
pub fn pairing_service() -> Service {
    let mut svc = Service::new(short(SVC_PAIRING));
    let rw = Permissions(Permissions::PAIRED_READ | Permissions::PAIRED_WRITE);
    svc.add(Characteristic::new(short(TYPE_PAIR_SETUP), Format::Tlv, rw)).unwrap();
    svc.add(Characteristic::new(short(TYPE_PAIR_VERIFY), Format::Tlv, rw)).unwrap();
    svc.add(
        Characteristic::new(short(TYPE_PAIRING_FEATURES), Format::Uint8, Permissions(Permissions::PAIRED_READ))
            .with_value(&[0]),
    )
    .unwrap();
    svc.add(Characteristic::new(short(TYPE_PAIRING_PAIRINGS), Format::Tlv, rw)).unwrap();
    svc
}

/// Demo `On` characteristic (Lightbulb service, UUID 0x43) used by the
/// end-to-end scenarios (spec.md §8 scenario 2). Supports paired read,
/// paired write, and connected events.
pub fn on_characteristic(initial: bool) -> Characteristic {
    let perm = Permissions(Permissions::PAIRED_READ | Permissions::PAIRED_WRITE | Permissions::CONNECTED_EVENT);
    Characteristic::new(short(TYPE_ON), Format::Bool, perm).with_value(&[u8::from(initial)])
}

pub fn lightbulb_service(initial: bool) -> Service {
    let mut svc = Service::new(short(SVC_LIGHTBULB));
    svc.add(on_characteristic(initial)).unwrap();
    svc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessory_information_has_seven_characteristics() {
        let svc = accessory_information("Acme", "HAP1,1", "0001", "1.0.0", "1.0");
        assert_eq!(svc.characteristics().count(), 7);
        assert!(svc.is_primary());
    }

    #[test]
    fn protocol_information_reports_hap_version() {
        let svc = protocol_information();
        let version = svc.characteristics().next().unwrap();
        assert_eq!(version.value(), b"1.1.0");
    }

    #[test]
    fn pairing_service_exposes_four_characteristics() {
        let svc = pairing_service();
        assert_eq!(svc.characteristics().count(), 4);
    }

    #[test]
    fn on_characteristic_starts_at_requested_value() {
        let ch = on_characteristic(true);
        assert_eq!(ch.value(), &[1]);
    }
}
