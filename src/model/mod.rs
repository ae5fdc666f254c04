//! Accessory data model (spec.md §3, §4.4): Property, Characteristic,
//! Service, Accessory, Db, plus the mandatory services every accessory
//! exposes.

pub mod accessory;
pub mod characteristic;
pub mod db;
pub mod property;
pub mod service;
pub mod services;
pub mod uuid;

pub use accessory::Accessory;
pub use characteristic::{Characteristic, Indication, Permissions};
pub use db::Db;
pub use property::{Format, Property, PropertyType};
pub use service::Service;
pub use uuid::Uuid;
