//! Service (spec.md §3): a UUID-identified ordered collection of
//! Characteristics with a service-wide IID and a small Properties bag.

use crate::error::BufferError;
use crate::model::characteristic::Characteristic;
use crate::model::uuid::Uuid;

/// Reserve space for 8 characteristics per service — matches the largest
/// mandatory service (Accessory Information).
pub const MAX_CHARACTERISTICS: usize = 8;
pub const MAX_LINKED_SERVICES: usize = 4;

pub struct Service {
    iid: u16,
    type_uuid: Uuid,
    primary: bool,
    hidden: bool,
    linked: heapless::Vec<u16, MAX_LINKED_SERVICES>,
    characteristics: heapless::Vec<Characteristic, MAX_CHARACTERISTICS>,
}

impl Service {
    pub fn new(type_uuid: Uuid) -> Self {
        Self {
            iid: 0,
            type_uuid,
            primary: false,
            hidden: false,
            linked: heapless::Vec::new(),
            characteristics: heapless::Vec::new(),
        }
    }

    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// `add(ch)` (spec.md §4.4).
    pub fn add(&mut self, characteristic: Characteristic) -> Result<(), BufferError> {
        self.characteristics.push(characteristic).map_err(|_| BufferError::CapacityExceeded)
    }

    pub fn link(&mut self, svc_iid: u16) -> Result<(), BufferError> {
        self.linked.push(svc_iid).map_err(|_| BufferError::CapacityExceeded)
    }

    pub fn iid(&self) -> u16 {
        self.iid
    }

    pub(crate) fn set_iid(&mut self, iid: u16) {
        self.iid = iid;
    }

    pub fn uuid(&self) -> Uuid {
        self.type_uuid
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn linked_services(&self) -> &[u16] {
        &self.linked
    }

    /// `forEachChar` (spec.md §4.4).
    pub fn characteristics(&self) -> impl Iterator<Item = &Characteristic> {
        self.characteristics.iter()
    }

    pub fn characteristics_mut(&mut self) -> impl Iterator<Item = &mut Characteristic> {
        self.characteristics.iter_mut()
    }

    pub fn find(&self, iid: u16) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.iid() == iid)
    }

    pub fn find_mut(&mut self, iid: u16) -> Option<&mut Characteristic> {
        self.characteristics.iter_mut().find(|c| c.iid() == iid)
    }
}
