//! Db (spec.md §3, §4.4): the root holding one or more Accessories, and
//! the IID/AID assignment walk.

use crate::error::BufferError;
use crate::model::accessory::Accessory;
use crate::model::characteristic::Characteristic;

pub const MAX_ACCESSORIES: usize = 4;

pub struct Db {
    accessories: heapless::Vec<Accessory, MAX_ACCESSORIES>,
}

impl Db {
    pub fn new() -> Self {
        Self { accessories: heapless::Vec::new() }
    }

    /// Add an accessory, assigning it the next AID (1 for the first
    /// accessory, the primary one per spec.md §3).
    pub fn add(&mut self, mut accessory: Accessory) -> Result<u64, BufferError> {
        let aid = self.accessories.len() as u64 + 1;
        accessory.set_aid(aid);
        self.accessories.push(accessory).map_err(|_| BufferError::CapacityExceeded)?;
        Ok(aid)
    }

    pub fn accessories(&self) -> impl Iterator<Item = &Accessory> {
        self.accessories.iter()
    }

    pub fn accessories_mut(&mut self) -> impl Iterator<Item = &mut Accessory> {
        self.accessories.iter_mut()
    }

    /// `setId()` (spec.md §4.4): walk the tree in declaration order,
    /// assigning `iid = 1..N` and bumping across accessories, returning
    /// the next free IID. IIDs are stable across reboots as long as the
    /// configuration number is unchanged (spec.md §3 Db invariant) —
    /// callers must only call this once per structural change and bump
    /// `Config::config_num` alongside it.
    pub fn assign_iids(&mut self) -> u16 {
        let mut next_iid: u16 = 1;
        for accessory in &mut self.accessories {
            for service in accessory.services_mut() {
                service.set_iid(next_iid);
                next_iid += 1;
                for characteristic in service.characteristics_mut() {
                    characteristic.set_iid(next_iid);
                    next_iid += 1;
                }
            }
        }
        next_iid
    }

    pub fn find_accessory(&self, aid: u64) -> Option<&Accessory> {
        self.accessories.iter().find(|a| a.aid() == aid)
    }

    pub fn find_characteristic_mut(&mut self, aid: u64, iid: u16) -> Option<&mut Characteristic> {
        let accessory = self.accessories.iter_mut().find(|a| a.aid() == aid)?;
        accessory.services_mut().find_map(|s| s.find_mut(iid))
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}
