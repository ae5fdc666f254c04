//! Pairings table (spec.md §3): a fixed-size table of 16 Controllers,
//! guarded by a single writer. `perm == None` iff the slot is empty;
//! duplicate controller IDs across slots are rejected.

use crate::error::PairError;

pub const MAX_PAIRINGS: usize = 16;
pub const MAX_ID_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Perm {
    None = 0,
    Regular = 1,
    Admin = 2,
}

impl Perm {
    pub fn from_byte(b: u8) -> Perm {
        if b == 1 { Perm::Admin } else { Perm::Regular }
    }
}

/// A controller identifier (≤36 bytes), long-term public key, and
/// permission level (spec.md §3 Controller).
#[derive(Clone, Copy)]
pub struct Controller {
    id: [u8; MAX_ID_LEN],
    id_len: u8,
    public_key: [u8; 32],
    perm: Perm,
}

impl Controller {
    const fn empty() -> Self {
        Self { id: [0; MAX_ID_LEN], id_len: 0, public_key: [0; 32], perm: Perm::None }
    }

    pub fn id(&self) -> &[u8] {
        &self.id[..self.id_len as usize]
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    pub fn perm(&self) -> Perm {
        self.perm
    }

    pub fn is_admin(&self) -> bool {
        self.perm == Perm::Admin
    }
}

pub struct Pairings {
    slots: [Controller; MAX_PAIRINGS],
}

impl Pairings {
    pub fn new() -> Self {
        Self { slots: [Controller::empty(); MAX_PAIRINGS] }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|c| c.perm == Perm::None)
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|c| c.perm != Perm::None).count()
    }

    pub fn find(&self, id: &[u8]) -> Option<&Controller> {
        self.slots.iter().find(|c| c.perm != Perm::None && c.id() == id)
    }

    /// Insert a new controller. Rejects an `id` already present (even with
    /// different permission/key) and a full table.
    pub fn add(&mut self, id: &[u8], public_key: [u8; 32], perm: Perm) -> Result<(), PairError> {
        if id.is_empty() || id.len() > MAX_ID_LEN {
            return Err(PairError::Unknown);
        }
        if self.find(id).is_some() {
            return Err(PairError::Unknown);
        }
        let slot = self.slots.iter_mut().find(|c| c.perm == Perm::None).ok_or(PairError::MaxPeers)?;
        let mut buf = [0u8; MAX_ID_LEN];
        buf[..id.len()].copy_from_slice(id);
        slot.id = buf;
        slot.id_len = id.len() as u8;
        slot.public_key = public_key;
        slot.perm = perm;
        Ok(())
    }

    /// Remove a controller by id. Returns whether anything was removed.
    pub fn remove(&mut self, id: &[u8]) -> bool {
        match self.slots.iter_mut().find(|c| c.perm != Perm::None && c.id() == id) {
            Some(slot) => {
                *slot = Controller::empty();
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Controller> {
        self.slots.iter().filter(|c| c.perm != Perm::None)
    }
}

impl Default for Pairings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_find_round_trips() {
        let mut table = Pairings::new();
        table.add(b"controller-1", [7; 32], Perm::Admin).unwrap();
        let found = table.find(b"controller-1").unwrap();
        assert_eq!(found.public_key(), &[7; 32]);
        assert!(found.is_admin());
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut table = Pairings::new();
        table.add(b"dup", [1; 32], Perm::Admin).unwrap();
        assert_eq!(table.add(b"dup", [2; 32], Perm::Regular), Err(PairError::Unknown));
    }

    #[test]
    fn table_rejects_insert_past_sixteen_slots() {
        let mut table = Pairings::new();
        for i in 0..MAX_PAIRINGS {
            let id = [i as u8; 4];
            table.add(&id, [0; 32], Perm::Regular).unwrap();
        }
        assert_eq!(table.add(b"one-too-many", [0; 32], Perm::Regular), Err(PairError::MaxPeers));
    }

    #[test]
    fn remove_frees_the_slot_for_reuse() {
        let mut table = Pairings::new();
        table.add(b"a", [1; 32], Perm::Admin).unwrap();
        assert!(table.remove(b"a"));
        assert!(table.is_empty());
        assert!(!table.remove(b"a"));
        table.add(b"a", [2; 32], Perm::Regular).unwrap();
        assert_eq!(table.find(b"a").unwrap().public_key(), &[2; 32]);
    }
}
