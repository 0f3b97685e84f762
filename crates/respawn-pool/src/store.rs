//! Stores of currently available entities.
//!
//! A [`Store`] only tracks ids; the entities themselves live in the
//! [`IdentityRegistry`](crate::registry::IdentityRegistry). Two strategies are
//! provided:
//!
//! - [`StackStore`]: one LIFO free list per behavior kind. Push and typed pop
//!   are O(1); an untyped pop compares the tops of the per-kind stacks and
//!   takes the most recently pushed one, so reuse is most-recently-returned
//!   first across kinds as well.
//! - [`ScanStore`]: one flat slot array searched front to back for the first
//!   available entity. O(n) per checkout, but slot indices are stable: new
//!   entities are appended and existing slots never move.

use std::collections::{HashMap, HashSet};

use crate::entity::EntityId;
use crate::lifecycle::KindTag;

/// The availability set of a pool.
pub trait Store {
    /// Mark `id` available. Returns `false` if it already was.
    fn push(&mut self, id: EntityId, kind: KindTag) -> bool;

    /// Remove and return an available id, restricted to `kind` when given.
    fn take(&mut self, kind: Option<KindTag>) -> Option<EntityId>;

    /// Withdraw a specific id. Returns whether it was available.
    fn remove(&mut self, id: EntityId) -> bool;

    /// Whether `id` is currently available.
    fn contains(&self, id: EntityId) -> bool;

    /// Number of available ids.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of available ids of `kind`.
    fn len_of(&self, kind: KindTag) -> usize;

    /// All available ids, in no particular order.
    fn available(&self) -> Vec<EntityId>;
}

// ---------------------------------------------------------------------------
// StackStore
// ---------------------------------------------------------------------------

/// Per-kind LIFO free lists.
#[derive(Debug, Default)]
pub struct StackStore {
    /// Each entry carries the push sequence number it was stored with.
    free: HashMap<KindTag, Vec<(u64, EntityId)>>,
    members: HashSet<EntityId>,
    next_seq: u64,
}

impl StackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for StackStore {
    fn push(&mut self, id: EntityId, kind: KindTag) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.next_seq += 1;
        self.free
            .entry(kind)
            .or_default()
            .push((self.next_seq, id));
        true
    }

    fn take(&mut self, kind: Option<KindTag>) -> Option<EntityId> {
        let stack = match kind {
            Some(kind) => self.free.get_mut(&kind)?,
            None => self
                .free
                .values_mut()
                .filter(|stack| !stack.is_empty())
                .max_by_key(|stack| stack.last().map(|(seq, _)| *seq))?,
        };
        let (_, id) = stack.pop()?;
        self.members.remove(&id);
        Some(id)
    }

    fn remove(&mut self, id: EntityId) -> bool {
        if !self.members.remove(&id) {
            return false;
        }
        for stack in self.free.values_mut() {
            if let Some(pos) = stack.iter().position(|(_, stored)| *stored == id) {
                stack.remove(pos);
                break;
            }
        }
        true
    }

    fn contains(&self, id: EntityId) -> bool {
        self.members.contains(&id)
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn len_of(&self, kind: KindTag) -> usize {
        self.free.get(&kind).map_or(0, Vec::len)
    }

    fn available(&self) -> Vec<EntityId> {
        self.members.iter().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// ScanStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Slot {
    id: EntityId,
    kind: KindTag,
    available: bool,
}

/// Flat slot array with linear search.
#[derive(Debug, Default)]
pub struct ScanStore {
    slots: Vec<Slot>,
    index: HashMap<EntityId, usize>,
    available: usize,
}

impl ScanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot index `id` occupies. Stable for the life of the store.
    pub fn slot_of(&self, id: EntityId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Total slots, available or not.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

impl Store for ScanStore {
    fn push(&mut self, id: EntityId, kind: KindTag) -> bool {
        match self.index.get(&id) {
            Some(&slot) => {
                let slot = &mut self.slots[slot];
                if slot.available {
                    return false;
                }
                slot.available = true;
            }
            None => {
                self.index.insert(id, self.slots.len());
                self.slots.push(Slot {
                    id,
                    kind,
                    available: true,
                });
            }
        }
        self.available += 1;
        true
    }

    fn take(&mut self, kind: Option<KindTag>) -> Option<EntityId> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.available && kind.map_or(true, |k| k == slot.kind))?;
        slot.available = false;
        self.available -= 1;
        Some(slot.id)
    }

    fn remove(&mut self, id: EntityId) -> bool {
        let Some(&slot) = self.index.get(&id) else {
            return false;
        };
        let slot = &mut self.slots[slot];
        if !slot.available {
            return false;
        }
        slot.available = false;
        self.available -= 1;
        true
    }

    fn contains(&self, id: EntityId) -> bool {
        self.index
            .get(&id)
            .is_some_and(|&slot| self.slots[slot].available)
    }

    fn len(&self) -> usize {
        self.available
    }

    fn len_of(&self, kind: KindTag) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.available && slot.kind == kind)
            .count()
    }

    fn available(&self) -> Vec<EntityId> {
        self.slots
            .iter()
            .filter(|slot| slot.available)
            .map(|slot| slot.id)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
