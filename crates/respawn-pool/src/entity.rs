//! Entity identifiers and pool handles.
//!
//! An [`EntityId`] is the registry id a pool assigns to an entity when it is
//! created or admitted. Ids start at 1; 0 is reserved as "unassigned" and can
//! never be constructed as an `EntityId`.
//!
//! A [`Handle`] is what callers hold after a checkout. It packs the owning
//! pool's [`PoolTag`] in the high 32 bits and the entity id in the low 32
//! bits, so a handle minted by one pool is rejected by every other pool even
//! when the ids collide.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A registry id. Always `>= 1`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(NonZeroU32);

impl EntityId {
    /// The first id a registry hands out.
    pub const FIRST: EntityId = EntityId(NonZeroU32::MIN);

    /// Build an id from its raw value. Returns `None` for the reserved 0.
    #[inline]
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Raw `u32` representation.
    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// The id issued after this one, or `None` on overflow.
    #[inline]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.get())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.get())
    }
}

// ---------------------------------------------------------------------------
// PoolTag
// ---------------------------------------------------------------------------

static NEXT_POOL_TAG: AtomicU32 = AtomicU32::new(1);

/// Identity of one pool instance within the process.
///
/// Entities keep their owner's tag as a non-owning back-reference. The tag is
/// only ever compared, never dereferenced.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolTag(NonZeroU32);

impl PoolTag {
    /// Allocate a tag no other pool in this process has.
    pub fn fresh() -> Self {
        let raw = NEXT_POOL_TAG.fetch_add(1, Ordering::Relaxed);
        // Wrapping past u32::MAX pools is not a supported workload.
        Self(NonZeroU32::new(raw).unwrap_or(NonZeroU32::MIN))
    }

    /// Raw `u32` representation.
    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Debug for PoolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolTag({})", self.get())
    }
}

impl fmt::Display for PoolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool{}", self.get())
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A caller-side reference to a pooled entity.
///
/// Layout: `[pool tag: u32 | entity id: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle(u64);

impl Handle {
    /// Construct a handle from its owning pool and entity id.
    #[inline]
    pub fn new(pool: PoolTag, id: EntityId) -> Self {
        Self((pool.get() as u64) << 32 | id.get() as u64)
    }

    /// The entity id portion (low 32 bits).
    #[inline]
    pub fn id(self) -> EntityId {
        // The low half was built from a non-zero id.
        EntityId::new(self.0 as u32).unwrap_or(EntityId::FIRST)
    }

    /// The owning pool portion (high 32 bits).
    #[inline]
    pub fn pool(self) -> PoolTag {
        PoolTag(NonZeroU32::new((self.0 >> 32) as u32).unwrap_or(NonZeroU32::MIN))
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`. Returns `None` if either half is zero.
    pub fn from_raw(raw: u64) -> Option<Self> {
        let id = EntityId::new(raw as u32)?;
        let pool = PoolTag(NonZeroU32::new((raw >> 32) as u32)?);
        Some(Self::new(pool, id))
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}@{})", self.id().get(), self.pool().get())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id(), self.pool())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_an_id() {
        assert!(EntityId::new(0).is_none());
        assert_eq!(EntityId::new(1), Some(EntityId::FIRST));
    }

    #[test]
    fn next_id_increments() {
        let id = EntityId::FIRST;
        assert_eq!(id.next().map(EntityId::get), Some(2));
        assert!(EntityId::new(u32::MAX).and_then(EntityId::next).is_none());
    }

    #[test]
    fn fresh_pool_tags_are_distinct() {
        let a = PoolTag::fresh();
        let b = PoolTag::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn handle_packs_pool_and_id() {
        let pool = PoolTag::fresh();
        let id = EntityId::new(42).unwrap();
        let handle = Handle::new(pool, id);
        assert_eq!(handle.id(), id);
        assert_eq!(handle.pool(), pool);
        assert_eq!(Handle::from_raw(handle.to_raw()), Some(handle));
    }

    #[test]
    fn handles_from_different_pools_differ() {
        let id = EntityId::new(3).unwrap();
        let a = Handle::new(PoolTag::fresh(), id);
        let b = Handle::new(PoolTag::fresh(), id);
        assert_ne!(a, b);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn raw_with_zero_half_is_rejected() {
        assert!(Handle::from_raw(0).is_none());
        assert!(Handle::from_raw(1).is_none());
        assert!(Handle::from_raw(1 << 32).is_none());
    }
}
