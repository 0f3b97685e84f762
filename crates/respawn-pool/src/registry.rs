//! Identity registry: id issuance and id → entity resolution.
//!
//! The registry owns every entity its pool has ever created or admitted.
//! Ids are issued sequentially from 1 and never reused, so the registry's
//! size is the pool's capacity. Entries are kept in id order, which makes
//! frame updates visit entities deterministically.

use std::collections::BTreeMap;

use crate::entity::{EntityId, Handle, PoolTag};
use crate::lifecycle::Entity;
use crate::{PoolError, PoolResult};

/// Maps ids to the entities a single pool owns.
#[derive(Debug)]
pub struct IdentityRegistry {
    /// The pool every handle must carry.
    tag: PoolTag,
    entries: BTreeMap<EntityId, Entity>,
    /// Next id to issue.
    next_id: EntityId,
}

impl IdentityRegistry {
    /// Create an empty registry for the pool tagged `tag`.
    pub fn new(tag: PoolTag) -> Self {
        Self {
            tag,
            entries: BTreeMap::new(),
            next_id: EntityId::FIRST,
        }
    }

    /// The tag stamped into every handle this registry mints.
    pub fn tag(&self) -> PoolTag {
        self.tag
    }

    /// Issue the next id.
    ///
    /// # Panics
    ///
    /// Panics once `u32::MAX` ids have been issued.
    pub fn issue(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id = id
            .next()
            .unwrap_or_else(|| panic!("{} exhausted its id space", self.tag));
        id
    }

    /// Insert `entity` under `id`.
    ///
    /// Fails with [`PoolError::DuplicateRegistration`] if the id is taken,
    /// leaving the existing entry in place.
    pub fn register(&mut self, id: EntityId, entity: Entity) -> PoolResult<()> {
        if self.entries.contains_key(&id) {
            return Err(PoolError::DuplicateRegistration { id });
        }
        self.entries.insert(id, entity);
        Ok(())
    }

    /// Initialize `entity` with a fresh id and register it.
    ///
    /// Entities that already carry an id are rejected: with
    /// [`PoolError::DuplicateRegistration`] when this registry knows the id,
    /// with [`PoolError::ForeignObject`] otherwise.
    pub fn admit(&mut self, mut entity: Entity) -> PoolResult<EntityId> {
        if let Some(existing) = entity.id() {
            if self.entries.contains_key(&existing) {
                return Err(PoolError::DuplicateRegistration { id: existing });
            }
            let owner = entity.owner().unwrap_or(self.tag);
            return Err(PoolError::ForeignObject {
                handle: Handle::new(owner, existing),
            });
        }
        let id = self.issue();
        entity.initialize(id, self.tag);
        self.register(id, entity)?;
        Ok(id)
    }

    /// Resolve a handle to its id, checking that it was minted by this
    /// registry's pool and that the id is registered.
    pub fn resolve(&self, handle: Handle) -> PoolResult<EntityId> {
        let id = handle.id();
        if handle.pool() != self.tag || !self.entries.contains_key(&id) {
            return Err(PoolError::ForeignObject { handle });
        }
        Ok(id)
    }

    /// The handle callers use for `id`.
    pub fn handle(&self, id: EntityId) -> Handle {
        Handle::new(self.tag, id)
    }

    /// The entity registered under `id`.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entries.get(&id)
    }

    /// Mutable access to the entity registered under `id`.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entries.get_mut(&id)
    }

    /// Whether `id` is registered here.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entity has been admitted yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entries.keys().copied()
    }

    /// Entities in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    /// Mutable entities in ascending id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut Entity)> {
        self.entries.iter_mut().map(|(id, e)| (*id, e))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Behavior;

    struct Dummy;
    impl Behavior for Dummy {}

    #[test]
    fn ids_are_sequential_from_one() {
        let mut registry = IdentityRegistry::new(PoolTag::fresh());
        let ids: Vec<u32> = (0..5)
            .map(|_| registry.admit(Entity::new(Dummy)).unwrap().get())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn admitted_entities_are_initialized_and_owned() {
        let tag = PoolTag::fresh();
        let mut registry = IdentityRegistry::new(tag);
        let id = registry.admit(Entity::new(Dummy)).unwrap();
        let entity = registry.get(id).unwrap();
        assert_eq!(entity.id(), Some(id));
        assert_eq!(entity.owner(), Some(tag));
    }

    #[test]
    fn register_rejects_taken_id() {
        let mut registry = IdentityRegistry::new(PoolTag::fresh());
        let id = registry.admit(Entity::new(Dummy)).unwrap();
        let err = registry.register(id, Entity::new(Dummy)).unwrap_err();
        assert!(matches!(err, PoolError::DuplicateRegistration { id: dup } if dup == id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn admit_rejects_entity_with_known_id() {
        let tag = PoolTag::fresh();
        let mut registry = IdentityRegistry::new(tag);
        let id = registry.admit(Entity::new(Dummy)).unwrap();

        let mut impostor = Entity::new(Dummy);
        impostor.initialize(id, tag);
        let err = registry.admit(impostor).unwrap_err();
        assert!(matches!(err, PoolError::DuplicateRegistration { .. }));
    }

    #[test]
    fn admit_rejects_entity_initialized_elsewhere() {
        let mut registry = IdentityRegistry::new(PoolTag::fresh());
        let mut stray = Entity::new(Dummy);
        stray.initialize(EntityId::new(40).unwrap(), PoolTag::fresh());
        let err = registry.admit(stray).unwrap_err();
        assert!(matches!(err, PoolError::ForeignObject { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn resolve_checks_pool_and_membership() {
        let tag = PoolTag::fresh();
        let mut registry = IdentityRegistry::new(tag);
        let id = registry.admit(Entity::new(Dummy)).unwrap();

        assert_eq!(registry.resolve(registry.handle(id)).unwrap(), id);

        let unknown = Handle::new(tag, EntityId::new(99).unwrap());
        assert!(matches!(
            registry.resolve(unknown),
            Err(PoolError::ForeignObject { .. })
        ));

        let other_pool = Handle::new(PoolTag::fresh(), id);
        assert!(matches!(
            registry.resolve(other_pool),
            Err(PoolError::ForeignObject { .. })
        ));
    }
}
