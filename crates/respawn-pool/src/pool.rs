//! The pool manager: creation, expansion, checkout and check-in.
//!
//! A [`Pool`] owns an [`IdentityRegistry`] holding every entity it has
//! created or admitted, and a [`Store`] holding the ids that are currently
//! available. The invariants it maintains after every public call:
//!
//! - `capacity() == registry.len()`
//! - an entity is in the store if and only if it is `Inactive`
//! - no id is in the store twice
//!
//! Entities never talk to the pool directly. Every operation that can change
//! an entity's state goes through the pool, which afterwards drains the
//! entity's events and restocks it if it ended `Inactive`.
//!
//! # Example
//!
//! ```
//! use respawn_pool::prelude::*;
//!
//! struct Enemy;
//! impl Behavior for Enemy {}
//!
//! let config = PoolConfig::with_capacity(4).expandable_by(2);
//! let mut pool = Pool::new(config, || Entity::new(Enemy)).unwrap();
//!
//! let handles: Vec<Handle> = (0..5).filter_map(|_| pool.pop()).collect();
//! assert_eq!(handles.len(), 5);
//! assert_eq!(pool.capacity(), 6);
//! assert_eq!(pool.size(), 1);
//!
//! pool.return_entity(handles[0], true).unwrap();
//! assert_eq!(pool.size(), 2);
//! ```

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::{PoolConfig, SpawnParent};
use crate::entity::{EntityId, Handle, PoolTag};
use crate::event::PoolEvent;
use crate::lifecycle::{
    Activation, Behavior, Entity, KindTag, LifecycleState, Parent, Placement, TimerHandle, Vec3,
};
use crate::registry::IdentityRegistry;
use crate::store::{ScanStore, StackStore, Store};
use crate::{PoolError, PoolResult};

/// Builds a new entity each time the pool needs one.
pub type Factory = Box<dyn FnMut() -> Entity>;

/// A pool over the linear-scan store.
pub type ScanPool = Pool<ScanStore>;

// ---------------------------------------------------------------------------
// PoolStats
// ---------------------------------------------------------------------------

/// A point-in-time summary for metrics and inspector layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Entities managed by the pool.
    pub capacity: usize,
    /// Entities in the store.
    pub available: usize,
    /// Entities in `Active`.
    pub active: usize,
    /// Entities in `PendingDeactivation`.
    pub pending: usize,
    /// Number of expansions since creation.
    pub expansions: u64,
    /// Successful checkouts since creation.
    pub checkouts: u64,
    /// Entities pushed back into the store after use.
    pub returns: u64,
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// A pool of reusable entities.
pub struct Pool<S: Store = StackStore> {
    config: PoolConfig,
    registry: IdentityRegistry,
    store: S,
    /// Current number of managed entities.
    capacity: usize,
    factory: Factory,
    events: VecDeque<PoolEvent>,
    expansions: u64,
    checkouts: u64,
    returns: u64,
}

impl Pool<StackStore> {
    /// Create a stack-backed pool and fill it with `config.capacity`
    /// entities from `factory`.
    pub fn new(config: PoolConfig, factory: impl FnMut() -> Entity + 'static) -> PoolResult<Self> {
        Self::with_store(config, StackStore::new(), factory)
    }
}

impl Pool<ScanStore> {
    /// Create a scan-backed pool and fill it with `config.capacity` entities
    /// from `factory`.
    pub fn new_scan(
        config: PoolConfig,
        factory: impl FnMut() -> Entity + 'static,
    ) -> PoolResult<Self> {
        Self::with_store(config, ScanStore::new(), factory)
    }
}

impl<S: Store> Pool<S> {
    /// Create a pool over an explicit store.
    ///
    /// Fails if the config is invalid or the factory hands out an entity that
    /// was already initialized.
    pub fn with_store(
        config: PoolConfig,
        store: S,
        factory: impl FnMut() -> Entity + 'static,
    ) -> PoolResult<Self> {
        config.validate()?;
        let initial = config.capacity;
        let mut pool = Self {
            registry: IdentityRegistry::new(PoolTag::fresh()),
            store,
            capacity: 0,
            factory: Box::new(factory),
            events: VecDeque::new(),
            expansions: 0,
            checkouts: 0,
            returns: 0,
            config,
        };
        for _ in 0..initial {
            pool.create_entity()?;
        }
        debug!(pool = %pool.tag(), capacity = pool.capacity, "pool created");
        Ok(pool)
    }

    // -- accessors ----------------------------------------------------------

    /// This pool's identity. Every handle it mints carries this tag.
    pub fn tag(&self) -> PoolTag {
        self.registry.tag()
    }

    /// The configuration the pool was created with.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of entities managed by the pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entities available for checkout.
    pub fn size(&self) -> usize {
        self.store.len()
    }

    /// Number of available entities of behavior `K`.
    pub fn size_of<K: Behavior>(&self) -> usize {
        self.store.len_of(KindTag::of::<K>())
    }

    /// Whether an empty store triggers expansion.
    pub fn is_expandable(&self) -> bool {
        self.config.is_expandable
    }

    /// Every entity this pool owns, stored or not.
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// The entities currently available for checkout.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handles of every managed entity, in id order.
    pub fn handles(&self) -> Vec<Handle> {
        self.registry.ids().map(|id| self.registry.handle(id)).collect()
    }

    /// Handles of every entity that is active or pending deactivation.
    pub fn live_handles(&self) -> Vec<Handle> {
        self.registry
            .iter()
            .filter(|(_, entity)| entity.state().is_live())
            .map(|(id, _)| self.registry.handle(id))
            .collect()
    }

    /// The entity behind `handle`.
    pub fn entity(&self, handle: Handle) -> PoolResult<&Entity> {
        let id = self.registry.resolve(handle)?;
        self.registry
            .get(id)
            .ok_or(PoolError::ForeignObject { handle })
    }

    /// Lifecycle state of the entity behind `handle`.
    pub fn state(&self, handle: Handle) -> PoolResult<LifecycleState> {
        self.entity(handle).map(Entity::state)
    }

    /// The behavior behind `handle`, downcast to `K`.
    pub fn behavior<K: Behavior>(&self, handle: Handle) -> PoolResult<&K> {
        self.entity(handle)?
            .behavior::<K>()
            .ok_or(PoolError::KindMismatch {
                handle,
                expected: std::any::type_name::<K>(),
            })
    }

    /// The behavior behind `handle`, downcast to `K`, mutably.
    ///
    /// Lifecycle state is not reachable through this reference; use the
    /// pool's lifecycle methods to change it.
    pub fn behavior_mut<K: Behavior>(&mut self, handle: Handle) -> PoolResult<&mut K> {
        let id = self.registry.resolve(handle)?;
        self.registry
            .get_mut(id)
            .and_then(Entity::behavior_mut::<K>)
            .ok_or(PoolError::KindMismatch {
                handle,
                expected: std::any::type_name::<K>(),
            })
    }

    /// A snapshot of the pool's counters.
    pub fn stats(&self) -> PoolStats {
        let (mut active, mut pending) = (0, 0);
        for (_, entity) in self.registry.iter() {
            match entity.state() {
                LifecycleState::Active => active += 1,
                LifecycleState::PendingDeactivation => pending += 1,
                LifecycleState::Inactive | LifecycleState::Uninitialized => {}
            }
        }
        PoolStats {
            capacity: self.capacity,
            available: self.store.len(),
            active,
            pending,
            expansions: self.expansions,
            checkouts: self.checkouts,
            returns: self.returns,
        }
    }

    /// Remove and return the events recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<PoolEvent> {
        self.events.drain(..).collect()
    }

    // -- checkout -----------------------------------------------------------

    /// Check out any available entity.
    ///
    /// The entity is placed at the origin and activated. An empty store
    /// expands the pool once if it is expandable; otherwise the result is
    /// `None`.
    ///
    /// # Panics
    ///
    /// Panics if expansion fails, which only happens when the factory hands
    /// out an already initialized entity.
    pub fn pop(&mut self) -> Option<Handle> {
        self.checkout(None, None)
    }

    /// [`pop`](Self::pop), then move the entity to `placement`.
    pub fn pop_at(&mut self, placement: Placement) -> Option<Handle> {
        self.checkout(None, Some(placement))
    }

    /// Check out an entity whose behavior is `K`. Entities of other kinds
    /// stay in the store.
    pub fn pop_kind<K: Behavior>(&mut self) -> Option<Handle> {
        self.checkout(Some(KindTag::of::<K>()), None)
    }

    /// [`pop_kind`](Self::pop_kind), then move the entity to `placement`.
    pub fn pop_kind_at<K: Behavior>(&mut self, placement: Placement) -> Option<Handle> {
        self.checkout(Some(KindTag::of::<K>()), Some(placement))
    }

    fn checkout(&mut self, kind: Option<KindTag>, placement: Option<Placement>) -> Option<Handle> {
        let id = match self.store.take(kind) {
            Some(id) => id,
            None if self.config.is_expandable => {
                if let Err(err) = self.expand_pool() {
                    panic!("{} failed to expand: {err}", self.tag());
                }
                match self.store.take(kind) {
                    Some(id) => id,
                    None => {
                        self.record_exhausted(kind);
                        return None;
                    }
                }
            }
            None => {
                self.record_exhausted(kind);
                return None;
            }
        };

        let activation = self
            .config
            .lifespan_override
            .map_or(Activation::Configured, Activation::Lifespan);
        let tag = self.tag();

        if let Some(entity) = self.registry.get_mut(id) {
            entity.set_placement(Placement::ORIGIN);
            entity.arm(activation);
            if let Some(placement) = placement {
                entity.set_placement(placement);
            }
        }
        self.checkouts += 1;
        debug!(pool = %tag, id = %id, available = self.store.len(), "checked out");
        self.settle(id);
        Some(self.registry.handle(id))
    }

    fn record_exhausted(&mut self, kind: Option<KindTag>) {
        let kind = kind.map(|k| k.name().to_owned());
        if self.config.is_expandable {
            debug!(pool = %self.tag(), kind = ?kind, "no entity of the requested kind after expansion");
        } else {
            warn!(pool = %self.tag(), kind = ?kind, capacity = self.capacity, "pool exhausted");
        }
        self.record(PoolEvent::Exhausted { kind });
    }

    // -- check-in -----------------------------------------------------------

    /// Give an entity back to the pool.
    ///
    /// Fails with [`PoolError::ForeignObject`] if the handle was not minted
    /// by this pool or names an unknown id. A live entity is deactivated
    /// first when `force_deactivation` is set; otherwise it stays live and is
    /// restocked once its own lifecycle ends.
    pub fn return_entity(&mut self, handle: Handle, force_deactivation: bool) -> PoolResult<()> {
        let id = self.registry.resolve(handle).inspect_err(|_| {
            warn!(pool = %self.tag(), handle = %handle, "rejected foreign entity");
        })?;
        self.check_in(id, force_deactivation);
        Ok(())
    }

    /// Admit an externally constructed entity.
    ///
    /// The entity receives a fresh id, capacity grows by one, and the entity
    /// is restocked (deactivating it first when `force_deactivation` is set
    /// and it arrived live).
    pub fn add(&mut self, entity: Entity, force_deactivation: bool) -> PoolResult<Handle> {
        let id = self.admit(entity, force_deactivation)?;
        debug!(pool = %self.tag(), id = %id, capacity = self.capacity, "entity added");
        Ok(self.registry.handle(id))
    }

    /// Grow the pool by `expansion_size` entities. Returns how many were
    /// added.
    pub fn expand_pool(&mut self) -> PoolResult<usize> {
        let added = self.config.expansion_size;
        for _ in 0..added {
            self.create_entity()?;
        }
        self.expansions += 1;
        debug!(pool = %self.tag(), added, capacity = self.capacity, "pool expanded");
        self.record(PoolEvent::Expanded {
            added,
            capacity: self.capacity,
        });
        Ok(added)
    }

    fn create_entity(&mut self) -> PoolResult<EntityId> {
        let entity = (self.factory)();
        self.admit(entity, true)
    }

    fn admit(&mut self, mut entity: Entity, force_deactivation: bool) -> PoolResult<EntityId> {
        entity.settings().validate()?;
        let parent = match self.config.spawn_parent {
            SpawnParent::None => None,
            SpawnParent::Pool => Some(Parent::Pool(self.tag())),
            SpawnParent::Custom(node) => Some(Parent::Node(node)),
        };
        if let (Some(parent), None) = (parent, entity.parent()) {
            entity.set_parent(parent);
        }
        let id = self.registry.admit(entity)?;
        self.capacity += 1;
        self.check_in(id, force_deactivation);
        Ok(id)
    }

    fn check_in(&mut self, id: EntityId, force_deactivation: bool) {
        if force_deactivation {
            if let Some(entity) = self.registry.get_mut(id) {
                entity.deactivate_now();
            }
        }
        self.settle(id);
    }

    /// Drain the entity's events and restock it if it is inactive. Returns
    /// whether it was pushed into the store.
    fn settle(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.registry.get_mut(id) else {
            return false;
        };
        let events = entity.take_events();
        let inactive = entity.state() == LifecycleState::Inactive;
        let kind = entity.kind();
        let was_used = events
            .iter()
            .any(|event| matches!(event, PoolEvent::Deactivated { .. }));
        for event in events {
            self.record(event);
        }

        if !inactive || !self.store.push(id, kind) {
            return false;
        }
        if was_used {
            self.returns += 1;
            trace!(pool = %self.tag(), id = %id, "returned to store");
            self.record(PoolEvent::Returned { id });
        }
        true
    }

    fn record(&mut self, event: PoolEvent) {
        let cap = self.config.event_capacity;
        if cap == 0 {
            return;
        }
        if self.events.len() == cap {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    // -- frame driving ------------------------------------------------------

    /// Advance every live entity by `dt` seconds and restock the ones that
    /// finished. Returns how many entities went back into the store.
    pub fn update(&mut self, dt: f64) -> usize {
        let live: Vec<EntityId> = self
            .registry
            .iter_mut()
            .filter(|(_, entity)| entity.state().is_live())
            .map(|(id, entity)| {
                entity.step(dt);
                id
            })
            .collect();
        live.into_iter().filter(|&id| self.settle(id)).count()
    }

    /// Tick every live tick-driven entity once. Returns how many entities
    /// went back into the store.
    pub fn tick_all(&mut self) -> usize {
        let live: Vec<EntityId> = self
            .registry
            .iter_mut()
            .filter(|(_, entity)| entity.state().is_live())
            .map(|(id, entity)| {
                entity.consume_tick();
                id
            })
            .collect();
        live.into_iter().filter(|&id| self.settle(id)).count()
    }

    // -- per-entity lifecycle -----------------------------------------------

    fn drive<T>(&mut self, handle: Handle, op: impl FnOnce(&mut Entity) -> T) -> PoolResult<T> {
        let id = self.registry.resolve(handle)?;
        let entity = self
            .registry
            .get_mut(id)
            .ok_or(PoolError::ForeignObject { handle })?;
        let out = op(entity);
        self.settle(id);
        Ok(out)
    }

    /// Activate the entity behind `handle`.
    ///
    /// An inactive entity is withdrawn from the store, exactly as if it had
    /// been checked out; a live one has its countdown restarted. An invalid
    /// lifespan fails with [`PoolError::InvalidConfig`] and leaves the entity
    /// untouched.
    pub fn activate(&mut self, handle: Handle, activation: Activation) -> PoolResult<()> {
        let id = self.registry.resolve(handle)?;
        activation.validate()?;
        if self.store.remove(id) {
            self.checkouts += 1;
        }
        self.drive(handle, |entity| entity.arm(activation))
    }

    /// Consume one tick of the entity's tick-driven activation.
    pub fn tick(&mut self, handle: Handle) -> PoolResult<()> {
        self.drive(handle, Entity::consume_tick)
    }

    /// Begin deactivation with the entity's configured delay.
    pub fn start_deactivation(&mut self, handle: Handle) -> PoolResult<Option<TimerHandle>> {
        self.drive(handle, |entity| {
            let delay = entity.settings().deactivation_delay;
            entity.begin_deactivation(delay)
        })
    }

    /// Begin deactivation, completing it after `delay` seconds.
    pub fn start_deactivation_after(
        &mut self,
        handle: Handle,
        delay: f64,
    ) -> PoolResult<Option<TimerHandle>> {
        self.drive(handle, |entity| entity.begin_deactivation(delay))
    }

    /// Cancel a pending deactivation. Returns whether one was pending.
    pub fn cancel_deactivation(&mut self, handle: Handle) -> PoolResult<bool> {
        self.drive(handle, Entity::cancel_deactivation)?
    }

    /// Deactivate now, skipping any pending phase. Returns whether the
    /// entity was live.
    pub fn deactivate_immediate(&mut self, handle: Handle) -> PoolResult<bool> {
        self.drive(handle, Entity::deactivate_now)
    }

    /// Move the entity, keeping its rotation.
    pub fn set_position(&mut self, handle: Handle, position: Vec3) -> PoolResult<()> {
        self.drive(handle, |entity| entity.set_position(position))
    }

    /// Move and orient the entity.
    pub fn set_placement(&mut self, handle: Handle, placement: Placement) -> PoolResult<()> {
        self.drive(handle, |entity| entity.set_placement(placement))
    }

    // -- invariants ---------------------------------------------------------

    /// Verify the pool invariants, describing the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.capacity != self.registry.len() {
            return Err(format!(
                "capacity {} != registry size {}",
                self.capacity,
                self.registry.len()
            ));
        }
        let stored = self.store.available();
        if stored.len() != self.store.len() {
            return Err(format!(
                "store lists {} ids but reports {}",
                stored.len(),
                self.store.len()
            ));
        }
        for id in stored {
            match self.registry.get(id) {
                None => return Err(format!("stored id {id} is not registered")),
                Some(entity) if entity.state() != LifecycleState::Inactive => {
                    return Err(format!("stored id {id} is {:?}", entity.state()));
                }
                Some(_) => {}
            }
        }
        for (id, entity) in self.registry.iter() {
            if entity.id() != Some(id) || entity.owner() != Some(self.tag()) {
                return Err(format!("entity {id} carries a different identity"));
            }
            if entity.state() == LifecycleState::Inactive && !self.store.contains(id) {
                return Err(format!("inactive entity {id} is missing from the store"));
            }
        }
        Ok(())
    }
}

impl<S: Store + fmt::Debug> fmt::Debug for Pool<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("tag", &self.tag())
            .field("capacity", &self.capacity)
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
