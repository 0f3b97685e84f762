//! Respawn Pool -- reusable-entity pooling with per-entity lifecycles.
//!
//! A [`Pool`](pool::Pool) pre-creates a bounded set of expensive entities
//! through a factory, hands them out with [`pop`](pool::Pool::pop), and takes
//! them back when their lifecycle ends. Each entity runs a small state
//! machine (`Uninitialized -> Inactive <-> Active -> PendingDeactivation ->
//! Inactive`) driven by a timer, a tick count, or explicit calls. Handles
//! carry the owning pool's tag, so an entity can only ever be returned to the
//! pool that created it.
//!
//! # Quick Start
//!
//! ```
//! use respawn_pool::prelude::*;
//!
//! struct Spark;
//! impl Behavior for Spark {}
//!
//! let config = PoolConfig::with_capacity(4).fixed();
//! let mut pool = Pool::new(config, || {
//!     Entity::new(Spark).with_mode(DeactivationMode::Timer { duration: 1.0 })
//! })
//! .unwrap();
//!
//! let spark = pool.pop().expect("pool has inactive entities");
//! assert_eq!(pool.size(), 3);
//!
//! // One simulated second later the spark is back in the store.
//! pool.update(1.0);
//! assert_eq!(pool.size(), 4);
//! assert_eq!(pool.state(spark).unwrap(), LifecycleState::Inactive);
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod entity;
pub mod event;
pub mod lifecycle;
pub mod pool;
pub mod registry;
pub mod store;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by pool and lifecycle operations.
///
/// Running out of entities is not an error: checkouts return `None`.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The handle or entity does not belong to this pool.
    #[error("entity {handle} does not belong to this pool (unknown id or minted by another pool)")]
    ForeignObject { handle: entity::Handle },

    /// An id was registered twice. Unreachable under sequential issuance.
    #[error("entity id {id} is already registered in this pool")]
    DuplicateRegistration { id: entity::EntityId },

    /// A lifecycle operation ran on an entity no pool has initialized.
    #[error("'{operation}' called on an entity that was not initialized by a pool")]
    UninitializedUse { operation: &'static str },

    /// The entity's behavior is not the requested type.
    #[error("entity {handle} is not a '{expected}'")]
    KindMismatch {
        handle: entity::Handle,
        expected: &'static str,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration for '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// A configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),
}

/// Result alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::config::{DeactivationMode, EntitySettings, NodeId, PoolConfig, SpawnParent};
    pub use crate::entity::{EntityId, Handle, PoolTag};
    pub use crate::event::PoolEvent;
    pub use crate::lifecycle::{
        Activation, Behavior, Entity, KindTag, LifecycleState, Parent, Placement, Quat, TimerHandle,
        Vec3,
    };
    pub use crate::pool::{Pool, PoolStats, ScanPool};
    pub use crate::registry::IdentityRegistry;
    pub use crate::store::{ScanStore, StackStore, Store};
    pub use crate::{PoolError, PoolResult};
}
