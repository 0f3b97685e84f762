//! Observable pool and lifecycle events.
//!
//! Every lifecycle transition an entity goes through, and every expansion of
//! a pool, is recorded as a [`PoolEvent`]. Events accumulate in the pool in
//! the order they happened and are handed out by
//! [`Pool::drain_events`](crate::pool::Pool::drain_events). Metrics or UI
//! layers consume them instead of registering callbacks on the pool.

use serde::Serialize;

use crate::entity::EntityId;

/// One observable transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    /// The entity received its id and left `Uninitialized`.
    Initialized {
        /// The assigned id.
        id: EntityId,
    },
    /// The entity became active.
    Activated {
        /// The entity.
        id: EntityId,
    },
    /// The entity entered `PendingDeactivation`.
    DeactivationStarted {
        /// The entity.
        id: EntityId,
        /// Seconds until deactivation completes.
        delay: f64,
    },
    /// A pending deactivation was cancelled; the entity stays active.
    DeactivationCancelled {
        /// The entity.
        id: EntityId,
    },
    /// The entity became inactive.
    Deactivated {
        /// The entity.
        id: EntityId,
    },
    /// The pool pushed the entity back into its store.
    Returned {
        /// The entity.
        id: EntityId,
    },
    /// The pool grew.
    Expanded {
        /// Entities created by this expansion.
        added: usize,
        /// Capacity after the expansion.
        capacity: usize,
    },
    /// A checkout found nothing, even after expanding when allowed.
    Exhausted {
        /// Behavior filter of the failed checkout, if any.
        kind: Option<String>,
    },
}

impl PoolEvent {
    /// The entity this event is about, if it concerns a single entity.
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            PoolEvent::Initialized { id }
            | PoolEvent::Activated { id }
            | PoolEvent::DeactivationStarted { id, .. }
            | PoolEvent::DeactivationCancelled { id }
            | PoolEvent::Deactivated { id }
            | PoolEvent::Returned { id } => Some(*id),
            PoolEvent::Expanded { .. } | PoolEvent::Exhausted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_scoped_events_report_their_id() {
        let id = EntityId::new(7).unwrap();
        assert_eq!(PoolEvent::Deactivated { id }.entity(), Some(id));
        assert_eq!(
            PoolEvent::Expanded {
                added: 2,
                capacity: 6
            }
            .entity(),
            None
        );
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let id = EntityId::new(3).unwrap();
        let json = serde_json::to_value(PoolEvent::DeactivationStarted { id, delay: 0.5 }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "event": "deactivation_started", "id": 3, "delay": 0.5 })
        );
    }
}
