//! Per-entity lifecycle state machine.
//!
//! ```text
//! Uninitialized --initialize--> Inactive <--activate/deactivate--> Active
//!                                  ^                                 |
//!                                  |                       start_deactivation
//!                                  |                                 v
//!                                  +------ delay elapsed ---- PendingDeactivation
//! ```
//!
//! An [`Entity`] wraps a user [`Behavior`] and owns the countdown that ends
//! each activation. The countdown is chosen per activation from the entity's
//! [`DeactivationMode`] or from a one-shot override (`activate_for`,
//! `activate_for_ticks`). A pending deactivation is an explicit timer with a
//! [`TimerHandle`], so it can be cancelled.
//!
//! Transitions never call back into the pool. They record [`PoolEvent`]s in
//! an outbox which the owning pool drains after each call; a `Deactivated`
//! event is what makes the pool restock the entity.

use std::any::{Any, TypeId};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::{DeactivationMode, EntitySettings, NodeId};
use crate::entity::{EntityId, PoolTag};
use crate::event::PoolEvent;
use crate::{PoolError, PoolResult};

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// A position in host space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// The origin.
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// An orientation quaternion `(x, y, z, w)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    /// No rotation.
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };
}

impl Default for Quat {
    fn default() -> Self {
        Quat::IDENTITY
    }
}

/// Position plus orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Placement {
    /// Zero position, identity rotation. Every checkout starts here.
    pub const ORIGIN: Placement = Placement {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// A placement at `position` with identity rotation.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }
}

/// The node an entity is attached to in the host hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parent {
    /// Child of the pool that created it.
    Pool(PoolTag),
    /// Child of a host node.
    Node(NodeId),
}

// ---------------------------------------------------------------------------
// Behavior
// ---------------------------------------------------------------------------

/// Downcasting support for [`Behavior`] objects. Implemented for every
/// `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The application-level part of a pooled entity.
///
/// The lifecycle hooks run synchronously inside the transition that triggers
/// them. The `set_*` methods are the side effects the pool issues to the host
/// runtime; the pool never reads host state back.
pub trait Behavior: AsAny {
    /// The entity received its id.
    fn on_initialize(&mut self, _id: EntityId) {}

    /// The entity was checked out or re-armed.
    fn on_activate(&mut self) {}

    /// The entity entered its pending-deactivation phase (fade-outs, sounds).
    fn on_deactivation_started(&mut self) {}

    /// The entity became inactive.
    fn on_deactivated(&mut self) {}

    /// Host visibility toggle.
    fn set_active(&mut self, _active: bool) {}

    /// Host transform setter.
    fn set_placement(&mut self, _placement: Placement) {}

    /// Host re-parenting.
    fn set_parent(&mut self, _parent: Parent) {}
}

/// Identifies the concrete [`Behavior`] type of an entity.
#[derive(Clone, Copy)]
pub struct KindTag {
    type_id: TypeId,
    name: &'static str,
}

impl KindTag {
    /// The tag for behavior type `B`.
    pub fn of<B: Behavior>() -> Self {
        Self {
            type_id: TypeId::of::<B>(),
            name: std::any::type_name::<B>(),
        }
    }

    /// Fully qualified Rust type name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for KindTag {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for KindTag {}

impl std::hash::Hash for KindTag {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KindTag({})", self.name)
    }
}

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Where an entity is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Not yet admitted to a pool.
    Uninitialized,
    /// Available for checkout.
    Inactive,
    /// Checked out and running.
    Active,
    /// Deactivation started, waiting for its delay to elapse.
    PendingDeactivation,
}

impl LifecycleState {
    /// Active or pending; the entity is still in use.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            LifecycleState::Active | LifecycleState::PendingDeactivation
        )
    }
}

/// The countdown armed for the current activation.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Countdown {
    Timer { remaining: f64, duration: f64 },
    Ticks { remaining: u32 },
    Manual,
}

impl From<DeactivationMode> for Countdown {
    fn from(mode: DeactivationMode) -> Self {
        match mode {
            DeactivationMode::Timer { duration } => Countdown::Timer {
                remaining: duration,
                duration,
            },
            DeactivationMode::TickCount { ticks } => Countdown::Ticks { remaining: ticks },
            DeactivationMode::Manual => Countdown::Manual,
        }
    }
}

/// How a single activation ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Activation {
    /// Use the entity's configured [`DeactivationMode`].
    Configured,
    /// Deactivate after this many seconds.
    Lifespan(f64),
    /// Deactivate after this many ticks.
    Ticks(u32),
}

impl Activation {
    /// Check that a lifespan is positive and finite.
    pub fn validate(&self) -> PoolResult<()> {
        match *self {
            Activation::Lifespan(lifespan) if !(lifespan > 0.0 && lifespan.is_finite()) => {
                Err(PoolError::InvalidConfig {
                    field: "lifespan",
                    reason: format!("must be positive and finite, got {lifespan}"),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Relative slack, as a fraction of the armed span, below which a countdown
/// counts as elapsed. Absorbs rounding from subtracting many frame steps.
const EXPIRY_TOLERANCE: f64 = 1e-9;

fn elapsed(remaining: f64, span: f64) -> bool {
    remaining <= span * EXPIRY_TOLERANCE
}

/// Handle to a scheduled deactivation. Unique per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone, Copy)]
struct PendingDeactivation {
    timer: TimerHandle,
    remaining: f64,
    delay: f64,
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A reusable pooled entity: a [`Behavior`] plus its lifecycle.
pub struct Entity {
    id: Option<EntityId>,
    /// Non-owning back-reference to the admitting pool.
    owner: Option<PoolTag>,
    state: LifecycleState,
    settings: EntitySettings,
    countdown: Countdown,
    pending: Option<PendingDeactivation>,
    next_timer: u64,
    /// Enter `Active` instead of `Inactive` on initialization.
    starts_active: bool,
    placement: Placement,
    parent: Option<Parent>,
    kind: KindTag,
    behavior: Box<dyn Behavior>,
    outbox: Vec<PoolEvent>,
}

impl Entity {
    /// Wrap a behavior with default [`EntitySettings`].
    pub fn new<B: Behavior>(behavior: B) -> Self {
        Self {
            id: None,
            owner: None,
            state: LifecycleState::Uninitialized,
            settings: EntitySettings::default(),
            countdown: Countdown::Manual,
            pending: None,
            next_timer: 0,
            starts_active: false,
            placement: Placement::ORIGIN,
            parent: None,
            kind: KindTag::of::<B>(),
            behavior: Box::new(behavior),
            outbox: Vec::new(),
        }
    }

    /// Builder: replace the lifecycle settings.
    pub fn with_settings(mut self, settings: EntitySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builder: replace only the deactivation mode.
    pub fn with_mode(mut self, mode: DeactivationMode) -> Self {
        self.settings.mode = mode;
        self
    }

    /// Builder: the host object is already live, so initialization leaves the
    /// entity `Active` rather than `Inactive`.
    pub fn already_active(mut self) -> Self {
        self.starts_active = true;
        self
    }

    // -- accessors ----------------------------------------------------------

    /// The registry id, once initialized.
    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    /// Whether [`initialize`](Self::initialize) has run.
    pub fn is_initialized(&self) -> bool {
        self.id.is_some()
    }

    /// The pool that admitted this entity.
    pub fn owner(&self) -> Option<PoolTag> {
        self.owner
    }

    /// The current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The configured lifecycle settings.
    pub fn settings(&self) -> &EntitySettings {
        &self.settings
    }

    /// The behavior type this entity wraps.
    pub fn kind(&self) -> KindTag {
        self.kind
    }

    /// Where the entity was last placed.
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// The hierarchy node the entity is attached under, if any.
    pub fn parent(&self) -> Option<Parent> {
        self.parent
    }

    /// Ticks left in the current activation, when it is tick-driven.
    pub fn ticks_remaining(&self) -> Option<u32> {
        match self.countdown {
            Countdown::Ticks { remaining } => Some(remaining),
            _ => None,
        }
    }

    /// Seconds left in the current activation, when it is timer-driven.
    pub fn time_remaining(&self) -> Option<f64> {
        match self.countdown {
            Countdown::Timer { remaining, .. } => Some(remaining),
            _ => None,
        }
    }

    /// The scheduled deactivation, if one is pending.
    pub fn pending_timer(&self) -> Option<TimerHandle> {
        self.pending.map(|p| p.timer)
    }

    /// Downcast the behavior.
    pub fn behavior<K: Behavior>(&self) -> Option<&K> {
        (*self.behavior).as_any().downcast_ref::<K>()
    }

    /// Downcast the behavior mutably.
    pub fn behavior_mut<K: Behavior>(&mut self) -> Option<&mut K> {
        (*self.behavior).as_any_mut().downcast_mut::<K>()
    }

    /// Remove and return the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.outbox)
    }

    // -- transitions --------------------------------------------------------

    /// Assign the id and owning pool. Only the first call has any effect;
    /// returns whether this call initialized the entity.
    pub fn initialize(&mut self, id: EntityId, owner: PoolTag) -> bool {
        if self.is_initialized() {
            return false;
        }
        self.id = Some(id);
        self.owner = Some(owner);
        self.state = LifecycleState::Inactive;
        trace!(id = %id, pool = %owner, "entity initialized");
        self.behavior.on_initialize(id);
        self.outbox.push(PoolEvent::Initialized { id });

        if self.starts_active {
            self.starts_active = false;
            self.arm(Activation::Configured);
        } else {
            self.behavior.set_active(false);
        }
        true
    }

    /// Startup check: fail if the entity never went through a pool.
    pub fn ensure_initialized(&self, operation: &'static str) -> PoolResult<EntityId> {
        self.id.ok_or(PoolError::UninitializedUse { operation })
    }

    /// Activate with the configured [`DeactivationMode`].
    pub fn activate(&mut self) -> PoolResult<()> {
        self.activate_with(Activation::Configured)
    }

    /// Activate for `lifespan` seconds, overriding the configured mode for
    /// this activation only.
    pub fn activate_for(&mut self, lifespan: f64) -> PoolResult<()> {
        self.activate_with(Activation::Lifespan(lifespan))
    }

    /// Activate for `ticks` ticks, overriding the configured mode for this
    /// activation only.
    pub fn activate_for_ticks(&mut self, ticks: u32) -> PoolResult<()> {
        self.activate_with(Activation::Ticks(ticks))
    }

    /// Activate with an explicit [`Activation`]. Re-activating a live entity
    /// restarts its countdown and cancels any pending deactivation.
    ///
    /// Fails with [`PoolError::InvalidConfig`] for a lifespan that is not
    /// positive and finite.
    pub fn activate_with(&mut self, activation: Activation) -> PoolResult<()> {
        self.ensure_initialized("activate")?;
        activation.validate()?;
        self.arm(activation);
        Ok(())
    }

    pub(crate) fn arm(&mut self, activation: Activation) {
        let Some(id) = self.id else { return };
        let countdown = match activation {
            Activation::Configured => self.settings.mode.into(),
            Activation::Lifespan(duration) => Countdown::Timer {
                remaining: duration,
                duration,
            },
            Activation::Ticks(remaining) => Countdown::Ticks { remaining },
        };
        if self.pending.take().is_some() {
            trace!(id = %id, "deactivation cancelled by activation");
            self.outbox.push(PoolEvent::DeactivationCancelled { id });
        }
        self.countdown = countdown;
        self.state = LifecycleState::Active;
        self.behavior.set_active(true);
        trace!(id = %id, countdown = ?countdown, "entity activated");
        self.behavior.on_activate();
        self.outbox.push(PoolEvent::Activated { id });
    }

    /// Advance simulated time by `dt` seconds.
    ///
    /// Counts down a timer-driven activation and any pending deactivation.
    /// Returns whether the entity became inactive during this call.
    pub fn advance(&mut self, dt: f64) -> PoolResult<bool> {
        self.ensure_initialized("advance")?;
        Ok(self.step(dt))
    }

    pub(crate) fn step(&mut self, dt: f64) -> bool {
        match self.state {
            LifecycleState::Active => {
                if let Countdown::Timer { remaining, duration } = &mut self.countdown {
                    *remaining -= dt;
                    if elapsed(*remaining, *duration) {
                        self.begin_deactivation(self.settings.deactivation_delay);
                    }
                }
            }
            LifecycleState::PendingDeactivation => {
                if let Some(pending) = &mut self.pending {
                    pending.remaining -= dt;
                    if elapsed(pending.remaining, pending.delay) {
                        self.complete_deactivation();
                    }
                }
            }
            LifecycleState::Inactive | LifecycleState::Uninitialized => return false,
        }
        self.state == LifecycleState::Inactive
    }

    /// Consume one tick of a tick-driven activation. A no-op for any other
    /// countdown or when the entity is not active.
    pub fn tick(&mut self) -> PoolResult<()> {
        self.ensure_initialized("tick")?;
        self.consume_tick();
        Ok(())
    }

    pub(crate) fn consume_tick(&mut self) {
        if self.state != LifecycleState::Active {
            return;
        }
        if let Countdown::Ticks { remaining } = &mut self.countdown {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.begin_deactivation(self.settings.deactivation_delay);
            }
        }
    }

    /// Begin deactivation with the configured delay.
    pub fn start_deactivation(&mut self) -> PoolResult<Option<TimerHandle>> {
        let delay = self.settings.deactivation_delay;
        self.start_deactivation_after(delay)
    }

    /// Begin deactivation, completing it after `delay` seconds.
    ///
    /// Observers are notified immediately. A non-positive delay completes the
    /// deactivation in this call and returns `None`. Calling this while a
    /// deactivation is already pending keeps the existing timer.
    pub fn start_deactivation_after(&mut self, delay: f64) -> PoolResult<Option<TimerHandle>> {
        self.ensure_initialized("start_deactivation")?;
        Ok(self.begin_deactivation(delay))
    }

    pub(crate) fn begin_deactivation(&mut self, delay: f64) -> Option<TimerHandle> {
        let id = self.id?;
        match self.state {
            LifecycleState::Active => {}
            LifecycleState::PendingDeactivation => return self.pending_timer(),
            LifecycleState::Inactive | LifecycleState::Uninitialized => return None,
        }

        self.state = LifecycleState::PendingDeactivation;
        let delay = delay.max(0.0);
        trace!(id = %id, delay, "deactivation started");
        self.behavior.on_deactivation_started();
        self.outbox.push(PoolEvent::DeactivationStarted { id, delay });

        if delay <= 0.0 {
            self.complete_deactivation();
            return None;
        }

        self.next_timer += 1;
        let timer = TimerHandle(self.next_timer);
        self.pending = Some(PendingDeactivation {
            timer,
            remaining: delay,
            delay,
        });
        Some(timer)
    }

    /// Cancel a pending deactivation and go back to `Active`.
    ///
    /// An already expired countdown is not re-armed; the entity stays active
    /// until it is deactivated explicitly or re-activated. Returns whether a
    /// deactivation was cancelled.
    pub fn cancel_deactivation(&mut self) -> PoolResult<bool> {
        let id = self.ensure_initialized("cancel_deactivation")?;
        if self.pending.take().is_none() {
            return Ok(false);
        }
        self.state = LifecycleState::Active;
        let expired = match self.countdown {
            Countdown::Timer {
                remaining,
                duration,
            } => elapsed(remaining, duration),
            Countdown::Ticks { remaining } => remaining == 0,
            Countdown::Manual => false,
        };
        if expired {
            self.countdown = Countdown::Manual;
        }
        trace!(id = %id, "deactivation cancelled");
        self.outbox.push(PoolEvent::DeactivationCancelled { id });
        Ok(true)
    }

    /// Become inactive now, skipping any pending phase. Returns whether the
    /// entity was live before the call.
    pub fn deactivate_immediate(&mut self) -> PoolResult<bool> {
        self.ensure_initialized("deactivate_immediate")?;
        Ok(self.deactivate_now())
    }

    pub(crate) fn deactivate_now(&mut self) -> bool {
        if !self.state.is_live() {
            return false;
        }
        self.complete_deactivation();
        true
    }

    fn complete_deactivation(&mut self) {
        let Some(id) = self.id else { return };
        if self.state == LifecycleState::Inactive {
            return;
        }
        self.pending = None;
        self.state = LifecycleState::Inactive;
        self.behavior.set_active(false);
        trace!(id = %id, "entity deactivated");
        self.behavior.on_deactivated();
        self.outbox.push(PoolEvent::Deactivated { id });
    }

    /// Move the entity and forward the placement to the host.
    pub fn set_placement(&mut self, placement: Placement) {
        self.placement = placement;
        self.behavior.set_placement(placement);
    }

    /// Move the entity, keeping its rotation.
    pub fn set_position(&mut self, position: Vec3) {
        let placement = Placement {
            position,
            rotation: self.placement.rotation,
        };
        self.set_placement(placement);
    }

    /// Attach the entity under `parent` in the host hierarchy.
    pub fn set_parent(&mut self, parent: Parent) {
        self.parent = Some(parent);
        self.behavior.set_parent(parent);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("state", &self.state)
            .field("kind", &self.kind)
            .field("countdown", &self.countdown)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
