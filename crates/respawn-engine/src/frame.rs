//! Fixed-timestep frame loop for pooled simulations.
//!
//! The [`FrameLoop`] drives a world forward one frame at a time. Each frame:
//!
//! 1. All registered systems run in registration order, each receiving a
//!    mutable reference to the world and the [`FrameContext`]. Systems are
//!    where entities get checked out, moved and deactivated.
//! 2. The world [advances](Simulation::advance) by `fixed_dt`: every pool
//!    counts down its live entities and restocks the ones whose lifecycle
//!    ended.
//! 3. The frame counter advances.
//!
//! # Example
//!
//! ```
//! use respawn_engine::prelude::*;
//!
//! struct Spark;
//! impl Behavior for Spark {}
//!
//! let pool = Pool::new(PoolConfig::with_capacity(4).fixed(), || {
//!     Entity::new(Spark).with_mode(DeactivationMode::TickCount { ticks: 1 })
//! })
//! .unwrap();
//! let mut frames = FrameLoop::new(pool, FrameConfig::default());
//!
//! frames.add_system("spawn", |pool, _ctx| {
//!     pool.pop();
//! });
//! frames.add_system_after("tick", &["spawn"], |pool, _ctx| {
//!     pool.tick_all();
//! });
//!
//! frames.run_frames(10);
//! assert_eq!(frames.frame_count(), 10);
//! assert_eq!(frames.world().size(), 4);
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use respawn_pool::pool::Pool;
use respawn_pool::store::Store;

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// A world the frame loop can advance in time.
pub trait Simulation {
    /// Advance by `dt` seconds. Returns how many entities went back to a
    /// store during the call.
    fn advance(&mut self, dt: f64) -> usize;
}

impl<S: Store> Simulation for Pool<S> {
    fn advance(&mut self, dt: f64) -> usize {
        self.update(dt)
    }
}

// ---------------------------------------------------------------------------
// FrameConfig
// ---------------------------------------------------------------------------

/// Configuration for the fixed-timestep frame loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Fixed time step in seconds per frame. Must be positive and finite.
    pub fixed_dt: f64,
    /// Headless mode: no presentation, run frames as fast as possible.
    pub headless: bool,
}

impl Default for FrameConfig {
    /// Defaults to 60 Hz, headless off.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            headless: false,
        }
    }
}

// ---------------------------------------------------------------------------
// FrameDiagnostics
// ---------------------------------------------------------------------------

/// Timing diagnostics for the last frame.
#[derive(Debug, Clone, Default)]
pub struct FrameDiagnostics {
    /// Wall-clock time per system, in execution order.
    pub system_times: Vec<(String, Duration)>,
    /// Time spent advancing the world.
    pub advance_time: Duration,
    /// Total time for the frame.
    pub total_time: Duration,
    /// Entities restocked while advancing.
    pub restocked: usize,
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// What a system knows about the frame it runs in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Zero-based index of the current frame.
    pub frame: u64,
    /// Seconds this frame will advance the world by.
    pub dt: f64,
    /// Simulation time at the start of the frame.
    pub sim_time: f64,
}

/// A system function run once per frame.
pub type SystemFn<W> = fn(&mut W, &FrameContext);

#[derive(Debug)]
struct RegisteredSystem<W> {
    name: String,
    func: SystemFn<W>,
}

// ---------------------------------------------------------------------------
// FrameLoop
// ---------------------------------------------------------------------------

/// The fixed-timestep frame loop.
///
/// Simulation time is computed as `frame_count * fixed_dt` rather than
/// accumulated, so it does not drift.
pub struct FrameLoop<W: Simulation> {
    world: W,
    systems: Vec<RegisteredSystem<W>>,
    frame_counter: u64,
    config: FrameConfig,
    last_diagnostics: FrameDiagnostics,
}

impl<W: Simulation> FrameLoop<W> {
    /// Create a frame loop around `world`.
    ///
    /// # Panics
    ///
    /// Panics if `config.fixed_dt` is not positive and finite.
    pub fn new(world: W, config: FrameConfig) -> Self {
        assert!(
            config.fixed_dt > 0.0 && config.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        Self {
            world,
            systems: Vec::new(),
            frame_counter: 0,
            config,
            last_diagnostics: FrameDiagnostics::default(),
        }
    }

    /// Register a system to run each frame, after every system registered
    /// before it.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add_system(&mut self, name: &str, func: SystemFn<W>) {
        self.add_system_after(name, &[], func);
    }

    /// Register a system that must run after each system named in `after`.
    ///
    /// Systems run in registration order, so requiring every dependency to
    /// be registered first is enough to honor the ordering.
    ///
    /// # Panics
    ///
    /// - If any system in `after` is not already registered.
    /// - If a system with this name already exists.
    pub fn add_system_after(&mut self, name: &str, after: &[&str], func: SystemFn<W>) {
        for dep in after {
            assert!(
                self.systems.iter().any(|s| s.name == *dep),
                "system '{name}' declares dependency on '{dep}', but '{dep}' is not registered"
            );
        }
        assert!(
            !self.systems.iter().any(|s| s.name == name),
            "duplicate system name: {name:?}"
        );

        self.systems.push(RegisteredSystem {
            name: name.to_owned(),
            func,
        });
        debug!(system = name, after = ?after, "system registered");
    }

    /// Run one frame: systems, then the world advance. Returns how many
    /// entities were restocked by the advance.
    pub fn frame(&mut self) -> usize {
        let frame_start = Instant::now();
        let ctx = FrameContext {
            frame: self.frame_counter,
            dt: self.config.fixed_dt,
            sim_time: self.sim_time(),
        };

        let mut system_times = Vec::with_capacity(self.systems.len());
        for system in &self.systems {
            let sys_start = Instant::now();
            (system.func)(&mut self.world, &ctx);
            system_times.push((system.name.clone(), sys_start.elapsed()));
        }

        let advance_start = Instant::now();
        let restocked = self.world.advance(self.config.fixed_dt);
        let advance_time = advance_start.elapsed();

        self.frame_counter += 1;
        trace!(frame = ctx.frame, restocked, "frame complete");

        self.last_diagnostics = FrameDiagnostics {
            system_times,
            advance_time,
            total_time: frame_start.elapsed(),
            restocked,
        };
        restocked
    }

    /// Run `count` frames. Returns the total number of restocked entities.
    pub fn run_frames(&mut self, count: u64) -> u64 {
        (0..count).map(|_| self.frame() as u64).sum()
    }

    // -- accessors ----------------------------------------------------------

    /// The number of frames executed so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    /// Current simulation time in seconds.
    pub fn sim_time(&self) -> f64 {
        self.frame_counter as f64 * self.config.fixed_dt
    }

    /// Seconds each frame advances the world by.
    pub fn fixed_dt(&self) -> f64 {
        self.config.fixed_dt
    }

    /// Shared access to the world.
    pub fn world(&self) -> &W {
        &self.world
    }

    /// Mutable access to the world, for setup and tests.
    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    /// Consume the loop and hand back the world.
    pub fn into_world(self) -> W {
        self.world
    }

    /// The number of registered systems.
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Registered system names, in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    /// Timing diagnostics from the most recent frame.
    pub fn last_diagnostics(&self) -> &FrameDiagnostics {
        &self.last_diagnostics
    }

    /// Whether the loop runs without presentation.
    pub fn is_headless(&self) -> bool {
        self.config.headless
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use respawn_pool::prelude::*;

    /// A world that just records what happened to it.
    #[derive(Debug, Default)]
    struct Recorder {
        log: Vec<String>,
        advanced: f64,
    }

    impl Simulation for Recorder {
        fn advance(&mut self, dt: f64) -> usize {
            self.advanced += dt;
            self.log.push("advance".into());
            0
        }
    }

    fn recorder_loop() -> FrameLoop<Recorder> {
        FrameLoop::new(Recorder::default(), FrameConfig::default())
    }

    // -- config -------------------------------------------------------------

    #[test]
    fn default_config_is_60hz() {
        let config = FrameConfig::default();
        assert!((config.fixed_dt - 1.0 / 60.0).abs() < 1e-12);
        assert!(!config.headless);
    }

    #[test]
    #[should_panic(expected = "fixed_dt must be positive and finite")]
    fn zero_dt_panics() {
        FrameLoop::new(
            Recorder::default(),
            FrameConfig {
                fixed_dt: 0.0,
                ..Default::default()
            },
        );
    }

    #[test]
    #[should_panic(expected = "fixed_dt must be positive and finite")]
    fn nan_dt_panics() {
        FrameLoop::new(
            Recorder::default(),
            FrameConfig {
                fixed_dt: f64::NAN,
                ..Default::default()
            },
        );
    }

    #[test]
    fn config_parses_from_json() {
        let config: FrameConfig = serde_json::from_str(r#"{ "headless": true }"#).unwrap();
        assert!(config.headless);
        assert_eq!(config.fixed_dt, FrameConfig::default().fixed_dt);
    }

    // -- ordering -----------------------------------------------------------

    #[test]
    fn systems_run_in_order_before_advance() {
        let mut frames = recorder_loop();
        frames.add_system("a", |w, _| w.log.push("a".into()));
        frames.add_system("b", |w, _| w.log.push("b".into()));
        frames.frame();
        assert_eq!(frames.world().log, vec!["a", "b", "advance"]);
    }

    #[test]
    fn context_reports_frame_and_time() {
        let mut frames = FrameLoop::new(
            Recorder::default(),
            FrameConfig {
                fixed_dt: 0.5,
                headless: true,
            },
        );
        frames.add_system("stamp", |w, ctx| {
            w.log.push(format!("{}@{}", ctx.frame, ctx.sim_time));
        });
        frames.run_frames(3);
        let stamps: Vec<&str> = frames
            .world()
            .log
            .iter()
            .filter(|s| s.contains('@'))
            .map(String::as_str)
            .collect();
        assert_eq!(stamps, vec!["0@0", "1@0.5", "2@1"]);
        assert_eq!(frames.sim_time(), 1.5);
        assert_eq!(frames.world().advanced, 1.5);
        assert!(frames.is_headless());
    }

    #[test]
    #[should_panic(expected = "duplicate system name")]
    fn duplicate_name_panics() {
        let mut frames = recorder_loop();
        frames.add_system("a", |_, _| {});
        frames.add_system("a", |_, _| {});
    }

    #[test]
    #[should_panic(expected = "declares dependency on")]
    fn unknown_dependency_panics() {
        let mut frames = recorder_loop();
        frames.add_system_after("a", &["missing"], |_, _| {});
    }

    #[test]
    fn dependencies_are_recorded() {
        let mut frames = recorder_loop();
        frames.add_system("spawn", |_, _| {});
        frames.add_system_after("move", &["spawn"], |_, _| {});
        frames.add_system_after("cull", &["spawn", "move"], |_, _| {});
        assert_eq!(frames.system_names(), vec!["spawn", "move", "cull"]);
        assert_eq!(frames.system_count(), 3);
    }

    #[test]
    fn dependent_systems_run_after_their_dependencies() {
        let mut frames = recorder_loop();
        frames.add_system("spawn", |w, _| w.log.push("spawn".into()));
        frames.add_system("steer", |w, _| w.log.push("steer".into()));
        frames.add_system_after("collide", &["spawn", "steer"], |w, _| {
            w.log.push("collide".into());
        });
        frames.frame();
        assert_eq!(frames.world().log, vec!["spawn", "steer", "collide", "advance"]);
    }

    // -- diagnostics --------------------------------------------------------

    #[test]
    fn diagnostics_cover_every_system() {
        let mut frames = recorder_loop();
        frames.add_system("a", |_, _| {});
        frames.add_system("b", |_, _| {});
        frames.frame();
        let diag = frames.last_diagnostics();
        let names: Vec<&str> = diag.system_times.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(diag.total_time >= diag.advance_time);
    }

    // -- pools --------------------------------------------------------------

    struct Shot;
    impl Behavior for Shot {}

    #[test]
    fn pool_entities_expire_through_the_loop() {
        let pool = Pool::new(PoolConfig::with_capacity(2).fixed(), || {
            Entity::new(Shot).with_mode(DeactivationMode::Timer { duration: 0.25 })
        })
        .unwrap();
        let mut frames = FrameLoop::new(
            pool,
            FrameConfig {
                fixed_dt: 0.125,
                headless: true,
            },
        );
        frames.add_system("fire", |pool, ctx| {
            if ctx.frame == 0 {
                pool.pop();
            }
        });

        assert_eq!(frames.frame(), 0);
        assert_eq!(frames.world().size(), 1);
        assert_eq!(frames.frame(), 1);
        assert_eq!(frames.world().size(), 2);
        assert_eq!(frames.last_diagnostics().restocked, 1);
    }
}
