//! Respawn Engine -- fixed-timestep frame driver for entity pools.
//!
//! This crate builds on [`respawn_pool`] to provide the simulation driver: a
//! frame loop that runs named systems in a validated order, then advances
//! every pool in the world by a fixed time step so expired entities go back
//! to their stores.
//!
//! # Quick Start
//!
//! ```
//! use respawn_engine::prelude::*;
//!
//! struct Enemy;
//! impl Behavior for Enemy {}
//!
//! let pool = Pool::new(PoolConfig::default(), || Entity::new(Enemy)).unwrap();
//! let config = FrameConfig { fixed_dt: 1.0 / 60.0, headless: true };
//! let mut frames = FrameLoop::new(pool, config);
//!
//! frames.add_system("spawn", |pool, ctx| {
//!     if ctx.frame % 30 == 0 {
//!         pool.pop();
//!     }
//! });
//!
//! frames.run_frames(600);
//! assert_eq!(frames.frame_count(), 600);
//! // Enemies live for two seconds, so at most five are out at once.
//! assert!(frames.world().stats().active <= 5);
//! ```

#![deny(unsafe_code)]

pub mod frame;

/// Re-export the pool crate for convenience.
pub use respawn_pool;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use respawn_pool::prelude::*;

    pub use crate::frame::{
        FrameConfig, FrameContext, FrameDiagnostics, FrameLoop, Simulation, SystemFn,
    };
}
