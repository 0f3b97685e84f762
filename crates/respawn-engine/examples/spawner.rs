//! Headless spawner demo: enemies and shots sharing one pool.
//!
//! An enemy spawner pops enemies at random positions on a fixed interval, a
//! ship fires shots straight up, and shots that reach an enemy wear it down. Dead
//! enemies linger for a short death animation before going back to the pool;
//! shots that miss expire on their own timer.
//!
//! Run with: `cargo run --example spawner -- [config.json]`
//!
//! The optional config file overrides any field of [`DemoConfig`]; for
//! example `{ "frames": 3600, "pool": { "capacity": 32 } }`. Set
//! `RUST_LOG=respawn_pool=debug` to watch checkouts and expansions.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use respawn_engine::prelude::*;

// ---------------------------------------------------------------------------
// Behaviors
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Enemy {
    health: f32,
}

impl Enemy {
    const MAX_HEALTH: f32 = 2.0;

    fn is_alive(&self) -> bool {
        self.health > 0.0
    }
}

impl Behavior for Enemy {
    fn on_activate(&mut self) {
        self.health = Self::MAX_HEALTH;
    }

    fn on_deactivation_started(&mut self) {
        self.health = 0.0;
    }
}

#[derive(Debug)]
struct Shot {
    speed: f32,
    damage: f32,
}

impl Default for Shot {
    fn default() -> Self {
        Self {
            speed: 8.0,
            damage: 1.0,
        }
    }
}

impl Behavior for Shot {}

/// Alternates enemies and shots so every expansion yields both kinds.
fn arena_factory() -> impl FnMut() -> Entity + 'static {
    let mut n = 0u32;
    move || {
        n += 1;
        if n % 2 == 0 {
            Entity::new(Shot::default()).with_mode(DeactivationMode::Timer { duration: 1.5 })
        } else {
            Entity::new(Enemy::default()).with_settings(EntitySettings {
                mode: DeactivationMode::Timer { duration: 6.0 },
                deactivation_delay: 0.4,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct DemoConfig {
    frame: FrameConfig,
    pool: PoolConfig,
    /// Number of frames to simulate.
    frames: u64,
    /// RNG seed for enemy placement.
    seed: u64,
    /// Seconds between enemy spawns.
    spawn_interval: f64,
    /// Frames between shots.
    fire_every: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig {
                headless: true,
                ..Default::default()
            },
            pool: PoolConfig::with_capacity(12).expandable_by(4),
            frames: 1800,
            seed: 42,
            spawn_interval: 0.5,
            fire_every: 6,
        }
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

struct Arena {
    pool: Pool,
    rng: Pcg64,
    spawn_interval: f64,
    next_spawn: f64,
    fire_every: u64,
    ship_x: f32,
    kills: u32,
}

impl Simulation for Arena {
    fn advance(&mut self, dt: f64) -> usize {
        self.pool.update(dt)
    }
}

fn live_of<K: Behavior>(pool: &Pool) -> Vec<Handle> {
    pool.live_handles()
        .into_iter()
        .filter(|&h| pool.behavior::<K>(h).is_ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

fn spawn_enemies(arena: &mut Arena, ctx: &FrameContext) {
    if ctx.sim_time < arena.next_spawn {
        return;
    }
    arena.next_spawn += arena.spawn_interval;
    let position = Vec3::new(
        arena.rng.gen_range(-5.0..5.0),
        arena.rng.gen_range(-1.0..3.0),
        0.0,
    );
    if arena
        .pool
        .pop_kind_at::<Enemy>(Placement::at(position))
        .is_none()
    {
        tracing::warn!(frame = ctx.frame, "no enemy available");
    }
}

fn steer_ship(arena: &mut Arena, ctx: &FrameContext) {
    // Sweep back and forth across the arena.
    arena.ship_x = (5.0 * (ctx.sim_time * 0.7).sin()) as f32;
}

fn fire(arena: &mut Arena, ctx: &FrameContext) {
    if ctx.frame % arena.fire_every != 0 {
        return;
    }
    let origin = Placement::at(Vec3::new(arena.ship_x, -4.0, 0.0));
    let Some(shot) = arena.pool.pop_kind_at::<Shot>(origin) else {
        return;
    };
    if let Ok(behavior) = arena.pool.behavior_mut::<Shot>(shot) {
        behavior.speed = 9.0;
        behavior.damage = 1.0;
    }
}

fn move_shots(arena: &mut Arena, ctx: &FrameContext) {
    for h in live_of::<Shot>(&arena.pool) {
        let Ok(entity) = arena.pool.entity(h) else {
            continue;
        };
        let Some(speed) = entity.behavior::<Shot>().map(|s| s.speed) else {
            continue;
        };
        let mut position = entity.placement().position;
        position.y += speed * ctx.dt as f32;
        if let Err(err) = arena.pool.set_position(h, position) {
            tracing::warn!(frame = ctx.frame, %err, "could not move shot");
        }
    }
}

fn collide(arena: &mut Arena, ctx: &FrameContext) {
    let enemies: Vec<(Handle, Vec3)> = live_of::<Enemy>(&arena.pool)
        .into_iter()
        .filter_map(|h| {
            let entity = arena.pool.entity(h).ok()?;
            entity
                .behavior::<Enemy>()
                .filter(|e| e.is_alive())
                .map(|_| (h, entity.placement().position))
        })
        .collect();

    for shot in live_of::<Shot>(&arena.pool) {
        let Ok(entity) = arena.pool.entity(shot) else {
            continue;
        };
        let p = entity.placement().position;
        let damage = entity.behavior::<Shot>().map_or(0.0, |s| s.damage);
        let hit = enemies.iter().find(|(h, e)| {
            let (dx, dy) = (p.x - e.x, p.y - e.y);
            dx * dx + dy * dy < 0.25
                && arena.pool.behavior::<Enemy>(*h).is_ok_and(Enemy::is_alive)
        });
        let Some(&(enemy, _)) = hit else {
            continue;
        };

        if let Err(err) = arena.pool.deactivate_immediate(shot) {
            tracing::warn!(frame = ctx.frame, %err, "could not retire shot");
        }
        let Ok(target) = arena.pool.behavior_mut::<Enemy>(enemy) else {
            continue;
        };
        target.health -= damage;
        if !target.is_alive() {
            // Dead enemies play out their deactivation delay before restocking.
            match arena.pool.start_deactivation(enemy) {
                Ok(_) => arena.kills += 1,
                Err(err) => tracing::warn!(frame = ctx.frame, %err, "could not kill enemy"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let config: DemoConfig = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        }
        None => DemoConfig::default(),
    };
    config.pool.validate()?;
    anyhow::ensure!(config.fire_every > 0, "fire_every must be at least 1");
    anyhow::ensure!(
        config.spawn_interval > 0.0,
        "spawn_interval must be positive"
    );

    let arena = Arena {
        pool: Pool::new(config.pool.clone(), arena_factory())?,
        rng: Pcg64::seed_from_u64(config.seed),
        spawn_interval: config.spawn_interval,
        next_spawn: 0.0,
        fire_every: config.fire_every,
        ship_x: 0.0,
        kills: 0,
    };

    let mut frames = FrameLoop::new(arena, config.frame.clone());
    frames.add_system("spawn_enemies", spawn_enemies);
    frames.add_system("steer_ship", steer_ship);
    frames.add_system_after("fire", &["steer_ship"], fire);
    frames.add_system_after("move_shots", &["fire"], move_shots);
    frames.add_system_after("collide", &["spawn_enemies", "move_shots"], collide);

    let restocked = frames.run_frames(config.frames);

    let arena = frames.world_mut();
    let mut event_counts: BTreeMap<String, usize> = BTreeMap::new();
    for event in arena.pool.drain_events() {
        let name = serde_json::to_value(&event)?["event"]
            .as_str()
            .unwrap_or("unknown")
            .to_owned();
        *event_counts.entry(name).or_default() += 1;
    }
    arena.pool.check_invariants().map_err(anyhow::Error::msg)?;

    println!(
        "{} frames ({:.1}s simulated), {} kills, {} restocked",
        frames.frame_count(),
        frames.sim_time(),
        frames.world().kills,
        restocked
    );
    println!("stats: {}", serde_json::to_string_pretty(&frames.world().pool.stats())?);
    println!("recent events: {}", serde_json::to_string(&event_counts)?);
    Ok(())
}
