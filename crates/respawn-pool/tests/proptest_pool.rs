//! Property tests for pool operations.
//!
//! Random sequences of checkouts, returns, frame updates and lifecycle calls
//! are applied to pools over both stores, and the pool invariants are checked
//! after every step.

use std::collections::HashSet;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use respawn_pool::prelude::*;

#[derive(Debug, Default)]
struct Shot;
impl Behavior for Shot {}

#[derive(Debug, Default)]
struct Spark;
impl Behavior for Spark {}

/// Alternates between a tick-driven shot and a timed spark with a short
/// pending phase.
fn mixed_factory() -> impl FnMut() -> Entity + 'static {
    let mut n = 0u32;
    move || {
        n += 1;
        if n % 2 == 1 {
            Entity::new(Shot).with_mode(DeactivationMode::TickCount { ticks: 3 })
        } else {
            Entity::new(Spark).with_settings(EntitySettings {
                mode: DeactivationMode::Timer { duration: 0.5 },
                deactivation_delay: 0.1,
            })
        }
    }
}

/// Operations we can perform on a pool.
#[derive(Debug, Clone)]
enum PoolOp {
    Pop,
    PopShot,
    PopSpark,
    Return(usize, bool),
    Update(u32),
    TickAll,
    Deactivate(usize),
    StartDeactivation(usize),
    Cancel(usize),
    Add(bool),
    ReturnForeign,
    ReturnUnknown(u32),
}

fn pool_op_strategy() -> impl Strategy<Value = PoolOp> {
    prop_oneof![
        3 => Just(PoolOp::Pop),
        1 => Just(PoolOp::PopShot),
        1 => Just(PoolOp::PopSpark),
        2 => (0..64usize, proptest::bool::ANY).prop_map(|(i, f)| PoolOp::Return(i, f)),
        2 => (0..40u32).prop_map(PoolOp::Update),
        1 => Just(PoolOp::TickAll),
        1 => (0..64usize).prop_map(PoolOp::Deactivate),
        1 => (0..64usize).prop_map(PoolOp::StartDeactivation),
        1 => (0..64usize).prop_map(PoolOp::Cancel),
        1 => proptest::bool::ANY.prop_map(PoolOp::Add),
        1 => Just(PoolOp::ReturnForeign),
        1 => (1_000..2_000u32).prop_map(PoolOp::ReturnUnknown),
    ]
}

fn check<S: Store>(pool: &Pool<S>) -> Result<(), TestCaseError> {
    if let Err(violation) = pool.check_invariants() {
        return Err(TestCaseError::fail(violation));
    }
    prop_assert_eq!(pool.capacity(), pool.registry().len());

    let handles = pool.handles();
    let ids: HashSet<u32> = handles.iter().map(|h| h.id().get()).collect();
    prop_assert_eq!(ids.len(), pool.capacity());
    prop_assert!(ids.iter().all(|&id| id >= 1));

    let stats = pool.stats();
    prop_assert_eq!(stats.available + stats.active + stats.pending, stats.capacity);
    Ok(())
}

fn run_ops<S: Store>(mut pool: Pool<S>, ops: Vec<PoolOp>) -> Result<(), TestCaseError> {
    let mut other = Pool::new(PoolConfig::with_capacity(1), || Entity::new(Shot))
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    let foreign = other
        .pop()
        .ok_or_else(|| TestCaseError::fail("other pool is empty"))?;

    check(&pool)?;
    for op in ops {
        match op {
            PoolOp::Pop => {
                let before = pool.size();
                match pool.pop() {
                    Some(h) => {
                        prop_assert_eq!(pool.state(h).unwrap(), LifecycleState::Active);
                    }
                    None => {
                        prop_assert!(!pool.is_expandable());
                        prop_assert_eq!(before, 0);
                    }
                }
            }
            PoolOp::PopShot => {
                if let Some(h) = pool.pop_kind::<Shot>() {
                    prop_assert!(pool.behavior::<Shot>(h).is_ok());
                }
            }
            PoolOp::PopSpark => {
                let shots = pool.size_of::<Shot>();
                if let Some(h) = pool.pop_kind::<Spark>() {
                    prop_assert!(pool.behavior::<Spark>(h).is_ok());
                }
                // A typed checkout never consumes entities of another kind.
                prop_assert!(pool.size_of::<Shot>() >= shots);
            }
            PoolOp::Return(i, force) => {
                let handles = pool.handles();
                let h = handles[i % handles.len()];
                pool.return_entity(h, force).unwrap();
                if force {
                    prop_assert_eq!(pool.state(h).unwrap(), LifecycleState::Inactive);
                }
            }
            PoolOp::Update(centis) => {
                pool.update(f64::from(centis) / 100.0);
            }
            PoolOp::TickAll => {
                pool.tick_all();
            }
            PoolOp::Deactivate(i) => {
                let handles = pool.handles();
                let h = handles[i % handles.len()];
                pool.deactivate_immediate(h).unwrap();
                prop_assert!(pool.store().contains(h.id()));
            }
            PoolOp::StartDeactivation(i) => {
                let handles = pool.handles();
                pool.start_deactivation(handles[i % handles.len()]).unwrap();
            }
            PoolOp::Cancel(i) => {
                let handles = pool.handles();
                pool.cancel_deactivation(handles[i % handles.len()]).unwrap();
            }
            PoolOp::Add(force) => {
                let capacity = pool.capacity();
                let h = pool.add(Entity::new(Shot).already_active(), force).unwrap();
                prop_assert_eq!(pool.capacity(), capacity + 1);
                prop_assert_eq!(h.pool(), pool.tag());
            }
            PoolOp::ReturnForeign => {
                let (capacity, size) = (pool.capacity(), pool.size());
                let err = pool.return_entity(foreign, true).unwrap_err();
                prop_assert!(matches!(err, PoolError::ForeignObject { .. }), "unexpected error kind");
                prop_assert_eq!((pool.capacity(), pool.size()), (capacity, size));
            }
            PoolOp::ReturnUnknown(raw) => {
                let bogus = Handle::new(pool.tag(), EntityId::new(raw).unwrap());
                prop_assert!(matches!(
                    pool.return_entity(bogus, true),
                    Err(PoolError::ForeignObject { .. })
                ), "unknown id was accepted");
            }
        }
        check(&pool)?;
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn stack_pool_random_ops_preserve_invariants(
        capacity in 1..8usize,
        expansion in 1..4usize,
        ops in prop::collection::vec(pool_op_strategy(), 1..60),
    ) {
        let config = PoolConfig::with_capacity(capacity).expandable_by(expansion);
        let pool = Pool::new(config, mixed_factory()).unwrap();
        run_ops(pool, ops)?;
    }

    #[test]
    fn scan_pool_random_ops_preserve_invariants(
        capacity in 1..8usize,
        ops in prop::collection::vec(pool_op_strategy(), 1..60),
    ) {
        let config = PoolConfig::with_capacity(capacity).fixed();
        let pool = Pool::new_scan(config, mixed_factory()).unwrap();
        run_ops(pool, ops)?;
    }

    /// Expansion adds exactly `expansion_size` entities each time the store
    /// runs dry, and every checkout yields a distinct entity.
    #[test]
    fn expansion_grows_in_fixed_steps(
        capacity in 1..10usize,
        expansion in 1..5usize,
        pops in 1..40usize,
    ) {
        let config = PoolConfig::with_capacity(capacity).expandable_by(expansion);
        let mut pool = Pool::new(config, || Entity::new(Shot)).unwrap();

        let handles: Vec<Handle> = (0..pops).map(|_| pool.pop().unwrap()).collect();
        let distinct: HashSet<Handle> = handles.iter().copied().collect();
        prop_assert_eq!(distinct.len(), pops);

        let expansions = pops.saturating_sub(capacity).div_ceil(expansion);
        prop_assert_eq!(pool.capacity(), capacity + expansions * expansion);
        prop_assert_eq!(pool.stats().expansions, expansions as u64);
        prop_assert_eq!(pool.size(), pool.capacity() - pops);
    }

    /// A timer lifespan of `n` hundredths of a second is back in the store
    /// after exactly that much simulated time.
    #[test]
    fn lifespan_expires_on_schedule(centis in 1..500u32) {
        let mut pool = Pool::new(PoolConfig::with_capacity(1).fixed(), || {
            Entity::new(Spark).with_mode(DeactivationMode::Manual)
        })
        .unwrap();
        let lifespan = f64::from(centis) / 100.0;
        let h = pool.pop().unwrap();
        pool.activate(h, Activation::Lifespan(lifespan)).unwrap();

        pool.update(lifespan / 2.0);
        prop_assert_eq!(pool.state(h).unwrap(), LifecycleState::Active);
        pool.update(lifespan / 2.0 + 1e-9);
        prop_assert_eq!(pool.state(h).unwrap(), LifecycleState::Inactive);
        prop_assert_eq!(pool.size(), 1);
    }
}
