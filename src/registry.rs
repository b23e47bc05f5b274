use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use crate::config::{RegistryConfig, grown_capacity};
use crate::error::{AllocError, Result};
use crate::pool::{PoolManager, Policy, PoolStats};
use crate::region::{AllocationHandle, Segment};

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Names one open pool of one registry.
///
/// A handle stops working once its pool is closed or its registry is torn
/// down, even if the registry is initialized again afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
  epoch: u64,
  slot: usize,
}

struct Store {
  epoch: u64,
  slots: Vec<Option<Box<PoolManager>>>,
  capacity: usize,
}

/// Table of open pools.
///
/// The registry is created uninitialized; `init` allocates its slot table
/// and `teardown` releases it. Slots are appended and never reused, so a
/// closed pool leaves an empty slot behind.
pub struct Registry {
  config: RegistryConfig,
  store: Option<Store>,
}

impl Default for Registry {
  fn default() -> Self {
    Self::new(RegistryConfig::default())
  }
}

impl Registry {
  pub fn new(config: RegistryConfig) -> Self {
    Self { config, store: None }
  }

  pub fn config(&self) -> &RegistryConfig {
    &self.config
  }

  pub fn is_initialized(&self) -> bool {
    self.store.is_some()
  }

  pub fn init(&mut self) -> Result<()> {
    if self.store.is_some() {
      return Err(AllocError::AlreadyInitialized);
    }
    self.config.validate()?;

    let capacity = self.config.store_capacity;
    let mut slots = Vec::new();
    slots
      .try_reserve_exact(capacity)
      .map_err(|_| AllocError::ResourceExhausted { what: "pool registry" })?;

    let epoch = NEXT_EPOCH.fetch_add(1, Ordering::Relaxed);
    self.store = Some(Store { epoch, slots, capacity });

    debug!(epoch, capacity, "registry initialized");
    Ok(())
  }

  /// Releases the slot table. Refused while any pool is still open.
  pub fn teardown(&mut self) -> Result<()> {
    let open = self.open_pools();
    let Some(store) = &self.store else {
      return Err(AllocError::AlreadyTornDown);
    };

    if open > 0 {
      warn!(epoch = store.epoch, open, "refusing to tear down registry");
      return Err(AllocError::PoolsStillOpen { open });
    }

    debug!(epoch = store.epoch, "registry torn down");
    self.store = None;
    Ok(())
  }

  /// Number of pools opened and not yet closed.
  pub fn open_pools(&self) -> usize {
    self
      .store
      .as_ref()
      .map_or(0, |store| store.slots.iter().filter(|slot| slot.is_some()).count())
  }

  pub fn open(
    &mut self,
    size: usize,
    policy: Policy,
  ) -> Result<PoolHandle> {
    let store = self.store.as_mut().ok_or(AllocError::NotInitialized)?;
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    if let Some(new_capacity) = grown_capacity(
      store.slots.len(),
      store.capacity,
      self.config.fill_factor,
      self.config.expand_factor,
    ) {
      store
        .slots
        .try_reserve_exact(new_capacity - store.slots.len())
        .map_err(|_| AllocError::ResourceExhausted { what: "pool registry" })?;
      trace!(from = store.capacity, to = new_capacity, "registry grown");
      store.capacity = new_capacity;
    }

    let manager = PoolManager::open(size, policy, &self.config.pool)?;

    let slot = store.slots.len();
    store.slots.push(Some(Box::new(manager)));

    debug!(epoch = store.epoch, slot, "pool registered");
    Ok(PoolHandle {
      epoch: store.epoch,
      slot,
    })
  }

  /// Closes a pool that has no allocations and a single gap.
  pub fn close(
    &mut self,
    pool: PoolHandle,
  ) -> Result<()> {
    self.pool(pool)?.ensure_clean()?;

    let store = self.store.as_mut().ok_or(AllocError::NotInitialized)?;
    if let Some(manager) = store.slots[pool.slot].take() {
      debug!(epoch = pool.epoch, slot = pool.slot, id = ?manager.id(), "pool closed");
    }
    Ok(())
  }

  pub fn allocate(
    &mut self,
    pool: PoolHandle,
    size: usize,
  ) -> Result<AllocationHandle> {
    self.pool_mut(pool)?.allocate(size)
  }

  pub fn deallocate(
    &mut self,
    pool: PoolHandle,
    alloc: AllocationHandle,
  ) -> Result<()> {
    self.pool_mut(pool)?.deallocate(alloc)
  }

  pub fn snapshot(
    &self,
    pool: PoolHandle,
  ) -> Result<Vec<Segment>> {
    Ok(self.pool(pool)?.snapshot())
  }

  pub fn stats(
    &self,
    pool: PoolHandle,
  ) -> Result<PoolStats> {
    Ok(self.pool(pool)?.stats())
  }

  pub fn pool(
    &self,
    pool: PoolHandle,
  ) -> Result<&PoolManager> {
    let store = self.store.as_ref().ok_or(AllocError::NotInitialized)?;
    if store.epoch != pool.epoch {
      warn!(epoch = pool.epoch, "pool handle from another registry");
      return Err(AllocError::InvalidHandle);
    }

    store
      .slots
      .get(pool.slot)
      .and_then(|slot| slot.as_deref())
      .ok_or(AllocError::InvalidHandle)
  }

  pub fn pool_mut(
    &mut self,
    pool: PoolHandle,
  ) -> Result<&mut PoolManager> {
    let store = self.store.as_mut().ok_or(AllocError::NotInitialized)?;
    if store.epoch != pool.epoch {
      warn!(epoch = pool.epoch, "pool handle from another registry");
      return Err(AllocError::InvalidHandle);
    }

    store
      .slots
      .get_mut(pool.slot)
      .and_then(|slot| slot.as_deref_mut())
      .ok_or(AllocError::InvalidHandle)
  }

  #[cfg(test)]
  fn capacity(&self) -> Option<usize> {
    self.store.as_ref().map(|store| store.capacity)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn registry() -> Registry {
    let mut registry = Registry::default();
    registry.init().unwrap();
    registry
  }

  fn layout(
    registry: &Registry,
    pool: PoolHandle,
  ) -> Vec<(usize, bool)> {
    registry
      .snapshot(pool)
      .unwrap()
      .iter()
      .map(|s| (s.size, s.allocated))
      .collect()
  }

  #[test]
  fn test_init_and_teardown_lifecycle() {
    let mut registry = Registry::default();
    assert!(!registry.is_initialized());
    assert_eq!(registry.teardown(), Err(AllocError::AlreadyTornDown));

    registry.init().unwrap();
    assert_eq!(registry.init(), Err(AllocError::AlreadyInitialized));

    registry.teardown().unwrap();
    assert_eq!(registry.teardown(), Err(AllocError::AlreadyTornDown));

    registry.init().unwrap();
    assert!(registry.is_initialized());
  }

  #[test]
  fn test_open_requires_init_and_size() {
    let mut registry = Registry::default();
    assert_eq!(
      registry.open(64, Policy::FirstFit),
      Err(AllocError::NotInitialized)
    );

    registry.init().unwrap();
    assert_eq!(registry.open(0, Policy::FirstFit), Err(AllocError::ZeroSize));
    assert_eq!(registry.open_pools(), 0);
  }

  #[test]
  fn test_first_fit_walkthrough() {
    let mut registry = registry();
    let pool = registry.open(1024, Policy::FirstFit).unwrap();
    assert_eq!(layout(&registry, pool), vec![(1024, false)]);

    let a = registry.allocate(pool, 100).unwrap();
    assert_eq!(layout(&registry, pool), vec![(100, true), (924, false)]);
    let stats = registry.stats(pool).unwrap();
    assert_eq!((stats.num_allocations, stats.allocated_bytes), (1, 100));

    let b = registry.allocate(pool, 50).unwrap();
    assert_eq!(layout(&registry, pool), vec![(100, true), (50, true), (874, false)]);

    assert!(matches!(registry.close(pool), Err(AllocError::NotClean { .. })));

    registry.deallocate(pool, a).unwrap();
    registry.deallocate(pool, b).unwrap();
    assert_eq!(layout(&registry, pool), vec![(1024, false)]);

    registry.close(pool).unwrap();
    assert_eq!(registry.open_pools(), 0);
    registry.teardown().unwrap();
  }

  #[test]
  fn test_best_fit_tie_break() {
    let mut registry = registry();
    let pool = registry.open(100, Policy::BestFit).unwrap();

    let low = registry.allocate(pool, 30).unwrap();
    let _mid = registry.allocate(pool, 20).unwrap();
    let high = registry.allocate(pool, 10).unwrap();
    let _tail = registry.allocate(pool, 40).unwrap();
    registry.deallocate(pool, low).unwrap();
    registry.deallocate(pool, high).unwrap();

    let picked = registry.allocate(pool, 10).unwrap();
    assert_eq!(picked.offset(), high.offset());
  }

  #[test]
  fn test_close_reports_outstanding_work() {
    let mut registry = registry();
    let pool = registry.open(256, Policy::FirstFit).unwrap();
    let a = registry.allocate(pool, 16).unwrap();

    assert_eq!(
      registry.close(pool),
      Err(AllocError::NotClean { allocations: 1, gaps: 1 })
    );
    assert_eq!(registry.open_pools(), 1);

    registry.deallocate(pool, a).unwrap();
    registry.close(pool).unwrap();
    assert_eq!(registry.close(pool), Err(AllocError::InvalidHandle));
    assert_eq!(registry.allocate(pool, 1), Err(AllocError::InvalidHandle));
  }

  #[test]
  fn test_teardown_refused_while_pools_open() {
    let mut registry = registry();
    let pool = registry.open(32, Policy::FirstFit).unwrap();

    assert_eq!(registry.teardown(), Err(AllocError::PoolsStillOpen { open: 1 }));
    assert!(registry.is_initialized());

    registry.close(pool).unwrap();
    registry.teardown().unwrap();
  }

  #[test]
  fn test_handles_do_not_survive_reinit() {
    let mut registry = registry();
    let pool = registry.open(32, Policy::FirstFit).unwrap();
    registry.close(pool).unwrap();
    registry.teardown().unwrap();
    registry.init().unwrap();

    let fresh = registry.open(32, Policy::FirstFit).unwrap();
    assert_ne!(fresh, pool);
    assert_eq!(registry.snapshot(pool), Err(AllocError::InvalidHandle));
  }

  #[test]
  fn test_handles_are_bound_to_their_registry() {
    let mut first = registry();
    let mut second = registry();
    let a = first.open(64, Policy::FirstFit).unwrap();
    let b = second.open(64, Policy::FirstFit).unwrap();

    assert_eq!(second.allocate(a, 8), Err(AllocError::InvalidHandle));

    let alloc = first.allocate(a, 8).unwrap();
    assert_eq!(second.deallocate(b, alloc), Err(AllocError::InvalidHandle));
    first.deallocate(a, alloc).unwrap();
  }

  #[test]
  fn test_store_grows_and_never_reuses_slots() {
    let config = RegistryConfig {
      store_capacity: 2,
      ..RegistryConfig::default()
    };
    let mut registry = Registry::new(config);
    registry.init().unwrap();

    let pools: Vec<_> = (0..5).map(|_| registry.open(8, Policy::BestFit).unwrap()).collect();
    assert_eq!(registry.capacity(), Some(8));

    registry.close(pools[1]).unwrap();
    let next = registry.open(8, Policy::BestFit).unwrap();
    assert_ne!(next, pools[1]);
    assert_eq!(registry.open_pools(), 5);
  }

  #[test]
  fn test_invalid_config_blocks_init() {
    let config = RegistryConfig {
      fill_factor: 0.0,
      ..RegistryConfig::default()
    };
    let mut registry = Registry::new(config);
    assert!(matches!(registry.init(), Err(AllocError::InvalidConfig { .. })));
    assert!(!registry.is_initialized());
  }
}
