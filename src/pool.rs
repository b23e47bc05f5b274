use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::arena::Arena;
use crate::config::PoolConfig;
use crate::error::{AllocError, Result};
use crate::gap_index::GapIndex;
use crate::heap::{HEAD, NodeHeap};
use crate::region::{AllocationHandle, PoolId, Segment};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// How a pool picks the gap an allocation is carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
  /// First sufficient gap in node slab order.
  FirstFit,
  /// Smallest sufficient gap, lowest offset on ties.
  BestFit,
}

/// Summary counters of a pool at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
  pub total_size: usize,
  pub num_allocations: usize,
  pub allocated_bytes: usize,
  pub num_gaps: usize,
}

/// A pool together with the bookkeeping that manages it: the arena,
/// the node slab and the gap index.
pub struct PoolManager {
  id: PoolId,
  arena: Arena,
  policy: Policy,
  num_allocations: usize,
  allocated_bytes: usize,
  heap: NodeHeap,
  gaps: GapIndex,
}

impl PoolManager {
  /// Reserves a `size`-byte arena holding a single gap.
  pub fn open(
    size: usize,
    policy: Policy,
    config: &PoolConfig,
  ) -> Result<Self> {
    config.validate()?;

    // Each step drops what the previous ones built if it fails.
    let arena = Arena::new(size)?;
    let heap = NodeHeap::new(config.node_heap_capacity, size, config.fill_factor, config.expand_factor)?;
    let mut gaps = GapIndex::with_capacity(config.gap_index_capacity, config.fill_factor, config.expand_factor)?;
    gaps.insert(size, 0, HEAD)?;

    let id = PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed));
    debug!(pool = id.0, size, ?policy, "pool opened");

    Ok(Self {
      id,
      arena,
      policy,
      num_allocations: 0,
      allocated_bytes: 0,
      heap,
      gaps,
    })
  }

  pub fn id(&self) -> PoolId {
    self.id
  }

  pub fn policy(&self) -> Policy {
    self.policy
  }

  pub fn total_size(&self) -> usize {
    self.arena.len()
  }

  pub fn num_allocations(&self) -> usize {
    self.num_allocations
  }

  pub fn allocated_bytes(&self) -> usize {
    self.allocated_bytes
  }

  pub fn num_gaps(&self) -> usize {
    self.gaps.len()
  }

  pub fn stats(&self) -> PoolStats {
    PoolStats {
      total_size: self.total_size(),
      num_allocations: self.num_allocations,
      allocated_bytes: self.allocated_bytes,
      num_gaps: self.num_gaps(),
    }
  }

  /// A pool can be closed once everything is released and coalesced.
  pub fn is_clean(&self) -> bool {
    self.num_allocations == 0 && self.gaps.len() == 1
  }

  pub(crate) fn ensure_clean(&self) -> Result<()> {
    if self.is_clean() {
      return Ok(());
    }

    warn!(
      pool = self.id.0,
      allocations = self.num_allocations,
      gaps = self.gaps.len(),
      "refusing to close pool"
    );
    Err(AllocError::NotClean {
      allocations: self.num_allocations,
      gaps: self.gaps.len(),
    })
  }

  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<AllocationHandle> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let slot = self
      .heap
      .allocate(&mut self.gaps, self.policy, size)
      .inspect_err(|err| debug!(pool = self.id.0, size, %err, "allocation failed"))?;

    self.num_allocations += 1;
    self.allocated_bytes += size;

    let region = self
      .heap
      .get(slot)
      .ok_or_else(|| AllocError::corrupted(format!("allocated slot {slot} is out of range")))?;
    debug!(pool = self.id.0, slot, offset = region.offset, size, "allocated");

    Ok(AllocationHandle::new(self.id, slot, region))
  }

  pub fn deallocate(
    &mut self,
    alloc: AllocationHandle,
  ) -> Result<()> {
    self.check(&alloc)?;

    let released = self.heap.release(&mut self.gaps, alloc.slot)?;
    self.num_allocations -= 1;
    self.allocated_bytes -= released;

    debug!(pool = self.id.0, slot = alloc.slot, size = released, "deallocated");
    Ok(())
  }

  /// `(size, allocated)` for every region, in address order.
  pub fn snapshot(&self) -> Vec<Segment> {
    self
      .heap
      .walk()
      .map(|(_, region)| Segment {
        size: region.size,
        allocated: region.occupied,
      })
      .collect()
  }

  /// The bytes behind a live allocation.
  pub fn bytes(
    &self,
    alloc: &AllocationHandle,
  ) -> Result<&[u8]> {
    self.check(alloc)?;
    Ok(self.arena.slice(alloc.offset(), alloc.size()))
  }

  pub fn bytes_mut(
    &mut self,
    alloc: &AllocationHandle,
  ) -> Result<&mut [u8]> {
    self.check(alloc)?;
    Ok(self.arena.slice_mut(alloc.offset(), alloc.size()))
  }

  /// Re-checks every structural invariant of the pool.
  pub fn verify(&self) -> Result<()> {
    self.heap.verify(&self.gaps, self.total_size())?;

    let (count, bytes) = self
      .heap
      .walk()
      .filter(|(_, region)| region.occupied)
      .fold((0, 0), |(count, bytes), (_, region)| (count + 1, bytes + region.size));
    if count != self.num_allocations || bytes != self.allocated_bytes {
      return Err(AllocError::corrupted(format!(
        "counters say {} allocation(s) of {} bytes, regions say {count} of {bytes}",
        self.num_allocations, self.allocated_bytes
      )));
    }

    Ok(())
  }

  fn check(
    &self,
    alloc: &AllocationHandle,
  ) -> Result<()> {
    let live = alloc.pool == self.id
      && self.heap.get(alloc.slot).is_some_and(|region| {
        region.active && region.occupied && region.generation == alloc.generation
      });

    if !live {
      warn!(pool = self.id.0, slot = alloc.slot, "rejected allocation handle");
      return Err(AllocError::InvalidHandle);
    }
    Ok(())
  }
}

impl std::fmt::Debug for PoolManager {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    f.debug_struct("PoolManager")
      .field("id", &self.id)
      .field("policy", &self.policy)
      .field("stats", &self.stats())
      .finish_non_exhaustive()
  }
}
