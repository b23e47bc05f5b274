use tracing::{error, trace};

use crate::config::grown_capacity;
use crate::error::{AllocError, Result};
use crate::gap_index::GapIndex;
use crate::pool::Policy;
use crate::region::Region;

/// Slot of the region at offset zero. It is never absorbed by a
/// neighbour, so it stays the list head for the life of the pool.
pub const HEAD: usize = 0;

/// The node slab: region descriptors threaded into an address-ordered
/// doubly linked list, plus the split/merge algorithms over it.
///
/// ```text
///   slab:   [0]──────▶[3]──────▶[1]──────▶[2]     (next links)
///            │         │         │         │
///   arena:  ├── 100 ──┼── 50 ───┼── 74 ───┼── 800 ──┤
///            used      gap       used      gap
/// ```
#[derive(Debug)]
pub struct NodeHeap {
  regions: Vec<Region>,
  active: usize,
  fill_factor: f32,
  expand_factor: usize,
}

impl NodeHeap {
  /// A slab of `capacity` slots whose head region spans `arena_len` bytes.
  pub fn new(
    capacity: usize,
    arena_len: usize,
    fill_factor: f32,
    expand_factor: usize,
  ) -> Result<Self> {
    let mut regions = Vec::new();
    regions
      .try_reserve_exact(capacity)
      .map_err(|_| AllocError::ResourceExhausted { what: "node heap" })?;
    regions.resize(capacity, Region::default());

    let mut heap = Self {
      regions,
      active: 0,
      fill_factor,
      expand_factor,
    };
    heap.activate(HEAD, 0, arena_len);

    Ok(heap)
  }

  pub fn capacity(&self) -> usize {
    self.regions.len()
  }

  /// Number of active regions.
  pub fn active(&self) -> usize {
    self.active
  }

  pub fn get(
    &self,
    slot: usize,
  ) -> Option<&Region> {
    self.regions.get(slot)
  }

  /// Active regions in address order.
  pub fn walk(&self) -> Walk<'_> {
    Walk {
      regions: &self.regions,
      cursor: Some(HEAD),
    }
  }

  /// Carves `size` bytes out of a gap chosen by `policy`.
  ///
  /// Nothing is mutated unless a candidate exists and all storage the
  /// split needs has been secured. Returns the slot of the allocation.
  pub fn allocate(
    &mut self,
    gaps: &mut GapIndex,
    policy: Policy,
    size: usize,
  ) -> Result<usize> {
    if gaps.is_empty() {
      return Err(AllocError::NoFit { requested: size });
    }

    let slot = match policy {
      Policy::FirstFit => self.first_fit(size),
      Policy::BestFit => gaps.best_fit(size).map(|entry| entry.region),
    }
    .ok_or(AllocError::NoFit { requested: size })?;

    let remainder = self.regions[slot].size - size;

    let spare = if remainder > 0 {
      self.ensure_room()?;
      gaps.ensure_room()?;
      match self.vacant_slot() {
        Some(spare) => Some(spare),
        None => {
          error!(active = self.active, capacity = self.capacity(), "no vacant slot after growth");
          return Err(AllocError::ResourceExhausted { what: "node heap" });
        }
      }
    } else {
      None
    };

    gaps.remove(slot)?;

    let region = &mut self.regions[slot];
    region.occupied = true;
    region.size = size;
    region.generation = region.generation.wrapping_add(1);
    let split_at = region.end();
    let after = region.next;

    if let Some(spare) = spare {
      self.activate(spare, split_at, remainder);
      self.regions[spare].prev = Some(slot);
      self.regions[spare].next = after;
      if let Some(after) = after {
        self.regions[after].prev = Some(spare);
      }
      self.regions[slot].next = Some(spare);

      trace!(slot, spare, offset = split_at, remainder, "gap split");
      gaps.insert(remainder, split_at, spare)?;
    }

    Ok(slot)
  }

  /// Turns the allocation in `slot` back into a gap, merging it with
  /// free neighbours. Returns the number of bytes released.
  ///
  /// The caller vouches that `slot` holds an active, occupied region.
  pub fn release(
    &mut self,
    gaps: &mut GapIndex,
    slot: usize,
  ) -> Result<usize> {
    gaps.ensure_room()?;

    let released = self.regions[slot].size;
    self.regions[slot].occupied = false;

    if let Some(next) = self.regions[slot].next {
      if self.regions[next].is_gap() {
        gaps.remove(next)?;
        let absorbed = self.regions[next].size;
        self.regions[slot].size += absorbed;
        self.retire(next);
        trace!(slot, absorbed = next, "merged right");
      }
    }

    let mut node = slot;
    if let Some(prev) = self.regions[slot].prev {
      if self.regions[prev].is_gap() {
        gaps.remove(prev)?;
        let absorbed = self.regions[slot].size;
        self.regions[prev].size += absorbed;
        self.retire(slot);
        trace!(slot = prev, absorbed = slot, "merged left");
        node = prev;
      }
    }

    let region = &self.regions[node];
    gaps.insert(region.size, region.offset, node)?;

    Ok(released)
  }

  /// Checks coverage, coalescing and gap index consistency.
  pub fn verify(
    &self,
    gaps: &GapIndex,
    total_size: usize,
  ) -> Result<()> {
    let mut expected_offset = 0;
    let mut walked = 0;
    let mut free = 0;
    let mut prev_was_gap = false;

    for (slot, region) in self.walk() {
      if region.offset != expected_offset {
        return Err(AllocError::corrupted(format!(
          "region {slot} starts at {} instead of {expected_offset}",
          region.offset
        )));
      }
      if !region.occupied {
        if prev_was_gap {
          return Err(AllocError::corrupted(format!("region {slot} follows another gap")));
        }
        free += 1;
      }
      prev_was_gap = !region.occupied;
      expected_offset = region.end();
      walked += 1;
    }

    if expected_offset != total_size {
      return Err(AllocError::corrupted(format!(
        "regions cover {expected_offset} of {total_size} bytes"
      )));
    }
    if walked != self.active {
      return Err(AllocError::corrupted(format!(
        "walked {walked} regions but {} are active",
        self.active
      )));
    }
    if gaps.len() != free {
      return Err(AllocError::corrupted(format!(
        "gap index holds {} entries for {free} gaps",
        gaps.len()
      )));
    }
    if !gaps.is_ordered() {
      return Err(AllocError::corrupted("gap index out of order"));
    }
    for entry in gaps.iter() {
      let matches = self
        .get(entry.region)
        .is_some_and(|r| r.is_gap() && r.size == entry.size && r.offset == entry.offset);
      if !matches {
        return Err(AllocError::corrupted(format!(
          "gap index entry for region {} is stale",
          entry.region
        )));
      }
    }

    Ok(())
  }

  /// First gap in slab storage order that can hold `size` bytes.
  fn first_fit(
    &self,
    size: usize,
  ) -> Option<usize> {
    self
      .regions
      .iter()
      .position(|region| region.is_gap() && region.size >= size)
  }

  fn vacant_slot(&self) -> Option<usize> {
    self.regions.iter().position(|region| !region.active)
  }

  fn ensure_room(&mut self) -> Result<()> {
    let capacity = self.capacity();
    let Some(new_capacity) =
      grown_capacity(self.active, capacity, self.fill_factor, self.expand_factor)
    else {
      return Ok(());
    };

    self
      .regions
      .try_reserve_exact(new_capacity - capacity)
      .map_err(|_| AllocError::ResourceExhausted { what: "node heap" })?;
    self.regions.resize(new_capacity, Region::default());

    trace!(from = capacity, to = new_capacity, "node heap grown");
    Ok(())
  }

  fn activate(
    &mut self,
    slot: usize,
    offset: usize,
    size: usize,
  ) {
    let region = &mut self.regions[slot];
    region.offset = offset;
    region.size = size;
    region.active = true;
    region.occupied = false;
    region.prev = None;
    region.next = None;
    self.active += 1;
  }

  /// Splices `slot` out of the list and frees its slab slot.
  fn retire(
    &mut self,
    slot: usize,
  ) {
    let (prev, next) = (self.regions[slot].prev, self.regions[slot].next);
    if let Some(prev) = prev {
      self.regions[prev].next = next;
    }
    if let Some(next) = next {
      self.regions[next].prev = prev;
    }

    let region = &mut self.regions[slot];
    region.active = false;
    region.occupied = false;
    region.prev = None;
    region.next = None;
    self.active -= 1;
  }
}

/// Address-order iterator over active regions.
pub struct Walk<'a> {
  regions: &'a [Region],
  cursor: Option<usize>,
}

impl<'a> Iterator for Walk<'a> {
  type Item = (usize, &'a Region);

  fn next(&mut self) -> Option<Self::Item> {
    let slot = self.cursor?;
    let region = &self.regions[slot];
    self.cursor = region.next;
    Some((slot, region))
  }
}
