/// One slot of the node slab.
///
/// Active slots describe a byte range of the arena; inactive ones are
/// free for reuse. `prev`/`next` are slab indices, so growing the slab
/// never invalidates a link.
#[derive(Debug, Clone, Default)]
pub struct Region {
  pub offset: usize,
  pub size: usize,
  pub active: bool,
  pub occupied: bool,
  pub prev: Option<usize>,
  pub next: Option<usize>,
  /// Bumped every time the slot is handed out as an allocation.
  pub generation: u32,
}

impl Region {
  pub fn is_gap(&self) -> bool {
    self.active && !self.occupied
  }

  pub fn end(&self) -> usize {
    self.offset + self.size
  }
}

/// Identifies one pool for as long as the process lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(pub(crate) u64);

/// Proof of a live allocation, returned by `allocate`.
///
/// It is only honoured by the pool that issued it and only while the
/// allocation has not been released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationHandle {
  pub(crate) pool: PoolId,
  pub(crate) slot: usize,
  pub(crate) generation: u32,
  offset: usize,
  size: usize,
}

impl AllocationHandle {
  pub(crate) fn new(
    pool: PoolId,
    slot: usize,
    region: &Region,
  ) -> Self {
    Self {
      pool,
      slot,
      generation: region.generation,
      offset: region.offset,
      size: region.size,
    }
  }

  /// Byte offset of the allocation inside its pool's arena.
  pub fn offset(&self) -> usize {
    self.offset
  }

  pub fn size(&self) -> usize {
    self.size
  }
}

/// One entry of a pool snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
  pub size: usize,
  pub allocated: bool,
}

impl From<(usize, bool)> for Segment {
  fn from((size, allocated): (usize, bool)) -> Self {
    Self { size, allocated }
  }
}
