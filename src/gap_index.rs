use tracing::{error, trace};

use crate::config::grown_capacity;
use crate::error::{AllocError, Result};

/// A gap index entry: a free region and what it is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapEntry {
  pub size: usize,
  pub offset: usize,
  /// Slab index of the region.
  pub region: usize,
}

impl GapEntry {
  fn key(&self) -> (usize, usize) {
    (self.size, self.offset)
  }
}

/// Free regions sorted ascending by size, ties ascending by offset.
///
/// The first entry large enough for a request is therefore the smallest
/// sufficient gap at the lowest address.
#[derive(Debug)]
pub struct GapIndex {
  entries: Vec<GapEntry>,
  capacity: usize,
  fill_factor: f32,
  expand_factor: usize,
}

impl GapIndex {
  pub fn with_capacity(
    capacity: usize,
    fill_factor: f32,
    expand_factor: usize,
  ) -> Result<Self> {
    let mut entries = Vec::new();
    entries
      .try_reserve_exact(capacity)
      .map_err(|_| AllocError::ResourceExhausted { what: "gap index" })?;

    Ok(Self {
      entries,
      capacity,
      fill_factor,
      expand_factor,
    })
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  #[cfg(test)]
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn iter(&self) -> impl Iterator<Item = &GapEntry> {
    self.entries.iter()
  }

  /// Grows the backing storage if it is past its fill factor.
  pub fn ensure_room(&mut self) -> Result<()> {
    let Some(new_capacity) =
      grown_capacity(self.entries.len(), self.capacity, self.fill_factor, self.expand_factor)
    else {
      return Ok(());
    };

    self
      .entries
      .try_reserve_exact(new_capacity - self.entries.len())
      .map_err(|_| AllocError::ResourceExhausted { what: "gap index" })?;

    trace!(from = self.capacity, to = new_capacity, "gap index grown");
    self.capacity = new_capacity;
    Ok(())
  }

  pub fn insert(
    &mut self,
    size: usize,
    offset: usize,
    region: usize,
  ) -> Result<()> {
    self.ensure_room()?;

    self.entries.push(GapEntry { size, offset, region });

    // Only the new last entry can be out of place.
    let mut i = self.entries.len() - 1;
    while i > 0 && self.entries[i].key() < self.entries[i - 1].key() {
      self.entries.swap(i, i - 1);
      i -= 1;
    }

    Ok(())
  }

  pub fn remove(
    &mut self,
    region: usize,
  ) -> Result<GapEntry> {
    match self.entries.iter().position(|entry| entry.region == region) {
      Some(pos) => Ok(self.entries.remove(pos)),
      None => {
        error!(region, "region missing from gap index");
        Err(AllocError::GapNotFound { region })
      }
    }
  }

  /// Smallest gap holding at least `size` bytes, lowest offset first.
  pub fn best_fit(
    &self,
    size: usize,
  ) -> Option<&GapEntry> {
    self.entries.iter().find(|entry| entry.size >= size)
  }

  pub fn is_ordered(&self) -> bool {
    self.entries.windows(2).all(|pair| pair[0].key() < pair[1].key())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn index() -> GapIndex {
    GapIndex::with_capacity(4, 0.75, 2).unwrap()
  }

  fn regions(index: &GapIndex) -> Vec<usize> {
    index.iter().map(|entry| entry.region).collect()
  }

  #[test]
  fn test_insert_keeps_size_then_offset_order() {
    let mut index = index();
    index.insert(30, 0, 0).unwrap();
    index.insert(10, 500, 1).unwrap();
    index.insert(30, 200, 2).unwrap();
    index.insert(10, 100, 3).unwrap();

    assert_eq!(regions(&index), vec![3, 1, 0, 2]);
    assert!(index.is_ordered());
  }

  #[test]
  fn test_remove_shifts_later_entries() {
    let mut index = index();
    index.insert(5, 0, 0).unwrap();
    index.insert(6, 10, 1).unwrap();
    index.insert(7, 20, 2).unwrap();

    let removed = index.remove(1).unwrap();
    assert_eq!(removed, GapEntry { size: 6, offset: 10, region: 1 });
    assert_eq!(regions(&index), vec![0, 2]);
  }

  #[test]
  fn test_remove_missing_region() {
    let mut index = index();
    index.insert(5, 0, 0).unwrap();
    assert_eq!(index.remove(9), Err(AllocError::GapNotFound { region: 9 }));
    assert_eq!(index.len(), 1);
  }

  #[test]
  fn test_best_fit_prefers_smallest_then_lowest() {
    let mut index = index();
    index.insert(30, 0, 0).unwrap();
    index.insert(10, 100, 1).unwrap();
    index.insert(10, 50, 2).unwrap();

    assert_eq!(index.best_fit(10).map(|e| e.region), Some(2));
    assert_eq!(index.best_fit(11).map(|e| e.region), Some(0));
    assert_eq!(index.best_fit(31), None);
  }

  #[test]
  fn test_growth_doubles_capacity() {
    let mut index = index();
    for i in 0..4 {
      index.insert(i + 1, i * 10, i).unwrap();
    }
    assert_eq!(index.capacity(), 4);

    index.insert(5, 40, 4).unwrap();
    assert_eq!(index.capacity(), 8);

    for i in 5..8 {
      index.insert(i + 1, i * 10, i).unwrap();
    }
    assert_eq!(index.capacity(), 16);
    assert_eq!(index.len(), 8);
  }
}
