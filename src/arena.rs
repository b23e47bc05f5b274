use std::ptr::NonNull;
use std::slice;

use libc::{c_void, calloc, free};

use crate::error::{AllocError, Result};

/// A fixed-size, zeroed byte buffer obtained straight from the C heap.
///
/// The buffer never moves or grows; regions address it by offset.
pub struct Arena {
  base: NonNull<u8>,
  len: usize,
}

impl Arena {
  pub fn new(len: usize) -> Result<Self> {
    if len == 0 {
      return Err(AllocError::ZeroSize);
    }

    let raw = unsafe { calloc(len, 1) } as *mut u8;

    match NonNull::new(raw) {
      Some(base) => Ok(Self { base, len }),
      None => Err(AllocError::ResourceExhausted { what: "arena" }),
    }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// Bytes in `offset..offset + len`. The range must lie inside the arena.
  pub fn slice(
    &self,
    offset: usize,
    len: usize,
  ) -> &[u8] {
    assert!(offset + len <= self.len, "range outside arena");
    unsafe { slice::from_raw_parts(self.base.as_ptr().add(offset), len) }
  }

  pub fn slice_mut(
    &mut self,
    offset: usize,
    len: usize,
  ) -> &mut [u8] {
    assert!(offset + len <= self.len, "range outside arena");
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr().add(offset), len) }
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    unsafe { free(self.base.as_ptr() as *mut c_void) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_is_zeroed_and_writable() {
    let mut arena = Arena::new(64).unwrap();
    assert_eq!(arena.len(), 64);
    assert!(arena.slice(0, 64).iter().all(|&b| b == 0));

    arena.slice_mut(10, 4).copy_from_slice(&[1, 2, 3, 4]);
    assert_eq!(arena.slice(10, 4), &[1, 2, 3, 4]);
    assert_eq!(arena.slice(9, 1), &[0]);
  }

  #[test]
  fn test_zero_length_arena() {
    assert_eq!(Arena::new(0).err(), Some(AllocError::ZeroSize));
  }

  #[test]
  #[should_panic(expected = "range outside arena")]
  fn test_out_of_range_slice() {
    let arena = Arena::new(8).unwrap();
    let _ = arena.slice(4, 8);
  }
}
