//! Capacity and growth knobs for pools and the registry.

use crate::error::{AllocError, Result};

/// Growth settings for one pool's node slab and gap index.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
  /// Initial number of region slots in the node slab.
  pub node_heap_capacity: usize,
  /// Initial number of entries the gap index can hold.
  pub gap_index_capacity: usize,
  /// Occupancy ratio above which storage grows.
  pub fill_factor: f32,
  /// Multiplier applied to a capacity when it grows.
  pub expand_factor: usize,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      node_heap_capacity: 40,
      gap_index_capacity: 40,
      fill_factor: 0.75,
      expand_factor: 2,
    }
  }
}

impl PoolConfig {
  /// Tiny initial capacities, so growth kicks in after a handful of regions.
  #[must_use]
  pub fn compact() -> Self {
    Self {
      node_heap_capacity: 2,
      gap_index_capacity: 2,
      ..Self::default()
    }
  }

  pub fn validate(&self) -> Result<()> {
    check_capacity("node_heap_capacity", self.node_heap_capacity)?;
    check_capacity("gap_index_capacity", self.gap_index_capacity)?;
    check_growth(self.fill_factor, self.expand_factor)
  }
}

/// Settings for the pool registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
  /// Initial number of pool slots.
  pub store_capacity: usize,
  pub fill_factor: f32,
  pub expand_factor: usize,
  /// Applied to every pool the registry opens.
  pub pool: PoolConfig,
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self {
      store_capacity: 20,
      fill_factor: 0.75,
      expand_factor: 2,
      pool: PoolConfig::default(),
    }
  }
}

impl RegistryConfig {
  pub fn validate(&self) -> Result<()> {
    check_capacity("store_capacity", self.store_capacity)?;
    check_growth(self.fill_factor, self.expand_factor)?;
    self.pool.validate()
  }
}

/// Capacity after one growth step, or `None` when not needed yet.
pub(crate) fn grown_capacity(
  len: usize,
  capacity: usize,
  fill_factor: f32,
  expand_factor: usize,
) -> Option<usize> {
  if (len as f32 / capacity as f32) > fill_factor {
    Some(capacity.saturating_mul(expand_factor))
  } else {
    None
  }
}

fn check_capacity(
  name: &str,
  value: usize,
) -> Result<()> {
  if value == 0 {
    return Err(AllocError::InvalidConfig {
      reason: format!("{name} must be at least 1"),
    });
  }
  Ok(())
}

fn check_growth(
  fill_factor: f32,
  expand_factor: usize,
) -> Result<()> {
  if !(fill_factor > 0.0 && fill_factor < 1.0) {
    return Err(AllocError::InvalidConfig {
      reason: format!("fill_factor must be in (0, 1), got {fill_factor}"),
    });
  }
  if expand_factor < 2 {
    return Err(AllocError::InvalidConfig {
      reason: format!("expand_factor must be at least 2, got {expand_factor}"),
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_valid() {
    assert!(PoolConfig::default().validate().is_ok());
    assert!(PoolConfig::compact().validate().is_ok());
    assert!(RegistryConfig::default().validate().is_ok());
  }

  #[test]
  fn test_rejects_bad_values() {
    let config = PoolConfig {
      fill_factor: 1.0,
      ..PoolConfig::default()
    };
    assert!(matches!(config.validate(), Err(AllocError::InvalidConfig { .. })));

    let config = PoolConfig {
      node_heap_capacity: 0,
      ..PoolConfig::default()
    };
    assert!(matches!(config.validate(), Err(AllocError::InvalidConfig { .. })));

    let config = RegistryConfig {
      expand_factor: 1,
      ..RegistryConfig::default()
    };
    assert!(matches!(config.validate(), Err(AllocError::InvalidConfig { .. })));
  }

  #[test]
  fn test_grown_capacity() {
    assert_eq!(grown_capacity(30, 40, 0.75, 2), None);
    assert_eq!(grown_capacity(31, 40, 0.75, 2), Some(80));
    assert_eq!(grown_capacity(1, 1, 0.75, 2), Some(2));
  }
}
