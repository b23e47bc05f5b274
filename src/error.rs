use thiserror::Error;

/// Result alias used by every fallible operation in the crate.
pub type Result<T> = std::result::Result<T, AllocError>;

/// Everything that can go wrong while managing pools.
///
/// `GapNotFound` and `Corrupted` are internal: they mean a bookkeeping
/// invariant was broken and should never be seen by a correct caller.
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
  #[error("registry is already initialized")]
  AlreadyInitialized,

  #[error("registry was never initialized or is already torn down")]
  AlreadyTornDown,

  #[error("registry is not initialized")]
  NotInitialized,

  #[error("registry still has {open} open pool(s)")]
  PoolsStillOpen { open: usize },

  #[error("size must be greater than zero")]
  ZeroSize,

  #[error("could not grow {what}")]
  ResourceExhausted { what: &'static str },

  #[error("no gap can hold {requested} bytes")]
  NoFit { requested: usize },

  #[error("pool is not clean: {allocations} allocation(s), {gaps} gap(s)")]
  NotClean { allocations: usize, gaps: usize },

  #[error("handle does not refer to a live pool or allocation")]
  InvalidHandle,

  #[error("region {region} is missing from the gap index")]
  GapNotFound { region: usize },

  #[error("pool bookkeeping is corrupted: {reason}")]
  Corrupted { reason: String },

  #[error("invalid configuration: {reason}")]
  InvalidConfig { reason: String },
}

impl AllocError {
  /// `true` when the error signals a broken invariant rather than a
  /// rejected request.
  #[must_use]
  pub fn is_internal(&self) -> bool {
    matches!(self, Self::GapNotFound { .. } | Self::Corrupted { .. })
  }

  /// Stable code for categorization.
  #[must_use]
  pub fn code(&self) -> &'static str {
    match self {
      Self::AlreadyInitialized => "POOL:REGISTRY:INITIALIZED",
      Self::AlreadyTornDown => "POOL:REGISTRY:TORN_DOWN",
      Self::NotInitialized => "POOL:REGISTRY:UNINITIALIZED",
      Self::PoolsStillOpen { .. } => "POOL:REGISTRY:OPEN_POOLS",
      Self::ZeroSize => "POOL:REQUEST:ZERO_SIZE",
      Self::ResourceExhausted { .. } => "POOL:RESOURCE:EXHAUSTED",
      Self::NoFit { .. } => "POOL:ALLOC:NO_FIT",
      Self::NotClean { .. } => "POOL:CLOSE:NOT_CLEAN",
      Self::InvalidHandle => "POOL:HANDLE:INVALID",
      Self::GapNotFound { .. } => "POOL:INTERNAL:GAP_NOT_FOUND",
      Self::Corrupted { .. } => "POOL:INTERNAL:CORRUPTED",
      Self::InvalidConfig { .. } => "POOL:CONFIG:INVALID",
    }
  }

  pub(crate) fn corrupted(reason: impl Into<String>) -> Self {
    let reason = reason.into();
    tracing::error!(%reason, "pool invariant violated");
    Self::Corrupted { reason }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_internal_kinds() {
    assert!(AllocError::GapNotFound { region: 3 }.is_internal());
    assert!(AllocError::Corrupted { reason: "x".into() }.is_internal());
    assert!(!AllocError::NoFit { requested: 8 }.is_internal());
    assert!(!AllocError::InvalidHandle.is_internal());
  }

  #[test]
  fn test_messages_and_codes() {
    let err = AllocError::NotClean { allocations: 2, gaps: 1 };
    assert_eq!(err.to_string(), "pool is not clean: 2 allocation(s), 1 gap(s)");
    assert_eq!(err.code(), "POOL:CLOSE:NOT_CLEAN");
    assert_eq!(AllocError::NoFit { requested: 64 }.to_string(), "no gap can hold 64 bytes");
  }
}
