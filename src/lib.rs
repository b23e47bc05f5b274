//! # rpool - Memory Pools with First-Fit and Best-Fit Placement
//!
//! This crate carves fixed-size byte arenas ("pools") into variably sized
//! allocations and free regions ("gaps"), and merges freed regions back
//! together.
//!
//! ## Overview
//!
//! ```text
//!   One pool:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                              ARENA                                   │
//!   │                                                                      │
//!   │   ┌────────┬──────┬────────────┬──────┬────────────────────────────┐ │
//!   │   │  A1    │ gap  │    A2      │ gap  │           gap ...          │ │
//!   │   └────────┴──────┴────────────┴──────┴────────────────────────────┘ │
//!   │    region   region   region    region          region              │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Node slab:  one descriptor per region, linked in address order.
//!   Gap index:  gaps sorted by (size, offset) for best-fit lookups.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rpool
//!   ├── arena      - The pool's byte buffer (libc calloc/free)
//!   ├── config     - Initial capacities and growth factors
//!   ├── error      - AllocError and Result
//!   ├── gap_index  - Size-sorted index of free regions
//!   ├── heap       - Node slab with split and merge algorithms
//!   ├── pool       - PoolManager, Policy, PoolStats
//!   ├── region     - Region descriptor, handles, snapshot segments
//!   └── registry   - Registry of open pools and PoolHandle
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rpool::{Policy, Registry};
//!
//! let mut registry = Registry::default();
//! registry.init().unwrap();
//!
//! let pool = registry.open(1024, Policy::FirstFit).unwrap();
//! let alloc = registry.allocate(pool, 100).unwrap();
//! registry.pool_mut(pool).unwrap().bytes_mut(&alloc).unwrap().fill(0xAB);
//!
//! let layout: Vec<_> = registry
//!   .snapshot(pool)
//!   .unwrap()
//!   .iter()
//!   .map(|s| (s.size, s.allocated))
//!   .collect();
//! assert_eq!(layout, vec![(100, true), (924, false)]);
//!
//! registry.deallocate(pool, alloc).unwrap();
//! registry.close(pool).unwrap();
//! registry.teardown().unwrap();
//! ```
//!
//! ## How It Works
//!
//! Allocating splits a gap: the front becomes the allocation, the rest a
//! new gap linked right after it.
//!
//! ```text
//!   before:  ├──────────────── gap 1024 ────────────────┤
//!   alloc 100
//!   after:   ├─ A 100 ─┼────────── gap 924 ─────────────┤
//! ```
//!
//! Releasing merges with a free right neighbour, then with a free left
//! neighbour, so two gaps are never adjacent:
//!
//! ```text
//!   before:  ├─ gap 100 ─┼─ A 50 ─┼──── gap 874 ────┤
//!   free A
//!   after:   ├──────────────── gap 1024 ────────────┤
//! ```
//!
//! Storage for region descriptors, gap entries and registry slots only
//! grows (doubling once 75% full) and is never shrunk.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no internal locking; the types are not
//!   `Send` or `Sync`.
//! - **Fixed arenas**: a pool never grows beyond the size it was opened with.
//! - **Linear scans**: fit selection and gap removal walk arrays.

mod arena;
pub mod config;
pub mod error;
mod gap_index;
mod heap;
mod pool;
mod region;
mod registry;

pub use config::{PoolConfig, RegistryConfig};
pub use error::{AllocError, Result};
pub use pool::{Policy, PoolManager, PoolStats};
pub use region::{AllocationHandle, PoolId, Segment};
pub use registry::{PoolHandle, Registry};
