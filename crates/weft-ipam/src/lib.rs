//! # weft-ipam
//!
//! Address pool allocator for Weft networks.
//!
//! Pools are grouped into named address spaces and identified by opaque
//! string ids so the allocator can be swapped for a remote implementation
//! without changing its callers.

#![warn(missing_docs)]

pub mod allocator;
mod pool;

pub use allocator::{Allocator, GLOBAL_ADDRESS_SPACE, LOCAL_ADDRESS_SPACE, PoolAllocation};
