//! # Memory Management
//!
//! Index arenas and range allocators for GPU-visible data.
//!
//! ## Design Rules
//!
//! Everything is addressed by integer index:
//! - Arena slots never move relative to their index
//! - Range offsets are element offsets into a GPU buffer
//! - Nothing is individually freed from an arena, only bulk-cleared

mod arena;
mod range_allocator;

pub use arena::IndexArena;
pub use range_allocator::{AllocatedRange, RangeAllocator};
