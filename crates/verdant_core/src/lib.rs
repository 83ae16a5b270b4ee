//! # Verdant Core
//!
//! Allocation and lifetime primitives shared by the Verdant renderer:
//! - Append-only index arenas (stable `u32` handles, bulk clear only)
//! - Best-fit range allocator for sub-allocating GPU buffers
//! - Frame-lifetime garbage ring for deferred resource destruction
//!
//! ## Architecture Rules
//!
//! 1. **Indices, not pointers** - everything the GPU sees is addressed by `u32`
//! 2. **No individual frees mid-scene** - arenas only grow until a full clear
//! 3. **Nothing is destroyed while a frame in flight may read it**
//!
//! ## Example
//!
//! ```rust
//! use verdant_core::{FrameGarbage, RangeAllocator};
//!
//! let mut bones = RangeAllocator::new();
//! let range = bones.allocate(32);
//! bones.release(range);
//! assert_eq!(bones.allocate(16).offset, range.offset);
//!
//! let mut garbage: FrameGarbage<u32> = FrameGarbage::new(2);
//! garbage.retire(7);
//! garbage.advance_frame(|_| {});
//! assert_eq!(garbage.pending(), 1);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod memory;
pub mod sync;

pub use memory::{AllocatedRange, IndexArena, RangeAllocator};
pub use sync::FrameGarbage;
