//! # Range Allocator
//!
//! Best-fit sub-allocator for element ranges inside a growable GPU buffer.
//!
//! ```text
//!  offset 0                                   capacity (high-water mark)
//!  ├──────────┬──────┬────────────┬───────────┤
//!  │  used    │ free │    used    │   free    │  ← bump point sits at capacity
//!  └──────────┴──────┴────────────┴───────────┘
//!
//!  allocate(n): smallest free block with len >= n, split remainder back
//!               otherwise bump at capacity (buffer grows)
//!  release(r):  insert r, merge with neighbours that touch it
//! ```

use std::collections::{BTreeMap, BTreeSet};

/// A contiguous range of elements handed out by a [`RangeAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AllocatedRange {
    /// First element.
    pub offset: u32,
    /// Number of elements.
    pub len: u32,
}

impl AllocatedRange {
    /// Creates a range.
    #[must_use]
    pub const fn new(offset: u32, len: u32) -> Self {
        Self { offset, len }
    }

    /// One past the last element.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.offset + self.len
    }

    /// Returns true for zero-length ranges.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Best-fit range allocator with coalescing free list.
///
/// Capacity is a high-water mark: it only grows when no free block fits,
/// and it never shrinks until [`RangeAllocator::clear`]. The owner sizes
/// its backing buffer to [`RangeAllocator::capacity`].
///
/// # Thread Safety
///
/// Not thread-safe. The render thread owns it.
#[derive(Debug, Clone, Default)]
pub struct RangeAllocator {
    /// Free blocks keyed by offset, value is length.
    free_by_offset: BTreeMap<u32, u32>,
    /// Free blocks ordered by `(len, offset)` for best-fit lookup.
    free_by_len: BTreeSet<(u32, u32)>,
    /// Bump point. Everything below it has been handed out at least once.
    capacity: u32,
    /// Elements currently handed out.
    allocated: u32,
}

impl RangeAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backing size required to hold every range ever handed out.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Elements currently in use.
    #[inline]
    #[must_use]
    pub const fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Elements sitting in the free list.
    #[must_use]
    pub fn free_len(&self) -> u32 {
        self.capacity - self.allocated
    }

    /// Number of distinct free blocks.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        self.free_by_offset.len()
    }

    /// Allocates `len` contiguous elements.
    ///
    /// Picks the smallest free block that fits (lowest offset on ties) and
    /// returns the unused tail to the free list. Falls back to bumping the
    /// capacity. A zero-length request returns an empty range and changes
    /// nothing.
    pub fn allocate(&mut self, len: u32) -> AllocatedRange {
        if len == 0 {
            return AllocatedRange::new(0, 0);
        }

        let best = self.free_by_len.range((len, 0)..).next().copied();
        let offset = if let Some((block_len, block_offset)) = best {
            self.remove_free(block_offset, block_len);
            if block_len > len {
                self.insert_free(block_offset + len, block_len - len);
            }
            block_offset
        } else {
            let offset = self.capacity;
            self.capacity += len;
            offset
        };

        self.allocated += len;
        AllocatedRange::new(offset, len)
    }

    /// Returns a range to the free list, merging with adjacent free blocks.
    ///
    /// Returns false (and changes nothing) for empty ranges, ranges past the
    /// capacity, or ranges overlapping memory that is already free.
    pub fn release(&mut self, range: AllocatedRange) -> bool {
        if range.is_empty() || range.end() > self.capacity || self.overlaps_free(range) {
            return false;
        }

        let mut offset = range.offset;
        let mut len = range.len;

        let prev = self
            .free_by_offset
            .range(..offset)
            .next_back()
            .map(|(&o, &l)| (o, l));
        if let Some((prev_offset, prev_len)) = prev {
            if prev_offset + prev_len == offset {
                self.remove_free(prev_offset, prev_len);
                offset = prev_offset;
                len += prev_len;
            }
        }

        let next = self.free_by_offset.get(&range.end()).copied();
        if let Some(next_len) = next {
            self.remove_free(range.end(), next_len);
            len += next_len;
        }

        self.insert_free(offset, len);
        self.allocated -= range.len;
        true
    }

    /// Forgets every allocation and resets capacity to zero.
    pub fn clear(&mut self) {
        self.free_by_offset.clear();
        self.free_by_len.clear();
        self.capacity = 0;
        self.allocated = 0;
    }

    fn overlaps_free(&self, range: AllocatedRange) -> bool {
        let before = self.free_by_offset.range(..=range.offset).next_back();
        if let Some((&o, &l)) = before {
            if o + l > range.offset {
                return true;
            }
        }
        self.free_by_offset
            .range(range.offset..range.end())
            .next()
            .is_some()
    }

    fn insert_free(&mut self, offset: u32, len: u32) {
        self.free_by_offset.insert(offset, len);
        self.free_by_len.insert((len, offset));
    }

    fn remove_free(&mut self, offset: u32, len: u32) {
        self.free_by_offset.remove(&offset);
        self.free_by_len.remove(&(len, offset));
    }
}
