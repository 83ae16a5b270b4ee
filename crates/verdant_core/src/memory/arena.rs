//! # Index Arena
//!
//! Append-only storage addressed by stable `u32` indices.

/// Append-only arena with `u32` indices.
///
/// Values are pushed and never individually removed, so an index handed out
/// once stays valid until [`IndexArena::clear`]. The backing `Vec` may
/// reallocate freely: callers hold indices, never references.
///
/// # Example
///
/// ```rust
/// use verdant_core::IndexArena;
///
/// let mut arena = IndexArena::new();
/// let a = arena.push("rock");
/// let b = arena.push("tree");
/// assert_eq!(arena.get(a), Some(&"rock"));
/// assert_eq!(b, 1);
/// ```
#[derive(Debug, Clone)]
pub struct IndexArena<T> {
    /// Stored values, index == handle.
    items: Vec<T>,
}

impl<T> IndexArena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Creates an empty arena with room for `capacity` values.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Appends a value and returns its index.
    pub fn push(&mut self, value: T) -> u32 {
        let index = self.items.len() as u32;
        self.items.push(value);
        index
    }

    /// Appends every value, returning the index of the first one.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, values: I) -> u32 {
        let first = self.items.len() as u32;
        self.items.extend(values);
        first
    }

    /// Index the next pushed value will receive.
    #[inline]
    #[must_use]
    pub fn next_index(&self) -> u32 {
        self.items.len() as u32
    }

    /// Gets a value by index.
    #[inline]
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&T> {
        self.items.get(index as usize)
    }

    /// Gets a mutable value by index.
    #[inline]
    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.items.get_mut(index as usize)
    }

    /// Number of stored values.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing has been pushed since the last clear.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Contiguous view of every value, in index order.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Mutable contiguous view. Indices are unaffected.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    /// Iterates `(index, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.items.iter().enumerate().map(|(i, v)| (i as u32, v))
    }

    /// Removes every value. All previously issued indices become invalid.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T> Default for IndexArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
