//! # Frame Garbage Ring
//!
//! Deferred release of resources that in-flight frames may still reference.

/// Ring of pending-release lists, one per frame in flight.
///
/// Ownership of a retired value moves into the list of the current frame
/// slot. The value is handed to the release callback only when the ring
/// wraps back to that slot, i.e. after `frames_in_flight` calls to
/// [`FrameGarbage::advance_frame`].
#[derive(Debug)]
pub struct FrameGarbage<T> {
    /// Pending values per frame slot.
    slots: Vec<Vec<T>>,
    /// Slot receiving values retired this frame.
    current: usize,
    /// Frames advanced since creation.
    frame: u64,
}

impl<T> FrameGarbage<T> {
    /// Creates a ring for `frames_in_flight` frames (at least one).
    #[must_use]
    pub fn new(frames_in_flight: usize) -> Self {
        let count = frames_in_flight.max(1);
        Self {
            slots: (0..count).map(|_| Vec::new()).collect(),
            current: 0,
            frame: 0,
        }
    }

    /// Number of frames a retired value survives.
    #[inline]
    #[must_use]
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Frames advanced since creation.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Slot receiving values retired this frame.
    #[inline]
    #[must_use]
    pub const fn current_slot(&self) -> usize {
        self.current
    }

    /// Takes ownership of a value that must outlive the frames in flight.
    pub fn retire(&mut self, value: T) {
        self.slots[self.current].push(value);
    }

    /// Values waiting for release across every slot.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    /// Moves to the next frame and releases the values retired
    /// `frames_in_flight` frames ago. Returns how many were released.
    pub fn advance_frame<F: FnMut(T)>(&mut self, mut release: F) -> usize {
        self.frame += 1;
        self.current = (self.current + 1) % self.slots.len();

        let expired = std::mem::take(&mut self.slots[self.current]);
        let count = expired.len();
        for value in expired {
            release(value);
        }

        if count > 0 {
            tracing::trace!(frame = self.frame, count, "released retired resources");
        }
        count
    }

    /// Releases everything immediately. Only valid once the device is idle.
    pub fn drain_all<F: FnMut(T)>(&mut self, mut release: F) -> usize {
        let mut count = 0;
        for slot in &mut self.slots {
            for value in slot.drain(..) {
                release(value);
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_after_frames_in_flight() {
        let mut garbage = FrameGarbage::new(2);
        garbage.retire("old vertex buffer");

        let mut released = Vec::new();
        garbage.advance_frame(|v| released.push(v));
        assert!(released.is_empty(), "must survive one frame in flight");

        garbage.advance_frame(|v| released.push(v));
        assert_eq!(released, vec!["old vertex buffer"]);
        assert_eq!(garbage.pending(), 0);
    }

    #[test]
    fn test_values_retired_in_different_frames() {
        let mut garbage = FrameGarbage::new(2);
        garbage.retire(1);
        garbage.advance_frame(|_| {});
        garbage.retire(2);

        let mut released = Vec::new();
        garbage.advance_frame(|v| released.push(v));
        assert_eq!(released, vec![1]);
        garbage.advance_frame(|v| released.push(v));
        assert_eq!(released, vec![1, 2]);
    }

    #[test]
    fn test_zero_frames_clamps_to_one() {
        let mut garbage = FrameGarbage::new(0);
        assert_eq!(garbage.frames_in_flight(), 1);
        garbage.retire(5);
        assert_eq!(garbage.advance_frame(|_| {}), 1);
    }

    #[test]
    fn test_drain_all() {
        let mut garbage = FrameGarbage::new(3);
        garbage.retire(1);
        garbage.advance_frame(|_| {});
        garbage.retire(2);
        let mut released = Vec::new();
        assert_eq!(garbage.drain_all(|v| released.push(v)), 2);
        released.sort_unstable();
        assert_eq!(released, vec![1, 2]);
    }
}
