//! Device seam used by the buffer synchronizer and the pipeline.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Description of a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSpec {
    /// Debug label.
    pub label: &'static str,
    /// Size in bytes, a multiple of 4.
    pub size: u64,
    /// Allowed usages.
    pub usage: wgpu::BufferUsages,
}

/// Progress of a readback map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapStatus {
    /// The device has not finished the map yet.
    Pending,
    /// Contents can be read.
    Ready,
    /// The map was refused, e.g. the buffer was destroyed.
    Failed,
}

/// Shared completion flag of a map request.
///
/// The device callback may fire on any thread.
#[derive(Debug, Clone)]
pub struct MapRequest(Arc<AtomicU8>);

impl MapRequest {
    const PENDING: u8 = 0;
    const READY: u8 = 1;
    const FAILED: u8 = 2;

    /// New request waiting for the device.
    #[must_use]
    pub fn pending() -> Self {
        Self(Arc::new(AtomicU8::new(Self::PENDING)))
    }

    /// Request that already completed.
    #[must_use]
    pub fn ready() -> Self {
        Self(Arc::new(AtomicU8::new(Self::READY)))
    }

    /// Records the device's answer.
    pub fn complete(&self, ok: bool) {
        let value = if ok { Self::READY } else { Self::FAILED };
        self.0.store(value, Ordering::Release);
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> MapStatus {
        match self.0.load(Ordering::Acquire) {
            Self::READY => MapStatus::Ready,
            Self::FAILED => MapStatus::Failed,
            _ => MapStatus::Pending,
        }
    }
}

/// Device operations the instance pipeline needs.
///
/// Buffer handles are cheap clones that keep the buffer alive; a handle
/// passed to [`GpuBackend::destroy`] must no longer be referenced by any
/// frame the device has not finished.
pub trait GpuBackend {
    /// Buffer handle.
    type Buffer: Clone + fmt::Debug;

    /// Creates an uninitialized buffer.
    fn create_buffer(&mut self, spec: &BufferSpec) -> Self::Buffer;

    /// Copies `data` into a new staging buffer and schedules a device copy
    /// from it into `target` at offset 0.
    ///
    /// Returns the staging buffer, which must be retired like any other
    /// buffer. Returns `None` when `data` is empty.
    fn upload(&mut self, target: &Self::Buffer, data: &[u8]) -> Option<Self::Buffer>;

    /// Writes `data` into `target` through the queue, ordered before the next
    /// submission.
    fn write(&mut self, target: &Self::Buffer, offset: u64, data: &[u8]);

    /// Submits any copies scheduled by [`GpuBackend::upload`].
    fn flush(&mut self) {}

    /// Releases a buffer.
    fn destroy(&mut self, buffer: Self::Buffer);

    /// Starts mapping a readback buffer for reading.
    fn request_map(&mut self, buffer: &Self::Buffer) -> MapRequest;

    /// Lets the device run completion callbacks without waiting.
    fn poll(&mut self);

    /// Reads and unmaps a buffer whose map is ready. `None` otherwise.
    fn read_mapped(&mut self, buffer: &Self::Buffer, request: &MapRequest) -> Option<Vec<u8>>;
}

/// Rounds a byte length up to the device copy alignment.
#[must_use]
pub const fn align_to_copy(len: u64) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    (len + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_request_status() {
        let request = MapRequest::pending();
        let shared = request.clone();
        assert_eq!(request.status(), MapStatus::Pending);
        std::thread::spawn(move || shared.complete(true)).join().unwrap();
        assert_eq!(request.status(), MapStatus::Ready);

        let failed = MapRequest::pending();
        failed.complete(false);
        assert_eq!(failed.status(), MapStatus::Failed);
    }

    #[test]
    fn test_copy_alignment() {
        assert_eq!(align_to_copy(0), 0);
        assert_eq!(align_to_copy(2), 4);
        assert_eq!(align_to_copy(20), 20);
    }
}
