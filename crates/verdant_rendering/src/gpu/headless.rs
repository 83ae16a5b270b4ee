//! Host-memory backend for tools and tests.

use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;

use super::backend::{BufferSpec, GpuBackend, MapRequest, MapStatus};

/// Buffer living in host memory.
#[derive(Debug, Clone)]
pub struct HeadlessBuffer {
    id: u64,
    label: &'static str,
    usage: wgpu::BufferUsages,
    data: Arc<Mutex<Vec<u8>>>,
}

impl HeadlessBuffer {
    /// Creation-order id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Debug label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }

    /// Allowed usages.
    #[must_use]
    pub const fn usage(&self) -> wgpu::BufferUsages {
        self.usage
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.lock().len() as u64
    }

    /// Copy of the contents.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// Contents as records. Trailing bytes that do not form a record are
    /// ignored.
    #[must_use]
    pub fn read_pod<T: Pod>(&self) -> Vec<T> {
        let data = self.data.lock();
        data.chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    /// Overwrites bytes, clipped to the buffer size.
    pub fn write_at(&self, offset: u64, bytes: &[u8]) {
        let mut data = self.data.lock();
        let start = (offset as usize).min(data.len());
        let end = (start + bytes.len()).min(data.len());
        data[start..end].copy_from_slice(&bytes[..end - start]);
    }
}

/// Backend that keeps every buffer in host memory.
///
/// Uploads complete immediately and readback maps are ready at once.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u64,
    live: usize,
    created: u64,
    destroyed: u64,
    uploads: u64,
    bytes_uploaded: u64,
}

impl HeadlessBackend {
    /// Creates a backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers created and not yet destroyed.
    #[must_use]
    pub const fn live_buffers(&self) -> usize {
        self.live
    }

    /// Buffers created since startup.
    #[must_use]
    pub const fn created_buffers(&self) -> u64 {
        self.created
    }

    /// Buffers destroyed since startup.
    #[must_use]
    pub const fn destroyed_buffers(&self) -> u64 {
        self.destroyed
    }

    /// Staging uploads performed.
    #[must_use]
    pub const fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Bytes copied by uploads and writes.
    #[must_use]
    pub const fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }
}

impl GpuBackend for HeadlessBackend {
    type Buffer = HeadlessBuffer;

    fn create_buffer(&mut self, spec: &BufferSpec) -> HeadlessBuffer {
        let id = self.next_id;
        self.next_id += 1;
        self.live += 1;
        self.created += 1;
        HeadlessBuffer {
            id,
            label: spec.label,
            usage: spec.usage,
            data: Arc::new(Mutex::new(vec![0; spec.size as usize])),
        }
    }

    fn upload(&mut self, target: &HeadlessBuffer, data: &[u8]) -> Option<HeadlessBuffer> {
        if data.is_empty() {
            return None;
        }
        let staging = self.create_buffer(&BufferSpec {
            label: "verdant.staging",
            size: data.len() as u64,
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        staging.write_at(0, data);
        target.write_at(0, data);
        self.uploads += 1;
        self.bytes_uploaded += data.len() as u64;
        Some(staging)
    }

    fn write(&mut self, target: &HeadlessBuffer, offset: u64, data: &[u8]) {
        target.write_at(offset, data);
        self.bytes_uploaded += data.len() as u64;
    }

    fn destroy(&mut self, buffer: HeadlessBuffer) {
        tracing::trace!(id = buffer.id, label = buffer.label, "destroy buffer");
        self.live = self.live.saturating_sub(1);
        self.destroyed += 1;
    }

    fn request_map(&mut self, _buffer: &HeadlessBuffer) -> MapRequest {
        MapRequest::ready()
    }

    fn poll(&mut self) {}

    fn read_mapped(&mut self, buffer: &HeadlessBuffer, request: &MapRequest) -> Option<Vec<u8>> {
        (request.status() == MapStatus::Ready).then(|| buffer.bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_writes_target_and_returns_staging() {
        let mut backend = HeadlessBackend::new();
        let target = backend.create_buffer(&BufferSpec {
            label: "target",
            size: 8,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        let staging = backend.upload(&target, &[1, 2, 3, 4]).unwrap();
        assert_eq!(target.bytes(), vec![1, 2, 3, 4, 0, 0, 0, 0]);
        assert_eq!(staging.size(), 4);
        assert_eq!(backend.live_buffers(), 2);

        backend.destroy(staging);
        assert_eq!(backend.live_buffers(), 1);
        assert!(backend.upload(&target, &[]).is_none());
    }

    #[test]
    fn test_write_is_clipped() {
        let mut backend = HeadlessBackend::new();
        let buffer = backend.create_buffer(&BufferSpec {
            label: "small",
            size: 4,
            usage: wgpu::BufferUsages::COPY_DST,
        });
        backend.write(&buffer, 2, &[9, 9, 9, 9]);
        assert_eq!(buffer.bytes(), vec![0, 0, 9, 9]);
        assert_eq!(buffer.read_pod::<u16>(), vec![0, 0x0909]);
    }
}
