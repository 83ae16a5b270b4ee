//! wgpu implementation of [`GpuBackend`].

use std::borrow::Cow;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::backend::{align_to_copy, BufferSpec, GpuBackend, MapRequest, MapStatus};

/// Backend over a wgpu device and queue.
///
/// Staging copies are recorded into one upload encoder and submitted by
/// [`GpuBackend::flush`], ahead of the frame's own command buffer.
#[derive(Debug)]
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    uploads: Option<wgpu::CommandEncoder>,
}

impl WgpuBackend {
    /// Wraps a device created with [`WgpuBackend::required_features`].
    #[must_use]
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            uploads: None,
        }
    }

    /// Features the cull/draw pipeline needs.
    #[must_use]
    pub fn required_features() -> wgpu::Features {
        wgpu::Features::MULTI_DRAW_INDIRECT
            | wgpu::Features::MULTI_DRAW_INDIRECT_COUNT
            | wgpu::Features::INDIRECT_FIRST_INSTANCE
    }

    /// Device.
    #[must_use]
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Queue.
    #[must_use]
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }
}

fn padded(data: &[u8]) -> Cow<'_, [u8]> {
    let len = align_to_copy(data.len() as u64) as usize;
    if len == data.len() {
        Cow::Borrowed(data)
    } else {
        let mut bytes = data.to_vec();
        bytes.resize(len, 0);
        Cow::Owned(bytes)
    }
}

impl GpuBackend for WgpuBackend {
    type Buffer = Arc<wgpu::Buffer>;

    fn create_buffer(&mut self, spec: &BufferSpec) -> Self::Buffer {
        Arc::new(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(spec.label),
            size: align_to_copy(spec.size),
            usage: spec.usage,
            mapped_at_creation: false,
        }))
    }

    fn upload(&mut self, target: &Self::Buffer, data: &[u8]) -> Option<Self::Buffer> {
        if data.is_empty() {
            return None;
        }
        let contents = padded(data);
        let staging = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("verdant.staging"),
            contents: &contents,
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        let device = &self.device;
        let encoder = self.uploads.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("verdant.uploads"),
            })
        });
        encoder.copy_buffer_to_buffer(&staging, 0, target, 0, contents.len() as u64);
        Some(Arc::new(staging))
    }

    fn write(&mut self, target: &Self::Buffer, offset: u64, data: &[u8]) {
        if !data.is_empty() {
            self.queue.write_buffer(target, offset, &padded(data));
        }
    }

    fn flush(&mut self) {
        if let Some(encoder) = self.uploads.take() {
            self.queue.submit(Some(encoder.finish()));
        }
    }

    fn destroy(&mut self, buffer: Self::Buffer) {
        buffer.destroy();
    }

    fn request_map(&mut self, buffer: &Self::Buffer) -> MapRequest {
        let request = MapRequest::pending();
        let completion = request.clone();
        buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| completion.complete(result.is_ok()));
        request
    }

    fn poll(&mut self) {
        let _ = self.device.poll(wgpu::Maintain::Poll);
    }

    fn read_mapped(&mut self, buffer: &Self::Buffer, request: &MapRequest) -> Option<Vec<u8>> {
        if request.status() != MapStatus::Ready {
            return None;
        }
        let bytes = buffer.slice(..).get_mapped_range().to_vec();
        buffer.unmap();
        Some(bytes)
    }
}
