//! # GPU Buffer Synchronizer
//!
//! Sole writer of device buffer contents. Each frame the owner describes
//! every CPU mirror as a [`BufferSource`]; buffers whose source changed are
//! replaced:
//!
//! ```text
//!  new buffer ──> staging upload ──> device copy ──> bind
//!       old buffer ──> FrameGarbage (destroyed frames_in_flight frames later)
//! ```
//!
//! Streamed sources (animation state) are written in place while their size
//! holds.

use std::collections::HashMap;

use verdant_core::FrameGarbage;

use super::backend::{align_to_copy, BufferSpec, GpuBackend};
use crate::instancing::DrawListKind;

/// Smallest buffer created, so empty mirrors still bind.
pub const MIN_BUFFER_SIZE: u64 = 256;

/// How a buffer follows its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Replaced whenever the source generation moves.
    Rebuild,
    /// Written in place while the size holds, replaced otherwise.
    Streamed,
    /// Written by the GPU. Replaced only when the required size changes.
    Output,
}

/// Every buffer the cull and draw passes bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Shared vertices.
    Vertices,
    /// Shared `u16` indices.
    Indices,
    /// Shared texture units.
    TextureUnits,
    /// Shared vertex colours.
    VertexColors,
    /// Per-instance data.
    Instances,
    /// Model-space bounding volumes.
    CullingData,
    /// Bone matrices.
    BoneDeform,
    /// Bone playback state.
    BoneInstances,
    /// Uncompacted draw arguments of a list.
    DrawCalls(DrawListKind),
    /// Side records of a list.
    DrawCallData(DrawListKind),
    /// Compacted draw arguments written by the cull pass.
    CulledDrawCalls(DrawListKind),
}

impl BufferKind {
    /// Debug label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Vertices => "verdant.vertices",
            Self::Indices => "verdant.indices",
            Self::TextureUnits => "verdant.texture_units",
            Self::VertexColors => "verdant.vertex_colors",
            Self::Instances => "verdant.instances",
            Self::CullingData => "verdant.culling_data",
            Self::BoneDeform => "verdant.bone_deform",
            Self::BoneInstances => "verdant.bone_instances",
            Self::DrawCalls(DrawListKind::Opaque) => "verdant.draw_calls.opaque",
            Self::DrawCalls(DrawListKind::Transparent) => "verdant.draw_calls.transparent",
            Self::DrawCallData(DrawListKind::Opaque) => "verdant.draw_call_data.opaque",
            Self::DrawCallData(DrawListKind::Transparent) => "verdant.draw_call_data.transparent",
            Self::CulledDrawCalls(DrawListKind::Opaque) => "verdant.culled_draw_calls.opaque",
            Self::CulledDrawCalls(DrawListKind::Transparent) => {
                "verdant.culled_draw_calls.transparent"
            }
        }
    }

    /// Device usages.
    #[must_use]
    pub fn usage(self) -> wgpu::BufferUsages {
        use wgpu::BufferUsages as U;
        match self {
            Self::Indices => U::INDEX | U::COPY_DST,
            Self::DrawCalls(_) => U::STORAGE | U::INDIRECT | U::COPY_DST,
            Self::CulledDrawCalls(_) => U::STORAGE | U::INDIRECT,
            _ => U::STORAGE | U::COPY_DST,
        }
    }

    /// How the buffer follows its source.
    #[must_use]
    pub const fn update_mode(self) -> UpdateMode {
        match self {
            Self::BoneInstances => UpdateMode::Streamed,
            Self::CulledDrawCalls(_) => UpdateMode::Output,
            _ => UpdateMode::Rebuild,
        }
    }
}

/// What a buffer should hold.
#[derive(Debug, Clone, Copy)]
pub enum BufferContents<'a> {
    /// Bytes to upload.
    Data(&'a [u8]),
    /// Size only, filled on the device.
    Uninit(u64),
}

impl BufferContents<'_> {
    fn len(&self) -> u64 {
        match self {
            Self::Data(bytes) => bytes.len() as u64,
            Self::Uninit(len) => *len,
        }
    }
}

/// CPU mirror of one buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferSource<'a> {
    /// Buffer described.
    pub kind: BufferKind,
    /// Change counter of the mirror.
    pub generation: u64,
    /// Contents.
    pub contents: BufferContents<'a>,
}

impl<'a> BufferSource<'a> {
    /// Source uploading a slice of records.
    #[must_use]
    pub fn data<T: bytemuck::Pod>(kind: BufferKind, generation: u64, records: &'a [T]) -> Self {
        Self {
            kind,
            generation,
            contents: BufferContents::Data(bytemuck::cast_slice(records)),
        }
    }

    /// Source sized but not uploaded.
    #[must_use]
    pub const fn uninit(kind: BufferKind, generation: u64, len: u64) -> Self {
        Self {
            kind,
            generation,
            contents: BufferContents::Uninit(len),
        }
    }
}

/// What one [`BufferSynchronizer::sync`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Buffers created or replaced.
    pub rebuilt: u32,
    /// Streamed buffers written in place.
    pub written: u32,
    /// Buffers handed to the garbage ring, staging included.
    pub retired: u32,
    /// Bytes sent to the device.
    pub bytes_uploaded: u64,
}

impl SyncReport {
    /// Returns true if no buffer changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rebuilt == 0 && self.written == 0
    }
}

#[derive(Debug)]
struct BoundBuffer<B> {
    buffer: B,
    size: u64,
    generation: u64,
}

/// Current buffers, as the passes bind them.
#[derive(Debug)]
pub struct DescriptorSet<'a, B> {
    bound: &'a HashMap<BufferKind, BoundBuffer<B>>,
    version: u64,
}

impl<'a, B> DescriptorSet<'a, B> {
    /// Buffer bound for a kind.
    #[must_use]
    pub fn get(&self, kind: BufferKind) -> Option<&'a B> {
        self.bound.get(&kind).map(|b| &b.buffer)
    }

    /// Moves whenever any binding changes. Bind groups are rebuilt on change.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }
}

/// Owner of every synchronized device buffer.
#[derive(Debug)]
pub struct BufferSynchronizer<B> {
    bound: HashMap<BufferKind, BoundBuffer<B>>,
    version: u64,
}

impl<B> Default for BufferSynchronizer<B> {
    fn default() -> Self {
        Self {
            bound: HashMap::new(),
            version: 0,
        }
    }
}

impl<B: Clone> BufferSynchronizer<B> {
    /// Creates a synchronizer with nothing bound.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Brings every listed buffer up to date with its source.
    pub fn sync<G>(&mut self, backend: &mut G, garbage: &mut FrameGarbage<B>, sources: &[BufferSource<'_>]) -> SyncReport
    where
        G: GpuBackend<Buffer = B>,
    {
        let mut report = SyncReport::default();
        for source in sources {
            let size = align_to_copy(source.contents.len().max(MIN_BUFFER_SIZE));
            let mode = source.kind.update_mode();

            if let Some(bound) = self.bound.get_mut(&source.kind) {
                let unchanged = match mode {
                    UpdateMode::Output => bound.size == size,
                    _ => bound.generation == source.generation,
                };
                if unchanged {
                    continue;
                }
                if mode == UpdateMode::Streamed && bound.size == size {
                    if let BufferContents::Data(bytes) = source.contents {
                        backend.write(&bound.buffer, 0, bytes);
                        report.bytes_uploaded += bytes.len() as u64;
                    }
                    bound.generation = source.generation;
                    report.written += 1;
                    continue;
                }
            }

            let buffer = backend.create_buffer(&BufferSpec {
                label: source.kind.label(),
                size,
                usage: source.kind.usage(),
            });
            if let BufferContents::Data(bytes) = source.contents {
                if let Some(staging) = backend.upload(&buffer, bytes) {
                    garbage.retire(staging);
                    report.retired += 1;
                }
                report.bytes_uploaded += bytes.len() as u64;
            }

            let replaced = self.bound.insert(
                source.kind,
                BoundBuffer {
                    buffer,
                    size,
                    generation: source.generation,
                },
            );
            if let Some(old) = replaced {
                garbage.retire(old.buffer);
                report.retired += 1;
            }
            report.rebuilt += 1;
            tracing::debug!(label = source.kind.label(), size, "rebuilt buffer");
        }

        if report.rebuilt > 0 {
            self.version += 1;
        }
        report
    }

    /// Current bindings.
    #[must_use]
    pub fn descriptor_set(&self) -> DescriptorSet<'_, B> {
        DescriptorSet {
            bound: &self.bound,
            version: self.version,
        }
    }

    /// Buffer bound for a kind.
    #[must_use]
    pub fn buffer(&self, kind: BufferKind) -> Option<&B> {
        self.bound.get(&kind).map(|b| &b.buffer)
    }

    /// Binding version.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Number of bound buffers.
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }

    /// Retires every bound buffer.
    pub fn retire_all(&mut self, garbage: &mut FrameGarbage<B>) -> usize {
        let count = self.bound.len();
        for (_, bound) in self.bound.drain() {
            garbage.retire(bound.buffer);
        }
        if count > 0 {
            self.version += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{HeadlessBackend, HeadlessBuffer};

    fn setup() -> (HeadlessBackend, FrameGarbage<HeadlessBuffer>, BufferSynchronizer<HeadlessBuffer>) {
        (HeadlessBackend::new(), FrameGarbage::new(2), BufferSynchronizer::new())
    }

    #[test]
    fn test_unchanged_generation_skips() {
        let (mut backend, mut garbage, mut sync) = setup();
        let data = [1u32, 2, 3];
        let first = sync.sync(&mut backend, &mut garbage, &[BufferSource::data(BufferKind::Instances, 1, &data)]);
        assert_eq!(first.rebuilt, 1);
        let id = sync.buffer(BufferKind::Instances).unwrap().id();

        let second = sync.sync(&mut backend, &mut garbage, &[BufferSource::data(BufferKind::Instances, 1, &data)]);
        assert!(second.is_empty());
        assert_eq!(sync.buffer(BufferKind::Instances).unwrap().id(), id);
        assert_eq!(sync.version(), 1);
    }

    #[test]
    fn test_rebuild_defers_destroy() {
        let (mut backend, mut garbage, mut sync) = setup();
        sync.sync(&mut backend, &mut garbage, &[BufferSource::data(BufferKind::Vertices, 1, &[0u8; 16])]);
        let old = sync.buffer(BufferKind::Vertices).unwrap().clone();

        let report = sync.sync(&mut backend, &mut garbage, &[BufferSource::data(BufferKind::Vertices, 2, &[7u8; 512])]);
        assert_eq!(report.rebuilt, 1);
        // Old buffer plus both staging buffers.
        assert_eq!(garbage.pending(), 3);
        assert_ne!(sync.buffer(BufferKind::Vertices).unwrap().id(), old.id());
        assert_eq!(sync.buffer(BufferKind::Vertices).unwrap().size(), 512);

        assert_eq!(garbage.advance_frame(|b| backend.destroy(b)), 0);
        assert_eq!(garbage.advance_frame(|b| backend.destroy(b)), 3);
        assert_eq!(backend.live_buffers(), 1);
    }

    #[test]
    fn test_streamed_writes_in_place() {
        let (mut backend, mut garbage, mut sync) = setup();
        let kind = BufferKind::BoneInstances;
        sync.sync(&mut backend, &mut garbage, &[BufferSource::data(kind, 1, &[1u32; 8])]);
        let id = sync.buffer(kind).unwrap().id();

        let report = sync.sync(&mut backend, &mut garbage, &[BufferSource::data(kind, 2, &[5u32; 8])]);
        assert_eq!(report.written, 1);
        assert_eq!(report.rebuilt, 0);
        let buffer = sync.buffer(kind).unwrap();
        assert_eq!(buffer.id(), id);
        assert_eq!(buffer.read_pod::<u32>()[..8], [5; 8]);

        // Growing past the buffer replaces it.
        let report = sync.sync(&mut backend, &mut garbage, &[BufferSource::data(kind, 3, &[5u32; 100])]);
        assert_eq!(report.rebuilt, 1);
    }

    #[test]
    fn test_output_follows_size_only() {
        let (mut backend, mut garbage, mut sync) = setup();
        let kind = BufferKind::CulledDrawCalls(DrawListKind::Opaque);
        sync.sync(&mut backend, &mut garbage, &[BufferSource::uninit(kind, 1, 400)]);
        let report = sync.sync(&mut backend, &mut garbage, &[BufferSource::uninit(kind, 2, 400)]);
        assert!(report.is_empty());
        let report = sync.sync(&mut backend, &mut garbage, &[BufferSource::uninit(kind, 3, 800)]);
        assert_eq!(report.rebuilt, 1);
        assert_eq!(backend.uploads(), 0);
    }

    #[test]
    fn test_empty_source_still_binds() {
        let (mut backend, mut garbage, mut sync) = setup();
        let empty: [u32; 0] = [];
        sync.sync(&mut backend, &mut garbage, &[BufferSource::data(BufferKind::VertexColors, 0, &empty)]);
        assert_eq!(sync.buffer(BufferKind::VertexColors).unwrap().size(), MIN_BUFFER_SIZE);
        assert_eq!(garbage.pending(), 0);
    }
}
