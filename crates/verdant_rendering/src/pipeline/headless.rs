//! Host-memory command recorder.
//!
//! Executes the cull pass on the CPU with [`is_draw_visible`] and records
//! what would have been drawn. Compaction keeps draw order, unlike the GPU.

use verdant_assets::CullingData;

use super::recorder::{BufferAccess, BufferBarrier, CommandRecorder, CullDispatch, IndirectDraw};
use crate::culling::{is_draw_visible, CullingConstants, DepthPyramid};
use crate::gpu::HeadlessBuffer;
use crate::instancing::{DrawCall, DrawCallData, DrawListKind, InstanceData};

/// One command as recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    /// Words written into a buffer.
    Fill {
        /// Target label.
        label: &'static str,
        /// Words written.
        words: Vec<u32>,
    },
    /// Culling dispatch.
    DispatchCull {
        /// List culled.
        list: DrawListKind,
        /// Draw calls tested.
        draw_count: u32,
        /// Draw calls kept.
        survivors: u32,
    },
    /// Barrier.
    Barrier {
        /// Access waited on.
        src: BufferAccess,
        /// Waiting access.
        dst: BufferAccess,
    },
    /// Indirect draw.
    Draw {
        /// List drawn.
        list: DrawListKind,
        /// Draws issued.
        draw_count: u32,
        /// Triangles issued.
        triangles: u32,
    },
    /// Buffer copy.
    Copy {
        /// Source label.
        src: &'static str,
        /// Destination label.
        dst: &'static str,
        /// Bytes copied.
        size: u64,
    },
}

/// Recorder over [`HeadlessBuffer`]s.
#[derive(Debug, Default)]
pub struct HeadlessRecorder {
    pyramid: Option<DepthPyramid>,
    commands: Vec<RecordedCommand>,
    drawn: [Vec<DrawCall>; 2],
}

impl HeadlessRecorder {
    /// Recorder without occlusion data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Occludes against a host depth pyramid when the constants enable it.
    #[must_use]
    pub fn with_depth_pyramid(mut self, pyramid: DepthPyramid) -> Self {
        self.pyramid = Some(pyramid);
        self
    }

    /// Commands recorded so far.
    #[must_use]
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Draw arguments issued by the last draw of a list.
    #[must_use]
    pub fn drawn(&self, list: DrawListKind) -> &[DrawCall] {
        &self.drawn[list.index()]
    }

    /// Clears the log for the next frame.
    pub fn reset(&mut self) {
        self.commands.clear();
        for drawn in &mut self.drawn {
            drawn.clear();
        }
    }
}

fn first_words(buffer: &HeadlessBuffer) -> [u32; 2] {
    let words = buffer.read_pod::<u32>();
    [words.first().copied().unwrap_or(0), words.get(1).copied().unwrap_or(0)]
}

impl CommandRecorder for HeadlessRecorder {
    type Buffer = HeadlessBuffer;

    fn fill_buffer(&mut self, buffer: &HeadlessBuffer, offset: u64, words: &[u32]) {
        buffer.write_at(offset, bytemuck::cast_slice(words));
        self.commands.push(RecordedCommand::Fill {
            label: buffer.label(),
            words: words.to_vec(),
        });
    }

    fn dispatch_cull(&mut self, dispatch: &CullDispatch<HeadlessBuffer>) {
        let constants = dispatch
            .constants
            .read_pod::<CullingConstants>()
            .first()
            .copied()
            .unwrap_or_default();
        let instances = dispatch.instances.read_pod::<InstanceData>();
        let volumes = dispatch.culling_data.read_pod::<CullingData>();
        let calls = dispatch.draw_calls.read_pod::<DrawCall>();
        let data = dispatch.draw_call_data.read_pod::<DrawCallData>();
        let count = (dispatch.draw_count.min(constants.max_draw_count) as usize).min(calls.len());

        let mut survivors = Vec::new();
        let mut triangles = 0;
        for (call, data) in calls[..count].iter().zip(&data) {
            let (Some(instance), Some(volume)) = (
                instances.get(data.instance_id as usize),
                volumes.get(data.culling_data_id as usize),
            ) else {
                continue;
            };
            if is_draw_visible(&constants, instance, volume, self.pyramid.as_ref()) {
                survivors.push(*call);
                triangles += call.triangle_count();
            }
        }

        dispatch.culled_draw_calls.write_at(0, bytemuck::cast_slice(&survivors));
        let [draws, tris] = first_words(&dispatch.counters);
        let counters = [draws + survivors.len() as u32, tris + triangles];
        dispatch.counters.write_at(0, bytemuck::cast_slice(&counters));

        self.commands.push(RecordedCommand::DispatchCull {
            list: dispatch.list,
            draw_count: dispatch.draw_count,
            survivors: survivors.len() as u32,
        });
    }

    fn barrier(&mut self, barrier: &BufferBarrier<HeadlessBuffer>) {
        self.commands.push(RecordedCommand::Barrier {
            src: barrier.src,
            dst: barrier.dst,
        });
    }

    fn draw_indexed_indirect_count(&mut self, draw: &IndirectDraw<HeadlessBuffer>) {
        let [count, _] = first_words(&draw.count);
        let arguments = draw.arguments.read_pod::<DrawCall>();
        let issued = (count.min(draw.max_draw_count) as usize).min(arguments.len());
        let drawn = &mut self.drawn[draw.list.index()];
        drawn.clear();
        drawn.extend_from_slice(&arguments[..issued]);

        self.commands.push(RecordedCommand::Draw {
            list: draw.list,
            draw_count: issued as u32,
            triangles: drawn.iter().map(DrawCall::triangle_count).sum(),
        });
    }

    fn copy_buffer(&mut self, src: &HeadlessBuffer, dst: &HeadlessBuffer, size: u64) {
        let bytes = src.bytes();
        let len = (size as usize).min(bytes.len());
        dst.write_at(0, &bytes[..len]);
        self.commands.push(RecordedCommand::Copy {
            src: src.label(),
            dst: dst.label(),
            size,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{BufferSpec, GpuBackend, HeadlessBackend};

    #[test]
    fn test_fill_and_copy() {
        let mut backend = HeadlessBackend::new();
        let spec = BufferSpec {
            label: "counters",
            size: 8,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        };
        let counters = backend.create_buffer(&spec);
        let readback = backend.create_buffer(&BufferSpec { label: "readback", ..spec });

        let mut recorder = HeadlessRecorder::new();
        recorder.fill_buffer(&counters, 0, &[4, 12]);
        recorder.copy_buffer(&counters, &readback, 8);
        assert_eq!(readback.read_pod::<u32>(), vec![4, 12]);
        assert_eq!(recorder.commands().len(), 2);

        recorder.reset();
        assert!(recorder.commands().is_empty());
    }
}
