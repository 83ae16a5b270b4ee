//! # Cull/Draw Pipeline
//!
//! One [`DrawListPipeline`] per draw list. Every frame with draw calls runs:
//!
//! ```text
//!  Idle ─> CounterReset ─> Cull ─> Barrier ─> Draw ─> Readback ─> Idle
//!               │                              ▲
//!               └──── culling disabled ────────┘
//! ```
//!
//! With culling disabled the counters are seeded with the full draw count
//! and the uncompacted arguments are drawn. The counters are copied into a
//! ring of `frames_in_flight` readback buffers and read back without ever
//! waiting on the device; a slot still mapping skips that frame's readback.

use bytemuck::{Pod, Zeroable};
use verdant_core::FrameGarbage;

use super::graph::{GraphPass, PassBuilder, PassResource};
use super::recorder::{BufferAccess, BufferBarrier, CommandRecorder, CullDispatch, IndirectDraw};
use super::stats::DrawListStats;
use crate::config::RendererConfig;
use crate::culling::{CullingConstants, CullingView};
use crate::gpu::{BufferKind, BufferSpec, DescriptorSet, GpuBackend, MapRequest, MapStatus};
use crate::instancing::{DrawList, DrawListKind};

/// Bytes of the counter buffer: surviving draws, surviving triangles.
pub const COUNTERS_SIZE: u64 = 8;

/// Camera uniform of the draw shader (80 bytes).
///
/// Always follows the live camera, also while the culling frustum is locked.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct DrawView {
    /// Projection times view.
    pub view_projection: [[f32; 4]; 4],
    /// World-space eye position.
    pub camera_position: [f32; 3],
    /// Padding for 16-byte alignment.
    pub _pad: u32,
}

impl DrawView {
    /// Uniform for a culling view.
    #[must_use]
    pub fn new(view: &CullingView) -> Self {
        Self {
            view_projection: view.view_projection.to_cols_array_2d(),
            camera_position: view.camera_position.to_array(),
            _pad: 0,
        }
    }
}

/// Step of a frame's command sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Nothing recorded.
    Idle,
    /// Counters zeroed, or seeded when culling is off.
    CounterReset,
    /// Culling dispatch.
    Cull,
    /// Compute writes ordered before indirect reads.
    Barrier,
    /// Count-driven indirect draw.
    Draw,
    /// Counters copied into a readback slot.
    Readback,
}

#[derive(Debug)]
enum ReadbackState {
    Idle,
    Recorded { frame: u64 },
    Mapping { frame: u64, request: MapRequest },
}

#[derive(Debug)]
struct ReadbackSlot<B> {
    buffer: B,
    state: ReadbackState,
}

#[derive(Debug)]
struct FrameCommands<B> {
    dispatch: Option<CullDispatch<B>>,
    draw: IndirectDraw<B>,
    seed: [u32; 2],
    readback: Option<usize>,
}

/// Cull and draw state of one draw list.
#[derive(Debug)]
pub struct DrawListPipeline<B> {
    kind: DrawListKind,
    counters: B,
    constants_buffer: B,
    constants: Option<CullingConstants>,
    view_buffer: B,
    view: Option<DrawView>,
    readbacks: Vec<ReadbackSlot<B>>,
    frame: u64,
    first_valid_frame: u64,
    culling_enabled: bool,
    commands: Option<FrameCommands<B>>,
    stats: DrawListStats,
}

impl<B: Clone> DrawListPipeline<B> {
    /// Creates the counter, constants and readback buffers of a list.
    pub fn new<G>(backend: &mut G, kind: DrawListKind, frames_in_flight: usize) -> Self
    where
        G: GpuBackend<Buffer = B>,
    {
        use wgpu::BufferUsages as U;
        let counters = backend.create_buffer(&BufferSpec {
            label: "verdant.cull_counters",
            size: COUNTERS_SIZE,
            usage: U::STORAGE | U::INDIRECT | U::COPY_SRC | U::COPY_DST,
        });
        let constants_buffer = backend.create_buffer(&BufferSpec {
            label: "verdant.cull_constants",
            size: std::mem::size_of::<CullingConstants>() as u64,
            usage: U::UNIFORM | U::COPY_DST,
        });
        let view_buffer = backend.create_buffer(&BufferSpec {
            label: "verdant.draw_view",
            size: std::mem::size_of::<DrawView>() as u64,
            usage: U::UNIFORM | U::COPY_DST,
        });
        let readbacks = (0..frames_in_flight.max(1))
            .map(|_| ReadbackSlot {
                buffer: backend.create_buffer(&BufferSpec {
                    label: "verdant.cull_readback",
                    size: COUNTERS_SIZE,
                    usage: U::MAP_READ | U::COPY_DST,
                }),
                state: ReadbackState::Idle,
            })
            .collect();

        Self {
            kind,
            counters,
            constants_buffer,
            constants: None,
            view_buffer,
            view: None,
            readbacks,
            frame: 0,
            first_valid_frame: 0,
            culling_enabled: true,
            commands: None,
            stats: DrawListStats::default(),
        }
    }

    /// List this pipeline draws.
    #[must_use]
    pub const fn kind(&self) -> DrawListKind {
        self.kind
    }

    /// Latest counters.
    #[must_use]
    pub const fn stats(&self) -> DrawListStats {
        self.stats
    }

    /// Constants the last culled frame used.
    #[must_use]
    pub const fn constants(&self) -> Option<&CullingConstants> {
        self.constants.as_ref()
    }

    /// Counter buffer.
    #[must_use]
    pub const fn counters(&self) -> &B {
        &self.counters
    }

    /// Frames ended so far.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Returns true if commands are prepared for this frame.
    #[must_use]
    pub const fn is_prepared(&self) -> bool {
        self.commands.is_some()
    }

    /// Builds this frame's commands.
    ///
    /// An empty list prepares nothing: no dispatch, no draw.
    pub fn prepare<G>(
        &mut self,
        backend: &mut G,
        config: &RendererConfig,
        view: &CullingView,
        list: &DrawList,
        descriptors: &DescriptorSet<'_, B>,
    ) where
        G: GpuBackend<Buffer = B>,
    {
        self.commands = None;
        self.culling_enabled = config.culling_enabled;
        self.stats.total_draw_calls = list.len();
        self.stats.total_triangles = list.total_triangles();

        let draw_count = list.len();
        if draw_count == 0 {
            self.stats.surviving_draw_calls = 0;
            self.stats.surviving_triangles = 0;
            self.stats.readback_frame = Some(self.frame);
            return;
        }

        let Some((dispatch, draw)) = self.bindings(descriptors, draw_count) else {
            tracing::warn!(list = self.kind.label(), "draw list buffers not synchronized, skipping frame");
            return;
        };

        let draw_view = DrawView::new(view);
        if self.view != Some(draw_view) {
            backend.write(&self.view_buffer, 0, bytemuck::bytes_of(&draw_view));
            self.view = Some(draw_view);
        }

        if self.culling_enabled {
            let constants = match self.constants {
                Some(mut locked) if config.lock_culling_frustum => {
                    locked.max_draw_count = draw_count;
                    locked
                }
                _ => CullingConstants::new(view, draw_count, config.occlusion_culling_enabled),
            };
            if self.constants != Some(constants) {
                backend.write(&self.constants_buffer, 0, bytemuck::bytes_of(&constants));
                self.constants = Some(constants);
            }

            let slot = (self.frame % self.readbacks.len() as u64) as usize;
            let readback = matches!(self.readbacks[slot].state, ReadbackState::Idle).then_some(slot);
            if readback.is_none() {
                tracing::trace!(list = self.kind.label(), slot, "readback slot busy, skipping");
            }
            self.commands = Some(FrameCommands {
                draw: IndirectDraw {
                    arguments: dispatch.culled_draw_calls.clone(),
                    ..draw
                },
                dispatch: Some(dispatch),
                seed: [0, 0],
                readback,
            });
        } else {
            self.stats.surviving_draw_calls = draw_count;
            self.stats.surviving_triangles = list.total_triangles();
            self.stats.readback_frame = Some(self.frame);
            self.commands = Some(FrameCommands {
                dispatch: None,
                draw,
                seed: [draw_count, list.total_triangles()],
                readback: None,
            });
        }
    }

    fn bindings(
        &self,
        descriptors: &DescriptorSet<'_, B>,
        draw_count: u32,
    ) -> Option<(CullDispatch<B>, IndirectDraw<B>)> {
        let get = |kind: BufferKind| descriptors.get(kind).cloned();
        let version = descriptors.version();
        let draw_calls = get(BufferKind::DrawCalls(self.kind))?;
        let draw_call_data = get(BufferKind::DrawCallData(self.kind))?;
        let instances = get(BufferKind::Instances)?;

        let dispatch = CullDispatch {
            list: self.kind,
            draw_count,
            bindings_version: version,
            constants: self.constants_buffer.clone(),
            instances: instances.clone(),
            culling_data: get(BufferKind::CullingData)?,
            draw_calls: draw_calls.clone(),
            draw_call_data: draw_call_data.clone(),
            culled_draw_calls: get(BufferKind::CulledDrawCalls(self.kind))?,
            counters: self.counters.clone(),
        };
        let draw = IndirectDraw {
            list: self.kind,
            max_draw_count: draw_count,
            bindings_version: version,
            arguments: draw_calls.clone(),
            count: self.counters.clone(),
            view: self.view_buffer.clone(),
            indices: get(BufferKind::Indices)?,
            vertices: get(BufferKind::Vertices)?,
            instances,
            draw_calls,
            draw_call_data,
            texture_units: get(BufferKind::TextureUnits)?,
            vertex_colors: get(BufferKind::VertexColors)?,
            bone_deform: get(BufferKind::BoneDeform)?,
        };
        Some((dispatch, draw))
    }

    /// Records the prepared commands. Does nothing if none are prepared.
    pub fn record<R>(&mut self, recorder: &mut R)
    where
        R: CommandRecorder<Buffer = B>,
    {
        let Some(commands) = self.commands.take() else {
            return;
        };

        let mut phase = FramePhase::CounterReset;
        while phase != FramePhase::Idle {
            tracing::trace!(list = self.kind.label(), ?phase, "cull/draw");
            phase = match phase {
                FramePhase::CounterReset => {
                    recorder.fill_buffer(&self.counters, 0, &commands.seed);
                    FramePhase::Cull
                }
                FramePhase::Cull => match &commands.dispatch {
                    Some(dispatch) => {
                        recorder.dispatch_cull(dispatch);
                        FramePhase::Barrier
                    }
                    None => FramePhase::Draw,
                },
                FramePhase::Barrier => {
                    if let Some(dispatch) = &commands.dispatch {
                        recorder.barrier(&BufferBarrier {
                            buffers: vec![dispatch.culled_draw_calls.clone(), self.counters.clone()],
                            src: BufferAccess::ComputeWrite,
                            dst: BufferAccess::IndirectRead,
                        });
                    }
                    FramePhase::Draw
                }
                FramePhase::Draw => {
                    recorder.draw_indexed_indirect_count(&commands.draw);
                    FramePhase::Readback
                }
                FramePhase::Readback => {
                    if let Some(index) = commands.readback {
                        let slot = &mut self.readbacks[index];
                        recorder.barrier(&BufferBarrier {
                            buffers: vec![self.counters.clone()],
                            src: BufferAccess::IndirectRead,
                            dst: BufferAccess::TransferRead,
                        });
                        recorder.copy_buffer(&self.counters, &slot.buffer, COUNTERS_SIZE);
                        slot.state = ReadbackState::Recorded { frame: self.frame };
                    }
                    FramePhase::Idle
                }
                FramePhase::Idle => FramePhase::Idle,
            };
        }
    }

    /// Starts mapping this frame's readback and advances the frame counter.
    /// Call after the frame's commands were submitted.
    pub fn end_frame<G>(&mut self, backend: &mut G)
    where
        G: GpuBackend<Buffer = B>,
    {
        self.commands = None;
        for slot in &mut self.readbacks {
            if let ReadbackState::Recorded { frame } = slot.state {
                slot.state = ReadbackState::Mapping {
                    frame,
                    request: backend.request_map(&slot.buffer),
                };
            }
        }
        self.frame += 1;
    }

    /// Applies every readback that finished mapping. Never waits.
    /// Returns the number of readbacks consumed.
    pub fn collect_readbacks<G>(&mut self, backend: &mut G) -> usize
    where
        G: GpuBackend<Buffer = B>,
    {
        let mut consumed = 0;
        for slot in &mut self.readbacks {
            let ReadbackState::Mapping { frame, request } = &slot.state else {
                continue;
            };
            let frame = *frame;
            match request.status() {
                MapStatus::Pending => continue,
                MapStatus::Failed => {
                    tracing::warn!(list = self.kind.label(), frame, "counter readback failed");
                }
                MapStatus::Ready => {
                    let counts = backend
                        .read_mapped(&slot.buffer, request)
                        .filter(|bytes| bytes.len() >= COUNTERS_SIZE as usize)
                        .map(|bytes| bytemuck::pod_read_unaligned::<[u32; 2]>(&bytes[..8]));
                    let newer = self.stats.readback_frame.map_or(true, |last| frame >= last);
                    if let Some([draws, triangles]) = counts {
                        if self.culling_enabled && frame >= self.first_valid_frame && newer {
                            self.stats.surviving_draw_calls = draws;
                            self.stats.surviving_triangles = triangles;
                            self.stats.readback_frame = Some(frame);
                        }
                    }
                    consumed += 1;
                }
            }
            slot.state = ReadbackState::Idle;
        }
        consumed
    }

    /// Forgets counters and constants. Readbacks already in flight are
    /// ignored when they land.
    pub fn reset(&mut self) {
        self.commands = None;
        self.constants = None;
        self.view = None;
        self.stats = DrawListStats::default();
        self.first_valid_frame = self.frame;
    }

    /// Hands every buffer of the list to the garbage ring.
    pub fn retire(self, garbage: &mut FrameGarbage<B>) {
        garbage.retire(self.counters);
        garbage.retire(self.constants_buffer);
        garbage.retire(self.view_buffer);
        for slot in self.readbacks {
            garbage.retire(slot.buffer);
        }
    }
}

/// Render-graph pass culling and drawing one list.
#[derive(Debug)]
pub struct CullDrawPass<'a, B> {
    pipeline: &'a mut DrawListPipeline<B>,
}

impl<'a, B> CullDrawPass<'a, B> {
    /// Wraps a list pipeline for one frame.
    pub fn new(pipeline: &'a mut DrawListPipeline<B>) -> Self {
        Self { pipeline }
    }
}

impl<'a, B, R> GraphPass<R> for CullDrawPass<'a, B>
where
    B: Clone,
    R: CommandRecorder<Buffer = B>,
{
    fn name(&self) -> &'static str {
        match self.pipeline.kind {
            DrawListKind::Opaque => "verdant.cull_draw.opaque",
            DrawListKind::Transparent => "verdant.cull_draw.transparent",
        }
    }

    fn setup(&mut self, builder: &mut PassBuilder) -> bool {
        let Some(commands) = &self.pipeline.commands else {
            return false;
        };
        let kind = self.pipeline.kind;
        for read in [
            BufferKind::Instances,
            BufferKind::Vertices,
            BufferKind::Indices,
            BufferKind::TextureUnits,
            BufferKind::VertexColors,
            BufferKind::BoneDeform,
            BufferKind::DrawCalls(kind),
            BufferKind::DrawCallData(kind),
        ] {
            builder.read(PassResource::Buffer(read.label()));
        }
        if commands.dispatch.is_some() {
            builder
                .read(PassResource::Buffer(BufferKind::CullingData.label()))
                .read(PassResource::Image("depth_pyramid"))
                .write(PassResource::Buffer(BufferKind::CulledDrawCalls(kind).label()));
        }
        builder
            .write(PassResource::Buffer("verdant.cull_counters"))
            .write(PassResource::Image("color"))
            .write(PassResource::Image("depth"));
        true
    }

    fn execute(&mut self, recorder: &mut R) {
        self.pipeline.record(recorder);
    }
}
