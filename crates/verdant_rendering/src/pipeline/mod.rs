//! Cull/draw pipeline: per-list frame state machine, the recorder seam it
//! emits commands through, and the render-graph pass wrapping it.

mod cull_draw;
mod graph;
mod headless;
mod recorder;
mod stats;
mod wgpu_recorder;

pub use cull_draw::{CullDrawPass, DrawListPipeline, DrawView, FramePhase, COUNTERS_SIZE};
pub use graph::{GraphPass, PassBuilder, PassRecord, PassResource, RenderGraph, SequentialGraph};
pub use headless::{HeadlessRecorder, RecordedCommand};
pub use recorder::{BufferAccess, BufferBarrier, CommandRecorder, CullDispatch, IndirectDraw};
pub use stats::{CullingStats, DrawListStats};
pub use wgpu_recorder::{GpuPipelines, RenderTargets, WgpuRecorder, CULL_WORKGROUP_SIZE};
