//! # Verdant Rendering
//!
//! GPU-driven instance pipeline for static map objects and animated complex
//! models:
//! - One indirect draw per draw list, whatever the instance count
//! - Visibility decided by a compute pass (frustum + depth pyramid)
//! - Surviving counts read back a frame late, never waited on
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        LOAD PHASE                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Placement ─> InstanceRegistry ─> ModelStore (dedup by hash)  │
//! │                      │                                        │
//! │                      └─> AnimationAllocator (bone ranges)     │
//! ├──────────────────────────────────────────────────────────────┤
//! │                        FRAME                                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  update ─> BufferSynchronizer ─> cull ─> barrier ─> draw      │
//! │                 │                                  │          │
//! │            FrameGarbage                      counter readback │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use glam::{Mat4, Vec3};
//! use verdant_rendering::gpu::HeadlessBackend;
//! use verdant_rendering::pipeline::{HeadlessRecorder, SequentialGraph};
//! use verdant_rendering::testing::TestAssets;
//! use verdant_rendering::{CullingView, InstanceRenderer, ModelKind, Placement, RendererConfig};
//!
//! let mut assets = TestAssets::new();
//! assets.add_map_object("world/rock", 1, 2);
//!
//! let mut backend = HeadlessBackend::new();
//! let mut renderer =
//!     InstanceRenderer::new(&mut backend, RendererConfig::default(), ModelKind::MapObject).unwrap();
//! renderer.register_placement(Placement::new(7, "world/rock", Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO));
//! renderer.execute_load(&assets.source);
//!
//! let proj = Mat4::perspective_infinite_reverse_rh(1.2, 1.0, 0.1);
//! let view = CullingView::new(proj, Vec3::ZERO);
//!
//! renderer.update(&mut backend, 0.016);
//! renderer.prepare_frame(&mut backend, &view);
//! let mut recorder = HeadlessRecorder::new();
//! let mut graph = SequentialGraph::new();
//! renderer.add_passes(&mut graph);
//! graph.execute(&mut recorder);
//! renderer.end_frame(&mut backend);
//!
//! renderer.update(&mut backend, 0.016);
//! assert_eq!(renderer.stats().combined().surviving_draw_calls, 2);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod animation;
pub mod config;
pub mod culling;
pub mod error;
pub mod gpu;
pub mod instancing;
pub mod model;
pub mod pipeline;
pub mod renderer;
pub mod testing;

pub use animation::{AnimationAllocator, AnimationRequester, PlayMode};
pub use config::RendererConfig;
pub use culling::{Aabb, CullingView, DepthPyramid, DepthPyramidInfo};
pub use error::{RenderError, RenderResult};
pub use gpu::{GpuBackend, HeadlessBackend, WgpuBackend};
pub use instancing::{DrawListKind, InstanceRegistry, LoadReport, Placement};
pub use model::{ModelHandle, ModelKind, ModelStore};
pub use pipeline::{CullingStats, DrawListStats, GpuPipelines, RenderTargets, WgpuRecorder};
pub use renderer::InstanceRenderer;
