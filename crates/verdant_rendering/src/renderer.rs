//! Instance renderer: one model kind, from placements to indirect draws.
//!
//! ```text
//!  register_placement ─> execute_load          (load phase)
//!
//!  update ─> prepare_frame ─> add_passes ─> submit ─> end_frame   (per frame)
//! ```

use verdant_assets::AssetSource;
use verdant_core::FrameGarbage;

use crate::animation::{AnimationAllocator, AnimationRequester};
use crate::config::RendererConfig;
use crate::culling::{Aabb, CullingView};
use crate::error::{RenderError, RenderResult};
use crate::gpu::{BufferKind, BufferSource, BufferSynchronizer, GpuBackend, SyncReport};
use crate::instancing::{DrawListKind, InstanceRegistry, LoadReport, Placement, NO_BONES};
use crate::model::{ModelKind, ModelStore};
use crate::pipeline::{CommandRecorder, CullDrawPass, CullingStats, DrawListPipeline, RenderGraph};

/// Instances of one model kind drawn per frame.
#[derive(Debug)]
pub struct InstanceRenderer<B> {
    config: RendererConfig,
    store: ModelStore,
    registry: InstanceRegistry,
    animation: AnimationAllocator,
    sync: BufferSynchronizer<B>,
    garbage: FrameGarbage<B>,
    lists: [DrawListPipeline<B>; 2],
    last_sync: SyncReport,
}

impl<B: Clone> InstanceRenderer<B> {
    /// Creates a renderer for one model kind.
    pub fn new<G>(backend: &mut G, config: RendererConfig, kind: ModelKind) -> RenderResult<Self>
    where
        G: GpuBackend<Buffer = B>,
    {
        config.validate()?;
        let lists = DrawListKind::ALL.map(|list| DrawListPipeline::new(backend, list, config.frames_in_flight));
        tracing::info!(kind = kind.label(), frames_in_flight = config.frames_in_flight, "instance renderer created");
        Ok(Self {
            store: ModelStore::new(kind),
            registry: InstanceRegistry::new(),
            animation: AnimationAllocator::new(config.animation_queue_capacity),
            sync: BufferSynchronizer::new(),
            garbage: FrameGarbage::new(config.frames_in_flight),
            lists,
            last_sync: SyncReport::default(),
            config,
        })
    }

    /// Queues a placement for the next [`Self::execute_load`]. Returns false
    /// for an already registered unique id.
    pub fn register_placement(&mut self, placement: Placement) -> bool {
        self.registry.register_placement(placement)
    }

    /// Loads every queued placement. See [`InstanceRegistry::execute_load`].
    pub fn execute_load(&mut self, source: &dyn AssetSource) -> LoadReport {
        self.registry.execute_load(&mut self.store, &mut self.animation, source)
    }

    /// Handle for submitting animation requests from any thread.
    #[must_use]
    pub fn animation_requester(&self) -> AnimationRequester {
        self.animation.requester()
    }

    /// Returns an animated instance's bone ranges and detaches its bones.
    pub fn release_animation(&mut self, instance_id: u32) -> RenderResult<()> {
        if self.registry.record(instance_id).is_none() {
            return Err(RenderError::UnknownInstance(instance_id));
        }
        self.animation.release(instance_id)?;
        self.registry.set_bone_offsets(instance_id, NO_BONES, NO_BONES);
        Ok(())
    }

    /// Start of a frame: drains animation requests once, advances animation
    /// and takes any readback that finished. Never waits on the device.
    pub fn update<G>(&mut self, backend: &mut G, dt: f32)
    where
        G: GpuBackend<Buffer = B>,
    {
        let applied = self.animation.process_requests(&self.store);
        let playing = self.animation.update(dt, &self.store);
        if applied > 0 {
            tracing::debug!(applied, playing, "animation requests applied");
        }

        backend.poll();
        for list in &mut self.lists {
            list.collect_readbacks(backend);
        }
    }

    /// Uploads changed mirrors, rebinds and prepares both draw lists.
    pub fn prepare_frame<G>(&mut self, backend: &mut G, view: &CullingView) -> SyncReport
    where
        G: GpuBackend<Buffer = B>,
    {
        let store_gen = self.store.generation();
        let registry_gen = self.registry.generation();
        let mut sources = vec![
            BufferSource::data(BufferKind::Vertices, store_gen, self.store.vertices()),
            BufferSource::data(BufferKind::Indices, store_gen, self.store.indices()),
            BufferSource::data(BufferKind::TextureUnits, store_gen, self.store.texture_units()),
            BufferSource::data(BufferKind::VertexColors, store_gen, self.store.vertex_colors()),
            BufferSource::data(BufferKind::CullingData, store_gen, self.store.culling_data()),
            BufferSource::data(BufferKind::Instances, registry_gen, self.registry.instances()),
            BufferSource::data(
                BufferKind::BoneDeform,
                self.animation.deform_generation(),
                self.animation.bone_deform(),
            ),
            BufferSource::data(
                BufferKind::BoneInstances,
                self.animation.state_generation(),
                self.animation.bone_instances(),
            ),
        ];
        for kind in DrawListKind::ALL {
            let list = self.registry.draw_list(kind);
            sources.push(BufferSource::data(BufferKind::DrawCalls(kind), registry_gen, list.draw_calls()));
            sources.push(BufferSource::data(BufferKind::DrawCallData(kind), registry_gen, list.draw_call_data()));
            sources.push(BufferSource::uninit(
                BufferKind::CulledDrawCalls(kind),
                registry_gen,
                std::mem::size_of_val(list.draw_calls()) as u64,
            ));
        }

        let report = self.sync.sync(backend, &mut self.garbage, &sources);
        backend.flush();
        if !report.is_empty() {
            tracing::debug!(
                rebuilt = report.rebuilt,
                written = report.written,
                bytes = report.bytes_uploaded,
                "buffers synchronized"
            );
        }

        let descriptors = self.sync.descriptor_set();
        for list in &mut self.lists {
            let draws = self.registry.draw_list(list.kind());
            list.prepare(backend, &self.config, view, draws, &descriptors);
        }
        self.last_sync = report;
        report
    }

    /// Registers one cull/draw pass per draw list.
    pub fn add_passes<'a, R, G>(&'a mut self, graph: &mut G)
    where
        B: 'a,
        R: CommandRecorder<Buffer = B>,
        G: RenderGraph<'a, R> + ?Sized,
    {
        for list in &mut self.lists {
            graph.add_pass(Box::new(CullDrawPass::new(list)));
        }
    }

    /// End of a frame, after submission: starts readback maps and destroys
    /// buffers retired `frames_in_flight` frames ago. Returns the number
    /// destroyed.
    pub fn end_frame<G>(&mut self, backend: &mut G) -> usize
    where
        G: GpuBackend<Buffer = B>,
    {
        for list in &mut self.lists {
            list.end_frame(backend);
        }
        self.garbage.advance_frame(|buffer| backend.destroy(buffer))
    }

    /// Unloads everything. GPU buffers go through the garbage ring.
    pub fn clear(&mut self) {
        let retired = self.sync.retire_all(&mut self.garbage);
        self.store.clear();
        self.registry.clear();
        self.animation.clear();
        for list in &mut self.lists {
            list.reset();
        }
        tracing::info!(retired, "instance renderer cleared");
    }

    /// Destroys every buffer now. The device must be idle.
    pub fn destroy<G>(mut self, backend: &mut G)
    where
        G: GpuBackend<Buffer = B>,
    {
        self.sync.retire_all(&mut self.garbage);
        for list in self.lists {
            list.retire(&mut self.garbage);
        }
        self.garbage.drain_all(|buffer| backend.destroy(buffer));
    }

    /// Counters of the last frame read back.
    #[must_use]
    pub fn stats(&self) -> CullingStats {
        CullingStats {
            lists: [self.lists[0].stats(), self.lists[1].stats()],
        }
    }

    /// `(model name, instance count)` of every loaded model.
    #[must_use]
    pub fn model_instance_counts(&self) -> Vec<(&str, usize)> {
        self.store
            .models()
            .iter()
            .map(|model| (model.name.as_str(), model.instance_ids.len()))
            .collect()
    }

    /// World-space boxes of every draw call, empty unless
    /// `draw_bounding_boxes` is set.
    #[must_use]
    pub fn debug_bounds(&self) -> Vec<Aabb> {
        if !self.config.draw_bounding_boxes {
            return Vec::new();
        }
        DrawListKind::ALL
            .into_iter()
            .flat_map(|kind| {
                (0..self.registry.draw_list(kind).len())
                    .filter_map(move |index| self.registry.world_bounds(&self.store, kind, index))
            })
            .collect()
    }

    /// What the last [`Self::prepare_frame`] uploaded.
    #[must_use]
    pub const fn last_sync(&self) -> SyncReport {
        self.last_sync
    }

    /// Buffers waiting in the garbage ring.
    #[must_use]
    pub fn pending_destroys(&self) -> usize {
        self.garbage.pending()
    }

    /// Geometry store.
    #[must_use]
    pub const fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Instance registry.
    #[must_use]
    pub const fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// Animation allocator.
    #[must_use]
    pub const fn animation(&self) -> &AnimationAllocator {
        &self.animation
    }

    /// Buffer synchronizer.
    #[must_use]
    pub const fn buffers(&self) -> &BufferSynchronizer<B> {
        &self.sync
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Culling switches, editable between frames.
    pub fn config_mut(&mut self) -> &mut RendererConfig {
        &mut self.config
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3};

    use super::*;
    use crate::gpu::{HeadlessBackend, HeadlessBuffer};
    use crate::pipeline::{HeadlessRecorder, SequentialGraph};
    use crate::testing::TestAssets;

    fn view() -> CullingView {
        let proj = Mat4::perspective_infinite_reverse_rh(90f32.to_radians(), 1.0, 0.1);
        let look = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        CullingView::new(proj * look, Vec3::ZERO)
    }

    fn renderer(backend: &mut HeadlessBackend) -> InstanceRenderer<HeadlessBuffer> {
        InstanceRenderer::new(backend, RendererConfig::default(), ModelKind::MapObject).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut backend = HeadlessBackend::new();
        let config = RendererConfig {
            frames_in_flight: 0,
            ..RendererConfig::default()
        };
        let result = InstanceRenderer::new(&mut backend, config, ModelKind::MapObject);
        assert!(matches!(result, Err(RenderError::Config(_))));
    }

    #[test]
    fn test_empty_frame_records_nothing() {
        let mut backend = HeadlessBackend::new();
        let mut renderer = renderer(&mut backend);
        renderer.update(&mut backend, 0.016);
        renderer.prepare_frame(&mut backend, &view());

        let mut recorder = HeadlessRecorder::new();
        let mut graph = SequentialGraph::new();
        renderer.add_passes(&mut graph);
        let records = graph.execute(&mut recorder);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.enabled));
        assert!(recorder.commands().is_empty());
        renderer.end_frame(&mut backend);
    }

    #[test]
    fn test_release_animation_errors() {
        let mut backend = HeadlessBackend::new();
        let mut renderer = renderer(&mut backend);
        assert_eq!(renderer.release_animation(3), Err(RenderError::UnknownInstance(3)));

        let mut assets = TestAssets::new();
        assets.add_map_object("world/rock", 1, 1);
        renderer.register_placement(Placement::new(1, "world/rock", Vec3::ZERO, Vec3::ZERO));
        renderer.execute_load(&assets.source);
        assert_eq!(renderer.release_animation(0), Err(RenderError::NotAnimated(0)));
    }

    #[test]
    fn test_debug_bounds_follow_config() {
        let mut backend = HeadlessBackend::new();
        let mut renderer = renderer(&mut backend);
        let mut assets = TestAssets::new();
        assets.add_map_object("world/rock", 1, 2);
        renderer.register_placement(Placement::new(1, "world/rock", Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO));
        renderer.execute_load(&assets.source);

        assert!(renderer.debug_bounds().is_empty());
        renderer.config_mut().draw_bounding_boxes = true;
        let bounds = renderer.debug_bounds();
        assert_eq!(bounds.len(), 2);
        assert!((bounds[0].min.x - 10.0).abs() < 1e-5);
    }
}
