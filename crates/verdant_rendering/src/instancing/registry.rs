//! # Instance Registry
//!
//! Placements are queued by [`InstanceRegistry::register_placement`] and
//! resolved in one batch by [`InstanceRegistry::execute_load`]:
//!
//! ```text
//!  register_placement ──> pending ──execute_load──> ModelStore::load
//!                                          │
//!                      ┌───────────────────┴───────────────────┐
//!                      v                                       v
//!              InstanceData (arena)          DrawCall + DrawCallData per batch
//!                      │                      (opaque / transparent lists)
//!                      └── bone ranges (animated models only)
//! ```
//!
//! Instances are never freed individually. Ids stay valid until `clear`.

use std::collections::{HashMap, HashSet};

use glam::{EulerRot, Mat4, Vec3};
use verdant_assets::AssetSource;
use verdant_core::IndexArena;

use super::draw_list::{DrawList, DrawListKind};
use super::instance_data::{DrawCall, DrawCallData, InstanceData};
use crate::animation::AnimationAllocator;
use crate::culling::Aabb;
use crate::error::RenderError;
use crate::model::{ModelHandle, ModelStore};

/// World placement of a model, supplied by the map loader.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Stable id shared by every map chunk that lists this placement.
    pub unique_id: u32,
    /// Model asset name (path without extension).
    pub model_name: String,
    /// World position.
    pub position: Vec3,
    /// Euler rotation in degrees (x, y, z).
    pub rotation: Vec3,
}

impl Placement {
    /// Creates a placement.
    #[must_use]
    pub fn new(unique_id: u32, model_name: impl Into<String>, position: Vec3, rotation: Vec3) -> Self {
        Self {
            unique_id,
            model_name: model_name.into(),
            position,
            rotation,
        }
    }

    /// Model-to-world matrix: translate, then rotate Z, -Y, -X.
    #[must_use]
    pub fn transform(&self) -> Mat4 {
        let r = self.rotation * (std::f32::consts::PI / 180.0);
        Mat4::from_translation(self.position) * Mat4::from_euler(EulerRot::ZYX, r.z, -r.y, -r.x)
    }
}

/// Placement dropped by a load batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPlacement {
    /// Placement id.
    pub unique_id: u32,
    /// Model it referenced.
    pub model_name: String,
    /// Why its model failed to load.
    pub error: RenderError,
}

/// Outcome of one [`InstanceRegistry::execute_load`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// `(unique_id, instance_id)` of every placement added.
    pub added: Vec<(u32, u32)>,
    /// Placements whose model failed to load.
    pub skipped: Vec<SkippedPlacement>,
    /// Distinct models loaded for the first time.
    pub models_loaded: usize,
    /// Draw calls appended across both lists.
    pub draw_calls_added: usize,
}

impl LoadReport {
    /// Returns true if the batch changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }
}

/// CPU-side record of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceRecord {
    /// Placement the instance came from.
    pub unique_id: u32,
    /// Model drawn.
    pub model: ModelHandle,
}

/// Per-placement instances and the draw lists built from them.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    pending: Vec<Placement>,
    /// Every unique id ever queued since the last clear.
    registered: HashSet<u32>,
    by_placement: HashMap<u32, u32>,
    instances: IndexArena<InstanceData>,
    records: IndexArena<InstanceRecord>,
    draw_lists: [DrawList; 2],
    /// Bumped when instances or draw lists change.
    generation: u64,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a placement for the next load batch.
    ///
    /// Returns false if a placement with the same unique id was already
    /// registered.
    pub fn register_placement(&mut self, placement: Placement) -> bool {
        if !self.registered.insert(placement.unique_id) {
            return false;
        }
        self.pending.push(placement);
        true
    }

    /// Placements waiting for [`InstanceRegistry::execute_load`].
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Resolves every pending placement.
    ///
    /// A model that fails to load skips its placements and the batch goes
    /// on. With nothing pending this is a no-op and no generation moves.
    pub fn execute_load(
        &mut self,
        store: &mut ModelStore,
        animation: &mut AnimationAllocator,
        source: &dyn AssetSource,
    ) -> LoadReport {
        let mut report = LoadReport::default();
        if self.pending.is_empty() {
            return report;
        }

        let models_before = store.model_count();
        let mut failed: HashMap<String, RenderError> = HashMap::new();

        for placement in std::mem::take(&mut self.pending) {
            if let Some(error) = failed.get(&placement.model_name) {
                self.skip(&mut report, placement, error.clone());
                continue;
            }
            let handle = match store.load(source, &placement.model_name) {
                Ok(handle) => handle,
                Err(error) => {
                    let error = RenderError::from(error);
                    failed.insert(placement.model_name.clone(), error.clone());
                    self.skip(&mut report, placement, error);
                    continue;
                }
            };

            let instance_id = self.push_instance(store, animation, &placement, handle);
            report.draw_calls_added += self.push_draw_calls(store, handle, instance_id);
            report.added.push((placement.unique_id, instance_id));
        }

        report.models_loaded = store.model_count() - models_before;
        if !report.added.is_empty() {
            self.generation += 1;
        }

        tracing::info!(
            kind = store.kind().label(),
            added = report.added.len(),
            skipped = report.skipped.len(),
            models_loaded = report.models_loaded,
            draw_calls = report.draw_calls_added,
            opaque_triangles = self.draw_lists[0].total_triangles(),
            transparent_triangles = self.draw_lists[1].total_triangles(),
            "load batch complete"
        );
        report
    }

    fn skip(&mut self, report: &mut LoadReport, placement: Placement, error: RenderError) {
        tracing::warn!(
            unique_id = placement.unique_id,
            model = %placement.model_name,
            %error,
            "skipping placement"
        );
        report.skipped.push(SkippedPlacement {
            unique_id: placement.unique_id,
            model_name: placement.model_name,
            error,
        });
    }

    fn push_instance(
        &mut self,
        store: &mut ModelStore,
        animation: &mut AnimationAllocator,
        placement: &Placement,
        handle: ModelHandle,
    ) -> u32 {
        let instance_id = self.instances.next_index();
        let mut data = InstanceData::new(placement.transform().to_cols_array_2d(), handle.index());

        let bone_count = store.model(handle).map_or(0, |m| m.bone_count());
        if bone_count > 0 {
            let (deform, state) = animation.allocate_bone_ranges(instance_id, handle, bone_count);
            data.bone_deform_offset = deform;
            data.bone_instance_offset = state;
        }

        self.instances.push(data);
        self.records.push(InstanceRecord {
            unique_id: placement.unique_id,
            model: handle,
        });
        self.by_placement.insert(placement.unique_id, instance_id);
        if let Some(model) = store.model_mut(handle) {
            model.instance_ids.push(instance_id);
        }
        instance_id
    }

    fn push_draw_calls(&mut self, store: &ModelStore, handle: ModelHandle, instance_id: u32) -> usize {
        let Some(model) = store.model(handle) else {
            return 0;
        };
        for batch in &model.render_batches {
            let call = DrawCall {
                index_count: batch.index_count,
                instance_count: 1,
                first_index: batch.first_index,
                base_vertex: batch.base_vertex,
                first_instance: 0,
            };
            let data = DrawCallData {
                instance_id,
                culling_data_id: batch.culling_data_id,
                texture_unit_offset: batch.texture_unit_offset,
                texture_unit_count: batch.texture_unit_count,
                flags: if batch.backface_culled { DrawCallData::FLAG_BACKFACE_CULLED } else { 0 },
                vertex_color_offset: batch.vertex_color_offset,
            };
            let kind = if batch.transparent { DrawListKind::Transparent } else { DrawListKind::Opaque };
            self.draw_lists[kind.index()].push(call, data);
        }
        model.render_batches.len()
    }

    /// Instance created for a placement.
    #[must_use]
    pub fn instance_for_placement(&self, unique_id: u32) -> Option<u32> {
        self.by_placement.get(&unique_id).copied()
    }

    /// GPU data of an instance.
    #[must_use]
    pub fn instance(&self, instance_id: u32) -> Option<&InstanceData> {
        self.instances.get(instance_id)
    }

    /// CPU record of an instance.
    #[must_use]
    pub fn record(&self, instance_id: u32) -> Option<&InstanceRecord> {
        self.records.get(instance_id)
    }

    /// Every instance, indexed by instance id.
    #[must_use]
    pub fn instances(&self) -> &[InstanceData] {
        self.instances.as_slice()
    }

    /// Number of instances.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// One of the two draw lists.
    #[must_use]
    pub fn draw_list(&self, kind: DrawListKind) -> &DrawList {
        &self.draw_lists[kind.index()]
    }

    /// Points an instance at new bone ranges, or [`super::NO_BONES`].
    pub fn set_bone_offsets(&mut self, instance_id: u32, deform: u32, state: u32) -> bool {
        let Some(data) = self.instances.get_mut(instance_id) else {
            return false;
        };
        data.bone_deform_offset = deform;
        data.bone_instance_offset = state;
        self.generation += 1;
        true
    }

    /// World-space box of one draw call.
    #[must_use]
    pub fn world_bounds(&self, store: &ModelStore, kind: DrawListKind, draw_index: u32) -> Option<Aabb> {
        let data = self.draw_list(kind).draw_call_data().get(draw_index as usize)?;
        let instance = self.instances.get(data.instance_id)?;
        let culling = store.culling_data().get(data.culling_data_id as usize)?;
        Some(Aabb::from_culling(culling).transformed(&Mat4::from_cols_array_2d(&instance.matrix)))
    }

    /// World-space box of a whole instance, from its model's aggregate volume.
    #[must_use]
    pub fn instance_bounds(&self, store: &ModelStore, instance_id: u32) -> Option<Aabb> {
        let instance = self.instances.get(instance_id)?;
        let record = self.records.get(instance_id)?;
        let model = store.model(record.model)?;
        let culling = store.culling_data().get(model.aggregate_culling_id as usize)?;
        Some(Aabb::from_culling(culling).transformed(&Mat4::from_cols_array_2d(&instance.matrix)))
    }

    /// Change counter of instances and draw lists.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Forgets every placement and instance.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.registered.clear();
        self.by_placement.clear();
        self.instances.clear();
        self.records.clear();
        for list in &mut self.draw_lists {
            list.clear();
        }
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instancing::NO_BONES;
    use crate::model::ModelKind;
    use crate::testing::TestAssets;
    use verdant_assets::{AssetError, VersionSkew};

    fn load(
        registry: &mut InstanceRegistry,
        store: &mut ModelStore,
        assets: &TestAssets,
    ) -> LoadReport {
        let mut animation = AnimationAllocator::new(16);
        registry.execute_load(store, &mut animation, &assets.source)
    }

    #[test]
    fn test_two_placements_share_one_model() {
        let mut assets = TestAssets::new();
        assets.add_map_object("world/hut", 2, 2);
        let mut store = ModelStore::new(ModelKind::MapObject);
        let mut registry = InstanceRegistry::new();
        registry.register_placement(Placement::new(10, "world/hut", Vec3::ZERO, Vec3::ZERO));
        registry.register_placement(Placement::new(11, "world/hut", Vec3::X, Vec3::ZERO));

        let report = load(&mut registry, &mut store, &assets);
        assert_eq!(report.added, vec![(10, 0), (11, 1)]);
        assert_eq!(report.models_loaded, 1);
        assert_eq!(store.model_count(), 1);
        assert_eq!(registry.instance_count(), 2);
        assert_eq!(registry.record(0).unwrap().model, registry.record(1).unwrap().model);

        let list = registry.draw_list(DrawListKind::Opaque);
        assert_eq!(list.len(), 8);
        assert_eq!(list.total_triangles(), 16);
        assert!(list.draw_call_data().iter().all(|d| registry.instance(d.instance_id).is_some()));
        assert_eq!(store.models()[0].instance_ids, vec![0, 1]);
    }

    #[test]
    fn test_draw_calls_match_render_batches() {
        let mut assets = TestAssets::new();
        assets.add_complex("creature/wolf", 2, 1);
        let mut complex = ModelStore::new(ModelKind::ComplexModel);
        let mut registry = InstanceRegistry::new();
        for id in 0..5 {
            registry.register_placement(Placement::new(id, "creature/wolf", Vec3::ZERO, Vec3::ZERO));
        }
        let report = load(&mut registry, &mut complex, &assets);
        let batches = complex.models()[0].render_batch_count();
        assert_eq!(report.draw_calls_added, 5 * batches);

        let opaque = registry.draw_list(DrawListKind::Opaque).len() as usize;
        let transparent = registry.draw_list(DrawListKind::Transparent).len() as usize;
        assert_eq!(opaque + transparent, 5 * batches);
        assert_eq!(transparent, 5);
    }

    #[test]
    fn test_empty_load_is_noop() {
        let assets = TestAssets::new();
        let mut store = ModelStore::new(ModelKind::MapObject);
        let mut registry = InstanceRegistry::new();
        let report = load(&mut registry, &mut store, &assets);
        assert!(report.is_empty());
        assert_eq!(registry.generation(), 0);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_duplicate_unique_id_ignored() {
        let mut registry = InstanceRegistry::new();
        assert!(registry.register_placement(Placement::new(7, "a", Vec3::ZERO, Vec3::ZERO)));
        assert!(!registry.register_placement(Placement::new(7, "b", Vec3::ZERO, Vec3::ZERO)));
        assert_eq!(registry.pending_count(), 1);
    }

    #[test]
    fn test_outdated_asset_skipped() {
        let mut assets = TestAssets::new();
        assets.add_map_object("world/hut", 1, 1);
        assets.add_outdated_map_object("world/old");
        let mut store = ModelStore::new(ModelKind::MapObject);
        let mut registry = InstanceRegistry::new();
        registry.register_placement(Placement::new(1, "world/old", Vec3::ZERO, Vec3::ZERO));
        registry.register_placement(Placement::new(2, "world/hut", Vec3::ZERO, Vec3::ZERO));
        registry.register_placement(Placement::new(3, "world/old", Vec3::ZERO, Vec3::ZERO));

        let report = load(&mut registry, &mut store, &assets);
        assert_eq!(report.added, vec![(2, 0)]);
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(
            report.skipped[0].error,
            RenderError::Asset(AssetError::VersionMismatch { skew: VersionSkew::Older, .. })
        ));
        assert_eq!(registry.instance_for_placement(2), Some(0));
        assert_eq!(registry.instance_for_placement(1), None);
    }

    #[test]
    fn test_animated_instances_get_bone_ranges() {
        let mut assets = TestAssets::new();
        assets.add_complex("creature/wolf", 3, 1);
        let mut store = ModelStore::new(ModelKind::ComplexModel);
        let mut registry = InstanceRegistry::new();
        let mut animation = AnimationAllocator::new(4);
        registry.register_placement(Placement::new(1, "creature/wolf", Vec3::ZERO, Vec3::ZERO));
        registry.register_placement(Placement::new(2, "creature/wolf", Vec3::ZERO, Vec3::ZERO));
        registry.execute_load(&mut store, &mut animation, &assets.source);

        assert_eq!(registry.instance(0).unwrap().bone_deform_offset, 0);
        assert_eq!(registry.instance(1).unwrap().bone_deform_offset, 3);
        assert_eq!(animation.deform_capacity(), 6);

        assert!(registry.set_bone_offsets(1, NO_BONES, NO_BONES));
        assert!(!registry.instance(1).unwrap().is_animated());
    }

    #[test]
    fn test_transform_rotation_order() {
        let placement = Placement::new(0, "m", Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 0.0, 90.0));
        let moved = placement.transform().transform_point3(Vec3::X);
        assert!((moved - Vec3::new(1.0, 3.0, 3.0)).length() < 1e-5);

        // Positive Y rotation turns the other way.
        let placement = Placement::new(0, "m", Vec3::ZERO, Vec3::new(0.0, 90.0, 0.0));
        let moved = placement.transform().transform_point3(Vec3::X);
        assert!((moved - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_world_bounds_follow_instance() {
        let mut assets = TestAssets::new();
        assets.add_map_object("world/hut", 1, 1);
        let mut store = ModelStore::new(ModelKind::MapObject);
        let mut registry = InstanceRegistry::new();
        registry.register_placement(Placement::new(1, "world/hut", Vec3::new(100.0, 0.0, 0.0), Vec3::ZERO));
        load(&mut registry, &mut store, &assets);

        let bounds = registry.world_bounds(&store, DrawListKind::Opaque, 0).unwrap();
        assert!((bounds.min - Vec3::new(100.0, 0.0, 0.0)).length() < 1e-5);
        assert!((bounds.max - Vec3::new(101.0, 1.0, 1.0)).length() < 1e-5);
        assert_eq!(registry.instance_bounds(&store, 0), Some(bounds));
        assert!(registry.world_bounds(&store, DrawListKind::Opaque, 1).is_none());
    }

    #[test]
    fn test_clear_allows_reregistration() {
        let mut registry = InstanceRegistry::new();
        registry.register_placement(Placement::new(7, "a", Vec3::ZERO, Vec3::ZERO));
        registry.clear();
        assert!(registry.register_placement(Placement::new(7, "a", Vec3::ZERO, Vec3::ZERO)));
    }
}
