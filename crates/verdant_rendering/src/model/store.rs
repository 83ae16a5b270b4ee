//! Model store: de-duplicated loading into shared geometry arrays.

use std::collections::HashMap;
use std::path::PathBuf;

use glam::{Mat4, Vec3};
use verdant_assets::{
    name_hash, AssetResult, AssetSource, ComplexBone, ComplexModel, ComplexSequence, CullingData, MapObject,
    MapObjectMaterial,
};
use verdant_core::IndexArena;

use super::{ModelHandle, ModelKind, ModelVertex, TextureUnit};

/// Rotation in radians of a bone at a keyframe at the very end of its
/// sequence. Keys in between swing proportionally to their timestamp.
pub const KEYFRAME_SWING: f32 = 0.5;

/// Vertex colour offset of batches without vertex colours.
pub const NO_VERTEX_COLORS: u32 = u32::MAX;

/// One drawable sub-mesh, with every offset resolved into the shared arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderBatch {
    /// First index in the shared index array.
    pub first_index: u32,
    /// Number of indices.
    pub index_count: u32,
    /// Added to every index to find the shared vertex.
    pub base_vertex: i32,
    /// First texture unit in the shared texture-unit array.
    pub texture_unit_offset: u32,
    /// Number of texture units.
    pub texture_unit_count: u16,
    /// Bounding volume of this batch in the shared culling array.
    pub culling_data_id: u32,
    /// Colour of the mesh's first vertex, or [`NO_VERTEX_COLORS`].
    pub vertex_color_offset: u32,
    /// Back faces are discarded.
    pub backface_culled: bool,
    /// Drawn in the transparent list.
    pub transparent: bool,
}

impl RenderBatch {
    /// Triangles drawn by this batch.
    #[must_use]
    pub const fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }
}

/// Bone and sequence metadata of an animated model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    /// Number of bones.
    pub bone_count: u32,
    /// Sequences, indexed by sequence index.
    pub sequences: Vec<ComplexSequence>,
    /// Timestamps in ms, `bone * sequences.len() + sequence`.
    tracks: Vec<Vec<u32>>,
    /// Parents and pivots. Parents precede their children.
    bones: Vec<ComplexBone>,
}

impl Skeleton {
    /// Number of sequences.
    #[must_use]
    pub fn sequence_count(&self) -> u32 {
        self.sequences.len() as u32
    }

    /// Sequence length in seconds.
    #[must_use]
    pub fn duration_seconds(&self, sequence: u32) -> f32 {
        self.sequences
            .get(sequence as usize)
            .map_or(0.0, |s| s.duration_ms as f32 / 1000.0)
    }

    /// Keyframe timestamps (ms) of a bone in a sequence.
    #[must_use]
    pub fn timestamps(&self, bone: u32, sequence: u32) -> &[u32] {
        if bone >= self.bone_count || sequence >= self.sequence_count() {
            return &[];
        }
        let index = bone as usize * self.sequences.len() + sequence as usize;
        self.tracks.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Parent bone, `None` for roots.
    #[must_use]
    pub fn parent(&self, bone: u32) -> Option<u32> {
        let parent = self.bones.get(bone as usize)?.parent;
        u32::try_from(parent).ok()
    }

    /// Bone-local pose at a keyframe: a rotation about the bone's pivot
    /// around +Z. Missing keys and zero-length sequences are the rest pose.
    #[must_use]
    pub fn local_pose(&self, bone: u32, sequence: u32, frame_index: u32) -> Mat4 {
        let Some(key_ms) = self.timestamps(bone, sequence).get(frame_index as usize) else {
            return Mat4::IDENTITY;
        };
        let duration_ms = self.sequences.get(sequence as usize).map_or(0, |s| s.duration_ms);
        if duration_ms == 0 {
            return Mat4::IDENTITY;
        }
        let pivot = Vec3::from(self.bones[bone as usize].pivot);
        let angle = KEYFRAME_SWING * (*key_ms as f32 / duration_ms as f32);
        Mat4::from_translation(pivot) * Mat4::from_rotation_z(angle) * Mat4::from_translation(-pivot)
    }
}

/// A distinct model asset, loaded once.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    /// Handle of this model.
    pub handle: ModelHandle,
    /// Asset name (path without extension).
    pub name: String,
    /// FNV-1a hash of `name`.
    pub name_hash: u32,
    /// First vertex in the shared vertex array.
    pub base_vertex: u32,
    /// Vertices owned by this model.
    pub vertex_count: u32,
    /// First index in the shared index array.
    pub first_index: u32,
    /// Indices owned by this model.
    pub index_count: u32,
    /// Sub-meshes.
    pub render_batches: Vec<RenderBatch>,
    /// Volume covering every batch.
    pub aggregate_culling_id: u32,
    /// Skeleton of animated models.
    pub skeleton: Option<Skeleton>,
    /// Instances placed with this model.
    pub instance_ids: Vec<u32>,
}

impl LoadedModel {
    /// Number of render batches.
    #[must_use]
    pub fn render_batch_count(&self) -> usize {
        self.render_batches.len()
    }

    /// Bones per instance, zero for static models.
    #[must_use]
    pub fn bone_count(&self) -> u32 {
        self.skeleton.as_ref().map_or(0, |s| s.bone_count)
    }

    /// Triangles drawn per instance.
    #[must_use]
    pub fn triangle_count(&self) -> u32 {
        self.render_batches.iter().map(RenderBatch::triangle_count).sum()
    }
}

/// Shared geometry and materials for one [`ModelKind`].
///
/// Appends only. The GPU buffer synchronizer uploads the arrays whenever
/// [`ModelStore::generation`] moves.
#[derive(Debug)]
pub struct ModelStore {
    /// Family of every model in this store.
    kind: ModelKind,
    /// Loaded models by handle.
    models: IndexArena<LoadedModel>,
    /// Name hash to handle.
    by_hash: HashMap<u32, ModelHandle>,
    /// Shared vertices.
    vertices: Vec<ModelVertex>,
    /// Shared indices, relative to each batch's base vertex.
    indices: Vec<u16>,
    /// Shared material slots.
    texture_units: Vec<TextureUnit>,
    /// Shared packed RGBA vertex colours.
    vertex_colors: Vec<u32>,
    /// Shared bounding volumes.
    culling_data: Vec<CullingData>,
    /// Bumped on every change to the shared arrays.
    generation: u64,
}

impl ModelStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            models: IndexArena::new(),
            by_hash: HashMap::new(),
            vertices: Vec::new(),
            indices: Vec::new(),
            texture_units: Vec::new(),
            vertex_colors: Vec::new(),
            culling_data: Vec::new(),
            generation: 0,
        }
    }

    /// Model family.
    #[must_use]
    pub const fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Handle of an already loaded model.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<ModelHandle> {
        self.by_hash.get(&name_hash(name)).copied()
    }

    /// Loads `name` (path without extension) unless already loaded.
    ///
    /// The whole asset is parsed and validated before anything is appended,
    /// so a failure leaves the store untouched.
    pub fn load(&mut self, source: &dyn AssetSource, name: &str) -> AssetResult<ModelHandle> {
        let hash = name_hash(name);
        if let Some(&handle) = self.by_hash.get(&hash) {
            if let Some(existing) = self.models.get(handle.0) {
                if existing.name != name {
                    tracing::warn!(name, existing = %existing.name, hash, "model name hash collision");
                }
            }
            return Ok(handle);
        }

        let path = PathBuf::from(format!("{name}.{}", self.kind.extension()));
        let handle = match self.kind {
            ModelKind::MapObject => {
                let object = MapObject::load(source, &path)?;
                self.append_map_object(name, hash, &object)
            }
            ModelKind::ComplexModel => {
                let model = ComplexModel::load(source, &path)?;
                self.append_complex_model(name, hash, &model)
            }
        };

        self.by_hash.insert(hash, handle);
        self.generation += 1;

        if let Some(model) = self.models.get(handle.0) {
            tracing::debug!(
                name,
                handle = handle.0,
                batches = model.render_batches.len(),
                vertices = model.vertex_count,
                bones = model.bone_count(),
                "loaded model"
            );
        }
        Ok(handle)
    }

    fn append_map_object(&mut self, name: &str, hash: u32, object: &MapObject) -> ModelHandle {
        let handle = ModelHandle(self.models.next_index());
        let base_vertex = self.vertices.len() as u32;
        let first_index = self.indices.len() as u32;
        let culling_start = self.culling_data.len();

        let material_offset = self.texture_units.len() as u32;
        self.texture_units
            .extend(object.root.materials.iter().map(texture_unit_from_material));

        let mut render_batches = Vec::with_capacity(object.render_batch_count());
        for mesh in &object.meshes {
            let mesh_vertex = self.vertices.len() as i32;
            let mesh_index = self.indices.len() as u32;

            self.vertices.extend(mesh.vertices.iter().map(|v| ModelVertex {
                position: v.position,
                normal: v.normal,
                uv: v.uv,
                bone_indices: 0,
                bone_weights: 0,
            }));
            self.indices.extend_from_slice(&mesh.indices);

            let vertex_color_offset = match mesh.vertex_color_sets.first() {
                Some(colors) => {
                    let offset = self.vertex_colors.len() as u32;
                    self.vertex_colors.extend_from_slice(colors);
                    offset
                }
                None => NO_VERTEX_COLORS,
            };

            for (batch, culling) in mesh.render_batches.iter().zip(&mesh.culling_data) {
                let culling_data_id = self.culling_data.len() as u32;
                self.culling_data.push(*culling);
                render_batches.push(RenderBatch {
                    first_index: mesh_index + batch.start_index,
                    index_count: batch.index_count,
                    base_vertex: mesh_vertex,
                    texture_unit_offset: material_offset + u32::from(batch.material_id),
                    texture_unit_count: 1,
                    culling_data_id,
                    vertex_color_offset,
                    backface_culled: false,
                    transparent: false,
                });
            }
        }

        let aggregate_culling_id = self.push_aggregate(culling_start);
        self.models.push(LoadedModel {
            handle,
            name: name.to_owned(),
            name_hash: hash,
            base_vertex,
            vertex_count: self.vertices.len() as u32 - base_vertex,
            first_index,
            index_count: self.indices.len() as u32 - first_index,
            render_batches,
            aggregate_culling_id,
            skeleton: None,
            instance_ids: Vec::new(),
        });
        handle
    }

    fn append_complex_model(&mut self, name: &str, hash: u32, model: &ComplexModel) -> ModelHandle {
        let handle = ModelHandle(self.models.next_index());
        let base_vertex = self.vertices.len() as u32;
        let first_index = self.indices.len() as u32;
        let culling_start = self.culling_data.len();
        let texture_offset = self.texture_units.len() as u32;

        self.vertices.extend(model.vertices.iter().map(|v| ModelVertex {
            position: v.position,
            normal: v.normal,
            uv: v.uv,
            bone_indices: u32::from_le_bytes(v.bone_indices),
            bone_weights: u32::from_le_bytes(v.bone_weights),
        }));
        self.indices.extend_from_slice(&model.indices);
        self.texture_units.extend(model.texture_units.iter().map(|unit| TextureUnit {
            flags: unit.flags,
            material_type: unit.material_type,
            texture_ids: [unit.texture_ids[0], unit.texture_ids[1], u32::MAX],
        }));

        let mut render_batches = Vec::with_capacity(model.render_batches.len());
        for (batch, culling) in model.render_batches.iter().zip(&model.culling_data) {
            let culling_data_id = self.culling_data.len() as u32;
            self.culling_data.push(*culling);
            render_batches.push(RenderBatch {
                first_index: first_index + batch.index_start,
                index_count: batch.index_count,
                base_vertex: base_vertex as i32,
                texture_unit_offset: texture_offset + u32::from(batch.texture_unit_offset),
                texture_unit_count: batch.texture_unit_count,
                culling_data_id,
                vertex_color_offset: NO_VERTEX_COLORS,
                backface_culled: batch.is_backface_culled(),
                transparent: batch.is_transparent(),
            });
        }

        let skeleton = (!model.bones.is_empty()).then(|| Skeleton {
            bone_count: model.bone_count(),
            sequences: model.sequences.clone(),
            tracks: model.tracks.clone(),
            bones: model.bones.clone(),
        });

        let aggregate_culling_id = self.push_aggregate(culling_start);
        self.models.push(LoadedModel {
            handle,
            name: name.to_owned(),
            name_hash: hash,
            base_vertex,
            vertex_count: model.vertices.len() as u32,
            first_index,
            index_count: model.indices.len() as u32,
            render_batches,
            aggregate_culling_id,
            skeleton,
            instance_ids: Vec::new(),
        });
        handle
    }

    fn push_aggregate(&mut self, batch_start: usize) -> u32 {
        let aggregate = CullingData::union(&self.culling_data[batch_start..])
            .unwrap_or_else(|| CullingData::from_bounds([0.0; 3], [0.0; 3]));
        let id = self.culling_data.len() as u32;
        self.culling_data.push(aggregate);
        id
    }

    /// Looks up a model.
    #[must_use]
    pub fn model(&self, handle: ModelHandle) -> Option<&LoadedModel> {
        self.models.get(handle.0)
    }

    pub(crate) fn model_mut(&mut self, handle: ModelHandle) -> Option<&mut LoadedModel> {
        self.models.get_mut(handle.0)
    }

    /// Every loaded model in handle order.
    #[must_use]
    pub fn models(&self) -> &[LoadedModel] {
        self.models.as_slice()
    }

    /// Number of distinct models.
    #[must_use]
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Shared vertices.
    #[must_use]
    pub fn vertices(&self) -> &[ModelVertex] {
        &self.vertices
    }

    /// Shared indices.
    #[must_use]
    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    /// Shared texture units.
    #[must_use]
    pub fn texture_units(&self) -> &[TextureUnit] {
        &self.texture_units
    }

    /// Shared vertex colours.
    #[must_use]
    pub fn vertex_colors(&self) -> &[u32] {
        &self.vertex_colors
    }

    /// Shared bounding volumes.
    #[must_use]
    pub fn culling_data(&self) -> &[CullingData] {
        &self.culling_data
    }

    /// Change counter of the shared arrays.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Unloads every model.
    pub fn clear(&mut self) {
        self.models.clear();
        self.by_hash.clear();
        self.vertices.clear();
        self.indices.clear();
        self.texture_units.clear();
        self.vertex_colors.clear();
        self.culling_data.clear();
        self.generation += 1;
    }
}

fn texture_unit_from_material(material: &MapObjectMaterial) -> TextureUnit {
    let mut flags = 0;
    if material.is_unlit() {
        flags |= TextureUnit::FLAG_UNLIT;
    }
    if material.transparency_mode == MapObjectMaterial::TRANSPARENCY_ALPHA_TEST {
        flags |= TextureUnit::FLAG_ALPHA_TEST;
    }
    TextureUnit {
        flags,
        material_type: material.material_type,
        texture_ids: material.texture_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{complex_model_bytes, map_object_files, TestAssets};
    use verdant_assets::{AssetError, MemoryAssetSource};

    #[test]
    fn test_same_asset_loads_once() {
        let mut assets = TestAssets::new();
        assets.add_complex("creature/wolf", 2, 3);

        let mut store = ModelStore::new(ModelKind::ComplexModel);
        let a = store.load(&assets.source, "creature/wolf").unwrap();
        let vertices = store.vertices().len();
        let generation = store.generation();
        let b = store.load(&assets.source, "creature/wolf").unwrap();

        assert_eq!(a, b);
        assert_eq!(store.model_count(), 1);
        assert_eq!(store.vertices().len(), vertices);
        assert_eq!(store.generation(), generation);
    }

    #[test]
    fn test_missing_asset_leaves_store_untouched() {
        let source = MemoryAssetSource::new();
        let mut store = ModelStore::new(ModelKind::MapObject);
        let err = store.load(&source, "world/missing").unwrap_err();
        assert!(matches!(err, AssetError::NotFound { .. }));
        assert_eq!(store.model_count(), 0);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_map_object_offsets() {
        let mut source = MemoryAssetSource::new();
        for (path, bytes) in map_object_files("world/hut", 2, 2) {
            source.insert(path, bytes);
        }
        for (path, bytes) in map_object_files("world/well", 1, 1) {
            source.insert(path, bytes);
        }

        let mut store = ModelStore::new(ModelKind::MapObject);
        let hut = store.load(&source, "world/hut").unwrap();
        let well = store.load(&source, "world/well").unwrap();

        let hut = store.model(hut).unwrap();
        let well = store.model(well).unwrap();
        assert_eq!(hut.render_batch_count(), 4);
        assert_eq!(well.render_batch_count(), 1);
        assert_eq!(well.base_vertex, hut.vertex_count);
        assert_eq!(well.first_index, hut.index_count);

        // Four batch volumes plus the aggregate, then the well's.
        assert_eq!(hut.aggregate_culling_id, 4);
        assert_eq!(well.render_batches[0].culling_data_id, 5);
        assert_eq!(store.culling_data().len(), 7);

        // Second mesh of the hut starts after the first.
        assert!(hut.render_batches[2].base_vertex > hut.render_batches[0].base_vertex);
        assert_ne!(hut.render_batches[0].vertex_color_offset, NO_VERTEX_COLORS);
    }

    #[test]
    fn test_aggregate_covers_batches() {
        let mut source = MemoryAssetSource::new();
        for (path, bytes) in map_object_files("world/hut", 2, 2) {
            source.insert(path, bytes);
        }
        let mut store = ModelStore::new(ModelKind::MapObject);
        let handle = store.load(&source, "world/hut").unwrap();
        let model = store.model(handle).unwrap();
        let aggregate = store.culling_data()[model.aggregate_culling_id as usize];
        for batch in &model.render_batches {
            let part = store.culling_data()[batch.culling_data_id as usize];
            for axis in 0..3 {
                assert!(aggregate.min[axis] <= part.min[axis]);
                assert!(aggregate.max[axis] >= part.max[axis]);
            }
        }
    }

    #[test]
    fn test_complex_model_skeleton() {
        let mut source = MemoryAssetSource::new();
        source.insert("creature/bat.cmodel", complex_model_bytes(4, 2, 1));
        let mut store = ModelStore::new(ModelKind::ComplexModel);
        let handle = store.load(&source, "creature/bat").unwrap();
        let model = store.model(handle).unwrap();
        let skeleton = model.skeleton.as_ref().unwrap();
        assert_eq!(skeleton.bone_count, 4);
        assert_eq!(skeleton.sequence_count(), 2);
        assert!(!skeleton.timestamps(3, 1).is_empty());
        assert!(skeleton.timestamps(4, 0).is_empty());
        assert_eq!(skeleton.parent(0), None);
        assert_eq!(skeleton.parent(2), Some(1));
        assert_eq!(skeleton.local_pose(1, 0, 0), Mat4::IDENTITY);
        assert_eq!(skeleton.local_pose(1, 0, 9), Mat4::IDENTITY);
        // The pivot stays put under the keyframe rotation.
        let pose = skeleton.local_pose(1, 0, 3);
        assert!(pose.transform_point3(Vec3::Y).abs_diff_eq(Vec3::Y, 1e-5));
        assert!(!pose.transform_point3(Vec3::ZERO).abs_diff_eq(Vec3::ZERO, 1e-3));
        assert_eq!(model.render_batches.iter().filter(|b| b.transparent).count(), 1);
    }

    #[test]
    fn test_clear() {
        let mut assets = TestAssets::new();
        assets.add_complex("creature/wolf", 2, 1);
        let mut store = ModelStore::new(ModelKind::ComplexModel);
        store.load(&assets.source, "creature/wolf").unwrap();
        store.clear();
        assert_eq!(store.model_count(), 0);
        assert!(store.vertices().is_empty());
        assert!(store.find("creature/wolf").is_none());
    }
}
