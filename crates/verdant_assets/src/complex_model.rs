//! # Complex Model Format
//!
//! Animated models in a single file: geometry, texture units, render
//! batches, skeleton and per-bone keyframe timestamp tracks.
//!
//! ```text
//! header {VCMD, ver}
//! u32 flags
//! u32 n + vertices[n]          (40 bytes, 4 bone influences)
//! u32 n + u16 indices[n]
//! u32 n + texture units[n]
//! u32 n + render batches[n]
//! culling data[batches]
//! u32 n + bones[n]
//! u32 n + sequences[n]
//! for bone: for sequence: u32 n + u32 timestamps_ms[n]
//! ```

use std::path::Path;

use bytemuck::{Pod, Zeroable};

use crate::culling::CullingData;
use crate::error::AssetResult;
use crate::header::token;
use crate::map_object::{validate_culling, validate_indices};
use crate::reader::{ByteReader, ByteWriter};
use crate::source::AssetSource;

/// Token of complex model files.
pub const COMPLEX_MODEL_TOKEN: u32 = token(*b"VCMD");
/// Format revision this build reads.
pub const COMPLEX_MODEL_VERSION: u32 = 5;
/// Extension of complex model files.
pub const COMPLEX_MODEL_EXTENSION: &str = "cmodel";

/// Skinned vertex (40 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ComplexVertex {
    /// Model-space position.
    pub position: [f32; 3],
    /// Model-space normal.
    pub normal: [f32; 3],
    /// Texture coordinates.
    pub uv: [f32; 2],
    /// Influencing bones.
    pub bone_indices: [u8; 4],
    /// Influence weights, normalized to 255.
    pub bone_weights: [u8; 4],
}

/// Texture unit record (12 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ComplexTextureUnit {
    /// Texture, material and blend-mode bits.
    pub flags: u16,
    /// Shader permutation.
    pub material_type: u16,
    /// Texture ids, `u32::MAX` when unused.
    pub texture_ids: [u32; 2],
}

/// Sub-mesh descriptor (16 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ComplexRenderBatch {
    /// First index.
    pub index_start: u32,
    /// Number of indices.
    pub index_count: u32,
    /// First texture unit.
    pub texture_unit_offset: u16,
    /// Number of texture units.
    pub texture_unit_count: u16,
    /// `FLAG_*` bits.
    pub flags: u32,
}

impl ComplexRenderBatch {
    /// Back faces are discarded.
    pub const FLAG_BACKFACE_CULLED: u32 = 1 << 0;
    /// Batch is blended and drawn in the transparent list.
    pub const FLAG_TRANSPARENT: u32 = 1 << 1;

    /// Returns true if back faces are culled.
    #[must_use]
    pub const fn is_backface_culled(&self) -> bool {
        self.flags & Self::FLAG_BACKFACE_CULLED != 0
    }

    /// Returns true if the batch is transparent.
    #[must_use]
    pub const fn is_transparent(&self) -> bool {
        self.flags & Self::FLAG_TRANSPARENT != 0
    }
}

/// Skeleton bone (16 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ComplexBone {
    /// Parent bone, -1 for roots.
    pub parent: i16,
    /// Bone flags.
    pub flags: u16,
    /// Pivot point in model space.
    pub pivot: [f32; 3],
}

/// Animation sequence header (8 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ComplexSequence {
    /// Animation id.
    pub id: u16,
    /// Variation of the id.
    pub sub_id: u16,
    /// Length in milliseconds.
    pub duration_ms: u32,
}

/// Parsed complex model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplexModel {
    /// Format flags.
    pub flags: u32,
    /// Vertices.
    pub vertices: Vec<ComplexVertex>,
    /// Indices into `vertices`.
    pub indices: Vec<u16>,
    /// Texture units referenced by batches.
    pub texture_units: Vec<ComplexTextureUnit>,
    /// Render batches.
    pub render_batches: Vec<ComplexRenderBatch>,
    /// One bounding volume per render batch.
    pub culling_data: Vec<CullingData>,
    /// Skeleton.
    pub bones: Vec<ComplexBone>,
    /// Sequences.
    pub sequences: Vec<ComplexSequence>,
    /// Keyframe timestamps in ms, `bone * sequences.len() + sequence`.
    pub tracks: Vec<Vec<u32>>,
}

impl ComplexModel {
    /// Parses and validates a complex model file.
    pub fn parse(path: &Path, bytes: &[u8]) -> AssetResult<Self> {
        let mut reader = ByteReader::new(path, bytes);
        reader.read_header(COMPLEX_MODEL_TOKEN, COMPLEX_MODEL_VERSION)?;

        let flags = reader.read_u32("flags")?;
        let vertices: Vec<ComplexVertex> = reader.read_counted_vec("vertices")?;
        let indices: Vec<u16> = reader.read_counted_vec("indices")?;
        let texture_units: Vec<ComplexTextureUnit> = reader.read_counted_vec("texture units")?;
        let render_batches: Vec<ComplexRenderBatch> = reader.read_counted_vec("render batches")?;
        let culling_data: Vec<CullingData> =
            reader.read_pod_vec(render_batches.len() as u32, "culling data")?;
        let bones: Vec<ComplexBone> = reader.read_counted_vec("bones")?;
        let sequences: Vec<ComplexSequence> = reader.read_counted_vec("sequences")?;

        // Every track carries at least its u32 count.
        let track_count = bones
            .len()
            .checked_mul(sequences.len())
            .filter(|&count| count <= reader.remaining() / 4)
            .ok_or_else(|| {
                reader.malformed(format!(
                    "{} bones x {} sequences exceed the {} bytes left for tracks",
                    bones.len(),
                    sequences.len(),
                    reader.remaining()
                ))
            })?;
        let mut tracks = Vec::with_capacity(track_count);
        for _ in 0..track_count {
            tracks.push(reader.read_counted_vec::<u32>("timestamps")?);
        }

        let model = Self {
            flags,
            vertices,
            indices,
            texture_units,
            render_batches,
            culling_data,
            bones,
            sequences,
            tracks,
        };
        model.validate(&reader)?;
        Ok(model)
    }

    /// Loads and parses `path` from `source`.
    pub fn load(source: &dyn AssetSource, path: &Path) -> AssetResult<Self> {
        Self::parse(path, &source.read(path)?)
    }

    fn validate(&self, reader: &ByteReader<'_>) -> AssetResult<()> {
        validate_indices(reader, &self.indices, self.vertices.len())?;
        validate_culling(reader, &self.culling_data)?;

        for (i, batch) in self.render_batches.iter().enumerate() {
            let end = u64::from(batch.index_start) + u64::from(batch.index_count);
            if end > self.indices.len() as u64 {
                return Err(reader.malformed(format!(
                    "render batch {i} covers indices up to {end}, model has {}",
                    self.indices.len()
                )));
            }
            let units = usize::from(batch.texture_unit_offset) + usize::from(batch.texture_unit_count);
            if units > self.texture_units.len() {
                return Err(reader.malformed(format!(
                    "render batch {i} references texture units up to {units}, model has {}",
                    self.texture_units.len()
                )));
            }
        }

        for (i, bone) in self.bones.iter().enumerate() {
            let parent = i32::from(bone.parent);
            if parent < -1 || parent >= i as i32 {
                return Err(reader.malformed(format!(
                    "bone {i} has parent {parent}, parents must precede children"
                )));
            }
        }

        if !self.bones.is_empty() {
            let bone_count = self.bones.len();
            let bad = self.vertices.iter().position(|v| {
                v.bone_indices
                    .iter()
                    .zip(v.bone_weights)
                    .any(|(&b, w)| w > 0 && usize::from(b) >= bone_count)
            });
            if let Some(v) = bad {
                return Err(reader.malformed(format!(
                    "vertex {v} is weighted to a bone past {bone_count}"
                )));
            }
        }

        if let Some(t) = self.tracks.iter().position(|track| track.windows(2).any(|w| w[0] > w[1])) {
            return Err(reader.malformed(format!("timestamp track {t} is not sorted")));
        }

        Ok(())
    }

    /// Encodes the model.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_header(COMPLEX_MODEL_TOKEN, COMPLEX_MODEL_VERSION);
        writer.write_u32(self.flags);
        writer.write_counted_slice(&self.vertices);
        writer.write_counted_slice(&self.indices);
        writer.write_counted_slice(&self.texture_units);
        writer.write_counted_slice(&self.render_batches);
        writer.write_slice(&self.culling_data);
        writer.write_counted_slice(&self.bones);
        writer.write_counted_slice(&self.sequences);
        for track in &self.tracks {
            writer.write_counted_slice(track);
        }
        writer.into_bytes()
    }

    /// Number of bones.
    #[must_use]
    pub fn bone_count(&self) -> u32 {
        self.bones.len() as u32
    }

    /// Number of sequences.
    #[must_use]
    pub fn sequence_count(&self) -> u32 {
        self.sequences.len() as u32
    }

    /// Keyframe timestamps of `bone` in `sequence`. Empty when out of range.
    #[must_use]
    pub fn timestamps(&self, bone: u32, sequence: u32) -> &[u32] {
        if bone >= self.bone_count() || sequence >= self.sequence_count() {
            return &[];
        }
        let index = bone as usize * self.sequences.len() + sequence as usize;
        self.tracks.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AssetError, VersionSkew};

    fn skinned_triangle() -> ComplexModel {
        let vertex = |x: f32, bone: u8| ComplexVertex {
            position: [x, 0.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [0.0, 0.0],
            bone_indices: [bone, 0, 0, 0],
            bone_weights: [255, 0, 0, 0],
        };
        ComplexModel {
            flags: 0,
            vertices: vec![vertex(0.0, 0), vertex(1.0, 1), vertex(2.0, 1)],
            indices: vec![0, 1, 2],
            texture_units: vec![ComplexTextureUnit { flags: 0, material_type: 2, texture_ids: [9, u32::MAX] }],
            render_batches: vec![ComplexRenderBatch {
                index_start: 0,
                index_count: 3,
                texture_unit_offset: 0,
                texture_unit_count: 1,
                flags: ComplexRenderBatch::FLAG_BACKFACE_CULLED,
            }],
            culling_data: vec![CullingData::from_bounds([0.0, 0.0, 0.0], [2.0, 0.0, 0.0])],
            bones: vec![
                ComplexBone { parent: -1, flags: 0, pivot: [0.0; 3] },
                ComplexBone { parent: 0, flags: 0, pivot: [1.0, 0.0, 0.0] },
            ],
            sequences: vec![
                ComplexSequence { id: 0, sub_id: 0, duration_ms: 1000 },
                ComplexSequence { id: 4, sub_id: 0, duration_ms: 500 },
            ],
            tracks: vec![vec![0, 500], vec![0], vec![0, 250, 750], vec![0, 100]],
        }
    }

    #[test]
    fn test_layouts() {
        assert_eq!(std::mem::size_of::<ComplexVertex>(), 40);
        assert_eq!(std::mem::size_of::<ComplexTextureUnit>(), 12);
        assert_eq!(std::mem::size_of::<ComplexRenderBatch>(), 16);
        assert_eq!(std::mem::size_of::<ComplexBone>(), 16);
        assert_eq!(std::mem::size_of::<ComplexSequence>(), 8);
    }

    #[test]
    fn test_reload_is_identical() {
        let model = skinned_triangle();
        let parsed = ComplexModel::parse(Path::new("m.cmodel"), &model.to_bytes()).unwrap();
        assert_eq!(parsed, model);
        assert_eq!(parsed.timestamps(1, 0), &[0, 250, 750]);
        assert!(parsed.timestamps(2, 0).is_empty());
    }

    #[test]
    fn test_newer_version() {
        let mut bytes = skinned_triangle().to_bytes();
        bytes[4..8].copy_from_slice(&(COMPLEX_MODEL_VERSION + 1).to_le_bytes());
        let err = ComplexModel::parse(Path::new("m.cmodel"), &bytes).unwrap_err();
        assert!(matches!(
            err,
            AssetError::VersionMismatch { skew: VersionSkew::Newer, .. }
        ));
    }

    #[test]
    fn test_wrong_token() {
        let mut bytes = skinned_triangle().to_bytes();
        bytes[0..4].copy_from_slice(b"NOPE");
        assert!(matches!(
            ComplexModel::parse(Path::new("m.cmodel"), &bytes),
            Err(AssetError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_bone_parent_must_precede() {
        let mut model = skinned_triangle();
        model.bones[0].parent = 1;
        assert!(ComplexModel::parse(Path::new("m"), &model.to_bytes()).is_err());
    }

    #[test]
    fn test_vertex_weighted_to_missing_bone() {
        let mut model = skinned_triangle();
        model.vertices[2].bone_indices[0] = 5;
        assert!(ComplexModel::parse(Path::new("m"), &model.to_bytes()).is_err());
    }

    #[test]
    fn test_texture_unit_range() {
        let mut model = skinned_triangle();
        model.render_batches[0].texture_unit_count = 2;
        assert!(ComplexModel::parse(Path::new("m"), &model.to_bytes()).is_err());
    }

    #[test]
    fn test_unsorted_track() {
        let mut model = skinned_triangle();
        model.tracks[0] = vec![500, 0];
        assert!(ComplexModel::parse(Path::new("m"), &model.to_bytes()).is_err());
    }

    #[test]
    fn test_track_table_larger_than_file() {
        let mut writer = ByteWriter::new();
        writer.write_header(COMPLEX_MODEL_TOKEN, COMPLEX_MODEL_VERSION);
        writer.write_u32(0);
        for _ in 0..4 {
            writer.write_u32(0);
        }
        let root = ComplexBone { parent: -1, flags: 0, pivot: [0.0; 3] };
        writer.write_counted_slice(&vec![root; 65536]);
        writer.write_counted_slice(&vec![ComplexSequence { id: 0, sub_id: 0, duration_ms: 1 }; 65536]);

        assert!(matches!(
            ComplexModel::parse(Path::new("m"), &writer.into_bytes()),
            Err(AssetError::Malformed { .. })
        ));
    }

    #[test]
    fn test_truncated_tracks() {
        let mut bytes = skinned_triangle().to_bytes();
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(
            ComplexModel::parse(Path::new("m"), &bytes),
            Err(AssetError::Malformed { .. })
        ));
    }
}
