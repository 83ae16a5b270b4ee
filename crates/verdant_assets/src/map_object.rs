//! # Map Object Format
//!
//! Static world models. One root file lists materials and how many mesh
//! files follow; each mesh file sits next to it as `<stem>_NNN.mapmesh`.
//!
//! ```text
//! root (.mapobj)                     mesh (.mapmesh)
//! ┌──────────────────────┐           ┌──────────────────────────────────┐
//! │ header {VMOR, ver}   │           │ header {VMOM, ver}               │
//! │ u32 n + materials[n] │           │ u32 flags                        │
//! │ u32 mesh_count       │           │ u32 n + u16 indices[n]           │
//! └──────────────────────┘           │ u32 n + vertices[n]              │
//!                                    │ u32 sets, each u32 n + u32[n]    │
//!                                    │ u32 n + triangle data (2B each)  │
//!                                    │ u32 n + render batches[n]        │
//!                                    │ culling data[batches]            │
//!                                    └──────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};

use crate::culling::CullingData;
use crate::error::{AssetError, AssetResult};
use crate::header::token;
use crate::reader::{ByteReader, ByteWriter};
use crate::source::AssetSource;

/// Token of map object root files.
pub const MAP_OBJECT_ROOT_TOKEN: u32 = token(*b"VMOR");
/// Root format revision this build reads.
pub const MAP_OBJECT_ROOT_VERSION: u32 = 2;
/// Token of map object mesh files.
pub const MAP_OBJECT_MESH_TOKEN: u32 = token(*b"VMOM");
/// Mesh format revision this build reads.
pub const MAP_OBJECT_MESH_VERSION: u32 = 3;
/// Extension of root files.
pub const MAP_OBJECT_ROOT_EXTENSION: &str = "mapobj";
/// Extension of mesh files.
pub const MAP_OBJECT_MESH_EXTENSION: &str = "mapmesh";
/// Most vertex colour sets a mesh may carry.
pub const MAX_VERTEX_COLOR_SETS: u32 = 2;

/// Bytes per triangle-data record. The renderer does not read them.
const TRIANGLE_DATA_STRIDE: usize = 2;

/// Material record of a map object root.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MapObjectMaterial {
    /// Shader permutation.
    pub material_type: u16,
    /// `FLAG_*` bits.
    pub flags: u16,
    /// 0 = opaque, 1 = alpha tested.
    pub transparency_mode: u32,
    /// Texture ids, `u32::MAX` when unused.
    pub texture_ids: [u32; 3],
}

impl MapObjectMaterial {
    /// Material ignores scene lighting.
    pub const FLAG_UNLIT: u16 = 1 << 0;
    /// `transparency_mode` value for alpha tested materials.
    pub const TRANSPARENCY_ALPHA_TEST: u32 = 1;
    /// Texture id of an empty slot.
    pub const NO_TEXTURE: u32 = u32::MAX;

    /// Returns true if the material is unlit.
    #[must_use]
    pub const fn is_unlit(&self) -> bool {
        self.flags & Self::FLAG_UNLIT != 0
    }

    /// Alpha-test cutoff in `[0, 1]`, zero when not alpha tested.
    #[must_use]
    pub fn alpha_test_threshold(&self) -> f32 {
        if self.transparency_mode == Self::TRANSPARENCY_ALPHA_TEST {
            128.0 / 255.0
        } else {
            0.0
        }
    }
}

/// Map object vertex (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct MapObjectVertex {
    /// Model-space position.
    pub position: [f32; 3],
    /// Model-space normal.
    pub normal: [f32; 3],
    /// Texture coordinates.
    pub uv: [f32; 2],
}

/// Sub-mesh drawn with a single material.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MapObjectRenderBatch {
    /// First index, relative to the mesh.
    pub start_index: u32,
    /// Number of indices.
    pub index_count: u32,
    /// Index into the root's materials.
    pub material_id: u16,
    /// Padding.
    pub _pad: u16,
}

/// Parsed root file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapObjectRoot {
    /// Materials referenced by render batches.
    pub materials: Vec<MapObjectMaterial>,
    /// Mesh files that follow.
    pub mesh_count: u32,
}

impl MapObjectRoot {
    /// Parses a root file.
    pub fn parse(path: &Path, bytes: &[u8]) -> AssetResult<Self> {
        let mut reader = ByteReader::new(path, bytes);
        reader.read_header(MAP_OBJECT_ROOT_TOKEN, MAP_OBJECT_ROOT_VERSION)?;
        let materials = reader.read_counted_vec("materials")?;
        let mesh_count = reader.read_count("mesh count")?;
        Ok(Self { materials, mesh_count })
    }

    /// Encodes the root file.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_header(MAP_OBJECT_ROOT_TOKEN, MAP_OBJECT_ROOT_VERSION);
        writer.write_counted_slice(&self.materials);
        writer.write_u32(self.mesh_count);
        writer.into_bytes()
    }
}

/// Parsed mesh file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapObjectMesh {
    /// Format flags.
    pub flags: u32,
    /// Mesh-relative indices.
    pub indices: Vec<u16>,
    /// Vertices.
    pub vertices: Vec<MapObjectVertex>,
    /// Packed RGBA colour sets, each one entry per vertex.
    pub vertex_color_sets: Vec<Vec<u32>>,
    /// Triangle-data records kept opaque (skipped on load).
    pub triangle_data_count: u32,
    /// Render batches.
    pub render_batches: Vec<MapObjectRenderBatch>,
    /// One bounding volume per render batch.
    pub culling_data: Vec<CullingData>,
}

impl MapObjectMesh {
    /// Parses and validates a mesh file.
    pub fn parse(path: &Path, bytes: &[u8]) -> AssetResult<Self> {
        let mut reader = ByteReader::new(path, bytes);
        reader.read_header(MAP_OBJECT_MESH_TOKEN, MAP_OBJECT_MESH_VERSION)?;

        let flags = reader.read_u32("flags")?;
        let indices: Vec<u16> = reader.read_counted_vec("indices")?;
        let vertices: Vec<MapObjectVertex> = reader.read_counted_vec("vertices")?;

        let set_count = reader.read_count("vertex color sets")?;
        if set_count > MAX_VERTEX_COLOR_SETS {
            return Err(reader.malformed(format!(
                "{set_count} vertex color sets, at most {MAX_VERTEX_COLOR_SETS} supported"
            )));
        }
        let mut vertex_color_sets = Vec::with_capacity(set_count as usize);
        for _ in 0..set_count {
            let colors: Vec<u32> = reader.read_counted_vec("vertex colors")?;
            if colors.len() != vertices.len() {
                return Err(reader.malformed(format!(
                    "vertex color set has {} entries for {} vertices",
                    colors.len(),
                    vertices.len()
                )));
            }
            vertex_color_sets.push(colors);
        }

        let triangle_data_count = reader.read_count("triangle data")?;
        reader.skip(triangle_data_count as usize * TRIANGLE_DATA_STRIDE, "triangle data")?;

        let render_batches: Vec<MapObjectRenderBatch> = reader.read_counted_vec("render batches")?;
        let culling_data: Vec<CullingData> =
            reader.read_pod_vec(render_batches.len() as u32, "culling data")?;

        validate_indices(&reader, &indices, vertices.len())?;
        for (i, batch) in render_batches.iter().enumerate() {
            let end = u64::from(batch.start_index) + u64::from(batch.index_count);
            if end > indices.len() as u64 {
                return Err(reader.malformed(format!(
                    "render batch {i} covers indices up to {end}, mesh has {}",
                    indices.len()
                )));
            }
        }
        validate_culling(&reader, &culling_data)?;

        Ok(Self {
            flags,
            indices,
            vertices,
            vertex_color_sets,
            triangle_data_count,
            render_batches,
            culling_data,
        })
    }

    /// Encodes the mesh file. Triangle data is written as zeroes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_header(MAP_OBJECT_MESH_TOKEN, MAP_OBJECT_MESH_VERSION);
        writer.write_u32(self.flags);
        writer.write_counted_slice(&self.indices);
        writer.write_counted_slice(&self.vertices);
        writer.write_u32(self.vertex_color_sets.len() as u32);
        for set in &self.vertex_color_sets {
            writer.write_counted_slice(set);
        }
        writer.write_u32(self.triangle_data_count);
        writer.write_slice(&vec![0u8; self.triangle_data_count as usize * TRIANGLE_DATA_STRIDE]);
        writer.write_counted_slice(&self.render_batches);
        writer.write_slice(&self.culling_data);
        writer.into_bytes()
    }
}

/// A root plus every mesh it names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapObject {
    /// Root file.
    pub root: MapObjectRoot,
    /// Mesh files in order.
    pub meshes: Vec<MapObjectMesh>,
}

impl MapObject {
    /// Loads a root and its meshes. Fails on the first bad file.
    pub fn load(source: &dyn AssetSource, root_path: &Path) -> AssetResult<Self> {
        let root = MapObjectRoot::parse(root_path, &source.read(root_path)?)?;

        let mut meshes = Vec::new();
        for index in 0..root.mesh_count {
            let path = mesh_path(root_path, index);
            let mesh = MapObjectMesh::parse(&path, &source.read(&path)?)?;

            for batch in &mesh.render_batches {
                if usize::from(batch.material_id) >= root.materials.len() {
                    return Err(AssetError::malformed(&path, format!(
                        "material {} out of range, root has {}",
                        batch.material_id,
                        root.materials.len()
                    )));
                }
            }
            meshes.push(mesh);
        }

        Ok(Self { root, meshes })
    }

    /// Total render batches across meshes.
    #[must_use]
    pub fn render_batch_count(&self) -> usize {
        self.meshes.iter().map(|m| m.render_batches.len()).sum()
    }
}

/// Path of mesh `index` next to `root_path`: `<dir>/<stem>_NNN.mapmesh`.
#[must_use]
pub fn mesh_path(root_path: &Path, index: u32) -> PathBuf {
    let stem = root_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    root_path.with_file_name(format!("{stem}_{index:03}.{MAP_OBJECT_MESH_EXTENSION}"))
}

pub(crate) fn validate_indices(
    reader: &ByteReader<'_>,
    indices: &[u16],
    vertex_count: usize,
) -> AssetResult<()> {
    if let Some(bad) = indices.iter().find(|&&i| usize::from(i) >= vertex_count) {
        return Err(reader.malformed(format!(
            "index {bad} out of range for {vertex_count} vertices"
        )));
    }
    Ok(())
}

pub(crate) fn validate_culling(reader: &ByteReader<'_>, culling: &[CullingData]) -> AssetResult<()> {
    if let Some(i) = culling.iter().position(|c| !c.is_valid()) {
        return Err(reader.malformed(format!("culling data {i} is not a valid box")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VersionSkew;
    use crate::source::MemoryAssetSource;

    fn quad_mesh() -> MapObjectMesh {
        let vertex = |x: f32, z: f32| MapObjectVertex {
            position: [x, 0.0, z],
            normal: [0.0, 1.0, 0.0],
            uv: [x, z],
        };
        MapObjectMesh {
            flags: 0,
            indices: vec![0, 1, 2, 2, 1, 3],
            vertices: vec![vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(0.0, 1.0), vertex(1.0, 1.0)],
            vertex_color_sets: vec![vec![0xff00_00ff; 4]],
            triangle_data_count: 2,
            render_batches: vec![
                MapObjectRenderBatch { start_index: 0, index_count: 3, material_id: 0, _pad: 0 },
                MapObjectRenderBatch { start_index: 3, index_count: 3, material_id: 0, _pad: 0 },
            ],
            culling_data: vec![
                CullingData::from_bounds([0.0, 0.0, 0.0], [1.0, 0.0, 1.0]),
                CullingData::from_bounds([0.0, 0.0, 0.0], [1.0, 0.5, 1.0]),
            ],
        }
    }

    #[test]
    fn test_mesh_path() {
        let path = mesh_path(Path::new("world/wmo/keep.mapobj"), 7);
        assert_eq!(path, PathBuf::from("world/wmo/keep_007.mapmesh"));
    }

    #[test]
    fn test_mesh_reload_preserves_culling_data() {
        let mesh = quad_mesh();
        let parsed = MapObjectMesh::parse(Path::new("m"), &mesh.to_bytes()).unwrap();
        assert_eq!(parsed.culling_data, mesh.culling_data);
        assert_eq!(parsed, mesh);
    }

    #[test]
    fn test_older_mesh_version() {
        let mut bytes = quad_mesh().to_bytes();
        bytes[4..8].copy_from_slice(&(MAP_OBJECT_MESH_VERSION - 1).to_le_bytes());
        let err = MapObjectMesh::parse(Path::new("m"), &bytes).unwrap_err();
        assert!(matches!(
            err,
            AssetError::VersionMismatch { skew: VersionSkew::Older, .. }
        ));
    }

    #[test]
    fn test_truncated_triangle_data() {
        let mut mesh = quad_mesh();
        mesh.render_batches.clear();
        mesh.culling_data.clear();
        let mut bytes = mesh.to_bytes();
        // Drop the render batch count and one byte of triangle data.
        bytes.truncate(bytes.len() - 5);
        let err = MapObjectMesh::parse(Path::new("m"), &bytes).unwrap_err();
        assert!(matches!(err, AssetError::Malformed { .. }));
    }

    #[test]
    fn test_batch_out_of_range() {
        let mut mesh = quad_mesh();
        mesh.render_batches[1].index_count = 4;
        let err = MapObjectMesh::parse(Path::new("m"), &mesh.to_bytes()).unwrap_err();
        assert!(matches!(err, AssetError::Malformed { .. }));
    }

    #[test]
    fn test_color_set_length_checked() {
        let mut mesh = quad_mesh();
        mesh.vertex_color_sets[0].pop();
        assert!(MapObjectMesh::parse(Path::new("m"), &mesh.to_bytes()).is_err());
    }

    #[test]
    fn test_load_root_and_meshes() {
        let root = MapObjectRoot {
            materials: vec![MapObjectMaterial {
                material_type: 1,
                flags: MapObjectMaterial::FLAG_UNLIT,
                transparency_mode: MapObjectMaterial::TRANSPARENCY_ALPHA_TEST,
                texture_ids: [4, MapObjectMaterial::NO_TEXTURE, MapObjectMaterial::NO_TEXTURE],
            }],
            mesh_count: 2,
        };
        let mut source = MemoryAssetSource::new();
        source.insert("keep.mapobj", root.to_bytes());
        source.insert("keep_000.mapmesh", quad_mesh().to_bytes());
        source.insert("keep_001.mapmesh", quad_mesh().to_bytes());

        let object = MapObject::load(&source, Path::new("keep.mapobj")).unwrap();
        assert_eq!(object.meshes.len(), 2);
        assert_eq!(object.render_batch_count(), 4);
        assert!(object.root.materials[0].is_unlit());
        assert!((object.root.materials[0].alpha_test_threshold() - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_mesh_file() {
        let root = MapObjectRoot { materials: vec![MapObjectMaterial::default()], mesh_count: 1 };
        let mut source = MemoryAssetSource::new();
        source.insert("keep.mapobj", root.to_bytes());
        let err = MapObject::load(&source, Path::new("keep.mapobj")).unwrap_err();
        assert_eq!(err, AssetError::NotFound { path: PathBuf::from("keep_000.mapmesh") });
    }

    #[test]
    fn test_huge_mesh_count_without_meshes() {
        let root = MapObjectRoot { materials: vec![MapObjectMaterial::default()], mesh_count: 1 << 24 };
        let mut source = MemoryAssetSource::new();
        source.insert("keep.mapobj", root.to_bytes());
        source.insert("keep_000.mapmesh", quad_mesh().to_bytes());
        let err = MapObject::load(&source, Path::new("keep.mapobj")).unwrap_err();
        assert_eq!(err, AssetError::NotFound { path: PathBuf::from("keep_001.mapmesh") });
    }
}
