//! Fixture assets for tests, benches and tools.
//!
//! Every render batch is a small quad or triangle with a known bounding
//! box, so tests can reason about offsets and visibility.

use std::path::{Path, PathBuf};

use verdant_assets::{
    mesh_path, ComplexBone, ComplexModel, ComplexRenderBatch, ComplexSequence, ComplexTextureUnit,
    ComplexVertex, CullingData, MapObjectMaterial, MapObjectMesh, MapObjectRenderBatch,
    MapObjectRoot, MapObjectVertex, MemoryAssetSource, COMPLEX_MODEL_EXTENSION,
    MAP_OBJECT_ROOT_EXTENSION,
};

/// Root and mesh files of a map object named `name`.
///
/// Mesh `m` holds `batches_per_mesh` unit quads; batch `b` spans
/// `[b, 0, 0]..[b + 1, 1, 1]` and draws two triangles. The first mesh
/// carries one vertex colour set.
#[must_use]
pub fn map_object_files(name: &str, mesh_count: u32, batches_per_mesh: u32) -> Vec<(PathBuf, Vec<u8>)> {
    let root_path = PathBuf::from(format!("{name}.{MAP_OBJECT_ROOT_EXTENSION}"));
    let root = MapObjectRoot {
        materials: vec![
            MapObjectMaterial {
                texture_ids: [1, MapObjectMaterial::NO_TEXTURE, MapObjectMaterial::NO_TEXTURE],
                ..MapObjectMaterial::default()
            },
            MapObjectMaterial {
                transparency_mode: MapObjectMaterial::TRANSPARENCY_ALPHA_TEST,
                texture_ids: [2, 3, MapObjectMaterial::NO_TEXTURE],
                ..MapObjectMaterial::default()
            },
        ],
        mesh_count,
    };

    let mut files = vec![(root_path.clone(), root.to_bytes())];
    for m in 0..mesh_count {
        files.push((mesh_path(&root_path, m), quad_mesh(batches_per_mesh, m == 0).to_bytes()));
    }
    files
}

fn quad_mesh(batch_count: u32, with_colors: bool) -> MapObjectMesh {
    let mut mesh = MapObjectMesh {
        triangle_data_count: batch_count * 2,
        ..MapObjectMesh::default()
    };
    for b in 0..batch_count {
        let x = b as f32;
        let base = mesh.vertices.len() as u16;
        for (position, uv) in [
            ([x, 0.0, 0.0], [0.0, 0.0]),
            ([x + 1.0, 0.0, 0.0], [1.0, 0.0]),
            ([x + 1.0, 1.0, 1.0], [1.0, 1.0]),
            ([x, 1.0, 1.0], [0.0, 1.0]),
        ] {
            mesh.vertices.push(MapObjectVertex {
                position,
                normal: [0.0, -0.707, 0.707],
                uv,
            });
        }
        let start_index = mesh.indices.len() as u32;
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        mesh.render_batches.push(MapObjectRenderBatch {
            start_index,
            index_count: 6,
            material_id: (b % 2) as u16,
            _pad: 0,
        });
        mesh.culling_data
            .push(CullingData::from_bounds([x, 0.0, 0.0], [x + 1.0, 1.0, 1.0]));
    }
    if with_colors {
        mesh.vertex_color_sets
            .push(vec![0xff80_8080; mesh.vertices.len()]);
    }
    mesh
}

/// Encoded complex model.
///
/// Two opaque batches (the first backface culled) and `transparent_batches`
/// transparent ones, one triangle each; batch `i` spans
/// `[i, 0, 0]..[i + 1, 1, 0]`. Sequence `s` lasts `(s + 1)` seconds with
/// keyframes at 0, 1/3, 2/3 and 3/3 of its length. Every vertex is weighted
/// to bone 0.
#[must_use]
pub fn complex_model_bytes(bone_count: u32, sequence_count: u32, transparent_batches: u32) -> Vec<u8> {
    let batch_count = 2 + transparent_batches;
    let mut model = ComplexModel::default();

    let weights = if bone_count > 0 { [255, 0, 0, 0] } else { [0; 4] };
    for i in 0..batch_count {
        let x = i as f32;
        let base = model.vertices.len() as u16;
        for position in [[x, 0.0, 0.0], [x + 1.0, 0.0, 0.0], [x, 1.0, 0.0]] {
            model.vertices.push(ComplexVertex {
                position,
                normal: [0.0, 0.0, 1.0],
                uv: [position[0] - x, position[1]],
                bone_indices: [0; 4],
                bone_weights: weights,
            });
        }
        model.indices.extend_from_slice(&[base, base + 1, base + 2]);
        model.texture_units.push(ComplexTextureUnit {
            flags: 0,
            material_type: 0,
            texture_ids: [10 + i, u32::MAX],
        });

        let flags = match i {
            0 => ComplexRenderBatch::FLAG_BACKFACE_CULLED,
            1 => 0,
            _ => ComplexRenderBatch::FLAG_TRANSPARENT,
        };
        model.render_batches.push(ComplexRenderBatch {
            index_start: i * 3,
            index_count: 3,
            texture_unit_offset: i as u16,
            texture_unit_count: 1,
            flags,
        });
        model
            .culling_data
            .push(CullingData::from_bounds([x, 0.0, 0.0], [x + 1.0, 1.0, 0.0]));
    }

    model.bones = (0..bone_count)
        .map(|b| ComplexBone {
            parent: b as i16 - 1,
            flags: 0,
            pivot: [0.0, b as f32, 0.0],
        })
        .collect();
    model.sequences = (0..sequence_count)
        .map(|s| ComplexSequence {
            id: s as u16,
            sub_id: 0,
            duration_ms: (s + 1) * 1000,
        })
        .collect();
    for _ in 0..bone_count {
        for sequence in &model.sequences {
            let d = sequence.duration_ms;
            model.tracks.push(vec![0, d / 3, 2 * d / 3, d]);
        }
    }

    model.to_bytes()
}

/// In-memory asset directory.
#[derive(Debug, Default)]
pub struct TestAssets {
    /// Source handed to the renderer.
    pub source: MemoryAssetSource,
}

impl TestAssets {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a map object, see [`map_object_files`].
    pub fn add_map_object(&mut self, name: &str, mesh_count: u32, batches_per_mesh: u32) {
        for (path, bytes) in map_object_files(name, mesh_count, batches_per_mesh) {
            self.source.insert(path, bytes);
        }
    }

    /// Adds a map object whose root was written by the previous format
    /// version.
    pub fn add_outdated_map_object(&mut self, name: &str) {
        for (path, mut bytes) in map_object_files(name, 1, 1) {
            if path.extension().is_some_and(|e| e == MAP_OBJECT_ROOT_EXTENSION) {
                let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
                bytes[4..8].copy_from_slice(&(version - 1).to_le_bytes());
            }
            self.source.insert(path, bytes);
        }
    }

    /// Adds a complex model with one transparent batch, see
    /// [`complex_model_bytes`].
    pub fn add_complex(&mut self, name: &str, bone_count: u32, sequence_count: u32) {
        self.source.insert(
            format!("{name}.{COMPLEX_MODEL_EXTENSION}"),
            complex_model_bytes(bone_count, sequence_count, 1),
        );
    }

    /// Adds arbitrary bytes.
    pub fn add_raw(&mut self, path: impl AsRef<Path>, bytes: Vec<u8>) {
        self.source.insert(path.as_ref().to_path_buf(), bytes);
    }
}
