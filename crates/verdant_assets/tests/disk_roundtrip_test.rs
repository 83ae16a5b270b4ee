//! # Disk Round-Trip Test
//!
//! Writes model files into a scratch directory and reads them back through
//! the filesystem source, the way the renderer sees them at runtime.

use std::path::{Path, PathBuf};

use verdant_assets::{
    AssetError, ComplexModel, ComplexRenderBatch, ComplexTextureUnit, ComplexVertex, CullingData,
    FsAssetSource, MapObject, MapObjectMaterial, MapObjectMesh, MapObjectRenderBatch,
    MapObjectRoot, MapObjectVertex, VersionSkew,
};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("verdant-assets-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn box_mesh(extent: f32) -> MapObjectMesh {
    let corners = [
        [0.0, 0.0, 0.0],
        [extent, 0.0, 0.0],
        [0.0, extent, 0.0],
        [0.0, 0.0, extent],
    ];
    MapObjectMesh {
        flags: 0,
        indices: vec![0, 1, 2, 0, 2, 3, 0, 3, 1],
        vertices: corners
            .iter()
            .map(|&position| MapObjectVertex { position, normal: [0.0, 1.0, 0.0], uv: [0.0, 0.0] })
            .collect(),
        vertex_color_sets: Vec::new(),
        triangle_data_count: 3,
        render_batches: vec![
            MapObjectRenderBatch { start_index: 0, index_count: 6, material_id: 0, _pad: 0 },
            MapObjectRenderBatch { start_index: 6, index_count: 3, material_id: 1, _pad: 0 },
        ],
        culling_data: vec![
            CullingData::from_bounds([0.0, 0.0, 0.0], [extent, extent, extent]),
            CullingData::from_bounds([0.0, 0.0, 0.0], [extent, 0.0, extent]),
        ],
    }
}

#[test]
fn test_map_object_from_disk() {
    let dir = scratch_dir("mapobj");
    let root = MapObjectRoot {
        materials: vec![MapObjectMaterial::default(), MapObjectMaterial::default()],
        mesh_count: 1,
    };
    std::fs::write(dir.join("tower.mapobj"), root.to_bytes()).unwrap();
    std::fs::write(dir.join("tower_000.mapmesh"), box_mesh(4.0).to_bytes()).unwrap();

    let source = FsAssetSource::new(&dir);
    let object = MapObject::load(&source, Path::new("tower.mapobj")).unwrap();

    assert_eq!(object.render_batch_count(), 2);
    // Bounding volumes survive the trip bit for bit.
    assert_eq!(object.meshes[0].culling_data, box_mesh(4.0).culling_data);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_material_out_of_range_is_malformed() {
    let dir = scratch_dir("material");
    let root = MapObjectRoot { materials: vec![MapObjectMaterial::default()], mesh_count: 1 };
    std::fs::write(dir.join("hut.mapobj"), root.to_bytes()).unwrap();
    std::fs::write(dir.join("hut_000.mapmesh"), box_mesh(1.0).to_bytes()).unwrap();

    let source = FsAssetSource::new(&dir);
    let err = MapObject::load(&source, Path::new("hut.mapobj")).unwrap_err();
    assert!(matches!(err, AssetError::Malformed { .. }));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_outdated_complex_model_on_disk() {
    let dir = scratch_dir("cmodel");
    let model = ComplexModel {
        vertices: vec![ComplexVertex::default(); 3],
        indices: vec![0, 1, 2],
        texture_units: vec![ComplexTextureUnit::default()],
        render_batches: vec![ComplexRenderBatch {
            index_start: 0,
            index_count: 3,
            texture_unit_offset: 0,
            texture_unit_count: 1,
            flags: 0,
        }],
        culling_data: vec![CullingData::from_bounds([0.0; 3], [1.0; 3])],
        ..ComplexModel::default()
    };
    let mut bytes = model.to_bytes();
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    bytes[4..8].copy_from_slice(&(version - 1).to_le_bytes());
    std::fs::write(dir.join("wolf.cmodel"), bytes).unwrap();

    let source = FsAssetSource::new(&dir);
    let err = ComplexModel::load(&source, Path::new("wolf.cmodel")).unwrap_err();
    match err {
        AssetError::VersionMismatch { found, expected, skew, .. } => {
            assert_eq!(found + 1, expected);
            assert_eq!(skew, VersionSkew::Older);
        }
        other => panic!("unexpected error: {other}"),
    }

    std::fs::remove_dir_all(&dir).ok();
}
