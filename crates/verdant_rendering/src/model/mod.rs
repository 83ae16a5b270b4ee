//! # Geometry/Material Store
//!
//! Flattened geometry shared by every loaded model of one kind.
//!
//! ```text
//!  vertices:  [ model A ........ | model B .... | model C ...... ]
//!  indices:   [ A mesh0 | A mesh1 | B          | C             ]
//!  textures:  [ A units | B units | C units ]
//!  culling:   [ A batch0 | A batch1 | A aggregate | B ... ]
//!
//!  append-only; a model is never unloaded before a full clear
//! ```

mod store;

use bytemuck::{Pod, Zeroable};
use verdant_assets::{COMPLEX_MODEL_EXTENSION, MAP_OBJECT_ROOT_EXTENSION};

pub use store::{LoadedModel, ModelStore, RenderBatch, Skeleton};

/// Model family a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Static world geometry (root + mesh files).
    MapObject,
    /// Skinned models with skeleton and sequences.
    ComplexModel,
}

impl ModelKind {
    /// File extension of the model's entry file.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::MapObject => MAP_OBJECT_ROOT_EXTENSION,
            Self::ComplexModel => COMPLEX_MODEL_EXTENSION,
        }
    }

    /// Label prefix for GPU resources.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MapObject => "map_object",
            Self::ComplexModel => "complex_model",
        }
    }
}

/// Index of a loaded model. Equal handles mean the same asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelHandle(pub u32);

impl ModelHandle {
    /// Raw index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Vertex layout shared by both model kinds (40 bytes).
///
/// Static models leave the bone fields zero.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ModelVertex {
    /// Model-space position.
    pub position: [f32; 3],
    /// Model-space normal.
    pub normal: [f32; 3],
    /// Texture coordinates.
    pub uv: [f32; 2],
    /// Four bone indices, one per byte.
    pub bone_indices: u32,
    /// Four bone weights, one per byte, summing to 255.
    pub bone_weights: u32,
}

/// Material slot referenced by draw calls (16 bytes).
///
/// Flag bits follow the model kind's file format.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TextureUnit {
    /// Material flags.
    pub flags: u16,
    /// Shader permutation.
    pub material_type: u16,
    /// Texture ids, `u32::MAX` when unused.
    pub texture_ids: [u32; 3],
}

impl TextureUnit {
    /// Map object material ignores lighting.
    pub const FLAG_UNLIT: u16 = 1 << 0;
    /// Map object material is alpha tested.
    pub const FLAG_ALPHA_TEST: u16 = 1 << 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_layouts() {
        assert_eq!(std::mem::size_of::<ModelVertex>(), 40);
        assert_eq!(std::mem::size_of::<TextureUnit>(), 16);
    }

    #[test]
    fn test_extensions() {
        assert_eq!(ModelKind::MapObject.extension(), "mapobj");
        assert_eq!(ModelKind::ComplexModel.extension(), "cmodel");
    }
}
