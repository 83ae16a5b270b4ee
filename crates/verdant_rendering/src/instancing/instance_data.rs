//! GPU-visible per-instance and per-draw records.
//!
//! Layouts match `shaders/instance_culling.wgsl` and
//! `shaders/instance_draw.wgsl` byte for byte.

use bytemuck::{Pod, Zeroable};

/// Bone offset of instances without a skeleton.
pub const NO_BONES: u32 = u32::MAX;

/// Per-instance data (80 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    /// Model-to-world matrix, column-major.
    pub matrix: [[f32; 4]; 4],
    /// First matrix in the bone-deform buffer, or [`NO_BONES`].
    pub bone_deform_offset: u32,
    /// First state in the bone-instance buffer, or [`NO_BONES`].
    pub bone_instance_offset: u32,
    /// Model handle.
    pub model_id: u32,
    /// Padding for 16-byte alignment.
    pub _pad: u32,
}

impl InstanceData {
    /// Creates a static instance.
    #[must_use]
    pub fn new(matrix: [[f32; 4]; 4], model_id: u32) -> Self {
        Self {
            matrix,
            bone_deform_offset: NO_BONES,
            bone_instance_offset: NO_BONES,
            model_id,
            _pad: 0,
        }
    }

    /// Returns true if bone ranges are attached.
    #[must_use]
    pub const fn is_animated(&self) -> bool {
        self.bone_deform_offset != NO_BONES
    }
}

impl Default for InstanceData {
    fn default() -> Self {
        Self::new(glam::Mat4::IDENTITY.to_cols_array_2d(), 0)
    }
}

/// Indexed indirect draw arguments (20 bytes).
///
/// `first_instance` carries the draw call's own index so shaders can find
/// its [`DrawCallData`] after culling has compacted the arguments.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawCall {
    /// Indices to draw.
    pub index_count: u32,
    /// Always 1.
    pub instance_count: u32,
    /// First index.
    pub first_index: u32,
    /// Added to each index.
    pub base_vertex: i32,
    /// Index of this draw call in its list.
    pub first_instance: u32,
}

impl DrawCall {
    /// Triangles drawn.
    #[must_use]
    pub const fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }
}

/// Side record of a draw call (20 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawCallData {
    /// Instance drawn.
    pub instance_id: u32,
    /// Bounding volume tested by the culling pass.
    pub culling_data_id: u32,
    /// First texture unit.
    pub texture_unit_offset: u32,
    /// Number of texture units.
    pub texture_unit_count: u16,
    /// `FLAG_*` bits.
    pub flags: u16,
    /// Colour of the mesh's first vertex, `u32::MAX` for none.
    pub vertex_color_offset: u32,
}

impl DrawCallData {
    /// Back faces are discarded in the fragment stage.
    pub const FLAG_BACKFACE_CULLED: u16 = 1 << 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_sizes() {
        assert_eq!(std::mem::size_of::<InstanceData>(), 80);
        assert_eq!(std::mem::size_of::<DrawCall>(), 20);
        assert_eq!(std::mem::size_of::<DrawCallData>(), 20);
    }

    #[test]
    fn test_static_instance() {
        let instance = InstanceData::default();
        assert!(!instance.is_animated());
        assert_eq!(instance.matrix[3][3], 1.0);
    }
}
