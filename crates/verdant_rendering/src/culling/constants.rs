//! Per-frame culling constants.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use verdant_assets::CullingData;

use super::frustum::{Aabb, Frustum};
use super::occlusion::{pyramid_covers, DepthPyramid, DepthPyramidInfo};
use crate::instancing::InstanceData;

/// Camera state a frame is culled against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullingView {
    /// Projection times view, wgpu clip conventions.
    pub view_projection: Mat4,
    /// World-space eye position.
    pub camera_position: Vec3,
    /// Depth pyramid bound this frame, if the caller built one.
    pub depth_pyramid: Option<DepthPyramidInfo>,
}

impl CullingView {
    /// View without occlusion data.
    #[must_use]
    pub fn new(view_projection: Mat4, camera_position: Vec3) -> Self {
        Self {
            view_projection,
            camera_position,
            depth_pyramid: None,
        }
    }

    /// Attaches the depth pyramid for occlusion culling.
    #[must_use]
    pub fn with_depth_pyramid(mut self, pyramid: DepthPyramidInfo) -> Self {
        self.depth_pyramid = Some(pyramid);
        self
    }
}

/// Uniform block of the culling shader (192 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct CullingConstants {
    /// Six normalized planes.
    pub frustum_planes: [[f32; 4]; 6],
    /// For projecting boxes onto the depth pyramid.
    pub view_projection: [[f32; 4]; 4],
    /// World-space eye position.
    pub camera_position: [f32; 3],
    /// Draw calls in the list being culled.
    pub max_draw_count: u32,
    /// Mip 0 size of the depth pyramid.
    pub pyramid_size: [f32; 2],
    /// Non-zero when the pyramid test runs.
    pub occlusion_enabled: u32,
    /// Mip levels of the depth pyramid.
    pub pyramid_mip_count: u32,
}

impl CullingConstants {
    /// Builds constants for one draw list.
    #[must_use]
    pub fn new(view: &CullingView, max_draw_count: u32, occlusion_enabled: bool) -> Self {
        let frustum = Frustum::from_view_projection(&view.view_projection);
        let pyramid = view.depth_pyramid.filter(|_| occlusion_enabled);
        Self {
            frustum_planes: frustum.as_arrays(),
            view_projection: view.view_projection.to_cols_array_2d(),
            camera_position: view.camera_position.to_array(),
            max_draw_count,
            pyramid_size: pyramid.map_or([0.0; 2], |p| [p.width as f32, p.height as f32]),
            occlusion_enabled: u32::from(pyramid.is_some()),
            pyramid_mip_count: pyramid.map_or(0, |p| p.mip_count),
        }
    }

    /// Frustum stored in the block.
    #[must_use]
    pub fn frustum(&self) -> Frustum {
        Frustum::from_arrays(&self.frustum_planes)
    }
}

/// Host reference of the culling shader's visibility test.
///
/// Sphere first, then box, then the depth pyramid when occlusion is on and the
/// bound pyramid has every mip the constants expect.
#[must_use]
pub fn is_draw_visible(
    constants: &CullingConstants,
    instance: &InstanceData,
    culling: &CullingData,
    pyramid: Option<&DepthPyramid>,
) -> bool {
    let matrix = Mat4::from_cols_array_2d(&instance.matrix);
    let frustum = constants.frustum();

    let max_scale = matrix
        .x_axis
        .truncate()
        .length()
        .max(matrix.y_axis.truncate().length())
        .max(matrix.z_axis.truncate().length());
    let center = matrix.transform_point3(Vec3::from_array(culling.center()));
    if !frustum.test_sphere(center, culling.radius * max_scale) {
        return false;
    }

    let world = Aabb::from_culling(culling).transformed(&matrix);
    if !frustum.test_aabb(&world) {
        return false;
    }

    match pyramid {
        Some(pyramid)
            if constants.occlusion_enabled != 0
                && pyramid_covers(constants.pyramid_mip_count, pyramid.info().mip_count) =>
        {
            pyramid.is_visible(&Mat4::from_cols_array_2d(&constants.view_projection), &world)
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> CullingView {
        let proj = Mat4::perspective_infinite_reverse_rh(90f32.to_radians(), 1.0, 0.1);
        let look = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        CullingView::new(proj * look, Vec3::ZERO)
    }

    fn unit_box() -> CullingData {
        CullingData::from_bounds([-0.5; 3], [0.5; 3])
    }

    fn placed_at(position: Vec3) -> InstanceData {
        InstanceData::new(Mat4::from_translation(position).to_cols_array_2d(), 0)
    }

    #[test]
    fn test_layout() {
        assert_eq!(std::mem::size_of::<CullingConstants>(), 192);
    }

    #[test]
    fn test_occlusion_needs_pyramid() {
        let constants = CullingConstants::new(&view(), 10, true);
        assert_eq!(constants.occlusion_enabled, 0);

        let with = view().with_depth_pyramid(DepthPyramidInfo::new(256, 128));
        let constants = CullingConstants::new(&with, 10, true);
        assert_eq!(constants.occlusion_enabled, 1);
        assert_eq!(constants.pyramid_size, [256.0, 128.0]);
        assert_eq!(constants.pyramid_mip_count, 9);

        let constants = CullingConstants::new(&with, 10, false);
        assert_eq!(constants.occlusion_enabled, 0);
    }

    #[test]
    fn test_short_pyramid_skips_occlusion() {
        let info = DepthPyramidInfo::new(256, 128);
        let constants = CullingConstants::new(&view().with_depth_pyramid(info), 1, true);
        let fallback = DepthPyramid::from_depth(1, 1, &[1.0]);
        let instance = placed_at(Vec3::new(0.0, 0.0, -10.0));
        assert!(is_draw_visible(&constants, &instance, &unit_box(), Some(&fallback)));
    }

    #[test]
    fn test_instance_transform_is_applied() {
        let constants = CullingConstants::new(&view(), 1, false);
        assert!(is_draw_visible(&constants, &placed_at(Vec3::new(0.0, 0.0, -10.0)), &unit_box(), None));
        assert!(!is_draw_visible(&constants, &placed_at(Vec3::new(0.0, 0.0, 10.0)), &unit_box(), None));
    }

    #[test]
    fn test_pyramid_occludes() {
        let info = DepthPyramidInfo::new(8, 8);
        let constants = CullingConstants::new(&view().with_depth_pyramid(info), 1, true);
        // Everything drawn at depth 1.0 (the near plane) hides the world.
        let wall = DepthPyramid::from_depth(8, 8, &[1.0; 64]);
        let instance = placed_at(Vec3::new(0.0, 0.0, -10.0));
        assert!(!is_draw_visible(&constants, &instance, &unit_box(), Some(&wall)));
        assert!(is_draw_visible(&constants, &instance, &unit_box(), None));
    }
}
