//! Frustum culling for view-dependent rendering.
//!
//! Extracts frustum planes from a wgpu-convention view-projection matrix
//! (clip depth in `[0, 1]`) and tests bounding volumes against them.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use verdant_assets::CullingData;

/// A plane in 3D space (Ax + By + Cz + D = 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Plane {
    /// Normal X component.
    pub a: f32,
    /// Normal Y component.
    pub b: f32,
    /// Normal Z component.
    pub c: f32,
    /// Distance from origin.
    pub d: f32,
}

impl Plane {
    /// Creates a plane from a clip-space row combination.
    #[must_use]
    pub fn from_vec4(v: Vec4) -> Self {
        Self { a: v.x, b: v.y, c: v.z, d: v.w }
    }

    /// Scales the plane to a unit normal. Degenerate planes are returned as-is.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = self.normal().length();
        if len > 0.0 {
            Self {
                a: self.a / len,
                b: self.b / len,
                c: self.c / len,
                d: self.d / len,
            }
        } else {
            self
        }
    }

    /// Plane normal.
    #[inline]
    #[must_use]
    pub fn normal(&self) -> Vec3 {
        Vec3::new(self.a, self.b, self.c)
    }

    /// Signed distance from a point to the plane.
    #[inline]
    #[must_use]
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal().dot(point) + self.d
    }

    /// Converts to array format.
    #[must_use]
    pub const fn as_array(&self) -> [f32; 4] {
        [self.a, self.b, self.c, self.d]
    }
}

/// View frustum for culling.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far planes.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Left plane index.
    pub const LEFT: usize = 0;
    /// Right plane index.
    pub const RIGHT: usize = 1;
    /// Bottom plane index.
    pub const BOTTOM: usize = 2;
    /// Top plane index.
    pub const TOP: usize = 3;
    /// `z >= 0` plane. The far plane under reversed-Z.
    pub const NEAR: usize = 4;
    /// `z <= w` plane. The near plane under reversed-Z.
    pub const FAR: usize = 5;

    /// Extracts frustum planes from a view-projection matrix.
    ///
    /// With an infinite reversed-Z projection the far plane degenerates to
    /// `(0, 0, 0, near)`, which never rejects anything.
    #[must_use]
    pub fn from_view_projection(m: &Mat4) -> Self {
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));
        let mut planes = [Plane::default(); 6];
        planes[Self::LEFT] = Plane::from_vec4(r3 + r0).normalized();
        planes[Self::RIGHT] = Plane::from_vec4(r3 - r0).normalized();
        planes[Self::BOTTOM] = Plane::from_vec4(r3 + r1).normalized();
        planes[Self::TOP] = Plane::from_vec4(r3 - r1).normalized();
        planes[Self::NEAR] = Plane::from_vec4(r2).normalized();
        planes[Self::FAR] = Plane::from_vec4(r3 - r2).normalized();
        Self { planes }
    }

    /// Rebuilds a frustum from uploaded plane arrays.
    #[must_use]
    pub fn from_arrays(planes: &[[f32; 4]; 6]) -> Self {
        Self {
            planes: planes.map(|p| Plane::from_vec4(Vec4::from_array(p))),
        }
    }

    /// Converts planes to array format for GPU upload.
    #[must_use]
    pub fn as_arrays(&self) -> [[f32; 4]; 6] {
        self.planes.map(|p| p.as_array())
    }

    /// Tests if a sphere intersects the frustum.
    #[must_use]
    pub fn test_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes.iter().all(|plane| plane.distance(center) >= -radius)
    }

    /// Tests if an AABB intersects the frustum.
    #[must_use]
    pub fn test_aabb(&self, aabb: &Aabb) -> bool {
        let center = aabb.center();
        let half = aabb.half_extents();
        self.planes.iter().all(|plane| {
            let r = half.dot(plane.normal().abs());
            plane.distance(center) >= -r
        })
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Creates a new AABB.
    #[must_use]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box part of a model-space culling volume.
    #[must_use]
    pub fn from_culling(data: &CullingData) -> Self {
        Self {
            min: Vec3::from_array(data.min),
            max: Vec3::from_array(data.max),
        }
    }

    /// Returns the center of the AABB.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the half-extents of the AABB.
    #[must_use]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Box enclosing this box after an affine transform.
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let center = matrix.transform_point3(self.center());
        let half = self.half_extents();
        let extent = matrix.x_axis.truncate().abs() * half.x
            + matrix.y_axis.truncate().abs() * half.y
            + matrix.z_axis.truncate().abs() * half.z;
        Self {
            min: center - extent,
            max: center + extent,
        }
    }

    /// The eight corners.
    #[must_use]
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Mat4 {
        // Looking down -Z from the origin, reversed infinite Z.
        let proj = Mat4::perspective_infinite_reverse_rh(90f32.to_radians(), 1.0, 0.1);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        proj * view
    }

    #[test]
    fn test_plane_normalization() {
        let plane = Plane { a: 3.0, b: 4.0, c: 0.0, d: 10.0 }.normalized();
        assert!((plane.a - 0.6).abs() < 0.001);
        assert!((plane.b - 0.8).abs() < 0.001);
        assert!((plane.d - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_aabb_in_front_and_behind() {
        let frustum = Frustum::from_view_projection(&camera());
        let ahead = Aabb::new(Vec3::new(-1.0, -1.0, -11.0), Vec3::new(1.0, 1.0, -9.0));
        let behind = Aabb::new(Vec3::new(-1.0, -1.0, 9.0), Vec3::new(1.0, 1.0, 11.0));
        let far_left = Aabb::new(Vec3::new(-100.0, -1.0, -6.0), Vec3::new(-90.0, 1.0, -5.0));
        assert!(frustum.test_aabb(&ahead));
        assert!(!frustum.test_aabb(&behind));
        assert!(!frustum.test_aabb(&far_left));
    }

    #[test]
    fn test_infinite_far_never_rejects() {
        let frustum = Frustum::from_view_projection(&camera());
        let distant = Aabb::new(Vec3::new(-1.0, -1.0, -1.0e6), Vec3::new(1.0, 1.0, -0.9e6));
        assert!(frustum.test_aabb(&distant));
    }

    #[test]
    fn test_sphere() {
        let frustum = Frustum::from_view_projection(&camera());
        assert!(frustum.test_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));
        assert!(!frustum.test_sphere(Vec3::new(0.0, 0.0, 5.0), 1.0));
    }

    #[test]
    fn test_plane_arrays_roundtrip() {
        let frustum = Frustum::from_view_projection(&camera());
        assert_eq!(Frustum::from_arrays(&frustum.as_arrays()), frustum);
    }

    #[test]
    fn test_transformed_aabb() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let matrix = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0))
            * Mat4::from_rotation_y(45f32.to_radians());
        let moved = aabb.transformed(&matrix);
        assert!((moved.center() - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-5);
        assert!((moved.half_extents().x - 2f32.sqrt()).abs() < 1e-5);
        assert!((moved.half_extents().y - 1.0).abs() < 1e-5);
    }
}
