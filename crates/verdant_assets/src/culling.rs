//! Model-space bounding volumes stored alongside render batches.

use bytemuck::{Pod, Zeroable};

/// Axis-aligned box plus bounding-sphere radius, in model space.
///
/// Same layout on disk and on the GPU (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct CullingData {
    /// Box minimum corner.
    pub min: [f32; 3],
    /// Bounding-sphere radius around the box centre.
    pub radius: f32,
    /// Box maximum corner.
    pub max: [f32; 3],
    /// Padding for 16-byte alignment.
    pub _pad: u32,
}

impl CullingData {
    /// Builds culling data from box corners. Radius is half the diagonal.
    #[must_use]
    pub fn from_bounds(min: [f32; 3], max: [f32; 3]) -> Self {
        let dx = max[0] - min[0];
        let dy = max[1] - min[1];
        let dz = max[2] - min[2];
        Self {
            min,
            radius: (dx * dx + dy * dy + dz * dz).sqrt() * 0.5,
            max,
            _pad: 0,
        }
    }

    /// Box covering every input. `None` for an empty slice.
    #[must_use]
    pub fn union(parts: &[Self]) -> Option<Self> {
        let first = parts.first()?;
        let mut min = first.min;
        let mut max = first.max;
        for part in &parts[1..] {
            for axis in 0..3 {
                min[axis] = min[axis].min(part.min[axis]);
                max[axis] = max[axis].max(part.max[axis]);
            }
        }
        Some(Self::from_bounds(min, max))
    }

    /// Box centre.
    #[must_use]
    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    /// Box half-extents.
    #[must_use]
    pub fn half_extents(&self) -> [f32; 3] {
        [
            (self.max[0] - self.min[0]) * 0.5,
            (self.max[1] - self.min[1]) * 0.5,
            (self.max[2] - self.min[2]) * 0.5,
        ]
    }

    /// Returns false for NaN corners or an inverted box.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (0..3).all(|axis| self.min[axis] <= self.max[axis]) && self.radius >= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(std::mem::size_of::<CullingData>(), 32);
    }

    #[test]
    fn test_radius_is_half_diagonal() {
        let data = CullingData::from_bounds([0.0, 0.0, 0.0], [2.0, 3.0, 6.0]);
        assert!((data.radius - 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_union() {
        let a = CullingData::from_bounds([-1.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = CullingData::from_bounds([0.0, -2.0, 0.0], [0.5, 0.5, 4.0]);
        let u = CullingData::union(&[a, b]).unwrap();
        assert_eq!(u.min, [-1.0, -2.0, 0.0]);
        assert_eq!(u.max, [1.0, 1.0, 4.0]);
        assert!(CullingData::union(&[]).is_none());
    }

    #[test]
    fn test_invalid_box() {
        let inverted = CullingData::from_bounds([1.0, 0.0, 0.0], [0.0, 1.0, 1.0]);
        assert!(!inverted.is_valid());
        let nan = CullingData::from_bounds([f32::NAN, 0.0, 0.0], [1.0, 1.0, 1.0]);
        assert!(!nan.is_valid());
    }
}
