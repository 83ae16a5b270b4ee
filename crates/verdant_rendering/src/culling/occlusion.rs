//! Hierarchical depth occlusion.
//!
//! The depth pyramid is a mip chain where each texel holds the *minimum*
//! depth of its footprint. With reversed-Z (near = 1, far = 0) the minimum is
//! the farthest occluder, so a box is hidden only if its nearest point is
//! still farther than everything already drawn over its footprint.
//!
//! The GPU variant of this test lives in `shaders/instance_culling.wgsl`;
//! [`DepthPyramid`] is the host-side mirror used by the headless recorder.

use glam::{Mat4, Vec2, Vec3Swizzles, Vec4Swizzles};

use super::frustum::Aabb;

/// Clip-space `w` below which a corner counts as behind the camera.
const NEAR_W_EPSILON: f32 = 1.0e-5;

/// Dimensions of a depth pyramid bound for culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthPyramidInfo {
    /// Width of mip 0 in texels.
    pub width: u32,
    /// Height of mip 0 in texels.
    pub height: u32,
    /// Number of mip levels.
    pub mip_count: u32,
}

impl DepthPyramidInfo {
    /// Full mip chain for a `width` x `height` base level.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            mip_count: 32 - width.max(height).leading_zeros(),
        }
    }

    /// Size of a mip level, never below one texel.
    #[must_use]
    pub fn mip_size(&self, mip: u32) -> (u32, u32) {
        ((self.width >> mip).max(1), (self.height >> mip).max(1))
    }
}

/// True when a bound pyramid with `bound_levels` mips can answer lookups
/// planned for `expected_levels`. The one-level fallback never can, so the
/// occlusion test is skipped rather than reading missing mips.
#[must_use]
pub const fn pyramid_covers(expected_levels: u32, bound_levels: u32) -> bool {
    expected_levels > 0 && bound_levels >= expected_levels
}

/// Host-side min-depth mip chain.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthPyramid {
    info: DepthPyramidInfo,
    levels: Vec<Vec<f32>>,
}

impl DepthPyramid {
    /// Builds the chain from a row-major depth buffer. Missing texels read as
    /// far (0.0).
    #[must_use]
    pub fn from_depth(width: u32, height: u32, depth: &[f32]) -> Self {
        let info = DepthPyramidInfo::new(width, height);
        let mut base = vec![0.0; (info.width * info.height) as usize];
        for (dst, src) in base.iter_mut().zip(depth) {
            *dst = *src;
        }

        let mut levels = Vec::with_capacity(info.mip_count as usize);
        levels.push(base);
        for mip in 1..info.mip_count {
            let (pw, ph) = info.mip_size(mip - 1);
            let (w, h) = info.mip_size(mip);
            let prev = &levels[mip as usize - 1];
            let mut level = Vec::with_capacity((w * h) as usize);
            for y in 0..h {
                // Footprint covers odd trailing rows/columns of the parent.
                let (y0, y1) = (y * ph / h, ((y + 1) * ph).div_ceil(h));
                for x in 0..w {
                    let (x0, x1) = (x * pw / w, ((x + 1) * pw).div_ceil(w));
                    let mut min = f32::INFINITY;
                    for py in y0..y1 {
                        for px in x0..x1 {
                            min = min.min(prev[(py * pw + px) as usize]);
                        }
                    }
                    level.push(min);
                }
            }
            levels.push(level);
        }
        Self { info, levels }
    }

    /// Pyramid dimensions.
    #[must_use]
    pub const fn info(&self) -> DepthPyramidInfo {
        self.info
    }

    /// Texel of a mip level, clamped to the level's edge.
    #[must_use]
    pub fn texel(&self, mip: u32, x: u32, y: u32) -> f32 {
        let mip = mip.min(self.info.mip_count - 1);
        let (w, h) = self.info.mip_size(mip);
        let (x, y) = (x.min(w - 1), y.min(h - 1));
        self.levels[mip as usize][(y * w + x) as usize]
    }

    /// Returns true unless the world-space box is hidden behind the pyramid.
    #[must_use]
    pub fn is_visible(&self, view_projection: &Mat4, world: &Aabb) -> bool {
        let Some(footprint) = ScreenFootprint::project(view_projection, world) else {
            return true;
        };
        let (mip, texels) = footprint.texels(self.info);
        let occluder = texels
            .iter()
            .map(|&(x, y)| self.texel(mip, x, y))
            .fold(f32::INFINITY, f32::min);
        footprint.nearest_depth >= occluder
    }
}

/// Screen-space rectangle and nearest depth of a projected box.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScreenFootprint {
    /// Top-left in UV space.
    uv_min: Vec2,
    /// Bottom-right in UV space.
    uv_max: Vec2,
    /// Largest NDC depth of any corner.
    nearest_depth: f32,
}

impl ScreenFootprint {
    /// `None` when any corner is behind the camera.
    fn project(view_projection: &Mat4, world: &Aabb) -> Option<Self> {
        let mut ndc_min = Vec2::splat(f32::INFINITY);
        let mut ndc_max = Vec2::splat(f32::NEG_INFINITY);
        let mut nearest_depth = f32::NEG_INFINITY;
        for corner in world.corners() {
            let clip = *view_projection * corner.extend(1.0);
            if clip.w <= NEAR_W_EPSILON {
                return None;
            }
            let ndc = clip.xyz() / clip.w;
            ndc_min = ndc_min.min(ndc.xy());
            ndc_max = ndc_max.max(ndc.xy());
            nearest_depth = nearest_depth.max(ndc.z);
        }
        // NDC y points up, texture v points down.
        let uv_min = Vec2::new(ndc_min.x * 0.5 + 0.5, 0.5 - ndc_max.y * 0.5);
        let uv_max = Vec2::new(ndc_max.x * 0.5 + 0.5, 0.5 - ndc_min.y * 0.5);
        Some(Self {
            uv_min: uv_min.clamp(Vec2::ZERO, Vec2::ONE),
            uv_max: uv_max.clamp(Vec2::ZERO, Vec2::ONE),
            nearest_depth,
        })
    }

    /// Mip level where the footprint spans at most two texels per axis, and
    /// the four texels covering it.
    fn texels(&self, info: DepthPyramidInfo) -> (u32, [(u32, u32); 4]) {
        let size = Vec2::new(info.width as f32, info.height as f32);
        let extent = (self.uv_max - self.uv_min) * size;
        let mip = extent.max_element().max(1.0).log2().ceil() as u32;
        let mip = mip.min(info.mip_count - 1);
        let (w, h) = info.mip_size(mip);
        let level = Vec2::new(w as f32, h as f32);
        let lo = (self.uv_min * level).floor();
        let hi = (self.uv_max * level).floor();
        let (x0, y0) = (lo.x as u32, lo.y as u32);
        let (x1, y1) = (hi.x as u32, hi.y as u32);
        (mip, [(x0, y0), (x1, y0), (x0, y1), (x1, y1)])
    }
}
