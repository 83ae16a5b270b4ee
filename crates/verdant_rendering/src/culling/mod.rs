//! Visibility tests for the cull pass.
//!
//! The compute shader does the per-frame work. This module owns the constant
//! block it reads and a host implementation of the same tests.

mod constants;
mod frustum;
mod occlusion;

pub use constants::{is_draw_visible, CullingConstants, CullingView};
pub use frustum::{Aabb, Frustum, Plane};
pub use occlusion::{DepthPyramid, DepthPyramidInfo};
