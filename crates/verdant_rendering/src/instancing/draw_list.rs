//! Opaque and transparent draw lists.

use super::instance_data::{DrawCall, DrawCallData};

/// Which list a render batch is drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DrawListKind {
    /// Depth-writing geometry.
    Opaque,
    /// Blended geometry, drawn after opaque.
    Transparent,
}

impl DrawListKind {
    /// Both lists in draw order.
    pub const ALL: [Self; 2] = [Self::Opaque, Self::Transparent];

    /// Dense index for per-list arrays.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Opaque => 0,
            Self::Transparent => 1,
        }
    }

    /// Label used for passes and GPU resources.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Opaque => "opaque",
            Self::Transparent => "transparent",
        }
    }
}

/// Draw arguments plus side records, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct DrawList {
    /// Indirect arguments, uploaded as-is.
    draw_calls: Vec<DrawCall>,
    /// Side record per draw call.
    draw_call_data: Vec<DrawCallData>,
    /// Sum of `index_count / 3`.
    total_triangles: u32,
}

impl DrawList {
    /// Appends a draw call. `call.first_instance` is overwritten with its index.
    pub fn push(&mut self, mut call: DrawCall, data: DrawCallData) -> u32 {
        let index = self.draw_calls.len() as u32;
        call.first_instance = index;
        self.total_triangles += call.triangle_count();
        self.draw_calls.push(call);
        self.draw_call_data.push(data);
        index
    }

    /// Number of draw calls.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.draw_calls.len() as u32
    }

    /// Returns true without draw calls.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.draw_calls.is_empty()
    }

    /// Triangles drawn if nothing is culled.
    #[must_use]
    pub const fn total_triangles(&self) -> u32 {
        self.total_triangles
    }

    /// Indirect arguments.
    #[must_use]
    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    /// Side records.
    #[must_use]
    pub fn draw_call_data(&self) -> &[DrawCallData] {
        &self.draw_call_data
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.draw_calls.clear();
        self.draw_call_data.clear();
        self.total_triangles = 0;
    }
}
