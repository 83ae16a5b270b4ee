//! Culling statistics.
//!
//! Surviving counts come from the GPU one frame late.

use crate::instancing::DrawListKind;

/// Counters of one draw list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawListStats {
    /// Draw calls in the list.
    pub total_draw_calls: u32,
    /// Draw calls that survived culling.
    pub surviving_draw_calls: u32,
    /// Triangles in the list.
    pub total_triangles: u32,
    /// Triangles that survived culling.
    pub surviving_triangles: u32,
    /// Frame the surviving counts were produced in.
    pub readback_frame: Option<u64>,
}

impl DrawListStats {
    /// Fraction of draw calls culled, zero for an empty list.
    #[must_use]
    pub fn culled_ratio(&self) -> f32 {
        if self.total_draw_calls == 0 {
            0.0
        } else {
            1.0 - self.surviving_draw_calls as f32 / self.total_draw_calls as f32
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            total_draw_calls: self.total_draw_calls + other.total_draw_calls,
            surviving_draw_calls: self.surviving_draw_calls + other.surviving_draw_calls,
            total_triangles: self.total_triangles + other.total_triangles,
            surviving_triangles: self.surviving_triangles + other.surviving_triangles,
            readback_frame: match (self.readback_frame, other.readback_frame) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
        }
    }
}

/// Counters of both lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullingStats {
    /// Indexed by [`DrawListKind::index`].
    pub lists: [DrawListStats; 2],
}

impl CullingStats {
    /// Counters of one list.
    #[must_use]
    pub const fn list(&self, kind: DrawListKind) -> DrawListStats {
        self.lists[kind.index()]
    }

    /// Sum of both lists.
    #[must_use]
    pub fn combined(&self) -> DrawListStats {
        self.lists[0].merge(self.lists[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined() {
        let stats = CullingStats {
            lists: [
                DrawListStats {
                    total_draw_calls: 10,
                    surviving_draw_calls: 4,
                    total_triangles: 20,
                    surviving_triangles: 8,
                    readback_frame: Some(3),
                },
                DrawListStats {
                    total_draw_calls: 2,
                    surviving_draw_calls: 2,
                    total_triangles: 2,
                    surviving_triangles: 2,
                    readback_frame: None,
                },
            ],
        };
        let combined = stats.combined();
        assert_eq!(combined.total_draw_calls, 12);
        assert_eq!(combined.surviving_triangles, 10);
        assert_eq!(combined.readback_frame, Some(3));
        assert!((stats.list(DrawListKind::Opaque).culled_ratio() - 0.6).abs() < 1e-6);
    }
}
