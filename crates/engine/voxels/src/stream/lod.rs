/// Default distance, in unit-cube lengths, at which the root's children stop
/// being expanded. Each deeper level halves it.
pub const DEFAULT_LOD_BASE_DISTANCE: f32 = 4.0;

/// Viewer distance cutoffs per render level.
///
/// A node at depth `d` has its children streamed only while the viewer is
/// closer than `boundary_distance_for_render_level(d + 1)` to its center.
#[derive(Debug, Clone, PartialEq)]
pub enum LodTable {
    /// `base_distance / 2^level`
    Geometric { base_distance: f32 },
    /// Explicit cutoffs; levels past the end are never expanded.
    Table(Vec<f32>),
    /// Every level expands regardless of distance.
    Unbounded,
}

impl Default for LodTable {
    fn default() -> Self {
        Self::geometric(DEFAULT_LOD_BASE_DISTANCE)
    }
}

impl LodTable {
    pub fn geometric(base_distance: f32) -> Self {
        Self::Geometric { base_distance }
    }

    pub fn unbounded() -> Self {
        Self::Unbounded
    }

    pub fn boundary_distance_for_render_level(&self, level: usize) -> f32 {
        match self {
            Self::Geometric { base_distance } => {
                let exponent = i32::try_from(level).unwrap_or(i32::MAX);
                base_distance * 0.5f32.powi(exponent)
            }
            Self::Table(distances) => distances.get(level).copied().unwrap_or(0.0),
            Self::Unbounded => f32::INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometric_halves() {
        let lod = LodTable::geometric(8.0);
        assert_eq!(lod.boundary_distance_for_render_level(0), 8.0);
        assert_eq!(lod.boundary_distance_for_render_level(1), 4.0);
        assert_eq!(lod.boundary_distance_for_render_level(4), 0.5);
    }

    #[test]
    fn test_table_ends_expansion() {
        let lod = LodTable::Table(vec![10.0, 5.0]);
        assert_eq!(lod.boundary_distance_for_render_level(1), 5.0);
        assert_eq!(lod.boundary_distance_for_render_level(2), 0.0);
    }

    #[test]
    fn test_unbounded() {
        assert!(LodTable::unbounded()
            .boundary_distance_for_render_level(200)
            .is_infinite());
    }
}
