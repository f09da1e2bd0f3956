//! Fatal import errors
//!
//! Anything here aborts the current mesh or skeleton. Recoverable conditions
//! live in [`crate::warnings`].

use thiserror::Error;

/// Topology contract violations (bad ids, empty groups)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("corner {corner} references control point {control_point}, but only {count} exist")]
    ControlPointOutOfRange {
        corner: usize,
        control_point: u32,
        count: usize,
    },

    #[error("wedge {wedge} is out of range ({count} wedges)")]
    WedgeOutOfRange { wedge: u32, count: usize },

    #[error("polygon group {0} has no polygons")]
    EmptyPolygonGroup(u32),

    #[error("polygon group {group} does not exist ({count} groups)")]
    UnknownPolygonGroup { group: u32, count: usize },
}

/// Corner-overlap index used outside its add/finish/query lifecycle
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum OverlapError {
    #[error("overlap index queried before finish_adding()")]
    NotFinished,

    #[error("overlap index modified after finish_adding()")]
    AlreadyFinished,
}

/// Fatal failure for one mesh or skeleton
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ImportError {
    #[error("skeleton has {} roots ({}), exactly one is required", .0.len(), .0.join(", "))]
    MultipleRoots(Vec<String>),

    #[error("no skin clusters to build a skeleton from")]
    NoBones,

    #[error(
        "triangle {triangle} references {bone_count} distinct bones, more than the {max} a section can hold"
    )]
    TriangleExceedsBoneLimit {
        triangle: usize,
        bone_count: usize,
        max: u32,
    },

    #[error("mesh '{0}' has no valid triangles")]
    NoValidTriangles(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("animation of {duration}s yields no samples at {sample_rate} Hz")]
    AnimationTooShort { duration: f32, sample_rate: f32 },

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Overlap(#[from] OverlapError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_roots_message() {
        let err = ImportError::MultipleRoots(vec!["hips".into(), "prop".into()]);
        assert_eq!(
            err.to_string(),
            "skeleton has 2 roots (hips, prop), exactly one is required"
        );
    }

    #[test]
    fn test_topology_error_converts() {
        let err: ImportError = TopologyError::EmptyPolygonGroup(3).into();
        assert_eq!(err.to_string(), "polygon group 3 has no polygons");
    }
}
