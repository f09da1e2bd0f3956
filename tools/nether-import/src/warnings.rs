//! Recoverable import conditions
//!
//! Each warning is logged through `tracing` when it is recorded and kept on
//! the resulting asset so callers can report it later.

use thiserror::Error;

/// What kind of entity was renamed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameKind {
    Material,
    Bone,
}

impl std::fmt::Display for RenameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Material => f.write_str("material"),
            Self::Bone => f.write_str("bone"),
        }
    }
}

/// A condition the pipeline worked around
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ImportWarning {
    #[error("skipped degenerate triangle {triangle} (control points {control_points:?})")]
    DegenerateTriangle {
        triangle: usize,
        control_points: [u32; 3],
    },

    #[error("control point {control_point} has no bone weight, bound 100% to bone 0")]
    ZeroBoneWeight { control_point: u32 },

    #[error(
        "control point {control_point} had {influences} influences, kept {kept} (discarded {:.1}% of weight)",
        .discarded_weight * 100.0
    )]
    InfluencesTruncated {
        control_point: u32,
        influences: usize,
        kept: usize,
        discarded_weight: f32,
    },

    #[error("renamed {kind} '{from}' to '{to}'")]
    Renamed {
        kind: RenameKind,
        from: String,
        to: String,
    },

    #[error("bone '{bone}' is missing from the bind pose, using its time-zero transform")]
    MissingFromBindPose { bone: String },

    #[error("no bind pose available, using time-zero transforms for the whole skeleton")]
    BindPoseFallback,

    #[error("bone '{bone}' has an invalid bind transform: {reason}")]
    InvalidBindTransform { bone: String, reason: &'static str },

    #[error("skipped vertex cache optimisation ({index_count} indices exceeds limit {limit})")]
    OptimizationSkipped { index_count: usize, limit: usize },
}

/// Ordered collection of warnings for one asset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Warnings {
    entries: Vec<ImportWarning>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and emit it to the log
    pub fn push(&mut self, warning: ImportWarning) {
        tracing::warn!("{}", warning);
        self.entries.push(warning);
    }

    /// Append warnings collected elsewhere (already logged)
    pub fn extend(&mut self, other: Warnings) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImportWarning> {
        self.entries.iter()
    }

    /// Count warnings matching a predicate
    pub fn count(&self, predicate: impl Fn(&ImportWarning) -> bool) -> usize {
        self.entries.iter().filter(|w| predicate(w)).count()
    }
}

/// Collects warnings that were already logged where they were raised
impl FromIterator<ImportWarning> for Warnings {
    fn from_iter<I: IntoIterator<Item = ImportWarning>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Warnings {
    type Item = &'a ImportWarning;
    type IntoIter = std::slice::Iter<'a, ImportWarning>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
