//! Per-control-point skin weight normalisation

use smallvec::SmallVec;
use tracing::debug;

use crate::config::{MAX_INFLUENCES, SkinningOptions};
use crate::source::RawInfluences;
use crate::warnings::{ImportWarning, Warnings};

/// Total weight at or below this is treated as unweighted
const WEIGHT_EPSILON: f32 = 1e-6;

/// Influences of one control point: descending weight, summing to 1
#[derive(Debug, Clone, PartialEq)]
pub struct SkinWeight {
    pub influences: SmallVec<[(u16, f32); MAX_INFLUENCES]>,
}

impl SkinWeight {
    /// Fully bound to one bone
    pub fn rigid(bone: u16) -> Self {
        let mut influences = SmallVec::new();
        influences.push((bone, 1.0));
        Self { influences }
    }

    pub fn bones(&self) -> impl Iterator<Item = u16> + '_ {
        self.influences.iter().map(|&(bone, _)| bone)
    }

    pub fn total(&self) -> f32 {
        self.influences.iter().map(|&(_, w)| w).sum()
    }
}

/// Sort, truncate and renormalise the influences of one control point.
///
/// Non-finite and non-positive weights are dropped and repeated bones are
/// merged first. A control point left without weight is bound to bone 0.
pub fn normalize_influences(
    control_point: u32,
    raw: &[(u16, f32)],
    options: &SkinningOptions,
    warnings: &mut Warnings,
) -> SkinWeight {
    let mut merged: SmallVec<[(u16, f32); 16]> = SmallVec::new();
    for &(bone, weight) in raw {
        if !weight.is_finite() || weight <= 0.0 {
            continue;
        }
        match merged.iter_mut().find(|(b, _)| *b == bone) {
            Some((_, w)) => *w += weight,
            None => merged.push((bone, weight)),
        }
    }

    let total: f32 = merged.iter().map(|&(_, w)| w).sum();
    if total <= WEIGHT_EPSILON {
        warnings.push(ImportWarning::ZeroBoneWeight { control_point });
        return SkinWeight::rigid(0);
    }

    // Heaviest first, bone id breaks ties so output is deterministic
    merged.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let max = options.max_influences.clamp(1, MAX_INFLUENCES);
    if merged.len() > max {
        let discarded: f32 = merged[max..].iter().map(|&(_, w)| w).sum::<f32>() / total;
        let influences = merged.len();
        merged.truncate(max);

        let threshold = options.discarded_weight_warning;
        if threshold >= 0.0 && discarded > threshold {
            warnings.push(ImportWarning::InfluencesTruncated {
                control_point,
                influences,
                kept: max,
                discarded_weight: discarded,
            });
        } else {
            debug!(
                "Control point {}: truncated {} influences to {} ({:.2}% weight dropped)",
                control_point,
                influences,
                max,
                discarded * 100.0
            );
        }
    }

    let kept: f32 = merged.iter().map(|&(_, w)| w).sum();
    SkinWeight {
        influences: merged.iter().map(|&(bone, w)| (bone, w / kept)).collect(),
    }
}

/// Normalise every control point of a mesh
pub fn normalize_skin_weights(
    raw: &[RawInfluences],
    options: &SkinningOptions,
    warnings: &mut Warnings,
) -> Vec<SkinWeight> {
    raw.iter()
        .enumerate()
        .map(|(i, influences)| normalize_influences(i as u32, influences, options, warnings))
        .collect()
}
