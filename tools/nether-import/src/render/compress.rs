//! Vertex compression and position-only remapping

use crate::error::ImportError;
use crate::overlap::OverlapIndex;

use super::FullVertex;

const UNMAPPED: u32 = u32::MAX;

/// Deduplicate corners into a minimal vertex buffer.
///
/// Corners are only compared against their overlap bucket (positions within
/// `threshold`), and merged only on bit-exact equality of every attribute.
/// Returns the compact vertices and an old -> new index remap. Vertices keep
/// the order of their first corner, so compressing an already compressed
/// buffer returns it unchanged.
pub fn compress_vertices(
    corners: &[FullVertex],
    threshold: f32,
) -> Result<(Vec<FullVertex>, Vec<u32>), ImportError> {
    let positions: Vec<_> = corners.iter().map(|c| c.position).collect();
    let overlap = OverlapIndex::build_identity(&positions, threshold)?;

    let mut vertices = Vec::with_capacity(corners.len());
    let mut remap = vec![UNMAPPED; corners.len()];
    for (i, corner) in corners.iter().enumerate() {
        if remap[i] != UNMAPPED {
            continue;
        }

        let slot = vertices.len() as u32;
        vertices.push(*corner);
        remap[i] = slot;

        for &j in overlap.find_overlapping(i as u32)? {
            let j = j as usize;
            if j > i && remap[j] == UNMAPPED && corners[j].same_as(corner) {
                remap[j] = slot;
            }
        }
    }

    Ok((vertices, remap))
}

/// Map every vertex to the smallest vertex index sharing its position.
///
/// Shading attributes are ignored, so this collapses seams and hard edges.
pub fn depth_only_remap(vertices: &[FullVertex], threshold: f32) -> Result<Vec<u32>, ImportError> {
    let positions: Vec<_> = vertices.iter().map(|v| v.position).collect();
    let overlap = OverlapIndex::build_identity(&positions, threshold)?;

    (0..vertices.len() as u32)
        .map(|i| -> Result<u32, ImportError> {
            let bucket = overlap.find_overlapping(i)?;
            Ok(bucket.first().copied().unwrap_or(i))
        })
        .collect()
}
