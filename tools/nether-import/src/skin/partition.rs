//! Bone-bounded section partitioning
//!
//! Each section is drawn with one fixed-size bone palette, so the distinct
//! bones referenced by a section's triangles must fit in that palette.

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;
use tracing::debug;

use crate::error::ImportError;
use crate::topology::PolygonId;

/// Distinct bones referenced by one triangle's corners
#[derive(Debug, Clone)]
pub struct TriangleBones {
    pub polygon: PolygonId,
    pub bones: SmallVec<[u16; 24]>,
}

impl TriangleBones {
    /// Collect and deduplicate the bones of three corners
    pub fn new(polygon: PolygonId, corners: impl IntoIterator<Item = u16>) -> Self {
        let mut bones: SmallVec<[u16; 24]> = corners.into_iter().collect();
        bones.sort_unstable();
        bones.dedup();
        Self { polygon, bones }
    }
}

/// A group of triangles sharing one bone palette
#[derive(Debug, Clone, Default)]
pub struct BoneSection {
    bone_set: HashSet<u16>,
    pub triangles: Vec<PolygonId>,
    /// Global bone ids, sorted; position is the section-local index.
    /// Filled by [`BoneSection::process`].
    pub bones: Vec<u16>,
    local: HashMap<u16, u8>,
}

impl BoneSection {
    /// Bone count after adding `bones`
    fn prospective_len(&self, bones: &[u16]) -> usize {
        self.bone_set.len() + bones.iter().filter(|b| !self.bone_set.contains(*b)).count()
    }

    fn add(&mut self, triangle: &TriangleBones) {
        self.bone_set.extend(triangle.bones.iter().copied());
        self.triangles.push(triangle.polygon);
    }

    pub fn bone_count(&self) -> usize {
        self.bone_set.len()
    }

    /// Build the dense sorted local bone table
    pub fn process(&mut self) {
        self.bones = self.bone_set.iter().copied().collect();
        self.bones.sort_unstable();
        self.local = self
            .bones
            .iter()
            .enumerate()
            .map(|(i, &bone)| (bone, i as u8))
            .collect();
    }

    /// Section-local index of a global bone (after [`BoneSection::process`])
    pub fn local_index(&self, bone: u16) -> Option<u8> {
        self.local.get(&bone).copied()
    }
}

/// Strategy for splitting triangles into bone-bounded sections
pub trait SectionPartitioner {
    /// Partition `triangles` so no section references more than
    /// `max_bones` distinct bones. Sections come back processed.
    fn partition(
        &self,
        triangles: &[TriangleBones],
        max_bones: u32,
    ) -> Result<Vec<BoneSection>, ImportError>;
}

/// Greedy first-fit: each triangle goes into the first section that can
/// absorb its bones, else into a new section.
///
/// O(sections x triangles); section count is not minimal.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyFirstFit;

impl SectionPartitioner for GreedyFirstFit {
    fn partition(
        &self,
        triangles: &[TriangleBones],
        max_bones: u32,
    ) -> Result<Vec<BoneSection>, ImportError> {
        let cap = max_bones as usize;
        let mut sections: Vec<BoneSection> = Vec::new();

        for triangle in triangles {
            if triangle.bones.len() > cap {
                return Err(ImportError::TriangleExceedsBoneLimit {
                    triangle: triangle.polygon.0 as usize,
                    bone_count: triangle.bones.len(),
                    max: max_bones,
                });
            }

            match sections
                .iter_mut()
                .find(|s| s.prospective_len(&triangle.bones) <= cap)
            {
                Some(section) => section.add(triangle),
                None => {
                    let mut section = BoneSection::default();
                    section.add(triangle);
                    sections.push(section);
                }
            }
        }

        for section in &mut sections {
            section.process();
        }

        debug!(
            "Partitioned {} triangles into {} sections (max {} bones)",
            triangles.len(),
            sections.len(),
            max_bones
        );
        Ok(sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(id: u32, bones: &[u16]) -> TriangleBones {
        TriangleBones::new(PolygonId(id), bones.iter().copied())
    }

    #[test]
    fn test_single_section_when_bones_fit() {
        let triangles = [triangle(0, &[0, 1]), triangle(1, &[1, 2]), triangle(2, &[2, 0])];
        let sections = GreedyFirstFit.partition(&triangles, 4).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].bones, vec![0, 1, 2]);
        assert_eq!(sections[0].triangles.len(), 3);
    }

    #[test]
    fn test_first_fit_reuses_earlier_section() {
        let triangles = [
            triangle(0, &[0, 1]),
            triangle(1, &[2, 3]),
            triangle(2, &[0, 1]),
            triangle(3, &[2, 4]),
        ];
        let sections = GreedyFirstFit.partition(&triangles, 2).unwrap();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].triangles, vec![PolygonId(0), PolygonId(2)]);
        assert_eq!(sections[1].triangles, vec![PolygonId(1)]);
        assert_eq!(sections[2].triangles, vec![PolygonId(3)]);
    }

    #[test]
    fn test_local_indices_dense_and_sorted() {
        let triangles = [triangle(0, &[40, 7, 19])];
        let sections = GreedyFirstFit.partition(&triangles, 8).unwrap();
        let section = &sections[0];
        assert_eq!(section.bones, vec![7, 19, 40]);
        assert_eq!(section.local_index(7), Some(0));
        assert_eq!(section.local_index(40), Some(2));
        assert_eq!(section.local_index(8), None);
    }

    #[test]
    fn test_oversized_triangle_is_fatal() {
        let triangles = [triangle(0, &[0, 1]), triangle(5, &[0, 1, 2, 3, 4])];
        let err = GreedyFirstFit.partition(&triangles, 4).unwrap_err();
        assert_eq!(
            err,
            ImportError::TriangleExceedsBoneLimit {
                triangle: 5,
                bone_count: 5,
                max: 4
            }
        );
    }

    #[test]
    fn test_bone_cap_respected_with_many_bones() {
        // 100 triangles, 2 bones each, drawn from 130 bones
        let triangles: Vec<TriangleBones> = (0..100u32)
            .map(|i| {
                let a = (i * 2 % 130) as u16;
                let b = ((i * 2 + 1) % 130) as u16;
                triangle(i, &[a, b])
            })
            .collect();
        let sections = GreedyFirstFit.partition(&triangles, 64).unwrap();
        assert!(sections.len() >= 3, "only {} sections", sections.len());
        for section in &sections {
            assert!(section.bones.len() <= 64);
        }
        let total: usize = sections.iter().map(|s| s.triangles.len()).sum();
        assert_eq!(total, 100);
    }
}
