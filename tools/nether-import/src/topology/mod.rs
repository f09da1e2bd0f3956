//! Topological mesh model
//!
//! Control points, wedges, edges, polygons and polygon groups live in flat
//! arrays and reference each other by id only.

mod build;
mod geometry;

pub use build::build_mesh_description;

use glam::{Vec2, Vec3, Vec4};
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::error::TopologyError;
use crate::material::MaterialId;

/// Index into [`MeshDescription::control_points`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlPointId(pub u32);

/// Index into [`MeshDescription::wedges`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WedgeId(pub u32);

/// Index into [`MeshDescription::edges`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u32);

/// Index into [`MeshDescription::polygons`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolygonId(pub u32);

/// Index into [`MeshDescription::polygon_groups`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolygonGroupId(pub u32);

/// A unique position shared by every wedge that sits on it
#[derive(Debug, Clone, Default)]
pub struct ControlPoint {
    pub position: Vec3,
    pub wedges: SmallVec<[WedgeId; 4]>,
    pub edges: SmallVec<[EdgeId; 6]>,
}

/// One triangle corner
#[derive(Debug, Clone)]
pub struct Wedge {
    pub control_point: ControlPointId,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    /// Handedness of the tangent frame (+1 / -1)
    pub binormal_sign: f32,
    pub color: Vec4,
    pub uvs: SmallVec<[Vec2; 2]>,
}

impl Wedge {
    pub fn new(control_point: ControlPointId) -> Self {
        Self {
            control_point,
            normal: Vec3::ZERO,
            tangent: Vec3::ZERO,
            bitangent: Vec3::ZERO,
            binormal_sign: 1.0,
            color: Vec4::ONE,
            uvs: SmallVec::new(),
        }
    }

    /// UV for a channel, zero when the wedge has fewer channels
    pub fn uv(&self, channel: usize) -> Vec2 {
        self.uvs.get(channel).copied().unwrap_or(Vec2::ZERO)
    }
}

/// Unordered control point pair
#[derive(Debug, Clone)]
pub struct Edge {
    pub control_points: [ControlPointId; 2],
    pub polygons: SmallVec<[PolygonId; 2]>,
    pub hard: bool,
    pub crease_sharpness: f32,
    pub uv_seam: bool,
}

/// A triangle
#[derive(Debug, Clone)]
pub struct Polygon {
    pub wedges: [WedgeId; 3],
    pub group: PolygonGroupId,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub area: f32,
}

/// Polygons sharing one material
#[derive(Debug, Clone)]
pub struct PolygonGroup {
    pub material: MaterialId,
    pub polygons: Vec<PolygonId>,
}

/// Packed lookup key for a directed control point pair
#[inline]
fn edge_key(a: ControlPointId, b: ControlPointId) -> u64 {
    ((a.0 as u64) << 32) | b.0 as u64
}

/// Arena-backed polygon mesh
#[derive(Debug, Clone, Default)]
pub struct MeshDescription {
    pub control_points: Vec<ControlPoint>,
    pub wedges: Vec<Wedge>,
    pub edges: Vec<Edge>,
    pub polygons: Vec<Polygon>,
    pub polygon_groups: Vec<PolygonGroup>,
    edge_lookup: HashMap<u64, EdgeId>,
}

impl MeshDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_control_point(&mut self, position: Vec3) -> ControlPointId {
        let id = ControlPointId(self.control_points.len() as u32);
        self.control_points.push(ControlPoint {
            position,
            ..Default::default()
        });
        id
    }

    /// Add a wedge and register it on its control point
    pub fn create_wedge(&mut self, wedge: Wedge) -> Result<WedgeId, TopologyError> {
        let id = WedgeId(self.wedges.len() as u32);
        let count = self.control_points.len();
        let point = self
            .control_points
            .get_mut(wedge.control_point.0 as usize)
            .ok_or(TopologyError::ControlPointOutOfRange {
                corner: id.0 as usize,
                control_point: wedge.control_point.0,
                count,
            })?;
        point.wedges.push(id);
        self.wedges.push(wedge);
        Ok(id)
    }

    pub fn create_polygon_group(&mut self, material: MaterialId) -> PolygonGroupId {
        let id = PolygonGroupId(self.polygon_groups.len() as u32);
        self.polygon_groups.push(PolygonGroup {
            material,
            polygons: Vec::new(),
        });
        id
    }

    /// Edge between two control points, created on first use
    pub fn create_edge(&mut self, a: ControlPointId, b: ControlPointId) -> EdgeId {
        if let Some(id) = self.find_edge(a, b) {
            return id;
        }

        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge {
            control_points: [a, b],
            polygons: SmallVec::new(),
            hard: false,
            crease_sharpness: 0.0,
            uv_seam: false,
        });
        self.edge_lookup.insert(edge_key(a, b), id);
        self.control_points[a.0 as usize].edges.push(id);
        if a != b {
            self.control_points[b.0 as usize].edges.push(id);
        }
        id
    }

    /// Existing edge for an unordered control point pair
    pub fn find_edge(&self, a: ControlPointId, b: ControlPointId) -> Option<EdgeId> {
        self.edge_lookup
            .get(&edge_key(a, b))
            .or_else(|| self.edge_lookup.get(&edge_key(b, a)))
            .copied()
    }

    /// Add a triangle to a group, creating its three edges
    pub fn create_polygon(
        &mut self,
        group: PolygonGroupId,
        wedges: [WedgeId; 3],
    ) -> Result<PolygonId, TopologyError> {
        if group.0 as usize >= self.polygon_groups.len() {
            return Err(TopologyError::UnknownPolygonGroup {
                group: group.0,
                count: self.polygon_groups.len(),
            });
        }
        for wedge in wedges {
            if wedge.0 as usize >= self.wedges.len() {
                return Err(TopologyError::WedgeOutOfRange {
                    wedge: wedge.0,
                    count: self.wedges.len(),
                });
            }
        }

        let id = PolygonId(self.polygons.len() as u32);
        let points = wedges.map(|w| self.wedges[w.0 as usize].control_point);
        let (normal, tangent, bitangent, area) = geometry::triangle_frame(self, wedges);
        self.polygons.push(Polygon {
            wedges,
            group,
            normal,
            tangent,
            bitangent,
            area,
        });
        self.polygon_groups[group.0 as usize].polygons.push(id);

        for corner in 0..3 {
            let edge = self.create_edge(points[corner], points[(corner + 1) % 3]);
            self.edges[edge.0 as usize].polygons.push(id);
        }
        Ok(id)
    }

    /// Append another mesh, offsetting all of its ids
    pub fn merge(&mut self, other: &MeshDescription) {
        let cp_offset = self.control_points.len() as u32;
        let wedge_offset = self.wedges.len() as u32;
        let edge_offset = self.edges.len() as u32;
        let polygon_offset = self.polygons.len() as u32;
        let group_offset = self.polygon_groups.len() as u32;

        self.control_points
            .extend(other.control_points.iter().map(|cp| ControlPoint {
                position: cp.position,
                wedges: cp.wedges.iter().map(|w| WedgeId(w.0 + wedge_offset)).collect(),
                edges: cp.edges.iter().map(|e| EdgeId(e.0 + edge_offset)).collect(),
            }));

        self.wedges.extend(other.wedges.iter().map(|w| Wedge {
            control_point: ControlPointId(w.control_point.0 + cp_offset),
            ..w.clone()
        }));

        for edge in &other.edges {
            let id = EdgeId(self.edges.len() as u32);
            let [a, b] = edge.control_points;
            let (a, b) = (ControlPointId(a.0 + cp_offset), ControlPointId(b.0 + cp_offset));
            self.edge_lookup.insert(edge_key(a, b), id);
            self.edges.push(Edge {
                control_points: [a, b],
                polygons: edge
                    .polygons
                    .iter()
                    .map(|p| PolygonId(p.0 + polygon_offset))
                    .collect(),
                ..edge.clone()
            });
        }

        self.polygons.extend(other.polygons.iter().map(|p| Polygon {
            wedges: p.wedges.map(|w| WedgeId(w.0 + wedge_offset)),
            group: PolygonGroupId(p.group.0 + group_offset),
            ..p.clone()
        }));

        self.polygon_groups
            .extend(other.polygon_groups.iter().map(|g| PolygonGroup {
                material: g.material,
                polygons: g
                    .polygons
                    .iter()
                    .map(|p| PolygonId(p.0 + polygon_offset))
                    .collect(),
            }));
    }

    /// Check every wedge points at a real control point and no group is empty
    pub fn validate(&self) -> Result<(), TopologyError> {
        let count = self.control_points.len();
        for (index, wedge) in self.wedges.iter().enumerate() {
            if wedge.control_point.0 as usize >= count {
                return Err(TopologyError::ControlPointOutOfRange {
                    corner: index,
                    control_point: wedge.control_point.0,
                    count,
                });
            }
        }
        for polygon in &self.polygons {
            for wedge in polygon.wedges {
                if wedge.0 as usize >= self.wedges.len() {
                    return Err(TopologyError::WedgeOutOfRange {
                        wedge: wedge.0,
                        count: self.wedges.len(),
                    });
                }
            }
        }
        for (index, group) in self.polygon_groups.iter().enumerate() {
            if group.polygons.is_empty() {
                return Err(TopologyError::EmptyPolygonGroup(index as u32));
            }
        }
        Ok(())
    }

    pub fn position(&self, point: ControlPointId) -> Vec3 {
        self.control_points[point.0 as usize].position
    }

    pub fn wedge(&self, wedge: WedgeId) -> &Wedge {
        &self.wedges[wedge.0 as usize]
    }

    /// Positions of a polygon's three corners
    pub fn polygon_positions(&self, polygon: PolygonId) -> [Vec3; 3] {
        self.polygons[polygon.0 as usize]
            .wedges
            .map(|w| self.position(self.wedge(w).control_point))
    }

    /// Mark hard edges and UV seams from the wedges around each edge
    pub fn update_edge_flags(&mut self) {
        geometry::update_edge_flags(self);
    }

    /// Generate wedge normals from area-weighted face normals
    pub fn compute_normals(&mut self) {
        geometry::compute_normals(self);
    }

    /// Generate wedge tangents from area-weighted face tangents
    pub fn compute_tangents(&mut self) {
        geometry::compute_tangents(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two triangles forming a unit quad in the XY plane
    fn quad() -> MeshDescription {
        let mut mesh = MeshDescription::new();
        let points = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]
        .map(|p| mesh.create_control_point(p));
        let group = mesh.create_polygon_group(MaterialId(0));
        for tri in [[0, 1, 2], [0, 2, 3]] {
            let wedges = tri.map(|i| mesh.create_wedge(Wedge::new(points[i])).unwrap());
            mesh.create_polygon(group, wedges).unwrap();
        }
        mesh
    }

    #[test]
    fn test_edges_shared_between_polygons() {
        let mesh = quad();
        // 4 outer edges + 1 diagonal
        assert_eq!(mesh.edges.len(), 5);
        let diagonal = mesh
            .find_edge(ControlPointId(2), ControlPointId(0))
            .unwrap();
        assert_eq!(mesh.edges[diagonal.0 as usize].polygons.len(), 2);
    }

    #[test]
    fn test_create_edge_is_unordered() {
        let mut mesh = quad();
        let before = mesh.edges.len();
        for a in 0..4u32 {
            for b in 0..4u32 {
                if a == b {
                    continue;
                }
                let ab = mesh.create_edge(ControlPointId(a), ControlPointId(b));
                let ba = mesh.create_edge(ControlPointId(b), ControlPointId(a));
                assert_eq!(ab, ba);
            }
        }
        // Only the missing diagonal 1-3 is new; C(4,2) = 6 caps the total
        assert_eq!(mesh.edges.len(), before + 1);
        assert!(mesh.edges.len() <= 6);
    }

    #[test]
    fn test_control_point_registration() {
        let mesh = quad();
        assert_eq!(mesh.control_points[0].wedges.len(), 2);
        assert_eq!(mesh.control_points[0].edges.len(), 3);
        assert_eq!(mesh.control_points[1].edges.len(), 2);
    }

    #[test]
    fn test_polygon_frame() {
        let mesh = quad();
        let polygon = &mesh.polygons[0];
        assert!((polygon.area - 0.5).abs() < 1e-6);
        assert!((polygon.normal - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_validate() {
        let mut mesh = quad();
        assert!(mesh.validate().is_ok());

        mesh.create_polygon_group(MaterialId(1));
        assert_eq!(mesh.validate(), Err(TopologyError::EmptyPolygonGroup(1)));
    }

    #[test]
    fn test_bad_wedge_rejected() {
        let mut mesh = quad();
        let err = mesh
            .create_polygon(PolygonGroupId(0), [WedgeId(0), WedgeId(1), WedgeId(99)])
            .unwrap_err();
        assert!(matches!(err, TopologyError::WedgeOutOfRange { wedge: 99, .. }));

        let err = mesh.create_wedge(Wedge::new(ControlPointId(42))).unwrap_err();
        assert!(matches!(err, TopologyError::ControlPointOutOfRange { .. }));
    }

    #[test]
    fn test_merge_offsets_ids() {
        let mut mesh = quad();
        let other = quad();
        mesh.merge(&other);

        assert_eq!(mesh.control_points.len(), 8);
        assert_eq!(mesh.wedges.len(), 12);
        assert_eq!(mesh.polygons.len(), 4);
        assert_eq!(mesh.polygon_groups.len(), 2);
        assert_eq!(mesh.edges.len(), 10);
        assert!(mesh.validate().is_ok());

        let merged = &mesh.polygons[2];
        assert_eq!(merged.group, PolygonGroupId(1));
        assert_eq!(merged.wedges[0], WedgeId(6));
        assert_eq!(mesh.wedges[6].control_point, ControlPointId(4));
        assert!(mesh
            .find_edge(ControlPointId(6), ControlPointId(4))
            .is_some());
        assert!(mesh
            .find_edge(ControlPointId(0), ControlPointId(4))
            .is_none());
    }
}
