//! Mesh description construction from a source mesh

use glam::Vec3;
use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::{debug, info};

use super::{ControlPointId, MeshDescription, PolygonGroupId, Wedge};
use crate::config::PipelineConfig;
use crate::error::{ImportError, TopologyError};
use crate::material::MaterialId;
use crate::source::SourceMesh;
use crate::warnings::{ImportWarning, Warnings};

/// Triangles with less area than this are degenerate regardless of edge lengths
const MIN_TRIANGLE_AREA: f32 = 1e-12;

/// Build a validated mesh description from a source mesh.
///
/// `slots` maps the source's material slots to cache ids. One polygon group
/// is created per used slot, in ascending slot order. Degenerate triangles are
/// skipped (and reported) when `mesh.remove_degenerates` is set.
pub fn build_mesh_description(
    source: &SourceMesh,
    slots: &[MaterialId],
    config: &PipelineConfig,
    warnings: &mut Warnings,
) -> Result<MeshDescription, ImportError> {
    source.check_layout()?;

    let mut mesh = MeshDescription::new();
    for &position in &source.positions {
        mesh.create_control_point(position);
    }

    // Pass 1: range checks, degenerate filtering, used slots
    let mut kept = Vec::with_capacity(source.triangle_count());
    let mut used_slots = Vec::new();
    for triangle in 0..source.triangle_count() {
        let corners = [triangle * 3, triangle * 3 + 1, triangle * 3 + 2];
        let mut points = [0u32; 3];
        for (k, &corner) in corners.iter().enumerate() {
            let control_point = source.indices[corner];
            if control_point as usize >= source.positions.len() {
                return Err(TopologyError::ControlPointOutOfRange {
                    corner,
                    control_point,
                    count: source.positions.len(),
                }
                .into());
            }
            points[k] = control_point;
        }

        let slot = source.material_slot(triangle);
        if slot as usize >= slots.len() {
            return Err(ImportError::InvalidInput(format!(
                "mesh '{}': triangle {} uses material slot {}, but only {} exist",
                source.name,
                triangle,
                slot,
                slots.len()
            )));
        }

        let positions = points.map(|p| source.positions[p as usize]);
        if config.mesh.remove_degenerates
            && is_degenerate(positions, config.thresholds.points_are_near)
        {
            warnings.push(ImportWarning::DegenerateTriangle {
                triangle,
                control_points: points,
            });
            continue;
        }

        kept.push(triangle);
        used_slots.push(slot);
    }

    if kept.is_empty() {
        return Err(ImportError::NoValidTriangles(source.name.clone()));
    }

    used_slots.sort_unstable();
    used_slots.dedup();
    let groups: HashMap<u32, PolygonGroupId> = used_slots
        .iter()
        .map(|&slot| (slot, mesh.create_polygon_group(slots[slot as usize])))
        .collect();

    // Pass 2: wedges and polygons
    let attr = &source.corners;
    for &triangle in &kept {
        let mut wedges = [super::WedgeId(0); 3];
        for (k, wedge_id) in wedges.iter_mut().enumerate() {
            let corner = triangle * 3 + k;
            let mut wedge = Wedge::new(ControlPointId(source.indices[corner]));
            if let Some(normals) = &attr.normals {
                wedge.normal = normals[corner];
            }
            if let Some(tangents) = &attr.tangents {
                wedge.tangent = tangents[corner];
            }
            if let Some(signs) = &attr.bitangent_signs {
                wedge.binormal_sign = if signs[corner] < 0.0 { -1.0 } else { 1.0 };
            }
            wedge.bitangent = wedge.normal.cross(wedge.tangent) * wedge.binormal_sign;
            if let Some(colors) = &attr.colors {
                wedge.color = colors[corner];
            }
            wedge.uvs = attr.uvs.iter().map(|channel| channel[corner]).collect::<SmallVec<_>>();
            *wedge_id = mesh.create_wedge(wedge)?;
        }

        let group = groups[&source.material_slot(triangle)];
        mesh.create_polygon(group, wedges)?;
    }

    if attr.normals.is_none() && config.mesh.compute_normals {
        debug!("Mesh '{}': generating normals", source.name);
        mesh.compute_normals();
    }
    if attr.tangents.is_none() && config.mesh.compute_tangents {
        debug!("Mesh '{}': generating tangents", source.name);
        mesh.compute_tangents();
    }

    mesh.update_edge_flags();
    mesh.validate()?;

    info!(
        "Built mesh '{}': {} control points, {} polygons ({} skipped), {} groups",
        source.name,
        mesh.control_points.len(),
        mesh.polygons.len(),
        source.triangle_count() - kept.len(),
        mesh.polygon_groups.len()
    );
    Ok(mesh)
}

/// Any two corners within `near`, or no area
fn is_degenerate(positions: [Vec3; 3], near: f32) -> bool {
    let [a, b, c] = positions;
    let near_sq = near * near;
    if a.distance_squared(b) <= near_sq
        || b.distance_squared(c) <= near_sq
        || c.distance_squared(a) <= near_sq
    {
        return true;
    }
    (b - a).cross(c - a).length() * 0.5 <= MIN_TRIANGLE_AREA
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn quad() -> SourceMesh {
        SourceMesh {
            name: "quad".into(),
            positions: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
            ..Default::default()
        }
    }

    #[test]
    fn test_builds_quad() {
        let mut warnings = Warnings::new();
        let mesh = build_mesh_description(
            &quad(),
            &[MaterialId(0)],
            &PipelineConfig::default(),
            &mut warnings,
        )
        .unwrap();
        assert_eq!(mesh.control_points.len(), 4);
        assert_eq!(mesh.wedges.len(), 6);
        assert_eq!(mesh.polygons.len(), 2);
        assert_eq!(mesh.polygon_groups.len(), 1);
        assert!(warnings.is_empty());
        // Generated normals face +Z
        for wedge in &mesh.wedges {
            assert!((wedge.normal - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn test_groups_in_slot_order() {
        let mut source = quad();
        source.triangle_materials = vec![2, 0];
        let slots = [MaterialId(10), MaterialId(11), MaterialId(12)];
        let mut warnings = Warnings::new();
        let mesh =
            build_mesh_description(&source, &slots, &PipelineConfig::default(), &mut warnings)
                .unwrap();
        // Slot 1 is unused and gets no group
        assert_eq!(mesh.polygon_groups.len(), 2);
        assert_eq!(mesh.polygon_groups[0].material, MaterialId(10));
        assert_eq!(mesh.polygon_groups[1].material, MaterialId(12));
        assert_eq!(mesh.polygons[0].group, PolygonGroupId(1));
    }

    #[test]
    fn test_degenerate_skipped_with_warning() {
        let mut source = quad();
        source.positions.push(Vec3::new(1.0, 0.00001, 0.0));
        source.indices.extend([0, 1, 4]);
        let mut warnings = Warnings::new();
        let mesh = build_mesh_description(
            &source,
            &[MaterialId(0)],
            &PipelineConfig::default(),
            &mut warnings,
        )
        .unwrap();
        assert_eq!(mesh.polygons.len(), 2);
        assert_eq!(
            warnings.iter().next(),
            Some(&ImportWarning::DegenerateTriangle {
                triangle: 2,
                control_points: [0, 1, 4],
            })
        );
    }

    #[test]
    fn test_all_degenerate_is_fatal() {
        let source = SourceMesh {
            name: "sliver".into(),
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::X * 2.0],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        let err = build_mesh_description(
            &source,
            &[MaterialId(0)],
            &PipelineConfig::default(),
            &mut Warnings::new(),
        )
        .unwrap_err();
        assert_eq!(err, ImportError::NoValidTriangles("sliver".into()));
    }

    #[test]
    fn test_out_of_range_index_is_fatal() {
        let mut source = quad();
        source.indices[4] = 9;
        let err = build_mesh_description(
            &source,
            &[MaterialId(0)],
            &PipelineConfig::default(),
            &mut Warnings::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ImportError::Topology(TopologyError::ControlPointOutOfRange { corner: 4, .. })
        ));
    }

    #[test]
    fn test_source_attributes_carried() {
        let mut source = quad();
        source.corners.normals = Some(vec![Vec3::Y; 6]);
        source.corners.uvs = vec![vec![Vec2::new(0.25, 0.75); 6]];
        let mut warnings = Warnings::new();
        let mesh = build_mesh_description(
            &source,
            &[MaterialId(0)],
            &PipelineConfig::default(),
            &mut warnings,
        )
        .unwrap();
        assert_eq!(mesh.wedges[3].normal, Vec3::Y);
        assert_eq!(mesh.wedges[3].uv(0), Vec2::new(0.25, 0.75));
    }
}
