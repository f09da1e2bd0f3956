//! Derived geometry: polygon frames, generated normals/tangents, edge flags

use glam::{Vec2, Vec3};

use super::{ControlPointId, MeshDescription, WedgeId};

/// Below this |det| the UV mapping of a triangle is treated as degenerate
const UV_AREA_EPSILON: f32 = 1e-12;

/// Wedges whose normals differ by more than this make an edge hard
const NORMAL_EPSILON: f32 = 1e-4;

const UV_EPSILON: f32 = 1e-6;

/// Normal, tangent, bitangent and area of a triangle
pub(super) fn triangle_frame(mesh: &MeshDescription, wedges: [WedgeId; 3]) -> (Vec3, Vec3, Vec3, f32) {
    let [w0, w1, w2] = wedges.map(|w| mesh.wedge(w));
    let p0 = mesh.position(w0.control_point);
    let e1 = mesh.position(w1.control_point) - p0;
    let e2 = mesh.position(w2.control_point) - p0;

    let cross = e1.cross(e2);
    let area = cross.length() * 0.5;
    let normal = cross.normalize_or_zero();

    let (tangent, bitangent) = uv_frame(e1, e2, w1.uv(0) - w0.uv(0), w2.uv(0) - w0.uv(0))
        .unwrap_or_else(|| {
            let tangent = e1.normalize_or_zero();
            (tangent, normal.cross(tangent))
        });

    (normal, tangent, bitangent, area)
}

fn uv_frame(e1: Vec3, e2: Vec3, duv1: Vec2, duv2: Vec2) -> Option<(Vec3, Vec3)> {
    let det = duv1.x * duv2.y - duv2.x * duv1.y;
    if det.abs() <= UV_AREA_EPSILON {
        return None;
    }
    let r = 1.0 / det;
    let tangent = ((e1 * duv2.y - e2 * duv1.y) * r).try_normalize()?;
    let bitangent = ((e2 * duv1.x - e1 * duv2.x) * r).try_normalize()?;
    Some((tangent, bitangent))
}

/// Sum `value(polygon) * area` onto each control point the polygon touches
fn accumulate_per_control_point(
    mesh: &MeshDescription,
    value: impl Fn(&super::Polygon) -> Vec3,
) -> Vec<Vec3> {
    let mut sums = vec![Vec3::ZERO; mesh.control_points.len()];
    for polygon in &mesh.polygons {
        let weighted = value(polygon) * polygon.area;
        for wedge in polygon.wedges {
            sums[mesh.wedge(wedge).control_point.0 as usize] += weighted;
        }
    }
    sums
}

pub(super) fn compute_normals(mesh: &mut MeshDescription) {
    let sums = accumulate_per_control_point(mesh, |p| p.normal);

    for polygon_index in 0..mesh.polygons.len() {
        let polygon = &mesh.polygons[polygon_index];
        let face_normal = polygon.normal;
        for wedge in polygon.wedges {
            let wedge = &mut mesh.wedges[wedge.0 as usize];
            let sum = sums[wedge.control_point.0 as usize];
            wedge.normal = sum.try_normalize().unwrap_or(face_normal);
        }
    }
}

pub(super) fn compute_tangents(mesh: &mut MeshDescription) {
    let tangent_sums = accumulate_per_control_point(mesh, |p| p.tangent);
    let bitangent_sums = accumulate_per_control_point(mesh, |p| p.bitangent);

    for wedge in &mut mesh.wedges {
        let point = wedge.control_point.0 as usize;
        let normal = wedge.normal.try_normalize().unwrap_or(Vec3::Z);
        let raw = tangent_sums[point];

        // Gram-Schmidt against the wedge normal
        let tangent = (raw - normal * normal.dot(raw))
            .try_normalize()
            .unwrap_or_else(|| normal.any_orthonormal_vector());
        let bitangent = normal.cross(tangent);
        let sign = if bitangent.dot(bitangent_sums[point]) < 0.0 {
            -1.0
        } else {
            1.0
        };

        wedge.tangent = tangent;
        wedge.bitangent = bitangent * sign;
        wedge.binormal_sign = sign;
    }
}

pub(super) fn update_edge_flags(mesh: &mut MeshDescription) {
    for edge_index in 0..mesh.edges.len() {
        let edge = &mesh.edges[edge_index];
        if edge.polygons.len() < 2 {
            continue;
        }

        let mut hard = false;
        let mut uv_seam = false;
        for point in edge.control_points {
            let mut corners = edge
                .polygons
                .iter()
                .filter_map(|&p| corner_at(mesh, p, point));
            let Some(first) = corners.next() else {
                continue;
            };
            let first = mesh.wedge(first);
            for other in corners {
                let other = mesh.wedge(other);
                hard |= !first.normal.abs_diff_eq(other.normal, NORMAL_EPSILON);
                uv_seam |= !first.uv(0).abs_diff_eq(other.uv(0), UV_EPSILON);
            }
        }

        let edge = &mut mesh.edges[edge_index];
        edge.hard = hard;
        edge.uv_seam = uv_seam;
    }
}

/// The wedge of `polygon` sitting on `point`
fn corner_at(
    mesh: &MeshDescription,
    polygon: super::PolygonId,
    point: ControlPointId,
) -> Option<WedgeId> {
    mesh.polygons[polygon.0 as usize]
        .wedges
        .into_iter()
        .find(|&w| mesh.wedge(w).control_point == point)
}
