//! Skinned mesh processing
//!
//! Skin weights are normalised per control point, each polygon group is
//! split into bone-bounded sections, and the sections are concatenated into
//! one render buffer whose vertices carry section-local bone indices.
//! Depth-only and adjacency streams are built per section, so an index never
//! leaves its section's vertex range.

mod partition;
mod weights;

pub use partition::{BoneSection, GreedyFirstFit, SectionPartitioner, TriangleBones};
pub use weights::{SkinWeight, normalize_influences, normalize_skin_weights};

use glam::Vec4;
use hashbrown::HashMap;
use tracing::info;

use crate::config::{MAX_INFLUENCES, PipelineConfig};
use crate::error::ImportError;
use crate::material::MaterialId;
use crate::overlap::OverlapIndex;
use crate::render::packing::{self, PackedSkin};
use crate::render::{
    FullVertex, IndexBuffer, build_adjacency, optimize_vertex_cache, reorder_vertices_by_first_use,
    reverse_winding,
};
use crate::topology::MeshDescription;
use crate::warnings::{ImportWarning, Warnings};

/// A compact vertex with its section-local skin influences
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinnedVertex {
    pub vertex: FullVertex,
    /// Indices into the owning section's bone table
    pub bones: [u8; MAX_INFLUENCES],
    pub weights: [f32; MAX_INFLUENCES],
}

impl SkinnedVertex {
    pub fn pack_skin(&self) -> PackedSkin {
        PackedSkin {
            bones: self.bones,
            weights: packing::quantize_weights(&self.weights),
        }
    }
}

/// A run of triangles drawn with one material and one bone palette
#[derive(Debug, Clone, PartialEq)]
pub struct SkinnedSection {
    pub material: MaterialId,
    pub first_index: u32,
    pub triangle_count: u32,
    pub min_index: u32,
    pub max_index: u32,
    /// Global bone ids; a vertex's local index points into this table
    pub bones: Vec<u16>,
}

/// Combined buffers for every section of a skinned mesh
#[derive(Debug, Clone)]
pub struct SkinnedRenderData {
    pub vertices: Vec<SkinnedVertex>,
    pub sections: Vec<SkinnedSection>,
    pub indices: IndexBuffer,
    pub reversed_indices: Option<IndexBuffer>,
    pub depth_only_indices: Option<IndexBuffer>,
    pub reversed_depth_only_indices: Option<IndexBuffer>,
    /// `[v0, v1, v2, n0, n1, n2]` per triangle, see [`build_adjacency`]
    pub adjacency_indices: Option<IndexBuffer>,
    /// One color per vertex identifying its section, for partition debugging
    pub debug_colors: Vec<Vec4>,
}

impl SkinnedRenderData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn position_stream(&self) -> Vec<u8> {
        packing::pack_positions(self.vertices.iter().map(|v| v.vertex.position))
    }

    pub fn attribute_stream(&self) -> Vec<u8> {
        let vertices: Vec<FullVertex> = self.vertices.iter().map(|v| v.vertex).collect();
        packing::pack_attributes(&vertices)
    }

    pub fn skin_stream(&self) -> Vec<u8> {
        let skin: Vec<PackedSkin> = self.vertices.iter().map(SkinnedVertex::pack_skin).collect();
        packing::pack_skin(&skin)
    }
}

/// Color ramp for section `index` of `count`: red, then green, then blue
/// saturate in turn as the index grows.
pub fn section_debug_color(index: usize, count: usize) -> Vec4 {
    let t = (index + 1) as f32 / count.max(1) as f32 * 3.0;
    Vec4::new(
        t.clamp(0.0, 1.0),
        (t - 1.0).clamp(0.0, 1.0),
        (t - 2.0).clamp(0.0, 1.0),
        1.0,
    )
}

/// Partition every polygon group and build the combined render buffers.
///
/// `weights` holds one normalised entry per control point.
pub fn build_skinned_render_data(
    mesh: &MeshDescription,
    weights: &[SkinWeight],
    config: &PipelineConfig,
    partitioner: &dyn SectionPartitioner,
    warnings: &mut Warnings,
) -> Result<SkinnedRenderData, ImportError> {
    if weights.len() != mesh.control_points.len() {
        return Err(ImportError::InvalidInput(format!(
            "{} skin weights for {} control points",
            weights.len(),
            mesh.control_points.len()
        )));
    }
    let max_bones = config.skinning.max_bones_per_section;
    let options = &config.index_buffers;

    // Partition per material group so a section never mixes materials
    let mut partitions: Vec<(MaterialId, BoneSection)> = Vec::new();
    for group in &mesh.polygon_groups {
        let triangles: Vec<TriangleBones> = group
            .polygons
            .iter()
            .map(|&polygon| {
                let corners = mesh.polygons[polygon.0 as usize]
                    .wedges
                    .into_iter()
                    .flat_map(|w| weights[mesh.wedge(w).control_point.0 as usize].bones());
                TriangleBones::new(polygon, corners)
            })
            .collect();
        for section in partitioner.partition(&triangles, max_bones)? {
            partitions.push((group.material, section));
        }
    }

    let total_indices: usize = partitions
        .iter()
        .map(|(_, s)| s.triangles.len() * 3)
        .sum();
    let optimize = total_indices <= config.index_buffers.optimize_index_limit;
    if !optimize {
        warnings.push(ImportWarning::OptimizationSkipped {
            index_count: total_indices,
            limit: config.index_buffers.optimize_index_limit,
        });
    }

    let section_count = partitions.len();
    let mut vertices = Vec::new();
    let mut debug_colors = Vec::new();
    let mut all_indices: Vec<u32> = Vec::with_capacity(total_indices);
    let mut all_adjacency: Vec<u32> = Vec::new();
    let mut all_depth: Vec<u32> = Vec::new();
    let mut sections = Vec::with_capacity(section_count);

    for (section_index, (material, section)) in partitions.iter().enumerate() {
        // Section-local vertices, deduplicated on attributes + control point
        let mut local_vertices: Vec<SkinnedVertex> = Vec::new();
        let mut lookup: HashMap<([u32; 18], u32), u32> = HashMap::new();
        let mut local_indices = Vec::with_capacity(section.triangles.len() * 3);

        for &polygon in &section.triangles {
            for wedge in mesh.polygons[polygon.0 as usize].wedges {
                let vertex = FullVertex::from_wedge(mesh, wedge);
                let control_point = mesh.wedge(wedge).control_point.0;
                let key = (vertex.bits(), control_point);
                let index = match lookup.get(&key) {
                    Some(&index) => index,
                    None => {
                        let skinned =
                            skin_vertex(vertex, &weights[control_point as usize], section)?;
                        let index = local_vertices.len() as u32;
                        local_vertices.push(skinned);
                        lookup.insert(key, index);
                        index
                    }
                };
                local_indices.push(index);
            }
        }

        if optimize {
            let mut streams = [optimize_vertex_cache(&local_indices)];
            local_vertices = reorder_vertices_by_first_use(&local_vertices, &mut streams);
            let [optimized] = streams;
            local_indices = optimized;
        }

        let base = vertices.len() as u32;
        let first_index = all_indices.len() as u32;
        all_indices.extend(local_indices.iter().map(|&i| i + base));

        if options.generate_adjacency {
            let full: Vec<FullVertex> = local_vertices.iter().map(|v| v.vertex).collect();
            let adjacency = build_adjacency(&full, &local_indices);
            all_adjacency.extend(adjacency.iter().map(|&i| i + base));
        }
        if options.generate_depth_only {
            let remap = skinned_depth_remap(&local_vertices, config.thresholds.points_are_same)?;
            let mapped: Vec<u32> = local_indices.iter().map(|&i| remap[i as usize]).collect();
            let depth = if optimize {
                optimize_vertex_cache(&mapped)
            } else {
                mapped
            };
            all_depth.extend(depth.iter().map(|&i| i + base));
        }

        sections.push(SkinnedSection {
            material: *material,
            first_index,
            triangle_count: section.triangles.len() as u32,
            min_index: base,
            max_index: base + local_vertices.len().saturating_sub(1) as u32,
            bones: section.bones.clone(),
        });

        let color = section_debug_color(section_index, section_count);
        debug_colors.extend(std::iter::repeat_n(color, local_vertices.len()));
        vertices.extend(local_vertices);
    }

    let vertex_count = vertices.len();
    let indices = IndexBuffer::from_indices(&all_indices, vertex_count);
    let reversed_indices = options
        .generate_reverse
        .then(|| IndexBuffer::from_indices(&reverse_winding(&all_indices), vertex_count));
    let adjacency_indices = options
        .generate_adjacency
        .then(|| IndexBuffer::from_indices(&all_adjacency, vertex_count));
    let depth_only_indices = options
        .generate_depth_only
        .then(|| IndexBuffer::from_indices(&all_depth, vertex_count));
    let reversed_depth_only_indices = (options.generate_depth_only
        && options.generate_reverse_depth_only)
        .then(|| IndexBuffer::from_indices(&reverse_winding(&all_depth), vertex_count));

    info!(
        "Skinned render data: {} vertices, {} indices, {} sections",
        vertex_count,
        all_indices.len(),
        sections.len()
    );

    Ok(SkinnedRenderData {
        vertices,
        sections,
        indices,
        reversed_indices,
        depth_only_indices,
        reversed_depth_only_indices,
        adjacency_indices,
        debug_colors,
    })
}

/// Map each section vertex to the first vertex at the same position with the
/// same influences; vertices that would deform differently stay apart.
fn skinned_depth_remap(vertices: &[SkinnedVertex], threshold: f32) -> Result<Vec<u32>, ImportError> {
    let positions: Vec<_> = vertices.iter().map(|v| v.vertex.position).collect();
    let overlap = OverlapIndex::build_identity(&positions, threshold)?;

    (0..vertices.len() as u32)
        .map(|i| -> Result<u32, ImportError> {
            let vertex = &vertices[i as usize];
            let target = overlap
                .find_overlapping(i)?
                .iter()
                .copied()
                .find(|&j| {
                    let other = &vertices[j as usize];
                    other.bones == vertex.bones && other.weights == vertex.weights
                })
                .unwrap_or(i);
            Ok(target.min(i))
        })
        .collect()
}

fn skin_vertex(
    vertex: FullVertex,
    weight: &SkinWeight,
    section: &BoneSection,
) -> Result<SkinnedVertex, ImportError> {
    let mut bones = [0u8; MAX_INFLUENCES];
    let mut weights = [0.0f32; MAX_INFLUENCES];
    for (slot, &(bone, w)) in weight.influences.iter().enumerate().take(MAX_INFLUENCES) {
        bones[slot] = section.local_index(bone).ok_or_else(|| {
            ImportError::InvalidInput(format!("bone {} missing from its section table", bone))
        })?;
        weights[slot] = w;
    }
    Ok(SkinnedVertex {
        vertex,
        bones,
        weights,
    })
}
