//! GPU-ready buffers for static meshes
//!
//! Post-process chain over a [`MeshDescription`]:
//! 1. Compress per-corner vertices into a minimal vertex buffer
//! 2. Reorder each section for vertex cache locality (below the index limit)
//! 3. Optional adjacency, reversed, depth-only and depth-only-reversed streams
//!
//! Every index stream shares one width, picked by [`use_32_bit_indices`].

mod adjacency;
mod compress;
mod index_buffer;
mod optimize;
pub mod packing;

pub use adjacency::build_adjacency;
pub use compress::{compress_vertices, depth_only_remap};
pub use index_buffer::{IndexBuffer, use_32_bit_indices};
pub use optimize::{optimize_vertex_cache, reorder_vertices_by_first_use};

use glam::{Vec2, Vec3, Vec4};
use tracing::{debug, info};

use crate::config::{PipelineConfig, RENDER_UV_CHANNELS};
use crate::error::ImportError;
use crate::material::MaterialId;
use crate::topology::{MeshDescription, WedgeId};
use crate::warnings::{ImportWarning, Warnings};

/// Per-corner vertex record with every shading attribute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FullVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    /// Bitangent sign (+1 / -1)
    pub handedness: f32,
    pub uvs: [Vec2; RENDER_UV_CHANNELS],
    pub color: Vec4,
}

impl FullVertex {
    pub fn from_wedge(mesh: &MeshDescription, wedge: WedgeId) -> Self {
        let w = mesh.wedge(wedge);
        Self {
            position: mesh.position(w.control_point),
            normal: w.normal,
            tangent: w.tangent,
            handedness: w.binormal_sign,
            uvs: [w.uv(0), w.uv(1)],
            color: w.color,
        }
    }

    /// Raw bit pattern of every attribute
    pub fn bits(&self) -> [u32; 18] {
        let [u0, u1] = self.uvs;
        [
            self.position.x.to_bits(),
            self.position.y.to_bits(),
            self.position.z.to_bits(),
            self.normal.x.to_bits(),
            self.normal.y.to_bits(),
            self.normal.z.to_bits(),
            self.tangent.x.to_bits(),
            self.tangent.y.to_bits(),
            self.tangent.z.to_bits(),
            self.handedness.to_bits(),
            u0.x.to_bits(),
            u0.y.to_bits(),
            u1.x.to_bits(),
            u1.y.to_bits(),
            self.color.x.to_bits(),
            self.color.y.to_bits(),
            self.color.z.to_bits(),
            self.color.w.to_bits(),
        ]
    }

    /// Bit-exact attribute equality (distinguishes -0.0 and NaN payloads)
    pub fn same_as(&self, other: &FullVertex) -> bool {
        self.bits() == other.bits()
    }
}

/// A contiguous run of triangles sharing one material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshSection {
    pub material: MaterialId,
    pub first_index: u32,
    pub triangle_count: u32,
    pub min_index: u32,
    pub max_index: u32,
}

impl MeshSection {
    pub fn index_count(&self) -> u32 {
        self.triangle_count * 3
    }

    /// Offset of this section in the adjacency stream (6 indices per triangle)
    pub fn adjacency_first_index(&self) -> u32 {
        self.first_index * 2
    }
}

/// Compact vertex buffer plus every index stream of a static mesh
#[derive(Debug, Clone)]
pub struct StaticRenderData {
    pub vertices: Vec<FullVertex>,
    pub sections: Vec<MeshSection>,
    pub indices: IndexBuffer,
    pub reversed_indices: Option<IndexBuffer>,
    pub depth_only_indices: Option<IndexBuffer>,
    pub reversed_depth_only_indices: Option<IndexBuffer>,
    /// `[v0, v1, v2, n0, n1, n2]` per triangle, see [`build_adjacency`]
    pub adjacency_indices: Option<IndexBuffer>,
}

impl StaticRenderData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn use_32_bit_indices(&self) -> bool {
        self.indices.is_32_bit()
    }

    /// Position stream (f32x3 per vertex)
    pub fn position_stream(&self) -> Vec<u8> {
        packing::pack_positions(self.vertices.iter().map(|v| v.position))
    }

    /// Interleaved attribute stream, see [`packing::PackedAttributes`]
    pub fn attribute_stream(&self) -> Vec<u8> {
        packing::pack_attributes(&self.vertices)
    }
}

/// Run the full post-process chain over a mesh description
pub fn build_static_render_data(
    mesh: &MeshDescription,
    config: &PipelineConfig,
    warnings: &mut Warnings,
) -> Result<StaticRenderData, ImportError> {
    let options = &config.index_buffers;
    let threshold = config.thresholds.points_are_same;

    // One corner list per polygon group
    let mut corners = Vec::with_capacity(mesh.wedges.len());
    let mut sections: Vec<Vec<u32>> = Vec::with_capacity(mesh.polygon_groups.len());
    for group in &mesh.polygon_groups {
        let mut section = Vec::with_capacity(group.polygons.len() * 3);
        for polygon in &group.polygons {
            for wedge in mesh.polygons[polygon.0 as usize].wedges {
                section.push(corners.len() as u32);
                corners.push(FullVertex::from_wedge(mesh, wedge));
            }
        }
        sections.push(section);
    }

    let (mut vertices, remap) = compress_vertices(&corners, threshold)?;
    for section in &mut sections {
        for index in section.iter_mut() {
            *index = remap[*index as usize];
        }
    }
    debug!(
        "Compressed {} corners to {} vertices",
        corners.len(),
        vertices.len()
    );

    let total_indices: usize = sections.iter().map(Vec::len).sum();
    let optimize = total_indices <= options.optimize_index_limit;
    if optimize {
        for section in &mut sections {
            *section = optimize_vertex_cache(section);
        }
        vertices = reorder_vertices_by_first_use(&vertices, &mut sections);
    } else {
        warnings.push(ImportWarning::OptimizationSkipped {
            index_count: total_indices,
            limit: options.optimize_index_limit,
        });
    }

    let vertex_count = vertices.len();
    let flatten = |streams: &[Vec<u32>]| -> IndexBuffer {
        let flat: Vec<u32> = streams.iter().flatten().copied().collect();
        IndexBuffer::from_indices(&flat, vertex_count)
    };

    let adjacency_indices = options.generate_adjacency.then(|| {
        let streams: Vec<Vec<u32>> = sections
            .iter()
            .map(|s| build_adjacency(&vertices, s))
            .collect();
        flatten(&streams)
    });

    let reversed_indices = options.generate_reverse.then(|| {
        let streams: Vec<Vec<u32>> = sections.iter().map(|s| reverse_winding(s)).collect();
        flatten(&streams)
    });

    let mut depth_only_indices = None;
    let mut reversed_depth_only_indices = None;
    if options.generate_depth_only {
        let depth_remap = depth_only_remap(&vertices, threshold)?;
        let depth_sections: Vec<Vec<u32>> = sections
            .iter()
            .map(|s| {
                let mapped: Vec<u32> = s.iter().map(|&i| depth_remap[i as usize]).collect();
                if optimize {
                    optimize_vertex_cache(&mapped)
                } else {
                    mapped
                }
            })
            .collect();

        if options.generate_reverse_depth_only {
            let streams: Vec<Vec<u32>> =
                depth_sections.iter().map(|s| reverse_winding(s)).collect();
            reversed_depth_only_indices = Some(flatten(&streams));
        }
        depth_only_indices = Some(flatten(&depth_sections));
    }

    let mut first_index = 0u32;
    let mesh_sections = mesh
        .polygon_groups
        .iter()
        .zip(&sections)
        .map(|(group, indices)| {
            let section = MeshSection {
                material: group.material,
                first_index,
                triangle_count: (indices.len() / 3) as u32,
                min_index: indices.iter().copied().min().unwrap_or(0),
                max_index: indices.iter().copied().max().unwrap_or(0),
            };
            first_index += indices.len() as u32;
            section
        })
        .collect();

    let indices = flatten(&sections);
    info!(
        "Render data: {} vertices, {} indices ({}-bit), {} sections",
        vertex_count,
        indices.len(),
        if indices.is_32_bit() { 32 } else { 16 },
        sections.len()
    );

    Ok(StaticRenderData {
        vertices,
        sections: mesh_sections,
        indices,
        reversed_indices,
        depth_only_indices,
        reversed_depth_only_indices,
        adjacency_indices,
    })
}

/// Flip the winding of every triangle
pub fn reverse_winding(indices: &[u32]) -> Vec<u32> {
    indices
        .chunks_exact(3)
        .flat_map(|tri| [tri[2], tri[1], tri[0]])
        .collect()
}
