//! Input records handed over by the scene importer
//!
//! Format-specific parsing, node traversal and unit/axis conversion happen
//! before these are filled in; the pipeline only ever sees flat arrays.

use glam::{Vec2, Vec3, Vec4};

use crate::config::MAX_UV_CHANNELS;
use crate::error::ImportError;

/// Per-corner attributes, each `None` or exactly one entry per corner
#[derive(Debug, Clone, Default)]
pub struct CornerAttributes {
    pub normals: Option<Vec<Vec3>>,
    pub tangents: Option<Vec<Vec3>>,
    /// Bitangent handedness (+1 / -1), paired with `tangents`
    pub bitangent_signs: Option<Vec<f32>>,
    pub colors: Option<Vec<Vec4>>,
    /// Up to [`MAX_UV_CHANNELS`] channels
    pub uvs: Vec<Vec<Vec2>>,
}

/// Raw `(bone, weight)` pairs for one control point, in any order
pub type RawInfluences = Vec<(u16, f32)>;

/// One polygonal mesh from the scene
#[derive(Debug, Clone, Default)]
pub struct SourceMesh {
    pub name: String,
    /// Control point positions
    pub positions: Vec<Vec3>,
    /// Flattened triangle corners, each a control point index
    pub indices: Vec<u32>,
    pub corners: CornerAttributes,
    /// Material slot per triangle (index into the scene material table).
    /// Empty means every triangle uses slot 0.
    pub triangle_materials: Vec<u32>,
    /// Per-control-point skin influences, present for skinned meshes
    pub skin_weights: Option<Vec<RawInfluences>>,
}

impl SourceMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn corner_count(&self) -> usize {
        self.indices.len()
    }

    /// Material slot for a triangle
    pub fn material_slot(&self, triangle: usize) -> u32 {
        self.triangle_materials.get(triangle).copied().unwrap_or(0)
    }

    /// Check array lengths against each other
    pub fn check_layout(&self) -> Result<(), ImportError> {
        let corners = self.corner_count();
        if corners % 3 != 0 {
            return Err(self.invalid(format!(
                "index count {} is not a multiple of 3",
                corners
            )));
        }

        let attr = &self.corners;
        let per_corner = [
            ("normals", attr.normals.as_ref().map(Vec::len)),
            ("tangents", attr.tangents.as_ref().map(Vec::len)),
            ("bitangent signs", attr.bitangent_signs.as_ref().map(Vec::len)),
            ("colors", attr.colors.as_ref().map(Vec::len)),
        ];
        for (name, len) in per_corner {
            if let Some(len) = len {
                if len != corners {
                    return Err(self.invalid(format!(
                        "{} has {} entries for {} corners",
                        name, len, corners
                    )));
                }
            }
        }

        if attr.uvs.len() > MAX_UV_CHANNELS {
            return Err(self.invalid(format!(
                "{} UV channels, maximum is {}",
                attr.uvs.len(),
                MAX_UV_CHANNELS
            )));
        }
        for (channel, uvs) in attr.uvs.iter().enumerate() {
            if uvs.len() != corners {
                return Err(self.invalid(format!(
                    "UV channel {} has {} entries for {} corners",
                    channel,
                    uvs.len(),
                    corners
                )));
            }
        }

        if !self.triangle_materials.is_empty() && self.triangle_materials.len() != corners / 3 {
            return Err(self.invalid(format!(
                "{} material slots for {} triangles",
                self.triangle_materials.len(),
                corners / 3
            )));
        }

        if let Some(weights) = &self.skin_weights {
            if weights.len() != self.positions.len() {
                return Err(self.invalid(format!(
                    "{} skin weight entries for {} control points",
                    weights.len(),
                    self.positions.len()
                )));
            }
        }

        Ok(())
    }

    fn invalid(&self, detail: String) -> ImportError {
        ImportError::InvalidInput(format!("mesh '{}': {}", self.name, detail))
    }
}

/// One texture binding on a material
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialParameter {
    pub texture_path: String,
    pub uv_index: u32,
    pub is_normal_map: bool,
}

/// A material as the scene describes it
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMaterial {
    /// Identity of the material object in the source scene
    pub source_id: u64,
    pub name: String,
    /// Semantic parameter name ("diffuse", "normal", ...) to binding
    pub parameters: Vec<(String, MaterialParameter)>,
}
