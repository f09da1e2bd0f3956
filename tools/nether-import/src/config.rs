//! Pipeline configuration (import.toml)
//!
//! Every key has a default, so an empty document yields the stock pipeline.
//!
//! ```toml
//! [thresholds]
//! points_are_same = 0.00002
//! points_are_near = 0.015
//!
//! [index_buffers]
//! generate_reverse = true
//! generate_depth_only = true
//!
//! [skinning]
//! max_bones_per_section = 64
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Maximum bone influences a single vertex can carry.
pub const MAX_INFLUENCES: usize = 8;

/// Maximum UV channels carried per wedge.
pub const MAX_UV_CHANNELS: usize = 8;

/// UV channels emitted into the compact vertex buffer.
pub const RENDER_UV_CHANNELS: usize = 2;

/// Local bone indices are stored as u8, so a section can address at most 256 bones.
pub const MAX_SECTION_BONES_LIMIT: u32 = 256;

/// Invalid configuration values
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("points_are_same ({same}) must not exceed points_are_near ({near})")]
    ThresholdOrder { same: f32, near: f32 },

    #[error("threshold '{name}' must be finite and non-negative, got {value}")]
    InvalidThreshold { name: &'static str, value: f32 },

    #[error("max_bones_per_section must be in 1..={MAX_SECTION_BONES_LIMIT}, got {0}")]
    BonesPerSection(u32),

    #[error("max_influences must be in 1..={MAX_INFLUENCES}, got {0}")]
    Influences(usize),

    #[error("animation sample_rate must be positive, got {0}")]
    SampleRate(f32),

    #[error("generate_reverse_depth_only requires generate_depth_only")]
    ReverseDepthWithoutDepth,
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub index_buffers: IndexBufferOptions,
    #[serde(default)]
    pub mesh: MeshOptions,
    #[serde(default)]
    pub skinning: SkinningOptions,
    #[serde(default)]
    pub animation: AnimationOptions,
}

/// Distance thresholds shared by every stage
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
    /// Positions closer than this are the same point (welding, depth-only dedup).
    #[serde(default = "default_points_are_same")]
    pub points_are_same: f32,

    /// Positions closer than this make a triangle degenerate.
    #[serde(default = "default_points_are_near")]
    pub points_are_near: f32,
}

fn default_points_are_same() -> f32 {
    0.00002
}

fn default_points_are_near() -> f32 {
    0.015
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            points_are_same: default_points_are_same(),
            points_are_near: default_points_are_near(),
        }
    }
}

/// Toggles for the auxiliary index streams
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexBufferOptions {
    #[serde(default)]
    pub generate_reverse: bool,
    #[serde(default)]
    pub generate_depth_only: bool,
    #[serde(default)]
    pub generate_reverse_depth_only: bool,
    #[serde(default)]
    pub generate_adjacency: bool,

    /// Vertex-cache optimisation is skipped above this many indices.
    #[serde(default = "default_optimize_index_limit")]
    pub optimize_index_limit: usize,
}

fn default_optimize_index_limit() -> usize {
    300_000
}

impl Default for IndexBufferOptions {
    fn default() -> Self {
        Self {
            generate_reverse: false,
            generate_depth_only: false,
            generate_reverse_depth_only: false,
            generate_adjacency: false,
            optimize_index_limit: default_optimize_index_limit(),
        }
    }
}

/// Mesh construction options
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshOptions {
    #[serde(default = "default_true")]
    pub remove_degenerates: bool,

    /// Generate smooth normals when the source has none.
    #[serde(default = "default_true")]
    pub compute_normals: bool,

    /// Generate tangents when the source has none.
    #[serde(default = "default_true")]
    pub compute_tangents: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            remove_degenerates: true,
            compute_normals: true,
            compute_tangents: true,
        }
    }
}

/// Skin weight and section partition options
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkinningOptions {
    /// Size of the per-section bone matrix palette.
    #[serde(default = "default_max_bones_per_section")]
    pub max_bones_per_section: u32,

    #[serde(default = "default_max_influences")]
    pub max_influences: usize,

    /// Warn when truncating influences discards more than this fraction of a
    /// vertex's total weight. Negative disables the warning.
    #[serde(default = "default_discarded_weight_warning")]
    pub discarded_weight_warning: f32,
}

fn default_max_bones_per_section() -> u32 {
    64
}

fn default_max_influences() -> usize {
    MAX_INFLUENCES
}

fn default_discarded_weight_warning() -> f32 {
    0.05
}

impl Default for SkinningOptions {
    fn default() -> Self {
        Self {
            max_bones_per_section: default_max_bones_per_section(),
            max_influences: default_max_influences(),
            discarded_weight_warning: default_discarded_weight_warning(),
        }
    }
}

/// Animation resampling options
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnimationOptions {
    /// Samples per second
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f32,
}

fn default_sample_rate() -> f32 {
    30.0
}

impl Default for AnimationOptions {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read import config: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse import config")?;
        config.validate().context("Invalid import config")?;
        Ok(config)
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        for (name, value) in [
            ("points_are_same", t.points_are_same),
            ("points_are_near", t.points_are_near),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        if t.points_are_same > t.points_are_near {
            return Err(ConfigError::ThresholdOrder {
                same: t.points_are_same,
                near: t.points_are_near,
            });
        }

        let bones = self.skinning.max_bones_per_section;
        if bones == 0 || bones > MAX_SECTION_BONES_LIMIT {
            return Err(ConfigError::BonesPerSection(bones));
        }

        let influences = self.skinning.max_influences;
        if influences == 0 || influences > MAX_INFLUENCES {
            return Err(ConfigError::Influences(influences));
        }

        let rate = self.animation.sample_rate;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(ConfigError::SampleRate(rate));
        }

        let ib = &self.index_buffers;
        if ib.generate_reverse_depth_only && !ib.generate_depth_only {
            return Err(ConfigError::ReverseDepthWithoutDepth);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PipelineConfig::parse("").unwrap();
        assert_eq!(config.thresholds.points_are_same, 0.00002);
        assert_eq!(config.thresholds.points_are_near, 0.015);
        assert_eq!(config.index_buffers.optimize_index_limit, 300_000);
        assert!(!config.index_buffers.generate_adjacency);
        assert!(config.mesh.remove_degenerates);
        assert_eq!(config.skinning.max_bones_per_section, 64);
        assert_eq!(config.skinning.max_influences, 8);
        assert_eq!(config.animation.sample_rate, 30.0);
    }

    #[test]
    fn test_config_sections() {
        let toml = r#"
[thresholds]
points_are_same = 0.001
points_are_near = 0.01

[index_buffers]
generate_reverse = true
generate_depth_only = true
generate_reverse_depth_only = true
generate_adjacency = true
optimize_index_limit = 1000

[skinning]
max_bones_per_section = 75
max_influences = 4

[animation]
sample_rate = 60.0
"#;
        let config = PipelineConfig::parse(toml).unwrap();
        assert_eq!(config.thresholds.points_are_same, 0.001);
        assert!(config.index_buffers.generate_reverse);
        assert!(config.index_buffers.generate_reverse_depth_only);
        assert_eq!(config.index_buffers.optimize_index_limit, 1000);
        assert_eq!(config.skinning.max_bones_per_section, 75);
        assert_eq!(config.skinning.max_influences, 4);
        assert_eq!(config.animation.sample_rate, 60.0);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(PipelineConfig::parse("[mesh]\nweld = true\n").is_err());
    }

    #[test]
    fn test_threshold_order_rejected() {
        let toml = "[thresholds]\npoints_are_same = 0.5\npoints_are_near = 0.1\n";
        assert!(PipelineConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = PipelineConfig::default();
        config.skinning.max_bones_per_section = 300;
        assert_eq!(config.validate(), Err(ConfigError::BonesPerSection(300)));

        let mut config = PipelineConfig::default();
        config.skinning.max_influences = 9;
        assert_eq!(config.validate(), Err(ConfigError::Influences(9)));

        let mut config = PipelineConfig::default();
        config.animation.sample_rate = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::SampleRate(0.0)));

        let mut config = PipelineConfig::default();
        config.index_buffers.generate_reverse_depth_only = true;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ReverseDepthWithoutDepth)
        );
    }
}
