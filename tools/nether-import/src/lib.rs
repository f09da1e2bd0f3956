//! nether-import library
//!
//! Turns polygonal scene data handed over by a format importer into a
//! topological mesh model and GPU-ready buffers: welded vertices, cache
//! optimised index streams, bone-bounded skinned sections, a parent-first
//! skeleton and fixed-rate animation clips.
//!
//! Scene parsing, file I/O and GPU upload are the caller's job. Start with
//! [`pipeline`] for whole-asset entry points, or use the stage modules
//! directly.

pub mod config;
pub mod error;
pub mod material;
pub mod overlap;
pub mod pipeline;
pub mod render;
pub mod skeleton;
pub mod skin;
pub mod source;
pub mod topology;
pub mod warnings;

// Configuration and diagnostics
pub use config::{ConfigError, PipelineConfig};
pub use error::{ImportError, OverlapError, TopologyError};
pub use warnings::{ImportWarning, RenameKind, Warnings};

// Inputs
pub use material::{ImportedMaterial, MaterialCache, MaterialId};
pub use source::{CornerAttributes, MaterialParameter, RawInfluences, SourceMaterial, SourceMesh};

// Whole-asset entry points
pub use pipeline::{
    ImportedSkeleton, ImportedSkinnedMesh, ImportedStaticMesh, import_animation, import_skeleton,
    import_skinned_mesh, import_skinned_mesh_with, import_static_mesh, import_static_meshes,
};

// Stage outputs
pub use overlap::OverlapIndex;
pub use render::{FullVertex, IndexBuffer, MeshSection, StaticRenderData};
pub use skeleton::{
    AnimationClip, AnimationTrack, Bone, BoneTransform, NodeId, NodeKind, SceneGraph, Skeleton,
    SkinCluster,
};
pub use skin::{SectionPartitioner, SkinWeight, SkinnedRenderData, SkinnedSection, SkinnedVertex};
pub use topology::MeshDescription;
