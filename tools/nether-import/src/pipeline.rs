//! Per-asset entry points
//!
//! Each function runs every stage for one mesh, skeleton or clip and either
//! returns the finished asset with its warnings or the first fatal error.
//! Materials must be registered in the [`MaterialCache`] before any mesh is
//! imported; the cache is only read from here on. Renames the cache made to
//! the materials a mesh uses are copied onto that mesh's warnings.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::ImportError;
use crate::material::{MaterialCache, MaterialId};
use crate::render::{StaticRenderData, build_static_render_data};
use crate::skeleton::{AnimationClip, SceneGraph, Skeleton, SkinCluster, build_skeleton, resample_animation};
use crate::skin::{
    GreedyFirstFit, SectionPartitioner, SkinWeight, SkinnedRenderData, build_skinned_render_data,
    normalize_skin_weights,
};
use crate::source::SourceMesh;
use crate::topology::{MeshDescription, build_mesh_description};
use crate::warnings::Warnings;

/// A static mesh after the full post-process chain
#[derive(Debug, Clone)]
pub struct ImportedStaticMesh {
    pub name: String,
    pub description: MeshDescription,
    pub render: StaticRenderData,
    pub warnings: Warnings,
}

/// A skinned mesh split into bone-bounded sections
#[derive(Debug, Clone)]
pub struct ImportedSkinnedMesh {
    pub name: String,
    pub description: MeshDescription,
    /// Normalised influences, one per control point
    pub skin_weights: Vec<SkinWeight>,
    pub render: SkinnedRenderData,
    pub warnings: Warnings,
}

/// A skeleton with the warnings raised while resolving its bind pose
#[derive(Debug, Clone)]
pub struct ImportedSkeleton {
    pub skeleton: Skeleton,
    pub warnings: Warnings,
}

/// Import one static mesh.
///
/// `slots` maps the mesh's material slots to ids registered in `materials`.
pub fn import_static_mesh(
    source: &SourceMesh,
    materials: &MaterialCache,
    slots: &[MaterialId],
    config: &PipelineConfig,
) -> Result<ImportedStaticMesh, ImportError> {
    check_slots(materials, slots)?;
    let mut warnings = Warnings::new();
    warnings.extend(materials.warnings_for(slots));

    let description = build_mesh_description(source, slots, config, &mut warnings)?;
    let render = build_static_render_data(&description, config, &mut warnings)?;

    info!(
        "Imported static mesh '{}': {} vertices, {} sections, {} warnings",
        source.name,
        render.vertex_count(),
        render.sections.len(),
        warnings.len()
    );

    Ok(ImportedStaticMesh {
        name: source.name.clone(),
        description,
        render,
        warnings,
    })
}

/// Import independent static meshes in parallel.
///
/// Results come back in input order; one mesh failing does not affect the others.
pub fn import_static_meshes(
    sources: &[SourceMesh],
    materials: &MaterialCache,
    slots: &[MaterialId],
    config: &PipelineConfig,
) -> Vec<Result<ImportedStaticMesh, ImportError>> {
    debug!("Importing {} static meshes", sources.len());
    sources
        .par_iter()
        .map(|source| import_static_mesh(source, materials, slots, config))
        .collect()
}

/// Import one skinned mesh with the default greedy partitioner
pub fn import_skinned_mesh(
    source: &SourceMesh,
    materials: &MaterialCache,
    slots: &[MaterialId],
    config: &PipelineConfig,
) -> Result<ImportedSkinnedMesh, ImportError> {
    import_skinned_mesh_with(source, materials, slots, config, &GreedyFirstFit)
}

/// Import one skinned mesh with a caller-supplied section partitioner
pub fn import_skinned_mesh_with(
    source: &SourceMesh,
    materials: &MaterialCache,
    slots: &[MaterialId],
    config: &PipelineConfig,
    partitioner: &dyn SectionPartitioner,
) -> Result<ImportedSkinnedMesh, ImportError> {
    check_slots(materials, slots)?;
    let raw = source.skin_weights.as_ref().ok_or_else(|| {
        ImportError::InvalidInput(format!("mesh '{}' has no skin weights", source.name))
    })?;

    let mut warnings = Warnings::new();
    warnings.extend(materials.warnings_for(slots));
    let description = build_mesh_description(source, slots, config, &mut warnings)?;
    let skin_weights = normalize_skin_weights(raw, &config.skinning, &mut warnings);
    let render = build_skinned_render_data(
        &description,
        &skin_weights,
        config,
        partitioner,
        &mut warnings,
    )?;

    info!(
        "Imported skinned mesh '{}': {} vertices, {} sections, {} warnings",
        source.name,
        render.vertex_count(),
        render.sections.len(),
        warnings.len()
    );

    Ok(ImportedSkinnedMesh {
        name: source.name.clone(),
        description,
        skin_weights,
        render,
        warnings,
    })
}

/// Build the skeleton referenced by a mesh's skin clusters
pub fn import_skeleton<S: SceneGraph>(
    scene: &mut S,
    clusters: &[SkinCluster],
) -> Result<ImportedSkeleton, ImportError> {
    let mut warnings = Warnings::new();
    let skeleton = build_skeleton(scene, clusters, &mut warnings)?;
    Ok(ImportedSkeleton { skeleton, warnings })
}

/// Resample a clip at the configured rate
pub fn import_animation<S: SceneGraph + ?Sized>(
    scene: &S,
    skeleton: &Skeleton,
    name: &str,
    duration: f32,
    config: &PipelineConfig,
) -> Result<AnimationClip, ImportError> {
    resample_animation(scene, skeleton, name, duration, config.animation.sample_rate)
}

fn check_slots(materials: &MaterialCache, slots: &[MaterialId]) -> Result<(), ImportError> {
    match slots.iter().find(|&&id| materials.get(id).is_none()) {
        Some(id) => Err(ImportError::InvalidInput(format!(
            "material {} is not registered ({} materials)",
            id.0,
            materials.len()
        ))),
        None => Ok(()),
    }
}
