//! Imported materials and the scene-wide dedup cache
//!
//! The cache is filled once, serially, before any mesh is imported
//! (`register` needs `&mut`), then shared read-only across mesh imports.

use hashbrown::{HashMap, HashSet};

use crate::source::{MaterialParameter, SourceMaterial};
use crate::warnings::{ImportWarning, RenameKind, Warnings};

/// Index into [`MaterialCache::materials`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// A deduplicated material ready to be referenced by polygon groups
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedMaterial {
    pub name: String,
    pub source_id: u64,
    pub parameters: HashMap<String, MaterialParameter>,
}

impl ImportedMaterial {
    pub fn parameter(&self, semantic: &str) -> Option<&MaterialParameter> {
        self.parameters.get(semantic)
    }
}

/// Scene-wide material table keyed by source identity
#[derive(Debug, Default)]
pub struct MaterialCache {
    materials: Vec<ImportedMaterial>,
    by_source: HashMap<u64, MaterialId>,
    names: HashSet<String>,
    /// Material for scenes without any
    fallback: Option<MaterialId>,
    warnings: Warnings,
}

impl MaterialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a material, returning the existing id if its source was seen before
    pub fn register(&mut self, source: &SourceMaterial) -> MaterialId {
        if let Some(&id) = self.by_source.get(&source.source_id) {
            return id;
        }

        let name = self.unique_name(&source.name);
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(ImportedMaterial {
            name,
            source_id: source.source_id,
            parameters: source.parameters.iter().cloned().collect(),
        });
        self.by_source.insert(source.source_id, id);
        id
    }

    /// Register a scene's material table; the returned ids are indexed by material slot.
    ///
    /// A scene without materials gets a single fallback slot.
    pub fn register_scene(&mut self, sources: &[SourceMaterial]) -> Vec<MaterialId> {
        if sources.is_empty() {
            return vec![self.fallback()];
        }
        sources.iter().map(|s| self.register(s)).collect()
    }

    /// Material for scenes that declare none
    pub fn fallback(&mut self) -> MaterialId {
        if let Some(id) = self.fallback {
            return id;
        }
        let name = self.unique_name("default");
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(ImportedMaterial {
            name,
            source_id: u64::MAX,
            parameters: HashMap::new(),
        });
        self.fallback = Some(id);
        id
    }

    pub fn get(&self, id: MaterialId) -> Option<&ImportedMaterial> {
        self.materials.get(id.0 as usize)
    }

    pub fn by_source(&self, source_id: u64) -> Option<MaterialId> {
        self.by_source.get(&source_id).copied()
    }

    pub fn materials(&self) -> &[ImportedMaterial] {
        &self.materials
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Renames recorded while registering
    pub fn warnings(&self) -> &Warnings {
        &self.warnings
    }

    /// Renames that produced the materials in `ids`
    pub fn warnings_for(&self, ids: &[MaterialId]) -> Warnings {
        let used: HashSet<&str> = ids
            .iter()
            .filter_map(|&id| self.get(id))
            .map(|m| m.name.as_str())
            .collect();
        self.warnings
            .iter()
            .filter(|w| match w {
                ImportWarning::Renamed { to, .. } => used.contains(to.as_str()),
                _ => false,
            })
            .cloned()
            .collect()
    }

    fn unique_name(&mut self, requested: &str) -> String {
        let base = if requested.trim().is_empty() {
            "material"
        } else {
            requested
        };

        let mut name = base.to_string();
        let mut suffix = 1;
        while self.names.contains(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        if name != requested {
            self.warnings.push(ImportWarning::Renamed {
                kind: RenameKind::Material,
                from: requested.to_string(),
                to: name.clone(),
            });
        }
        self.names.insert(name.clone());
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(source_id: u64, name: &str) -> SourceMaterial {
        SourceMaterial {
            source_id,
            name: name.to_string(),
            parameters: vec![(
                "diffuse".to_string(),
                MaterialParameter {
                    texture_path: format!("{}.png", name),
                    uv_index: 0,
                    is_normal_map: false,
                },
            )],
        }
    }

    #[test]
    fn test_dedup_by_source_identity() {
        let mut cache = MaterialCache::new();
        let a = cache.register(&material(7, "skin"));
        let b = cache.register(&material(7, "skin"));
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
        assert!(cache.warnings().is_empty());
    }

    #[test]
    fn test_duplicate_name_renamed() {
        let mut cache = MaterialCache::new();
        let ids = cache.register_scene(&[material(1, "metal"), material(2, "metal")]);
        assert_eq!(cache.get(ids[0]).unwrap().name, "metal");
        assert_eq!(cache.get(ids[1]).unwrap().name, "metal_1");
        assert_eq!(cache.warnings().len(), 1);
    }

    #[test]
    fn test_empty_name_renamed() {
        let mut cache = MaterialCache::new();
        let id = cache.register(&material(3, ""));
        assert_eq!(cache.get(id).unwrap().name, "material");
        assert_eq!(cache.warnings().len(), 1);
    }

    #[test]
    fn test_parameters_by_semantic() {
        let mut cache = MaterialCache::new();
        let id = cache.register(&material(4, "cloth"));
        let diffuse = cache.get(id).unwrap().parameter("diffuse").unwrap();
        assert_eq!(diffuse.texture_path, "cloth.png");
        assert!(cache.get(id).unwrap().parameter("normal").is_none());
    }

    #[test]
    fn test_empty_scene_gets_fallback_slot() {
        let mut cache = MaterialCache::new();
        let a = cache.register_scene(&[]);
        let b = cache.register_scene(&[]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
        assert_eq!(cache.get(a[0]).unwrap().name, "default");
    }
}
