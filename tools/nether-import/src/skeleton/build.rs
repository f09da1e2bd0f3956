//! Skeleton construction from skin clusters
//!
//! Phases: discover bone nodes, order them parent-first, resolve each bone's
//! bind-pose global matrix, derive local transforms, then sanity-check.

use glam::Mat4;
use hashbrown::{HashMap, HashSet};
use tracing::{debug, info};

use super::{Bone, BoneTransform, NodeId, NodeKind, SceneGraph, Skeleton, SkinCluster};
use crate::error::ImportError;
use crate::warnings::{ImportWarning, RenameKind, Warnings};

/// Scale components below this make a bind transform unusable
const MIN_BIND_SCALE: f32 = 1e-6;

/// Build a single-rooted, parent-first skeleton from skin clusters
pub fn build_skeleton<S: SceneGraph>(
    scene: &mut S,
    clusters: &[SkinCluster],
    warnings: &mut Warnings,
) -> Result<Skeleton, ImportError> {
    if clusters.is_empty() {
        return Err(ImportError::NoBones);
    }

    let nodes = discover(scene, clusters);
    let order = order_parent_first(scene, &nodes)?;
    let globals = resolve_bind_globals(scene, clusters, &order, warnings);

    let index_of: HashMap<NodeId, usize> =
        order.iter().enumerate().map(|(i, &node)| (node, i)).collect();
    let names = unique_bone_names(scene, &order, warnings);

    let mut bones: Vec<Bone> = Vec::with_capacity(order.len());
    for (i, (&node, name)) in order.iter().zip(names).enumerate() {
        let parent = scene.parent(node).and_then(|p| index_of.get(&p).copied());
        let global = globals[i];
        let local = match parent {
            Some(p) => globals[p].inverse() * global,
            None => global,
        };

        if let Some(reason) = invalid_transform_reason(&local) {
            warnings.push(ImportWarning::InvalidBindTransform {
                bone: name.clone(),
                reason,
            });
        }

        if let Some(p) = parent {
            bones[p].children.push(i);
        }
        bones.push(Bone {
            name,
            node,
            parent,
            children: Vec::new(),
            bind_local: BoneTransform::from_matrix(&local),
            bind_local_matrix: local,
            inverse_bind_global: global.inverse(),
        });
    }

    info!(
        "Built skeleton: {} bones, root '{}'",
        bones.len(),
        bones.first().map_or("", |b| b.name.as_str())
    );
    Ok(Skeleton::from_bones(bones))
}

/// Cluster bones plus their ancestors.
///
/// When every bone shares an ancestor that is a mesh, null or skeleton node,
/// chains are followed up to and including the deepest such ancestor.
/// Otherwise each chain is followed through skeleton nodes only.
fn discover<S: SceneGraph>(scene: &S, clusters: &[SkinCluster]) -> HashSet<NodeId> {
    let chains: Vec<Vec<NodeId>> = clusters
        .iter()
        .map(|c| {
            let mut chain = vec![c.bone_node];
            let mut node = c.bone_node;
            while let Some(parent) = scene.parent(node) {
                chain.push(parent);
                node = parent;
            }
            chain
        })
        .collect();

    let common = deepest_common_ancestor(&chains).filter(|&node| {
        matches!(
            scene.kind(node),
            NodeKind::Mesh | NodeKind::Null | NodeKind::Skeleton
        )
    });

    let mut nodes = HashSet::new();
    for chain in &chains {
        match common {
            Some(stop) => {
                for &node in chain {
                    nodes.insert(node);
                    if node == stop {
                        break;
                    }
                }
            }
            None => {
                nodes.insert(chain[0]);
                for &node in &chain[1..] {
                    if scene.kind(node) != NodeKind::Skeleton {
                        break;
                    }
                    nodes.insert(node);
                }
            }
        }
    }
    debug!(
        "Discovered {} bone nodes from {} clusters (common ancestor: {:?})",
        nodes.len(),
        clusters.len(),
        common
    );
    nodes
}

/// Deepest node present in every bottom-up chain
fn deepest_common_ancestor(chains: &[Vec<NodeId>]) -> Option<NodeId> {
    let (first, rest) = chains.split_first()?;
    let sets: Vec<HashSet<NodeId>> = rest.iter().map(|c| c.iter().copied().collect()).collect();
    first
        .iter()
        .copied()
        .find(|node| sets.iter().all(|set| set.contains(node)))
}

/// Depth-first, parent before children, siblings by node id
fn order_parent_first<S: SceneGraph>(
    scene: &S,
    nodes: &HashSet<NodeId>,
) -> Result<Vec<NodeId>, ImportError> {
    let mut roots: Vec<NodeId> = nodes
        .iter()
        .copied()
        .filter(|&n| scene.parent(n).is_none_or(|p| !nodes.contains(&p)))
        .collect();
    roots.sort_unstable();

    if roots.len() != 1 {
        return Err(ImportError::MultipleRoots(
            roots
                .iter()
                .map(|&r| scene.node_name(r).to_string())
                .collect(),
        ));
    }

    let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &node in nodes {
        if let Some(parent) = scene.parent(node) {
            if nodes.contains(&parent) {
                children.entry(parent).or_default().push(node);
            }
        }
    }

    let mut order = Vec::with_capacity(nodes.len());
    let mut stack = vec![roots[0]];
    while let Some(node) = stack.pop() {
        order.push(node);
        if let Some(kids) = children.get_mut(&node) {
            // Reverse so the smallest id is visited first
            kids.sort_unstable_by(|a, b| b.cmp(a));
            stack.extend(kids.iter().copied());
        }
    }
    Ok(order)
}

/// Bind-pose global matrix per ordered bone.
///
/// Priority: the scene's bind pose, then the cluster link transform, then
/// the time-zero transform. A scene without any bind pose gets one
/// regeneration attempt before the whole skeleton falls back to time zero.
fn resolve_bind_globals<S: SceneGraph>(
    scene: &mut S,
    clusters: &[SkinCluster],
    order: &[NodeId],
    warnings: &mut Warnings,
) -> Vec<Mat4> {
    let count_poses = |scene: &S| order.iter().filter(|&&n| scene.bind_pose(n).is_some()).count();

    let mut poses = count_poses(&*scene);
    if poses == 0 && scene.regenerate_bind_poses() {
        poses = count_poses(&*scene);
        debug!("Regenerated bind poses: {} found", poses);
    }

    if poses == 0 {
        warnings.push(ImportWarning::BindPoseFallback);
        return order
            .iter()
            .map(|&n| scene.evaluate_global_transform(n, 0.0))
            .collect();
    }

    let links: HashMap<NodeId, Mat4> = clusters
        .iter()
        .filter_map(|c| c.link_transform.map(|m| (c.bone_node, m)))
        .collect();

    order
        .iter()
        .map(|&node| {
            if let Some(pose) = scene.bind_pose(node) {
                return pose;
            }
            if let Some(&link) = links.get(&node) {
                debug!("Bone '{}': bind from cluster link", scene.node_name(node));
                return link;
            }
            warnings.push(ImportWarning::MissingFromBindPose {
                bone: scene.node_name(node).to_string(),
            });
            scene.evaluate_global_transform(node, 0.0)
        })
        .collect()
}

fn unique_bone_names<S: SceneGraph>(
    scene: &S,
    order: &[NodeId],
    warnings: &mut Warnings,
) -> Vec<String> {
    let mut taken = HashSet::new();
    order
        .iter()
        .map(|&node| {
            let requested = scene.node_name(node);
            let base = if requested.trim().is_empty() {
                "bone"
            } else {
                requested
            };
            let mut name = base.to_string();
            let mut suffix = 1;
            while taken.contains(&name) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            if name != requested {
                warnings.push(ImportWarning::Renamed {
                    kind: RenameKind::Bone,
                    from: requested.to_string(),
                    to: name.clone(),
                });
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

fn invalid_transform_reason(local: &Mat4) -> Option<&'static str> {
    if !local.is_finite() {
        return Some("non-finite values");
    }
    let (scale, _, _) = local.to_scale_rotation_translation();
    if scale.abs().min_element() < MIN_BIND_SCALE {
        return Some("near-zero scale");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::super::test_scene::TestScene;
    use super::*;
    use glam::Vec3;

    /// scene root -> armature (null) -> hips -> {spine -> head, leg}
    fn humanoid() -> (TestScene, Vec<NodeId>) {
        let mut scene = TestScene::default();
        let root = scene.add("scene", None, NodeKind::Other, Vec3::ZERO);
        let armature = scene.add("armature", Some(root), NodeKind::Null, Vec3::ZERO);
        let hips = scene.add("hips", Some(armature), NodeKind::Skeleton, Vec3::Y);
        let spine = scene.add("spine", Some(hips), NodeKind::Skeleton, Vec3::Y);
        let head = scene.add("head", Some(spine), NodeKind::Skeleton, Vec3::Y);
        let leg = scene.add("leg", Some(hips), NodeKind::Skeleton, Vec3::NEG_Y);
        (scene, vec![armature, hips, spine, head, leg])
    }

    fn clusters(nodes: &[NodeId]) -> Vec<SkinCluster> {
        nodes
            .iter()
            .map(|&bone_node| SkinCluster {
                bone_node,
                link_transform: None,
            })
            .collect()
    }

    #[test]
    fn test_parent_first_single_root() {
        let (mut scene, nodes) = humanoid();
        scene.set_bind_poses(&nodes);
        let mut warnings = Warnings::new();
        let skeleton =
            build_skeleton(&mut scene, &clusters(&nodes[2..]), &mut warnings).unwrap();

        // Deepest common ancestor of head and leg is hips
        assert_eq!(skeleton.len(), 4);
        assert_eq!(skeleton.bones[0].name, "hips");
        assert!(skeleton.validate_ordering());
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);

        let head = skeleton.bone_by_name("head").unwrap();
        let global = skeleton.global_bind_matrix(head);
        assert!((global.w_axis.truncate() - Vec3::new(0.0, 3.0, 0.0)).length() < 1e-5);
        let inverse = skeleton.bones[head].inverse_bind_global;
        assert!((inverse * global).abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_common_null_ancestor_included() {
        let (mut scene, nodes) = humanoid();
        let prop = scene.add("prop", Some(nodes[0]), NodeKind::Skeleton, Vec3::X);
        scene.set_bind_poses(&[nodes[0], nodes[1], nodes[3], prop]);
        let mut warnings = Warnings::new();
        let skeleton = build_skeleton(
            &mut scene,
            &clusters(&[nodes[3], prop]),
            &mut warnings,
        )
        .unwrap();
        assert_eq!(skeleton.bones[0].name, "armature");
        assert_eq!(skeleton.len(), 5);
        // spine has no bind pose and no link
        assert_eq!(
            warnings.count(|w| matches!(w, ImportWarning::MissingFromBindPose { .. })),
            1
        );
    }

    #[test]
    fn test_multiple_roots_fatal() {
        let mut scene = TestScene::default();
        let root = scene.add("scene", None, NodeKind::Other, Vec3::ZERO);
        let a = scene.add("left", Some(root), NodeKind::Skeleton, Vec3::X);
        let b = scene.add("right", Some(root), NodeKind::Skeleton, Vec3::NEG_X);
        let err = build_skeleton(&mut scene, &clusters(&[a, b]), &mut Warnings::new())
            .unwrap_err();
        assert_eq!(
            err,
            ImportError::MultipleRoots(vec!["left".into(), "right".into()])
        );
    }

    #[test]
    fn test_other_ancestor_stops_discovery() {
        let mut scene = TestScene::default();
        let armature = scene.add("armature", None, NodeKind::Null, Vec3::ZERO);
        let group = scene.add("group", Some(armature), NodeKind::Other, Vec3::ZERO);
        let a = scene.add("a", Some(group), NodeKind::Skeleton, Vec3::X);
        let b = scene.add("b", Some(group), NodeKind::Skeleton, Vec3::NEG_X);
        let err = build_skeleton(&mut scene, &clusters(&[a, b]), &mut Warnings::new())
            .unwrap_err();
        assert_eq!(err, ImportError::MultipleRoots(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_no_clusters_is_fatal() {
        let mut scene = TestScene::default();
        let err = build_skeleton(&mut scene, &[], &mut Warnings::new()).unwrap_err();
        assert_eq!(err, ImportError::NoBones);
    }

    #[test]
    fn test_link_transform_used_when_pose_missing() {
        let (mut scene, nodes) = humanoid();
        scene.set_bind_poses(&[nodes[1]]);
        let link = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let mut cl = clusters(&[nodes[1], nodes[4]]);
        cl[1].link_transform = Some(link);

        let mut warnings = Warnings::new();
        let skeleton = build_skeleton(&mut scene, &cl, &mut warnings).unwrap();
        let leg = skeleton.bone_by_name("leg").unwrap();
        assert!(skeleton.global_bind_matrix(leg).abs_diff_eq(link, 1e-5));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_regeneration_then_fallback() {
        let (mut scene, nodes) = humanoid();
        scene.regenerated = vec![(nodes[1], Mat4::from_translation(Vec3::Y))];
        let mut warnings = Warnings::new();
        build_skeleton(&mut scene, &clusters(&nodes[1..3]), &mut warnings).unwrap();
        assert_eq!(warnings.count(|w| *w == ImportWarning::BindPoseFallback), 0);

        let (mut scene, nodes) = humanoid();
        let mut warnings = Warnings::new();
        let skeleton =
            build_skeleton(&mut scene, &clusters(&nodes[1..3]), &mut warnings).unwrap();
        assert_eq!(warnings.count(|w| *w == ImportWarning::BindPoseFallback), 1);
        assert_eq!(
            warnings.count(|w| matches!(w, ImportWarning::MissingFromBindPose { .. })),
            0
        );
        assert_eq!(skeleton.len(), 2);
    }

    #[test]
    fn test_duplicate_bone_names_renamed() {
        let mut scene = TestScene::default();
        let root = scene.add("joint", None, NodeKind::Skeleton, Vec3::ZERO);
        let child = scene.add("joint", Some(root), NodeKind::Skeleton, Vec3::Y);
        // A single cluster is its own common ancestor
        let single =
            build_skeleton(&mut scene, &clusters(&[child]), &mut Warnings::new()).unwrap();
        assert_eq!(single.len(), 1);

        let leaf = scene.add("", Some(child), NodeKind::Skeleton, Vec3::Y);
        let mut warnings = Warnings::new();
        let skeleton =
            build_skeleton(&mut scene, &clusters(&[root, leaf]), &mut warnings).unwrap();
        let names: Vec<&str> = skeleton.bones.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["joint", "joint_1", "bone"]);
        assert_eq!(
            warnings.count(|w| matches!(w, ImportWarning::Renamed { kind: RenameKind::Bone, .. })),
            2
        );
    }

    #[test]
    fn test_zero_scale_warns() {
        let (mut scene, nodes) = humanoid();
        scene.nodes[nodes[2].0 as usize].local.scale = Vec3::new(1.0, 0.0, 1.0);
        scene.set_bind_poses(&nodes);
        let mut warnings = Warnings::new();
        build_skeleton(&mut scene, &clusters(&nodes[2..]), &mut warnings).unwrap();
        assert!(warnings.count(|w| matches!(w, ImportWarning::InvalidBindTransform { .. })) >= 1);
    }
}
