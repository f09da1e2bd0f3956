//! Bone hierarchy, bind pose and animation resampling
//!
//! The scene importer exposes its node graph through [`SceneGraph`]; the
//! skeleton is built from the nodes its skin clusters reference.

mod animation;
mod build;

pub use animation::{AnimationClip, AnimationTrack, resample_animation};
pub use build::build_skeleton;

use glam::{Mat4, Quat, Vec3};
use hashbrown::HashMap;

/// Node handle in the source scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Node attribute kinds that matter for skeleton discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Mesh,
    Null,
    Skeleton,
    Other,
}

/// Read access to the source scene's node graph
pub trait SceneGraph {
    fn node_name(&self, node: NodeId) -> &str;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn kind(&self, node: NodeId) -> NodeKind;

    /// Authoritative bind-pose global matrix, if the scene stores one
    fn bind_pose(&self, node: NodeId) -> Option<Mat4>;

    /// Global transform of a node at `time` seconds
    fn evaluate_global_transform(&self, node: NodeId, time: f32) -> Mat4;

    /// Rebuild missing bind poses from the scene's deformers.
    ///
    /// Returns `true` if anything was regenerated. Scenes that cannot do
    /// this keep the default.
    fn regenerate_bind_poses(&mut self) -> bool {
        false
    }
}

/// One skin cluster: the bone node it deforms with and its recorded bind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinCluster {
    pub bone_node: NodeId,
    /// Global transform of the bone when the skin was bound
    pub link_transform: Option<Mat4>,
}

/// Decomposed transform (translation, rotation, scale)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BoneTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// One bone of a [`Skeleton`]
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub node: NodeId,
    /// Always a smaller index than this bone; `None` for the root
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Rest pose relative to the parent
    pub bind_local: BoneTransform,
    pub bind_local_matrix: Mat4,
    pub inverse_bind_global: Mat4,
}

impl Bone {
    /// Parent index with -1 for the root, as stored in exported skeletons
    pub fn parent_index(&self) -> i32 {
        self.parent.map_or(-1, |p| p as i32)
    }
}

/// Parent-first ordered bone hierarchy with a single root
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
    by_name: HashMap<String, usize>,
}

impl Skeleton {
    fn from_bones(bones: Vec<Bone>) -> Self {
        let by_name = bones
            .iter()
            .enumerate()
            .map(|(i, bone)| (bone.name.clone(), i))
            .collect();
        Self { bones, by_name }
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn root(&self) -> Option<&Bone> {
        self.bones.first()
    }

    pub fn bone_by_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn children(&self, bone: usize) -> &[usize] {
        match self.bones.get(bone) {
            Some(b) => &b.children,
            None => &[],
        }
    }

    /// Bind-pose global matrix, composed from the local matrices up the chain
    pub fn global_bind_matrix(&self, bone: usize) -> Mat4 {
        let b = &self.bones[bone];
        match b.parent {
            Some(parent) => self.global_bind_matrix(parent) * b.bind_local_matrix,
            None => b.bind_local_matrix,
        }
    }

    /// Every bone's parent precedes it and only bone 0 is a root
    pub fn validate_ordering(&self) -> bool {
        self.bones.iter().enumerate().all(|(i, bone)| match bone.parent {
            Some(parent) => parent < i,
            None => i == 0,
        })
    }

    /// Inverse bind matrices in column-major 3x4 form (12 floats per bone)
    pub fn inverse_bind_matrices_3x4(&self) -> Vec<[f32; 12]> {
        self.bones
            .iter()
            .map(|bone| {
                let m = bone.inverse_bind_global.to_cols_array();
                [
                    m[0], m[1], m[2], // col0.xyz
                    m[4], m[5], m[6], // col1.xyz
                    m[8], m[9], m[10], // col2.xyz
                    m[12], m[13], m[14], // col3.xyz (translation)
                ]
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test_scene {
    //! Minimal in-memory scene used by the skeleton tests

    use super::*;

    pub struct TestNode {
        pub name: String,
        pub parent: Option<NodeId>,
        pub kind: NodeKind,
        pub local: BoneTransform,
        /// Extra rotation about Z per second of animation
        pub spin: f32,
        pub bind_pose: Option<Mat4>,
    }

    #[derive(Default)]
    pub struct TestScene {
        pub nodes: Vec<TestNode>,
        /// Bind poses handed out by `regenerate_bind_poses`
        pub regenerated: Vec<(NodeId, Mat4)>,
    }

    impl TestScene {
        pub fn add(
            &mut self,
            name: &str,
            parent: Option<NodeId>,
            kind: NodeKind,
            offset: Vec3,
        ) -> NodeId {
            let id = NodeId(self.nodes.len() as u32);
            self.nodes.push(TestNode {
                name: name.to_string(),
                parent,
                kind,
                local: BoneTransform {
                    translation: offset,
                    ..BoneTransform::IDENTITY
                },
                spin: 0.0,
                bind_pose: None,
            });
            id
        }

        pub fn local_at(&self, node: NodeId, time: f32) -> Mat4 {
            let n = &self.nodes[node.0 as usize];
            n.local.to_matrix() * Mat4::from_rotation_z(n.spin * time)
        }

        /// Store the time-zero globals of `nodes` as their bind poses
        pub fn set_bind_poses(&mut self, nodes: &[NodeId]) {
            for &node in nodes {
                let global = self.evaluate_global_transform(node, 0.0);
                self.nodes[node.0 as usize].bind_pose = Some(global);
            }
        }
    }

    impl SceneGraph for TestScene {
        fn node_name(&self, node: NodeId) -> &str {
            &self.nodes[node.0 as usize].name
        }

        fn parent(&self, node: NodeId) -> Option<NodeId> {
            self.nodes[node.0 as usize].parent
        }

        fn kind(&self, node: NodeId) -> NodeKind {
            self.nodes[node.0 as usize].kind
        }

        fn bind_pose(&self, node: NodeId) -> Option<Mat4> {
            self.nodes[node.0 as usize].bind_pose
        }

        fn evaluate_global_transform(&self, node: NodeId, time: f32) -> Mat4 {
            let local = self.local_at(node, time);
            match self.parent(node) {
                Some(parent) => self.evaluate_global_transform(parent, time) * local,
                None => local,
            }
        }

        fn regenerate_bind_poses(&mut self) -> bool {
            let regenerated = std::mem::take(&mut self.regenerated);
            let changed = !regenerated.is_empty();
            for (node, pose) in regenerated {
                self.nodes[node.0 as usize].bind_pose = Some(pose);
            }
            changed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Skeleton {
        let bone = |name: &str, parent: Option<usize>, children: Vec<usize>, y: f32| {
            let bind_local = BoneTransform {
                translation: Vec3::new(0.0, y, 0.0),
                ..BoneTransform::IDENTITY
            };
            Bone {
                name: name.to_string(),
                node: NodeId(0),
                parent,
                children,
                bind_local,
                bind_local_matrix: bind_local.to_matrix(),
                inverse_bind_global: Mat4::IDENTITY,
            }
        };
        Skeleton::from_bones(vec![
            bone("root", None, vec![1], 1.0),
            bone("spine", Some(0), vec![2], 2.0),
            bone("head", Some(1), vec![], 3.0),
        ])
    }

    #[test]
    fn test_global_bind_matrix_composes_chain() {
        let skeleton = chain();
        let global = skeleton.global_bind_matrix(2);
        assert!((global.w_axis.truncate() - Vec3::new(0.0, 6.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_lookup_and_children() {
        let skeleton = chain();
        assert_eq!(skeleton.bone_by_name("spine"), Some(1));
        assert_eq!(skeleton.bone_by_name("tail"), None);
        assert_eq!(skeleton.children(0), &[1]);
        assert!(skeleton.children(9).is_empty());
        assert_eq!(skeleton.bones[0].parent_index(), -1);
        assert!(skeleton.validate_ordering());
    }

    #[test]
    fn test_ordering_violation_detected() {
        let mut skeleton = chain();
        skeleton.bones[1].parent = Some(2);
        assert!(!skeleton.validate_ordering());
    }

    #[test]
    fn test_bone_transform_matrix_roundtrip() {
        let transform = BoneTransform {
            translation: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.7),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };
        let back = BoneTransform::from_matrix(&transform.to_matrix());
        assert!((back.translation - transform.translation).length() < 1e-5);
        assert!(back.rotation.angle_between(transform.rotation) < 1e-4);
        assert!((back.scale - transform.scale).length() < 1e-5);
    }
}
