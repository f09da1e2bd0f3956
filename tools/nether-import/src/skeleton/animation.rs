//! Fixed-rate animation resampling
//!
//! Every sample stores a bind-relative delta per bone: the bone's local
//! transform at that time multiplied by the inverse of its bind-local
//! matrix. A runtime evaluator recovers the local pose as
//! `delta * bind_local` without walking the hierarchy.

use glam::{Mat4, Quat, Vec3};
use tracing::{debug, info};

use super::{BoneTransform, SceneGraph, Skeleton};
use crate::error::ImportError;

/// Sampled deltas for one bone; all three arrays have `sample_count` entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationTrack {
    pub positions: Vec<Vec3>,
    pub rotations: Vec<Quat>,
    pub scales: Vec<Vec3>,
}

impl AnimationTrack {
    fn with_capacity(samples: usize) -> Self {
        Self {
            positions: Vec::with_capacity(samples),
            rotations: Vec::with_capacity(samples),
            scales: Vec::with_capacity(samples),
        }
    }

    fn push(&mut self, delta: BoneTransform) {
        self.positions.push(delta.translation);
        self.rotations.push(delta.rotation);
        self.scales.push(delta.scale);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Delta at sample `index`
    pub fn sample(&self, index: usize) -> Option<BoneTransform> {
        Some(BoneTransform {
            translation: *self.positions.get(index)?,
            rotation: *self.rotations.get(index)?,
            scale: *self.scales.get(index)?,
        })
    }
}

/// One resampled animation; `tracks[i]` belongs to skeleton bone `i`
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub sample_rate: f32,
    pub sample_count: usize,
    pub tracks: Vec<AnimationTrack>,
}

impl AnimationClip {
    /// Local transform of `bone` at sample `index`, delta applied to the bind pose
    pub fn local_pose(&self, skeleton: &Skeleton, bone: usize, index: usize) -> Option<Mat4> {
        let delta = self.tracks.get(bone)?.sample(index)?;
        let bind = skeleton.bones.get(bone)?.bind_local_matrix;
        Some(delta.to_matrix() * bind)
    }
}

/// Resample `duration` seconds of scene animation at `sample_rate` Hz
pub fn resample_animation<S: SceneGraph + ?Sized>(
    scene: &S,
    skeleton: &Skeleton,
    name: &str,
    duration: f32,
    sample_rate: f32,
) -> Result<AnimationClip, ImportError> {
    let samples = (duration * sample_rate).floor();
    if !samples.is_finite() || samples < 1.0 {
        return Err(ImportError::AnimationTooShort {
            duration,
            sample_rate,
        });
    }
    let sample_count = samples as usize;

    let inverse_binds: Vec<Mat4> = skeleton
        .bones
        .iter()
        .map(|bone| bone.bind_local_matrix.inverse())
        .collect();
    let mut tracks: Vec<AnimationTrack> = (0..skeleton.len())
        .map(|_| AnimationTrack::with_capacity(sample_count))
        .collect();
    let mut globals = vec![Mat4::IDENTITY; skeleton.len()];

    for sample in 0..sample_count {
        let t = sample as f32 / sample_rate;
        for (i, bone) in skeleton.bones.iter().enumerate() {
            globals[i] = scene.evaluate_global_transform(bone.node, t);
        }
        for (i, bone) in skeleton.bones.iter().enumerate() {
            // Relative to the parent's pose at t, not the bind pose
            let local = match bone.parent {
                Some(parent) => globals[parent].inverse() * globals[i],
                None => globals[i],
            };
            let delta = local * inverse_binds[i];
            tracks[i].push(BoneTransform::from_matrix(&delta));
        }
    }

    debug!(
        "Resampled '{}' at {} Hz: t = 0..{:.3}s",
        name,
        sample_rate,
        (sample_count - 1) as f32 / sample_rate
    );
    info!(
        "Animation '{}': {} bones, {} samples ({:.2}s)",
        name,
        skeleton.len(),
        sample_count,
        duration
    );

    Ok(AnimationClip {
        name: name.to_string(),
        duration,
        sample_rate,
        sample_count,
        tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_scene::TestScene;
    use super::super::{NodeKind, SkinCluster, build_skeleton};
    use super::*;
    use crate::warnings::Warnings;
    use std::f32::consts::FRAC_PI_2;

    /// root -> arm -> hand, bind poses at time zero
    fn rig() -> (TestScene, Skeleton) {
        let mut scene = TestScene::default();
        let root = scene.add("root", None, NodeKind::Skeleton, Vec3::ZERO);
        let arm = scene.add("arm", Some(root), NodeKind::Skeleton, Vec3::X);
        let hand = scene.add("hand", Some(arm), NodeKind::Skeleton, Vec3::X);
        scene.set_bind_poses(&[root, arm, hand]);
        let clusters: Vec<SkinCluster> = [root, arm, hand]
            .into_iter()
            .map(|bone_node| SkinCluster {
                bone_node,
                link_transform: None,
            })
            .collect();
        let skeleton = build_skeleton(&mut scene, &clusters, &mut Warnings::new()).unwrap();
        (scene, skeleton)
    }

    fn assert_identity(transform: BoneTransform) {
        assert!(transform.translation.length() < 1e-5, "{:?}", transform);
        assert!(transform.rotation.angle_between(Quat::IDENTITY) < 1e-3, "{:?}", transform);
        assert!((transform.scale - Vec3::ONE).length() < 1e-5, "{:?}", transform);
    }

    #[test]
    fn test_sample_count_is_floor() {
        let (scene, skeleton) = rig();
        let clip = resample_animation(&scene, &skeleton, "idle", 1.05, 30.0).unwrap();
        assert_eq!(clip.sample_count, 31);
        for track in &clip.tracks {
            assert_eq!(track.len(), 31);
            assert_eq!(track.rotations.len(), 31);
            assert_eq!(track.scales.len(), 31);
        }
    }

    #[test]
    fn test_static_scene_yields_identity_deltas() {
        let (scene, skeleton) = rig();
        let clip = resample_animation(&scene, &skeleton, "idle", 1.0, 10.0).unwrap();
        for track in &clip.tracks {
            for i in 0..clip.sample_count {
                assert_identity(track.sample(i).unwrap());
            }
        }
    }

    #[test]
    fn test_deltas_are_parent_relative() {
        let (mut scene, skeleton) = rig();
        // Arm spins a quarter turn per second; hand follows rigidly
        scene.nodes[1].spin = FRAC_PI_2;
        let clip = resample_animation(&scene, &skeleton, "wave", 2.0, 4.0).unwrap();

        let arm = skeleton.bone_by_name("arm").unwrap();
        let hand = skeleton.bone_by_name("hand").unwrap();
        // Sample 4 is t = 1s
        let arm_delta = clip.tracks[arm].sample(4).unwrap();
        let expected = Quat::from_rotation_z(FRAC_PI_2);
        assert!(arm_delta.rotation.angle_between(expected) < 1e-3);
        assert_identity(clip.tracks[hand].sample(4).unwrap());

        let local = clip.local_pose(&skeleton, arm, 4).unwrap();
        let direct = scene.local_at(skeleton.bones[arm].node, 1.0);
        assert!(local.abs_diff_eq(direct, 1e-4));
    }

    #[test]
    fn test_too_short_is_fatal() {
        let (scene, skeleton) = rig();
        let err = resample_animation(&scene, &skeleton, "blink", 0.01, 30.0).unwrap_err();
        assert_eq!(
            err,
            ImportError::AnimationTooShort {
                duration: 0.01,
                sample_rate: 30.0
            }
        );
        assert!(resample_animation(&scene, &skeleton, "nan", f32::NAN, 30.0).is_err());
    }
}
