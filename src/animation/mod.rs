//! Skeletal animation clips and the mixer that plays them.
//!
//! Clips come from the host's asset loader. The mixer only needs bone
//! tracks with linear keyframes.

pub mod mixer;

pub use mixer::AnimationMixer;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::rig::BoneTransform;

/// A bone transform at a point in clip time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub transform: BoneTransform,
}

/// Keyframes for one bone, sorted by time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneTrack {
    pub bone: String,
    pub keyframes: Vec<Keyframe>,
}

impl BoneTrack {
    /// Interpolated transform at `t`, clamped to the first and last key.
    pub fn sample(&self, t: f32) -> Option<BoneTransform> {
        let first = self.keyframes.first()?;
        let idx = self.keyframes.partition_point(|k| k.time <= t);
        if idx == 0 {
            return Some(first.transform);
        }
        let prev = &self.keyframes[idx - 1];
        let Some(next) = self.keyframes.get(idx) else {
            return Some(prev.transform);
        };
        let span = next.time - prev.time;
        if span <= f32::EPSILON {
            return Some(next.transform);
        }
        let alpha = ((t - prev.time) / span).clamp(0.0, 1.0);
        Some(prev.transform.lerp(&next.transform, alpha))
    }
}

/// A named, looping set of bone tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    /// Length in seconds.
    pub duration: f32,
    pub tracks: Vec<BoneTrack>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, duration: f32, tracks: Vec<BoneTrack>) -> Self {
        let mut tracks = tracks;
        for track in &mut tracks {
            track.keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
        }
        Self {
            name: name.into(),
            duration,
            tracks,
        }
    }

    /// Pose of every animated bone at `t` seconds.
    pub fn sample(&self, t: f32) -> Pose {
        let mut pose = Pose::default();
        for track in &self.tracks {
            if let Some(transform) = track.sample(t) {
                pose.set(&track.bone, transform);
            }
        }
        pose
    }

    /// A slow breathing sway on `Spine` and `Neck`.
    pub fn idle_sway(name: impl Into<String>) -> Self {
        let sway = |bone: &str, y: f32, angle: f32| BoneTrack {
            bone: bone.to_owned(),
            keyframes: [(0.0, 0.0), (2.0, angle), (4.0, 0.0)]
                .into_iter()
                .map(|(time, a)| Keyframe {
                    time,
                    transform: BoneTransform {
                        translation: Vec3::new(0.0, y, 0.0),
                        rotation: Quat::from_rotation_z(a),
                        scale: Vec3::ONE,
                    },
                })
                .collect(),
        };
        Self::new(
            name,
            4.0,
            vec![sway("Spine", 0.1, 0.02), sway("Neck", 0.45, -0.015)],
        )
    }

    /// Small nods on `Neck`, suitable as a talk clip.
    pub fn talk_nod(name: impl Into<String>) -> Self {
        let keyframes = [(0.0, 0.0), (0.4, 0.06), (0.8, -0.02), (1.2, 0.0)]
            .into_iter()
            .map(|(time, pitch)| Keyframe {
                time,
                transform: BoneTransform {
                    translation: Vec3::new(0.0, 0.45, 0.0),
                    rotation: Quat::from_rotation_x(pitch),
                    scale: Vec3::ONE,
                },
            })
            .collect();
        Self::new(
            name,
            1.2,
            vec![BoneTrack {
                bone: "Neck".into(),
                keyframes,
            }],
        )
    }
}

/// Local transforms by bone name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Pose {
    bones: BTreeMap<String, BoneTransform>,
}

impl Pose {
    pub fn get(&self, bone: &str) -> Option<&BoneTransform> {
        self.bones.get(bone)
    }

    pub fn set(&mut self, bone: &str, transform: BoneTransform) {
        self.bones.insert(bone.to_owned(), transform);
    }

    /// Blend towards `other` by `t`. Bones present on one side only are kept.
    pub fn blend(&self, other: &Pose, t: f32) -> Pose {
        let mut out = self.clone();
        for (bone, theirs) in &other.bones {
            let blended = match self.bones.get(bone) {
                Some(ours) => ours.lerp(theirs, t),
                None => *theirs,
            };
            out.bones.insert(bone.clone(), blended);
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BoneTransform)> {
        self.bones.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn track(points: &[(f32, f32)]) -> BoneTrack {
        BoneTrack {
            bone: "Spine".into(),
            keyframes: points
                .iter()
                .map(|&(time, x)| Keyframe {
                    time,
                    transform: BoneTransform::from_translation(Vec3::new(x, 0.0, 0.0)),
                })
                .collect(),
        }
    }

    #[test]
    fn track_interpolates_linearly() {
        let t = track(&[(0.0, 0.0), (1.0, 2.0)]);
        assert!((t.sample(0.25).unwrap().translation.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn track_clamps_outside_keys() {
        let t = track(&[(0.5, 1.0), (1.0, 3.0)]);
        assert_eq!(t.sample(0.0).unwrap().translation.x, 1.0);
        assert_eq!(t.sample(9.0).unwrap().translation.x, 3.0);
    }

    #[test]
    fn empty_track_samples_nothing() {
        assert!(track(&[]).sample(0.3).is_none());
    }

    #[test]
    fn clip_sorts_keyframes() {
        let clip = AnimationClip::new("c", 1.0, vec![track(&[(1.0, 2.0), (0.0, 0.0)])]);
        let x = clip.sample(0.5).get("Spine").unwrap().translation.x;
        assert!((x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn idle_sway_animates_spine_and_neck() {
        let pose = AnimationClip::idle_sway("idle").sample(1.0);
        assert!(pose.get("Spine").is_some());
        assert!(pose.get("Neck").is_some());
        assert!(pose.get("Head").is_none());
    }

    #[test]
    fn pose_blend_keeps_one_sided_bones() {
        let mut a = Pose::default();
        a.set("Spine", BoneTransform::IDENTITY);
        let mut b = Pose::default();
        b.set("Neck", BoneTransform::IDENTITY);
        let blended = a.blend(&b, 0.5);
        assert_eq!(blended.len(), 2);
    }
}
