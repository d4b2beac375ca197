//! Head look-at.
//!
//! Bone rest translations are model-space offsets from the avatar origin,
//! which is all a yaw-only look-at needs.

use glam::{Quat, Vec3};

use crate::animation::Pose;
use crate::rig::{BoneTransform, Skeleton};

/// Horizontal distance below which the viewer is treated as straight above.
const MIN_HORIZONTAL_DISTANCE: f32 = 1e-4;

/// Turns one bone towards the viewer around the vertical axis.
#[derive(Debug, Clone)]
pub struct HeadTracker {
    bone: String,
    rest: BoneTransform,
}

impl HeadTracker {
    /// `None` when the skeleton has no such bone.
    pub fn from_skeleton(skeleton: &Skeleton, bone: &str) -> Option<Self> {
        skeleton.bone(bone).map(|b| Self {
            bone: b.name.clone(),
            rest: b.rest,
        })
    }

    pub fn bone(&self) -> &str {
        &self.bone
    }

    /// Yaw (radians about +Y) that faces `viewer` projected onto the head's
    /// own height. `+Z` is forward.
    pub fn yaw_towards(&self, viewer: Vec3) -> Option<f32> {
        let origin = self.rest.translation;
        let target = Vec3::new(viewer.x, origin.y, viewer.z);
        let delta = target - origin;
        if !delta.is_finite() || delta.length() < MIN_HORIZONTAL_DISTANCE {
            return None;
        }
        Some(delta.x.atan2(delta.z))
    }

    /// Overwrite the head rotation in `pose` with the look-at yaw.
    pub fn apply(&self, pose: &mut Pose, viewer: Vec3) {
        let Some(yaw) = self.yaw_towards(viewer) else {
            return;
        };
        let mut transform = pose.get(&self.bone).copied().unwrap_or(self.rest);
        transform.rotation = Quat::from_rotation_y(yaw);
        pose.set(&self.bone, transform);
    }
}
