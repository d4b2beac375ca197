//! Rig description supplied by the host's asset loader.
//!
//! The core never decodes meshes. A host hands over the named mesh nodes
//! with their sparse morph-target dictionaries and optional skeletons, and
//! [`MorphTargetRegistry`] indexes them once at load time.

pub mod registry;

pub use registry::{MorphTargetRegistry, NodeHandle, NodeSelector};

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Local transform of a single bone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
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

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Interpolate towards `other`; rotation uses slerp.
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(other.rotation, t),
            scale: self.scale.lerp(other.scale, t),
        }
    }
}

/// A named bone and its rest pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    #[serde(default)]
    pub rest: BoneTransform,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl Skeleton {
    pub fn bone(&self, name: &str) -> Option<&Bone> {
        self.bones.iter().find(|b| b.name == name)
    }
}

/// One mesh node as exposed by the loader.
///
/// `morph_targets[i]` names the blend shape whose influence lives in
/// `influences[i]`. Both are empty for meshes without blend shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshNode {
    pub name: String,
    #[serde(default)]
    pub morph_targets: Vec<String>,
    #[serde(default)]
    pub influences: Vec<f32>,
    #[serde(default)]
    pub skeleton: Option<Skeleton>,
}

impl MeshNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Attach blend shapes, all starting at zero influence.
    pub fn with_morph_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.morph_targets = targets.into_iter().map(Into::into).collect();
        self.influences = vec![0.0; self.morph_targets.len()];
        self
    }

    pub fn with_skeleton(mut self, skeleton: Skeleton) -> Self {
        self.skeleton = Some(skeleton);
        self
    }
}

/// A loaded avatar: every mesh node the host knows about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rig {
    pub nodes: Vec<MeshNode>,
}

impl Rig {
    pub fn new(nodes: Vec<MeshNode>) -> Self {
        Self { nodes }
    }

    /// Load a rig description from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid rig description.
    pub fn from_json_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            crate::error::AvatarError::Asset(format!("invalid rig {}: {e}", path.display()))
        })
    }

    /// First skeleton found on any node. Meshes of one avatar share a skeleton.
    pub fn skeleton(&self) -> Option<&Skeleton> {
        self.nodes.iter().find_map(|n| n.skeleton.as_ref())
    }

    /// A Ready Player Me style half-body rig: two eyes, head, teeth and hair,
    /// sharing one skeleton with a `Head` bone.
    pub fn sample_half_body() -> Self {
        const VISEMES: [&str; 8] = [
            "viseme_PP",
            "viseme_kk",
            "viseme_I",
            "viseme_AA",
            "viseme_O",
            "viseme_U",
            "viseme_FF",
            "viseme_TH",
        ];
        const FACE: [&str; 12] = [
            "eyeBlinkLeft",
            "eyeBlinkRight",
            "browInnerUp",
            "eyeSquintLeft",
            "eyeSquintRight",
            "mouthSmileLeft",
            "mouthSmileRight",
            "noseSneerLeft",
            "noseSneerRight",
            "cheekPuff",
            "jawOpen",
            "mouthOpen",
        ];

        let skeleton = Skeleton {
            bones: vec![
                Bone {
                    name: "Hips".into(),
                    rest: BoneTransform::IDENTITY,
                },
                Bone {
                    name: "Spine".into(),
                    rest: BoneTransform::from_translation(Vec3::new(0.0, 0.1, 0.0)),
                },
                Bone {
                    name: "Neck".into(),
                    rest: BoneTransform::from_translation(Vec3::new(0.0, 0.45, 0.0)),
                },
                Bone {
                    name: "Head".into(),
                    rest: BoneTransform::from_translation(Vec3::new(0.0, 0.6, 0.0)),
                },
            ],
        };

        let head_targets = FACE.iter().chain(VISEMES.iter()).copied();
        Self::new(vec![
            MeshNode::new("EyeLeft")
                .with_morph_targets(["eyeBlinkLeft", "eyeBlinkRight", "eyeSquintLeft"])
                .with_skeleton(skeleton.clone()),
            MeshNode::new("EyeRight")
                .with_morph_targets(["eyeBlinkLeft", "eyeBlinkRight", "eyeSquintRight"])
                .with_skeleton(skeleton.clone()),
            MeshNode::new("Wolf3D_Head")
                .with_morph_targets(head_targets)
                .with_skeleton(skeleton.clone()),
            MeshNode::new("Wolf3D_Teeth")
                .with_morph_targets(VISEMES.iter().copied().chain(["jawOpen", "mouthOpen"]))
                .with_skeleton(skeleton.clone()),
            MeshNode::new("Wolf3D_Hair").with_skeleton(skeleton),
        ])
    }
}
