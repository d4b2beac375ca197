//! Capability index over the rig's morph targets.
//!
//! Built once when the rig is loaded: every target name maps to the list of
//! `(node, influence slot)` pairs that expose it. Frame code never walks the
//! node list looking for dictionaries; a name that is not in the index is
//! simply a feature this rig does not have.

use std::collections::HashMap;

use tracing::debug;

use super::Rig;

/// Opaque handle to a mesh node inside a [`MorphTargetRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(usize);

impl NodeHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which nodes a read or write applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSelector<'a> {
    /// Every node exposing the target.
    All,
    /// A single node by handle.
    Handle(NodeHandle),
    /// A single node by name.
    Name(&'a str),
}

#[derive(Debug, Clone)]
struct NodeSlots {
    name: String,
    target_names: Vec<String>,
    influences: Vec<f32>,
}

/// Current weight per `(node, target)`, plus the target → nodes index.
#[derive(Debug, Clone, Default)]
pub struct MorphTargetRegistry {
    nodes: Vec<NodeSlots>,
    by_target: HashMap<String, Vec<(NodeHandle, usize)>>,
    by_node_name: HashMap<String, NodeHandle>,
    /// Target names in first-seen order, for deterministic iteration.
    target_order: Vec<String>,
}

impl MorphTargetRegistry {
    /// Index every node of `rig`. Nodes without morph targets are still
    /// addressable by name but expose nothing.
    pub fn from_rig(rig: &Rig) -> Self {
        let mut registry = Self::default();

        for (idx, node) in rig.nodes.iter().enumerate() {
            let handle = NodeHandle(idx);
            if registry
                .by_node_name
                .insert(node.name.clone(), handle)
                .is_some()
            {
                debug!(node = %node.name, "duplicate node name, later node wins name lookups");
            }

            let slot_count = node.morph_targets.len();
            if node.influences.len() != slot_count {
                debug!(
                    node = %node.name,
                    targets = slot_count,
                    influences = node.influences.len(),
                    "influence array length differs from dictionary, resizing"
                );
            }
            let mut influences = node.influences.clone();
            influences.resize(slot_count, 0.0);
            for w in &mut influences {
                *w = sanitize(*w);
            }

            for (slot, target) in node.morph_targets.iter().enumerate() {
                let entry = registry.by_target.entry(target.clone()).or_default();
                if entry.is_empty() {
                    registry.target_order.push(target.clone());
                }
                if entry.iter().any(|(h, _)| *h == handle) {
                    debug!(node = %node.name, morph_target = %target, "duplicate target on node, keeping first slot");
                    continue;
                }
                entry.push((handle, slot));
            }

            registry.nodes.push(NodeSlots {
                name: node.name.clone(),
                target_names: node.morph_targets.clone(),
                influences,
            });
        }

        debug!(
            nodes = registry.nodes.len(),
            targets = registry.target_order.len(),
            "morph target registry built"
        );
        registry
    }

    /// Clamp `weight` into `[0, 1]` and store it on the selected nodes.
    /// Unknown targets or nodes are ignored.
    pub fn set(&mut self, selector: NodeSelector<'_>, target: &str, weight: f32) {
        let weight = sanitize(weight);
        let Some(slots) = self.by_target.get(target) else {
            return;
        };
        let wanted = self.resolve(selector);
        for &(handle, slot) in slots {
            if wanted.is_some_and(|h| h != handle) {
                continue;
            }
            if let Some(w) = self.nodes[handle.0].influences.get_mut(slot) {
                *w = weight;
            }
        }
    }

    /// Last stored weight, or `0.0` when the target does not exist on the
    /// selected node. With [`NodeSelector::All`] the first exposing node is read.
    pub fn get(&self, selector: NodeSelector<'_>, target: &str) -> f32 {
        let Some(slots) = self.by_target.get(target) else {
            return 0.0;
        };
        let wanted = self.resolve(selector);
        slots
            .iter()
            .find(|(h, _)| wanted.is_none_or(|w| w == *h))
            .and_then(|&(h, slot)| self.nodes[h.0].influences.get(slot))
            .copied()
            .unwrap_or(0.0)
    }

    /// Move every node's weight for `target` a `smoothing` fraction of the
    /// way towards `desired`. This is the only blending write the engine uses.
    pub fn resolve_and_blend(&mut self, target: &str, desired: f32, smoothing: f32) {
        let desired = sanitize(desired);
        let t = if smoothing.is_finite() {
            smoothing.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let Some(slots) = self.by_target.get(target) else {
            return;
        };
        for &(handle, slot) in slots {
            if let Some(w) = self.nodes[handle.0].influences.get_mut(slot) {
                *w = sanitize(lerp(*w, desired, t));
            }
        }
    }

    /// Direct write of `weight` to every node exposing `target`.
    pub fn set_all(&mut self, target: &str, weight: f32) {
        self.set(NodeSelector::All, target, weight);
    }

    /// Direct write restricted to the given nodes.
    pub fn set_on(&mut self, nodes: &[NodeHandle], target: &str, weight: f32) {
        for &handle in nodes {
            self.set(NodeSelector::Handle(handle), target, weight);
        }
    }

    pub fn supports(&self, target: &str) -> bool {
        self.by_target.contains_key(target)
    }

    /// Handles of the nodes exposing `target`.
    pub fn nodes_exposing(&self, target: &str) -> impl Iterator<Item = NodeHandle> + '_ {
        self.by_target
            .get(target)
            .into_iter()
            .flat_map(|slots| slots.iter().map(|(h, _)| *h))
    }

    /// Every indexed target name, in first-seen order.
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.target_order.iter().map(String::as_str)
    }

    pub fn node_handle(&self, name: &str) -> Option<NodeHandle> {
        self.by_node_name.get(name).copied()
    }

    pub fn node_name(&self, handle: NodeHandle) -> Option<&str> {
        self.nodes.get(handle.0).map(|n| n.name.as_str())
    }

    /// Influence array for one node, parallel to its morph-target dictionary.
    /// This is what a renderer uploads.
    pub fn influences(&self, handle: NodeHandle) -> &[f32] {
        self.nodes
            .get(handle.0)
            .map(|n| n.influences.as_slice())
            .unwrap_or(&[])
    }

    /// Morph-target names for one node, parallel to [`Self::influences`].
    pub fn node_targets(&self, handle: NodeHandle) -> &[String] {
        self.nodes
            .get(handle.0)
            .map(|n| n.target_names.as_slice())
            .unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Snapshot of `target -> weight` read from the first exposing node.
    pub fn snapshot(&self) -> Vec<(String, f32)> {
        self.target_order
            .iter()
            .map(|t| (t.clone(), self.get(NodeSelector::All, t)))
            .collect()
    }

    fn resolve(&self, selector: NodeSelector<'_>) -> Option<NodeHandle> {
        match selector {
            NodeSelector::All => None,
            NodeSelector::Handle(h) => Some(h),
            // An unknown name must not match anything, so map it to an
            // out-of-range handle instead of "all".
            NodeSelector::Name(name) => Some(
                self.node_handle(name)
                    .unwrap_or(NodeHandle(usize::MAX)),
            ),
        }
    }
}

pub(crate) fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

fn sanitize(weight: f32) -> f32 {
    if weight.is_finite() {
        weight.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
