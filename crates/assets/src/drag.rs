//! Drop target that feeds dragged files into the asset store.
//!
//! The UI forwards raw drag events here. The only state is the "dragging"
//! indicator; leave events fired while the pointer moves between the
//! zone's own children must not clear it, so the zone keeps a small tree
//! of its descendant node ids.

use std::collections::HashMap;

use crate::file::{AssetId, SelectedFile};
use crate::store::{AddOptions, ImageAssetStore};

/// Identifier of a UI node inside (or outside) the drop zone.
pub type NodeId = u64;

/// What the UI should do with the event's default behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAction {
    /// Suppress it (the browser would otherwise navigate to the file).
    Prevent,
    Allow,
}

/// The drop zone root and its descendants.
#[derive(Debug, Clone)]
pub struct DropZone {
    root: NodeId,
    /// child -> parent
    parents: HashMap<NodeId, NodeId>,
}

impl DropZone {
    pub fn new(root: NodeId) -> Self {
        Self {
            root,
            parents: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Register `child` under `parent`. Returns `false` if `parent` is not
    /// part of the zone.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if !self.contains(parent) || child == self.root {
            return false;
        }
        self.parents.insert(child, parent);
        true
    }

    /// Whether `node` is the root or one of its descendants.
    pub fn contains(&self, node: NodeId) -> bool {
        let mut current = node;
        // Bounded by the number of registered nodes.
        for _ in 0..=self.parents.len() {
            if current == self.root {
                return true;
            }
            match self.parents.get(&current) {
                Some(parent) => current = *parent,
                None => return false,
            }
        }
        false
    }
}

/// Drag state of one drop zone.
#[derive(Debug)]
pub struct DropTarget {
    zone: DropZone,
    dragging: bool,
}

impl DropTarget {
    pub fn new(zone: DropZone) -> Self {
        Self {
            zone,
            dragging: false,
        }
    }

    pub fn zone_mut(&mut self) -> &mut DropZone {
        &mut self.zone
    }

    /// Whether the drop indicator is shown.
    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn drag_enter(&mut self) -> DefaultAction {
        self.dragging = true;
        DefaultAction::Prevent
    }

    pub fn drag_over(&mut self) -> DefaultAction {
        DefaultAction::Prevent
    }

    /// `related` is the node the pointer moved to, if any.
    pub fn drag_leave(&mut self, related: Option<NodeId>) -> DefaultAction {
        if !related.is_some_and(|node| self.zone.contains(node)) {
            self.dragging = false;
        }
        DefaultAction::Allow
    }

    /// Hand dropped files to `store`. The indicator is always cleared.
    pub fn drop_files(
        &mut self,
        files: Vec<SelectedFile>,
        store: &ImageAssetStore,
    ) -> (DefaultAction, Vec<AssetId>) {
        self.dragging = false;
        if files.is_empty() {
            return (DefaultAction::Prevent, Vec::new());
        }
        let added = store.add_files(files, AddOptions::default());
        (DefaultAction::Prevent, added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> DropZone {
        let mut zone = DropZone::new(1);
        assert!(zone.add_child(1, 2));
        assert!(zone.add_child(2, 3));
        zone
    }

    #[test]
    fn contains_is_inclusive_of_descendants() {
        let zone = zone();
        assert!(zone.contains(1));
        assert!(zone.contains(3));
        assert!(!zone.contains(99));
    }

    #[test]
    fn children_of_outside_nodes_are_rejected() {
        let mut zone = zone();
        assert!(!zone.add_child(99, 100));
        assert!(!zone.contains(100));
    }
}
