//! Sparse voxel tree keyed by octal codes.
//!
//! Nodes live in an arena owned by [`VoxelTree`] and refer to their children
//! by [`NodeId`]. The root always exists and carries the depth-0 code.
//! Deleting a subtree returns its slots to a free list; dropping the tree
//! drops the arena.

mod edit;
mod node;
mod record;

pub use node::{NodeId, VoxelNode};
pub use record::{RecordError, VoxelRecord};

use crate::color::{ColorSum, Rgb};
use crate::octal::{ChildCheck, OctalCode, OctalCodeError, NUMBER_OF_CHILDREN};
use std::ops::Index;

/// Tree behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeConfig {
    /// Recompute ancestor colors from their children after each edit.
    pub reaverage_on_edit: bool,
}

/// Running counters for a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub voxels_created: u64,
    pub voxels_colored: u64,
    pub bytes_read: u64,
}

#[derive(Debug, Clone)]
pub struct VoxelTree {
    nodes: Vec<Option<VoxelNode>>,
    free: Vec<NodeId>,
    root: NodeId,
    next_stamp: u64,
    config: TreeConfig,
    pub(crate) stats: TreeStats,
}

impl Default for VoxelTree {
    fn default() -> Self {
        Self::new()
    }
}

impl VoxelTree {
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    pub fn with_config(config: TreeConfig) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeId::from_index(0),
            next_stamp: 0,
            config,
            stats: TreeStats::default(),
        };
        tree.root = tree.allocate(OctalCode::root());
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: TreeConfig) {
        self.config = config;
    }

    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    pub fn get(&self, id: NodeId) -> Option<&VoxelNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut VoxelNode {
        match self.nodes.get_mut(id.index()).and_then(Option::as_mut) {
            Some(node) => node,
            None => panic!("stale node id {id:?}"),
        }
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    fn allocate(&mut self, code: OctalCode) -> NodeId {
        let node = VoxelNode::new(code, self.next_stamp);
        self.next_stamp += 1;

        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = Some(node);
            id
        } else {
            self.nodes.push(Some(node));
            NodeId::from_index(self.nodes.len() - 1)
        }
    }

    /// Child of `parent` at `index`, created uncolored if missing.
    ///
    /// # Panics
    ///
    /// Panics if `index >= 8`.
    pub fn add_child_at_index(&mut self, parent: NodeId, index: usize) -> NodeId {
        assert!(index < NUMBER_OF_CHILDREN, "child index {index} out of range");
        if let Some(existing) = self[parent].child_at_index(index) {
            return existing;
        }
        let code = self[parent].octal_code().push_section(index as u8);
        let child = self.allocate(code);
        self.node_mut(parent).set_child(index, Some(child));
        self.stats.voxels_created += 1;
        child
    }

    /// Remove the child at `index` and its whole subtree.
    pub fn delete_child_at_index(&mut self, parent: NodeId, index: usize) -> bool {
        let Some(child) = self[parent].child_at_index(index) else {
            return false;
        };
        self.node_mut(parent).set_child(index, None);
        self.free_subtree(child);
        true
    }

    fn free_subtree(&mut self, top: NodeId) {
        let mut stack = vec![top];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes[id.index()].take() {
                stack.extend(node.children().iter().flatten());
                self.free.push(id);
            }
        }
    }

    /// Delete every child of `id`.
    pub fn delete_children(&mut self, id: NodeId) {
        for index in 0..NUMBER_OF_CHILDREN {
            self.delete_child_at_index(id, index);
        }
    }

    /// Deepest existing node on the path from `start` towards `needle`.
    ///
    /// Returns `start` itself when it is not an ancestor of `needle`.
    pub fn node_for_octal_code(&self, start: NodeId, needle: &OctalCode) -> NodeId {
        if !self[start]
            .octal_code()
            .is_ancestor_of(needle, ChildCheck::NodeOnly)
        {
            return start;
        }

        let mut current = start;
        loop {
            let node = &self[current];
            let Some(branch) = node.octal_code().branch_index_with_descendant(needle) else {
                return current;
            };
            match node.child_at_index(branch as usize) {
                Some(child) => current = child,
                None => return current,
            }
        }
    }

    /// Create the nodes between `last_parent` and `target`, returning the
    /// node for `target`.
    pub fn create_missing_node(
        &mut self,
        last_parent: NodeId,
        target: &OctalCode,
    ) -> Result<NodeId, OctalCodeError> {
        let parent_code = self[last_parent].octal_code();
        if !parent_code.is_ancestor_of(target, ChildCheck::NodeOnly) {
            return Err(OctalCodeError::NotDescendant {
                ancestor_depth: parent_code.depth(),
                descendant_depth: target.depth(),
            });
        }
        Ok(self.create_path(last_parent, target))
    }

    /// `from` must be an ancestor of `target`.
    pub(crate) fn create_path(&mut self, from: NodeId, target: &OctalCode) -> NodeId {
        let mut current = from;
        while let Some(index) = self[current].octal_code().branch_index_with_descendant(target) {
            current = self.add_child_at_index(current, index as usize);
        }
        current
    }

    /// Node for `code`, creating it and its ancestors as needed.
    pub fn get_or_create_node(&mut self, code: &OctalCode) -> NodeId {
        let deepest = self.node_for_octal_code(self.root, code);
        self.create_path(deepest, code)
    }

    /// Exact node for `code`, if present.
    pub fn find_node(&self, code: &OctalCode) -> Option<NodeId> {
        let found = self.node_for_octal_code(self.root, code);
        (self[found].octal_code() == code).then_some(found)
    }

    /// Set the color of `id` to the average of its colored children, or
    /// clear it when fewer than four children are colored. Returns whether
    /// the color changed.
    pub fn set_color_from_average_of_children(&mut self, id: NodeId) -> bool {
        let sum: ColorSum = self[id]
            .children()
            .iter()
            .flatten()
            .filter_map(|&child| self[child].color())
            .collect();
        self.node_mut(id).set_color(sum.average())
    }

    /// Replace eight identically colored leaf children with a colored leaf.
    pub fn collapse_identical_leaves(&mut self, id: NodeId) -> bool {
        let node = &self[id];
        let mut shared: Option<Rgb> = None;
        for child in node.children() {
            let Some(child) = *child else {
                return false;
            };
            let child = &self[child];
            let Some(color) = child.color() else {
                return false;
            };
            if !child.is_leaf() || shared.is_some_and(|c| c != color) {
                return false;
            }
            shared = Some(color);
        }

        self.delete_children(id);
        self.node_mut(id).set_color(shared);
        true
    }

    /// Recompute every interior color bottom-up, collapsing uniform octets.
    pub fn reaverage_voxel_colors(&mut self) {
        for id in self.depth_first(self.root).into_iter().rev() {
            if self[id].is_leaf() {
                continue;
            }
            if !self.collapse_identical_leaves(id) {
                self.set_color_from_average_of_children(id);
            }
        }
    }

    /// Remove every node below the root and clear the root color.
    pub fn erase_all_voxels(&mut self) {
        let root = self.root;
        self.delete_children(root);
        self.node_mut(root).set_color(None);
    }

    /// Node ids reachable from `start` in pre-order, children ascending.
    pub fn depth_first(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self[id].children().iter().rev().flatten());
        }
        order
    }

    /// Colored nodes in pre-order.
    pub fn colored_voxels(&self) -> impl Iterator<Item = (&OctalCode, Rgb)> + '_ {
        self.depth_first(self.root).into_iter().filter_map(move |id| {
            let node = &self[id];
            node.color().map(|color| (node.octal_code(), color))
        })
    }

    /// Colored leaves as insert records, in pre-order.
    pub fn leaf_records(&self) -> Vec<VoxelRecord> {
        self.depth_first(self.root)
            .into_iter()
            .map(|id| &self[id])
            .filter(|node| node.is_leaf())
            .filter_map(|node| {
                node.color()
                    .map(|color| VoxelRecord::new(node.octal_code().clone(), color))
            })
            .collect()
    }
}

impl Index<NodeId> for VoxelTree {
    type Output = VoxelNode;

    fn index(&self, id: NodeId) -> &Self::Output {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale node id {id:?}"),
        }
    }
}
