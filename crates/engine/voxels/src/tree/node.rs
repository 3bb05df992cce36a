use crate::color::Rgb;
use crate::octal::{OctalCode, VoxelPositionSize, NUMBER_OF_CHILDREN};
use crate::stream::child_mask_bit;

/// Handle of a node inside a [`VoxelTree`](super::VoxelTree) arena.
///
/// Handles are only meaningful for the tree that issued them and become
/// invalid once the node is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node of the voxel tree.
#[derive(Debug, Clone)]
pub struct VoxelNode {
    code: OctalCode,
    color: Option<Rgb>,
    children: [Option<NodeId>; NUMBER_OF_CHILDREN],
    stamp: u64,
}

impl VoxelNode {
    pub(crate) fn new(code: OctalCode, stamp: u64) -> Self {
        Self {
            code,
            color: None,
            children: [None; NUMBER_OF_CHILDREN],
            stamp,
        }
    }

    pub fn octal_code(&self) -> &OctalCode {
        &self.code
    }

    pub fn depth(&self) -> usize {
        self.code.depth()
    }

    pub fn color(&self) -> Option<Rgb> {
        self.color
    }

    pub fn is_colored(&self) -> bool {
        self.color.is_some()
    }

    /// Returns whether the color changed.
    pub(crate) fn set_color(&mut self, color: Option<Rgb>) -> bool {
        let changed = self.color != color;
        self.color = color;
        changed
    }

    pub fn child_at_index(&self, index: usize) -> Option<NodeId> {
        self.children.get(index).copied().flatten()
    }

    pub fn children(&self) -> &[Option<NodeId>; NUMBER_OF_CHILDREN] {
        &self.children
    }

    pub(crate) fn set_child(&mut self, index: usize, child: Option<NodeId>) {
        self.children[index] = child;
    }

    /// Exists bits of the children, child 0 in the most significant bit.
    pub fn child_mask(&self) -> u8 {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, child)| child.is_some())
            .fold(0u8, |mask, (index, _)| mask | child_mask_bit(index))
    }

    pub fn child_count(&self) -> usize {
        self.children.iter().flatten().count()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    /// Creation stamp, unique within the tree. A node deleted and recreated
    /// at the same code gets a new stamp.
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    pub fn position_size(&self) -> VoxelPositionSize {
        self.code.position_size()
    }
}
