use super::{child_mask_bit, is_child_bit_set};
use crate::octal::NUMBER_OF_CHILDREN;

/// Per-peer shadow of the voxel tree recording which children have been
/// fully streamed in the current pass.
///
/// Each marker remembers the stamp of the voxel node it mirrors. If the
/// voxel node is deleted and recreated, the stamps differ and the stale
/// marker subtree is dropped on the next visit.
#[derive(Debug, Default)]
pub struct MarkerNode {
    children_visited: u8,
    children: [Option<Box<MarkerNode>>; NUMBER_OF_CHILDREN],
    stamp: Option<u64>,
}

impl MarkerNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn children_visited_mask(&self) -> u8 {
        self.children_visited
    }

    pub fn is_child_visited(&self, index: usize) -> bool {
        is_child_bit_set(self.children_visited, index)
    }

    pub fn set_child_visited(&mut self, index: usize) {
        self.children_visited |= child_mask_bit(index);
    }

    /// Whether every child present in `exists_mask` has been visited.
    pub fn all_visited(&self, exists_mask: u8) -> bool {
        self.children_visited & exists_mask == exists_mask
    }

    pub fn child(&self, index: usize) -> Option<&MarkerNode> {
        self.children.get(index).and_then(Option::as_deref)
    }

    /// Stamp of the mirrored voxel node, once visited.
    pub fn stamp(&self) -> Option<u64> {
        self.stamp
    }

    /// Start a new pass from this marker, discarding everything below it.
    pub fn reset(&mut self) {
        self.children_visited = 0;
        self.children = Default::default();
    }

    /// Number of markers in this subtree, this one included.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(marker) = stack.pop() {
            count += 1;
            stack.extend(marker.children.iter().flatten().map(|child| &**child));
        }
        count
    }

    /// Bind this marker to a voxel node's stamp, resetting it if it mirrored
    /// a different node before.
    pub(crate) fn sync(&mut self, stamp: u64) {
        if self.stamp.is_some_and(|current| current != stamp) {
            self.reset();
        }
        self.stamp = Some(stamp);
    }

    /// Drop the marker for child `index`, clearing its visited bit.
    pub(crate) fn evict_child(&mut self, index: usize) {
        self.children_visited &= !child_mask_bit(index);
        self.children[index] = None;
    }

    /// Evict child `index` unless it mirrors the voxel node with `stamp`.
    pub(crate) fn evict_if_stale(&mut self, index: usize, stamp: u64) {
        let current = self.children[index].as_ref().and_then(|child| child.stamp);
        if current != Some(stamp) && (current.is_some() || self.is_child_visited(index)) {
            self.evict_child(index);
        }
    }

    /// Marker for child `index`, created on first use and bound to `stamp`.
    pub(crate) fn child_mut(&mut self, index: usize, stamp: u64) -> &mut MarkerNode {
        let child = self.children[index].get_or_insert_with(Box::default);
        child.sync(stamp);
        child
    }
}

impl Drop for MarkerNode {
    fn drop(&mut self) {
        // Unlink iteratively so deep marker trees cannot overflow the stack
        let mut stack: Vec<Box<MarkerNode>> =
            self.children.iter_mut().filter_map(Option::take).collect();
        while let Some(mut marker) = stack.pop() {
            stack.extend(marker.children.iter_mut().filter_map(Option::take));
        }
    }
}
