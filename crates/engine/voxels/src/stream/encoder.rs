//! Bounded, resumable bitstream encoder.

use super::constants::{
    MAX_RECURSION_DEPTH, MAX_TREE_SLICE_BYTES, MAX_VOXEL_PACKET_SIZE, PACKET_TYPE_VOXEL_DATA,
};
use super::{child_mask_bit, LodTable, MarkerNode, PacketBuffer, StreamError};
use crate::octal::{octant_offset, OctalCode, VoxelPositionSize};
use crate::tree::{NodeId, VoxelNode, VoxelTree};
use glam::Vec3;

/// Outcome of visiting one subtree.
enum Visit {
    /// Everything in range below the node has been written.
    Complete,
    /// The packet ended before this node's block could be written: it was
    /// full, or the block would have nested past the recursion limit.
    Stopped(OctalCode),
}

/// One packet's worth of tree walk for a single peer.
///
/// Holds the read-only inputs of a walk; the peer's [`MarkerNode`] and the
/// packet are passed per call.
#[derive(Debug, Clone, Copy)]
pub struct BitstreamEncoder<'a> {
    tree: &'a VoxelTree,
    viewer_position: Vec3,
    lod: &'a LodTable,
    stop_code: Option<&'a OctalCode>,
}

impl<'a> BitstreamEncoder<'a> {
    pub fn new(tree: &'a VoxelTree, viewer_position: Vec3, lod: &'a LodTable) -> Self {
        Self {
            tree,
            viewer_position,
            lod,
            stop_code: None,
        }
    }

    /// Continue a pass from the stop code returned by the previous packet.
    pub fn resume_from(mut self, stop_code: Option<&'a OctalCode>) -> Self {
        self.stop_code = stop_code;
        self
    }

    /// Fill `packet` starting at the tree root.
    ///
    /// Returns the stop code to resume from, or `None` once the pass is
    /// complete.
    pub fn encode(
        &self,
        marker: &mut MarkerNode,
        packet: &mut PacketBuffer,
    ) -> Result<Option<OctalCode>, StreamError> {
        self.load_bitstream_buffer(self.tree.root(), marker, Vec3::ZERO, packet)
    }

    /// Fill `packet` with the subtree under `node`, whose cube has its
    /// minimum corner at `node_world_position`.
    ///
    /// `marker` is bound to `node`; a marker that mirrored another node is
    /// reset first.
    pub fn load_bitstream_buffer(
        &self,
        node: NodeId,
        marker: &mut MarkerNode,
        node_world_position: Vec3,
        packet: &mut PacketBuffer,
    ) -> Result<Option<OctalCode>, StreamError> {
        let stamp = self.tree[node].stamp();
        let known = marker.stamp() == Some(stamp);
        marker.sync(stamp);
        match self.visit(node, marker, node_world_position, None, known, packet)? {
            Visit::Complete => Ok(None),
            Visit::Stopped(code) => Ok(Some(code)),
        }
    }

    /// `nesting` is the depth of this node's block inside the open record,
    /// `None` when the node has to open a record of its own. `known` tells
    /// whether `marker` mirrored this node before the visit.
    fn visit(
        &self,
        id: NodeId,
        marker: &mut MarkerNode,
        corner: Vec3,
        nesting: Option<usize>,
        known: bool,
        packet: &mut PacketBuffer,
    ) -> Result<Visit, StreamError> {
        let node = &self.tree[id];
        if node.is_leaf() {
            return Ok(Visit::Complete);
        }

        let code = node.octal_code();
        let cube = VoxelPositionSize {
            corner,
            scale: 0.5f32.powi(code.depth() as i32),
        };
        let cutoff = self.lod.boundary_distance_for_render_level(code.depth() + 1);
        if self.viewer_position.distance(cube.center()) >= cutoff {
            return Ok(Visit::Complete);
        }

        for (index, child) in node.children().iter().enumerate() {
            match child {
                Some(child_id) => marker.evict_if_stale(index, self.tree[*child_id].stamp()),
                None => marker.evict_child(index),
            }
        }
        if marker.all_visited(node.child_mask()) {
            return Ok(Visit::Complete);
        }

        // Strict ancestors of the stop code wrote their block in an earlier
        // packet; only their descendants still need space. A node recreated
        // since then has a fresh marker and has to be written again.
        let passes_through = known
            && self
                .stop_code
                .is_some_and(|stop| code.is_strict_ancestor_of(stop));

        let block = if passes_through {
            None
        } else {
            let required = match nesting {
                Some(_) => MAX_TREE_SLICE_BYTES,
                None => 1 + code.len() + MAX_TREE_SLICE_BYTES,
            };
            if packet.remaining() < required {
                if packet.is_empty() {
                    return Err(StreamError::PacketTooSmall {
                        capacity: packet.capacity(),
                        required,
                        code: code.clone(),
                    });
                }
                return Ok(Visit::Stopped(code.clone()));
            }
            if nesting.is_none() {
                packet.push(PACKET_TYPE_VOXEL_DATA);
                packet.extend(code.as_bytes());
            }
            self.write_child_colors(node, packet);
            let exists_offset = packet.len();
            packet.push(0);
            Some((exists_offset, nesting.unwrap_or(0)))
        };

        let child_nesting = block
            .map(|(_, depth)| depth + 1)
            .filter(|&depth| depth < MAX_RECURSION_DEPTH);

        let child_edge = cube.scale * 0.5;
        for (index, child) in node.children().iter().enumerate() {
            let Some(child_id) = *child else {
                continue;
            };
            let stamp = self.tree[child_id].stamp();
            if marker.is_child_visited(index) {
                continue;
            }
            // Receivers refuse blocks nested past the recursion limit, and a
            // record cannot start inside another one. End the packet so the
            // child opens its own record in the next.
            if block.is_some() && child_nesting.is_none() && !self.tree[child_id].is_leaf() {
                return Ok(Visit::Stopped(self.tree[child_id].octal_code().clone()));
            }

            let known = marker
                .child(index)
                .is_some_and(|child| child.stamp() == Some(stamp));
            let child_corner = corner + octant_offset(index as u8) * child_edge;
            let watermark = packet.len();
            let outcome = self.visit(
                child_id,
                marker.child_mut(index, stamp),
                child_corner,
                child_nesting,
                known,
                packet,
            )?;

            if let Some((exists_offset, _)) = block {
                if packet.len() > watermark {
                    packet.set_bits(exists_offset, child_mask_bit(index));
                }
            }

            match outcome {
                Visit::Complete => marker.set_child_visited(index),
                Visit::Stopped(stop) => return Ok(Visit::Stopped(stop)),
            }
        }

        Ok(Visit::Complete)
    }

    fn write_child_colors(&self, node: &VoxelNode, packet: &mut PacketBuffer) {
        let colors = node
            .children()
            .iter()
            .enumerate()
            .filter_map(|(index, child)| {
                child.and_then(|id| self.tree[id].color()).map(|color| (index, color))
            });

        let mask = colors
            .clone()
            .fold(0u8, |mask, (index, _)| mask | child_mask_bit(index));
        packet.push(mask);
        for (_, color) in colors {
            packet.extend(&color.to_bytes());
        }
    }
}

/// Restartable iterator over the packets of one scan pass for one peer.
///
/// Ends after the packet in which the root completes. The cursor between
/// packets is the stop code of the last packet; a new stream can resume
/// from any cursor this one reported, given the same marker.
pub struct PacketStream<'a> {
    tree: &'a VoxelTree,
    marker: &'a mut MarkerNode,
    viewer_position: Vec3,
    lod: &'a LodTable,
    cursor: Option<OctalCode>,
    packet_size: usize,
    finished: bool,
}

impl<'a> PacketStream<'a> {
    pub fn new(
        tree: &'a VoxelTree,
        marker: &'a mut MarkerNode,
        viewer_position: Vec3,
        lod: &'a LodTable,
    ) -> Self {
        Self::resume(tree, marker, viewer_position, lod, None)
    }

    pub fn resume(
        tree: &'a VoxelTree,
        marker: &'a mut MarkerNode,
        viewer_position: Vec3,
        lod: &'a LodTable,
        cursor: Option<OctalCode>,
    ) -> Self {
        Self {
            tree,
            marker,
            viewer_position,
            lod,
            cursor,
            packet_size: MAX_VOXEL_PACKET_SIZE,
            finished: false,
        }
    }

    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// Stop code the next packet resumes from.
    pub fn cursor(&self) -> Option<&OctalCode> {
        self.cursor.as_ref()
    }

    /// Whether the pass completed (or failed).
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_cursor(self) -> Option<OctalCode> {
        self.cursor
    }
}

impl Iterator for PacketStream<'_> {
    type Item = Result<Vec<u8>, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut packet = PacketBuffer::with_capacity(self.packet_size);
        let encoder = BitstreamEncoder::new(self.tree, self.viewer_position, self.lod)
            .resume_from(self.cursor.as_ref());

        match encoder.encode(&mut *self.marker, &mut packet) {
            Ok(Some(stop)) => {
                self.cursor = Some(stop);
                Some(Ok(packet.into_vec()))
            }
            Ok(None) => {
                self.finished = true;
                self.cursor = None;
                (!packet.is_empty()).then(|| Ok(packet.into_vec()))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::stream::parse_bitstream;

    fn code(sections: &[u8]) -> OctalCode {
        OctalCode::from_sections(sections).unwrap()
    }

    #[test]
    fn test_two_leaf_packet_bytes() {
        let mut tree = VoxelTree::new();
        tree.set_voxel(&code(&[5]), Rgb::new(1, 0, 1), false);
        tree.set_voxel(&code(&[7]), Rgb::new(0, 1, 1), false);

        let lod = LodTable::unbounded();
        let mut marker = MarkerNode::new();
        let mut packet = PacketBuffer::new();
        let stop = BitstreamEncoder::new(&tree, Vec3::splat(0.5), &lod)
            .encode(&mut marker, &mut packet)
            .unwrap();

        assert_eq!(stop, None);
        assert_eq!(
            packet.as_slice(),
            &[b'V', 0, 0b0000_0101, 1, 0, 1, 0, 1, 1, 0]
        );
        assert_eq!(marker.children_visited_mask(), 0b0000_0101);
    }

    #[test]
    fn test_empty_tree_writes_nothing() {
        let tree = VoxelTree::new();
        let lod = LodTable::default();
        let mut marker = MarkerNode::new();
        let mut stream = PacketStream::new(&tree, &mut marker, Vec3::ZERO, &lod);
        assert!(stream.next().is_none());
        assert!(stream.is_finished());
    }

    #[test]
    fn test_lod_cutoff_skips_children() {
        let mut tree = VoxelTree::new();
        tree.set_voxel(&code(&[0, 0]), Rgb::new(9, 9, 9), false);

        // The root's children are in range, the grandchildren are not
        let lod = LodTable::Table(vec![f32::INFINITY, f32::INFINITY, 0.0]);
        let mut marker = MarkerNode::new();
        let mut packet = PacketBuffer::new();
        BitstreamEncoder::new(&tree, Vec3::ZERO, &lod)
            .encode(&mut marker, &mut packet)
            .unwrap();

        // Root block only: child 0 uncolored, exists bit clear
        assert_eq!(packet.as_slice(), &[b'V', 0, 0, 0]);
        assert!(marker.is_child_visited(0));
    }

    #[test]
    fn test_deep_branch_splits_records_at_recursion_limit() {
        let mut tree = VoxelTree::new();
        tree.set_voxel(&code(&[3; 140]), Rgb::new(4, 5, 6), false);

        let lod = LodTable::unbounded();
        let mut marker = MarkerNode::new();
        let mut packet = PacketBuffer::new();
        let stop = BitstreamEncoder::new(&tree, Vec3::splat(0.5), &lod)
            .encode(&mut marker, &mut packet)
            .unwrap();
        let split = code(&[3; MAX_RECURSION_DEPTH]);
        assert_eq!(stop.as_ref(), Some(&split));

        let head = parse_bitstream(packet.as_slice()).unwrap();
        assert_eq!(head.len(), 1);
        assert_eq!(head[0].code, OctalCode::root());
        assert_eq!(head[0].block.block_count(), MAX_RECURSION_DEPTH);

        let mut packet = PacketBuffer::new();
        let stop = BitstreamEncoder::new(&tree, Vec3::splat(0.5), &lod)
            .resume_from(Some(&split))
            .encode(&mut marker, &mut packet)
            .unwrap();
        assert_eq!(stop, None);

        let tail = parse_bitstream(packet.as_slice()).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].code, split);
        assert_eq!(tail[0].block.block_count(), 140 - MAX_RECURSION_DEPTH);
    }

    #[test]
    fn test_packet_too_small() {
        let mut tree = VoxelTree::new();
        tree.set_voxel(&code(&[1]), Rgb::new(1, 1, 1), false);

        let lod = LodTable::unbounded();
        let mut marker = MarkerNode::new();
        let mut packet = PacketBuffer::with_capacity(MAX_TREE_SLICE_BYTES);
        let err = BitstreamEncoder::new(&tree, Vec3::ZERO, &lod)
            .encode(&mut marker, &mut packet)
            .unwrap_err();

        assert_eq!(
            err,
            StreamError::PacketTooSmall {
                capacity: MAX_TREE_SLICE_BYTES,
                required: MAX_TREE_SLICE_BYTES + 2,
                code: OctalCode::root(),
            }
        );
    }
}
