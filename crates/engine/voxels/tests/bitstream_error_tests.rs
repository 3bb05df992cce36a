//! Malformed bitstream tests
//!
//! A receiver must reject a malformed buffer as a whole: no record from it,
//! valid or not, may reach the tree.

use voxels::glam::Vec3;
use voxels::{
    BitstreamError, LodTable, MarkerNode, OctalCode, OctalCodeError, PacketStream, Rgb, VoxelTree,
};

fn valid_packet() -> Vec<u8> {
    let mut tree = VoxelTree::new();
    for index in 0..8u8 {
        let code = OctalCode::from_sections(&[index, 7 - index]).unwrap();
        tree.set_voxel(&code, Rgb::new(index, index, index), false);
    }
    let lod = LodTable::unbounded();
    let mut marker = MarkerNode::new();
    let mut packets: Vec<Vec<u8>> = PacketStream::new(&tree, &mut marker, Vec3::ZERO, &lod)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(packets.len(), 1);
    packets.remove(0)
}

fn assert_rejected(data: &[u8]) -> BitstreamError {
    let mut tree = VoxelTree::new();
    let err = tree
        .read_bitstream_to_tree(data)
        .expect_err("malformed buffer must be rejected");
    assert_eq!(tree.node_count(), 1, "nothing may be applied");
    assert_eq!(tree.stats().bytes_read, 0);
    err
}

#[test]
fn test_valid_packet_applies() {
    let mut tree = VoxelTree::new();
    let packet = valid_packet();
    assert_eq!(tree.read_bitstream_to_tree(&packet).unwrap(), 1);
    assert_eq!(tree.colored_voxels().filter(|(code, _)| code.depth() == 2).count(), 8);
    assert_eq!(tree.stats().bytes_read, packet.len() as u64);
}

#[test]
fn test_every_truncation_is_rejected() {
    let packet = valid_packet();
    for len in 1..packet.len() {
        let err = assert_rejected(&packet[..len]);
        assert!(
            matches!(
                err,
                BitstreamError::Truncated { .. } | BitstreamError::OctalCode { .. }
            ),
            "length {len}: {err}"
        );
    }
}

#[test]
fn test_valid_record_followed_by_garbage() {
    let mut data = valid_packet();
    data.extend_from_slice(&[b'V', 1]);
    let err = assert_rejected(&data);
    assert!(matches!(
        err,
        BitstreamError::OctalCode {
            source: OctalCodeError::Overflowed { .. },
            ..
        }
    ));
}

#[test]
fn test_wrong_record_type() {
    let mut data = valid_packet();
    data[0] = b'Q';
    assert_eq!(
        assert_rejected(&data),
        BitstreamError::UnexpectedRecordType {
            found: b'Q',
            offset: 0
        }
    );
}

#[test]
fn test_empty_code_header() {
    let err = assert_rejected(&[b'V']);
    assert_eq!(
        err,
        BitstreamError::OctalCode {
            offset: 1,
            source: OctalCodeError::UnknownLength
        }
    );
}

#[test]
fn test_read_node_data_rejects_truncated_block() {
    let mut tree = VoxelTree::new();
    let root = tree.root();
    // Child 0 colored and nested, but the nested block is cut short
    let data = [0x80, 1, 2, 3, 0x80, 0xC0, 4, 5, 6];
    assert!(tree.read_node_data(root, &data).is_err());
    assert_eq!(tree.node_count(), 1);
}

#[test]
fn test_empty_buffer_is_a_no_op() {
    let mut tree = VoxelTree::new();
    assert_eq!(tree.read_bitstream_to_tree(&[]).unwrap(), 0);
    assert_eq!(tree.node_count(), 1);
}
