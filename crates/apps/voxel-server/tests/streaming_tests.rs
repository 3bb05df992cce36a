//! End-to-end streaming tests
//!
//! Peers edit the server tree through datagrams and must converge on the
//! server's colored voxels from the packets each tick sends them.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use voxel_server::protocol::{encode_erase_voxels, encode_set_voxels, encode_viewer_position};
use voxel_server::{PacketSink, ServerConfig, UdpTransport, VoxelServer, WorldState};
use voxels::glam::Vec3;
use voxels::{OctalCode, Rgb, VoxelRecord, VoxelTree, MAX_VOXEL_PACKET_SIZE};

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
}

impl RecordingSink {
    fn take(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl PacketSink for RecordingSink {
    fn send_to(&self, peer: SocketAddr, packet: &[u8]) -> io::Result<()> {
        self.sent.lock().push((peer, packet.to_vec()));
        Ok(())
    }
}

fn peer(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn unbounded_server(packets_per_second: u32) -> VoxelServer {
    let config = ServerConfig {
        lod_base_distance: Some(1.0e6),
        packets_per_second,
        send_interval: Duration::from_millis(100),
        ..ServerConfig::default()
    };
    VoxelServer::new(config, WorldState::new(VoxelTree::new(), None))
}

/// Helper: A grid of leaves three levels deep
fn grid_records(count: usize) -> Vec<VoxelRecord> {
    (0..count)
        .map(|i| {
            let sections = [(i % 8) as u8, ((i / 8) % 8) as u8, ((i / 64) % 8) as u8];
            VoxelRecord::new(
                OctalCode::from_sections(&sections).unwrap(),
                Rgb::new(i as u8, (i / 3) as u8, 200),
            )
        })
        .collect()
}

fn leaf_colors(tree: &VoxelTree) -> BTreeMap<OctalCode, Rgb> {
    tree.leaf_records()
        .into_iter()
        .map(|record| (record.code, record.color))
        .collect()
}

#[test]
fn test_peer_converges_over_capped_ticks() {
    let server = unbounded_server(10);
    assert_eq!(server.config.packets_per_interval(), 1);

    server
        .handle_packet(peer(9), &encode_set_voxels(false, &grid_records(512)))
        .unwrap();

    let sink = RecordingSink::default();
    let mut receiver = VoxelTree::new();
    let mut ticks = 0;
    loop {
        let sent = server.send_tick(&sink);
        assert!(sent <= 1);
        let packets = sink.take();
        if packets.is_empty() && ticks > 0 {
            break;
        }
        for (_, packet) in packets {
            assert!(packet.len() <= MAX_VOXEL_PACKET_SIZE);
            receiver.read_bitstream_to_tree(&packet).unwrap();
        }
        ticks += 1;
        assert!(ticks < 50, "pass never completed");
    }

    assert!(ticks > 1);
    assert_eq!(leaf_colors(&receiver), leaf_colors(&server.world().read()));
}

#[test]
fn test_edit_after_pass_is_resent() {
    let server = unbounded_server(1000);
    server
        .handle_packet(peer(1), &encode_set_voxels(false, &grid_records(16)))
        .unwrap();

    let sink = RecordingSink::default();
    assert!(server.send_tick(&sink) > 0);
    sink.take();
    assert_eq!(server.send_tick(&sink), 0);

    let recolor = VoxelRecord::new(OctalCode::from_sections(&[0, 0, 0]).unwrap(), Rgb::new(1, 1, 1));
    server
        .handle_packet(peer(1), &encode_set_voxels(true, &[recolor]))
        .unwrap();
    assert!(server.send_tick(&sink) > 0);

    let mut receiver = VoxelTree::new();
    for (_, packet) in sink.take() {
        receiver.read_bitstream_to_tree(&packet).unwrap();
    }
    assert_eq!(leaf_colors(&receiver), leaf_colors(&server.world().read()));
}

#[test]
fn test_erase_datagram() {
    let server = unbounded_server(1000);
    let records = grid_records(2);
    server
        .handle_packet(peer(1), &encode_set_voxels(false, &records))
        .unwrap();
    server
        .handle_packet(peer(1), &encode_erase_voxels(&records[..1]))
        .unwrap();

    let tree = server.world().read();
    assert!(tree.find_node(&records[0].code).is_none());
    assert!(tree.find_node(&records[1].code).is_some());
}

#[test]
fn test_malformed_bitstream_changes_nothing() {
    let server = unbounded_server(1000);
    let before = server.world().revision();
    assert!(server.handle_packet(peer(1), &[b'V', 1, 0x20, 0x80]).is_err());
    assert_eq!(server.world().revision(), before);
    assert_eq!(server.world().read().node_count(), 1);
}

#[test]
fn test_far_viewer_receives_nothing() {
    let config = ServerConfig {
        lod_base_distance: Some(4.0),
        ..ServerConfig::default()
    };
    let server = VoxelServer::new(config, WorldState::new(VoxelTree::new(), None));
    server
        .handle_packet(peer(1), &encode_set_voxels(false, &grid_records(8)))
        .unwrap();
    server
        .handle_packet(peer(1), &encode_viewer_position(Vec3::splat(100.0)))
        .unwrap();

    let sink = RecordingSink::default();
    assert_eq!(server.send_tick(&sink), 0);
}

#[tokio::test]
async fn test_udp_round_trip() {
    let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
    let server_addr = transport.local_addr().unwrap();
    let client = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let server = unbounded_server(1000);
    let records = grid_records(8);
    client
        .send_to(&encode_set_voxels(false, &records), server_addr)
        .await
        .unwrap();

    let mut buf = vec![0u8; 2048];
    let (len, from) = transport.recv_from(&mut buf).await.unwrap();
    server.handle_packet(from, &buf[..len]).unwrap();
    assert_eq!(server.send_tick(&transport), 1);

    let (len, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let mut receiver = VoxelTree::new();
    receiver.read_bitstream_to_tree(&buf[..len]).unwrap();
    assert_eq!(leaf_colors(&receiver), leaf_colors(&server.world().read()));
}
