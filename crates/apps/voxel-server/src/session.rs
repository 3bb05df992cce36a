//! Per-peer streaming state

use glam::Vec3;
use std::time::Instant;
use voxels::{LodTable, MarkerNode, OctalCode, PacketStream, StreamError, VoxelTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Streaming,
    Complete,
}

/// What a peer has been sent so far and where it is looking from.
///
/// The marker survives across ticks so that a pass spread over many ticks
/// never repeats a block. Deleted and recreated branches are caught by node
/// stamps; color edits are not, so a finished pass restarts whenever the
/// world revision moved on since the pass began.
#[derive(Debug)]
pub struct PeerSession {
    viewer_position: Vec3,
    marker: MarkerNode,
    cursor: Option<OctalCode>,
    pass: PassState,
    pass_revision: Option<u64>,
    last_seen: Instant,
    packets_sent: u64,
}

impl PeerSession {
    pub fn new(now: Instant) -> Self {
        Self {
            viewer_position: Vec3::splat(0.5),
            marker: MarkerNode::new(),
            cursor: None,
            pass: PassState::Streaming,
            pass_revision: None,
            last_seen: now,
            packets_sent: 0,
        }
    }

    pub fn viewer_position(&self) -> Vec3 {
        self.viewer_position
    }

    pub fn pass_state(&self) -> PassState {
        self.pass
    }

    pub fn cursor(&self) -> Option<&OctalCode> {
        self.cursor.as_ref()
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    /// Move the viewer. A move farther than `reset_distance` restarts the
    /// pass so that detail near the new position is sent. Returns whether it
    /// restarted.
    pub fn update_viewer(&mut self, position: Vec3, reset_distance: f32) -> bool {
        let moved = self.viewer_position.distance(position) > reset_distance;
        self.viewer_position = position;
        if moved {
            self.restart_pass();
        }
        moved
    }

    pub fn restart_pass(&mut self) {
        self.marker.reset();
        self.cursor = None;
        self.pass = PassState::Streaming;
        self.pass_revision = None;
    }

    /// Encode up to `max_packets` packets of the current pass.
    pub fn fill_packets(
        &mut self,
        tree: &VoxelTree,
        lod: &LodTable,
        revision: u64,
        max_packets: usize,
    ) -> Result<Vec<Vec<u8>>, StreamError> {
        if self.pass == PassState::Complete {
            if self.pass_revision == Some(revision) {
                return Ok(Vec::new());
            }
            self.restart_pass();
        }
        self.pass_revision.get_or_insert(revision);

        let mut stream = PacketStream::resume(
            tree,
            &mut self.marker,
            self.viewer_position,
            lod,
            self.cursor.take(),
        );
        let mut packets = Vec::new();
        let outcome = loop {
            if packets.len() >= max_packets {
                break Ok(());
            }
            match stream.next() {
                Some(Ok(packet)) => packets.push(packet),
                Some(Err(err)) => break Err(err),
                None => break Ok(()),
            }
        };
        let finished = stream.is_finished();
        let cursor = stream.into_cursor();

        if let Err(err) = outcome {
            self.restart_pass();
            return Err(err);
        }

        self.cursor = cursor;
        if finished {
            self.pass = PassState::Complete;
            tracing::debug!(
                "Pass complete after {} packets total",
                self.packets_sent + packets.len() as u64
            );
        }
        self.packets_sent += packets.len() as u64;
        Ok(packets)
    }
}
