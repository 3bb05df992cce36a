use crate::config::ServerConfig;
use crate::protocol::{InboundPacket, ProtocolError};
use crate::session::PeerSession;
use crate::transport::PacketSink;
use crate::world::{WorldError, WorldState};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use voxels::LodTable;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("world error: {0}")]
    World(#[from] WorldError),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Voxel streaming server state, shared by the receive and send loops.
#[derive(Clone)]
pub struct VoxelServer {
    pub sessions: Arc<DashMap<SocketAddr, PeerSession>>,
    pub config: Arc<ServerConfig>,
    world: WorldState,
    lod: Arc<LodTable>,
}

impl VoxelServer {
    pub fn new(config: ServerConfig, world: WorldState) -> Self {
        let lod = config.lod_table();
        Self {
            sessions: Arc::new(DashMap::new()),
            config: Arc::new(config),
            world,
            lod: Arc::new(lod),
        }
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Handle one datagram from `peer`. Any datagram, valid or not, keeps the
    /// peer's session alive.
    pub fn handle_packet(&self, peer: SocketAddr, data: &[u8]) -> Result<()> {
        self.handle_packet_at(peer, data, Instant::now())
    }

    pub fn handle_packet_at(&self, peer: SocketAddr, data: &[u8], now: Instant) -> Result<()> {
        self.sessions
            .entry(peer)
            .or_insert_with(|| {
                tracing::info!("Peer {} connected", peer);
                PeerSession::new(now)
            })
            .touch(now);

        match InboundPacket::parse(data)? {
            InboundPacket::VoxelData(bitstream) => {
                let records = self.world.apply_bitstream(bitstream)?;
                tracing::debug!("Applied {} bitstream records from {}", records, peer);
            }
            InboundPacket::SetVoxels {
                destructive,
                records,
            } => {
                let changed = self.world.set_voxels(&records, destructive);
                tracing::debug!("{} set {} voxels ({} changed)", peer, records.len(), changed);
            }
            InboundPacket::EraseVoxels(records) => {
                let erased = self.world.erase_voxels(&records);
                tracing::debug!("{} erased {} voxels", peer, erased);
            }
            InboundPacket::ViewerPosition(position) => {
                if let Some(mut session) = self.sessions.get_mut(&peer) {
                    if session.update_viewer(position, self.config.view_reset_distance) {
                        tracing::trace!("Peer {} moved to {}, restarting pass", peer, position);
                    }
                }
            }
        }
        Ok(())
    }

    /// Send each peer its share of packets for one tick. Returns how many
    /// packets went out.
    pub fn send_tick<S: PacketSink + ?Sized>(&self, sink: &S) -> usize {
        let max_packets = self.config.packets_per_interval();
        let tree = self.world.read();
        let revision = self.world.revision();

        let mut sent = 0;
        for mut entry in self.sessions.iter_mut() {
            let peer = *entry.key();
            let packets = match entry
                .value_mut()
                .fill_packets(&tree, &self.lod, revision, max_packets)
            {
                Ok(packets) => packets,
                Err(e) => {
                    tracing::warn!("Streaming to {} failed: {}", peer, e);
                    continue;
                }
            };

            for packet in &packets {
                if let Err(e) = sink.send_to(peer, packet) {
                    tracing::warn!("Failed to send to {}: {}", peer, e);
                    break;
                }
                sent += 1;
            }
        }
        sent
    }

    /// Drop sessions idle for longer than the peer timeout.
    pub fn expire_idle(&self, now: Instant) -> usize {
        let timeout = self.config.peer_timeout;
        let before = self.sessions.len();
        self.sessions.retain(|peer, session| {
            let alive = now.saturating_duration_since(session.last_seen()) <= timeout;
            if !alive {
                tracing::info!("Peer {} timed out", peer);
            }
            alive
        });
        before - self.sessions.len()
    }

    /// Run the send loop forever.
    pub async fn run_sender<S: PacketSink + 'static>(self, sink: Arc<S>) {
        let mut interval = tokio::time::interval(self.config.send_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            self.expire_idle(Instant::now());
            let sent = self.send_tick(sink.as_ref());
            if sent > 0 {
                tracing::trace!("Sent {} voxel packets", sent);
            }
        }
    }
}
