//! Voxel streaming server
//!
//! Holds one shared [`voxels::VoxelTree`] and streams it to every peer over
//! UDP in packets of at most [`voxels::MAX_VOXEL_PACKET_SIZE`] bytes. Peers
//! edit the tree with set/erase datagrams or bitstreams of their own and
//! report their viewer position so that detail is streamed by distance.

pub mod config;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;
pub mod world;

pub use config::ServerConfig;
pub use protocol::{InboundPacket, ProtocolError};
pub use server::{ServerError, VoxelServer};
pub use session::{PassState, PeerSession};
pub use transport::{PacketSink, UdpTransport};
pub use world::{WorldError, WorldState};
