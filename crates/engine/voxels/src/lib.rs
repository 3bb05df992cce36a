//! Octal-coded voxel octree and its incremental streaming protocol.
//!
//! - [`octal`]: the variable-length bit-packed address format for tree nodes
//! - [`tree`]: the sparse voxel tree keyed by octal codes
//! - [`stream`]: per-peer marker trees, the bounded bitstream encoder and the
//!   fail-closed decoder
//! - [`io`]: flat voxel record files

pub mod color;
pub mod io;
pub mod octal;
pub mod stream;
pub mod tree;

pub use color::{ColorSum, Rgb, MIN_CHILDREN_FOR_AVERAGE};
pub use octal::{
    ChildCheck, OctalCode, OctalCodeComparison, OctalCodeError, VoxelPositionSize,
    NUMBER_OF_CHILDREN,
};
pub use stream::{
    BitstreamEncoder, BitstreamError, LodTable, MarkerNode, PacketBuffer, PacketStream,
    StreamError, MAX_TREE_SLICE_BYTES, MAX_VOXEL_PACKET_SIZE,
};
pub use tree::{NodeId, TreeConfig, TreeStats, VoxelNode, VoxelRecord, VoxelTree};

// Re-export glam for convenience
pub use glam;
