//! Incremental, distance-bounded streaming of a voxel tree.
//!
//! A sender walks the tree against one peer's [`MarkerNode`] and fills
//! bounded packets with subtree records. When a packet fills up, the walk
//! reports the code of the node it could not emit; the next packet resumes
//! from there. A pass ends when the root finishes without a stop code.
//!
//! # Wire Format
//!
//! A packet holds one or more records back to back:
//!
//! ```text
//! 'V'                       record type
//! <octal code>              node the record is rooted at
//! <block>
//!
//! block := <color mask>     bit 0x80 >> i set => child i is colored
//!          <RGB> * popcount(color mask)
//!          <exists mask>    bit 0x80 >> i set => child i has a nested block
//!          <block> * popcount(exists mask)
//! ```
//!
//! Receivers parse the whole buffer before touching the tree, so a malformed
//! packet changes nothing.

mod decoder;
mod encoder;
mod lod;
mod marker;
mod packet;

pub use decoder::{parse_bitstream, parse_node_data, DecodedBlock, DecodedRecord};
pub use encoder::{BitstreamEncoder, PacketStream};
pub use lod::{LodTable, DEFAULT_LOD_BASE_DISTANCE};
pub use marker::MarkerNode;
pub use packet::PacketBuffer;

pub use constants::{MAX_TREE_SLICE_BYTES, MAX_VOXEL_PACKET_SIZE};

use crate::octal::{OctalCode, OctalCodeError};
use thiserror::Error;

/// Wire constants
pub mod constants {
    /// Record type byte of a streamed subtree
    pub const PACKET_TYPE_VOXEL_DATA: u8 = b'V';

    /// Largest packet the sender produces
    pub const MAX_VOXEL_PACKET_SIZE: usize = 1492;

    /// Worst-case size of one block: color mask, eight RGB triples and the
    /// exists mask
    pub const MAX_TREE_SLICE_BYTES: usize = 26;

    pub const SIZE_OF_COLOR_DATA: usize = 3;

    /// Deepest block nesting accepted from the wire
    pub const MAX_RECURSION_DEPTH: usize = 128;
}

/// Mask bit for child `index`; child 0 is the most significant bit.
pub const fn child_mask_bit(index: usize) -> u8 {
    0x80 >> index
}

pub const fn is_child_bit_set(mask: u8, index: usize) -> bool {
    mask & child_mask_bit(index) != 0
}

/// Inbound bitstream errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BitstreamError {
    /// A record did not start with the voxel data type byte
    #[error("unexpected record type 0x{found:02X} at offset {offset}")]
    UnexpectedRecordType { found: u8, offset: usize },

    /// Buffer ended inside a record
    #[error("truncated bitstream at offset {offset}: need {expected_bytes} bytes, {available_bytes} available")]
    Truncated {
        offset: usize,
        expected_bytes: usize,
        available_bytes: usize,
    },

    /// Blocks nested deeper than the decoder accepts
    #[error("bitstream nesting exceeds {max_depth} levels")]
    RecursionLimit { max_depth: usize },

    /// Malformed record code
    #[error("invalid octal code at offset {offset}: {source}")]
    OctalCode {
        offset: usize,
        #[source]
        source: OctalCodeError,
    },
}

/// Outbound streaming errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// An empty packet cannot hold the next record, so the pass cannot
    /// progress
    #[error("packet capacity {capacity} cannot hold a {required}-byte record at {code}")]
    PacketTooSmall {
        capacity: usize,
        required: usize,
        code: OctalCode,
    },
}
