//! Inbound datagram formats
//!
//! Every datagram starts with a one byte type:
//!
//! | Type | Body                                               |
//! |------|----------------------------------------------------|
//! | `V`  | voxel bitstream records (the type byte included)    |
//! | `S`  | destructive flag (0 or 1), then `[code][R][G][B]`*  |
//! | `E`  | `[code][R][G][B]`* naming voxels to erase           |
//! | `P`  | viewer position as three little-endian `f32`        |

use glam::Vec3;
use thiserror::Error;
use voxels::stream::constants::PACKET_TYPE_VOXEL_DATA;
use voxels::tree::RecordError;
use voxels::VoxelRecord;

pub const PACKET_TYPE_SET_VOXELS: u8 = b'S';
pub const PACKET_TYPE_ERASE_VOXELS: u8 = b'E';
pub const PACKET_TYPE_VIEWER_POSITION: u8 = b'P';

const VIEWER_POSITION_LEN: usize = 12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("empty datagram")]
    Empty,
    #[error("unknown packet type 0x{0:02X}")]
    UnknownType(u8),
    #[error("missing or invalid destructive flag")]
    InvalidFlag,
    #[error("malformed voxel records: {0}")]
    Records(#[from] RecordError),
    #[error("viewer position needs {expected} bytes, got {actual}")]
    BadPosition { expected: usize, actual: usize },
    #[error("viewer position is not finite")]
    NonFinitePosition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundPacket<'a> {
    /// Whole datagram, ready for `read_bitstream_to_tree`.
    VoxelData(&'a [u8]),
    SetVoxels {
        destructive: bool,
        records: Vec<VoxelRecord>,
    },
    EraseVoxels(Vec<VoxelRecord>),
    ViewerPosition(Vec3),
}

impl<'a> InboundPacket<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, ProtocolError> {
        let (&packet_type, body) = data.split_first().ok_or(ProtocolError::Empty)?;
        match packet_type {
            PACKET_TYPE_VOXEL_DATA => Ok(Self::VoxelData(data)),
            PACKET_TYPE_SET_VOXELS => {
                let (&flag, records) = body.split_first().ok_or(ProtocolError::InvalidFlag)?;
                let destructive = match flag {
                    0 => false,
                    1 => true,
                    _ => return Err(ProtocolError::InvalidFlag),
                };
                Ok(Self::SetVoxels {
                    destructive,
                    records: VoxelRecord::parse_all(records)?,
                })
            }
            PACKET_TYPE_ERASE_VOXELS => Ok(Self::EraseVoxels(VoxelRecord::parse_all(body)?)),
            PACKET_TYPE_VIEWER_POSITION => {
                let bytes: &[u8; VIEWER_POSITION_LEN] =
                    body.try_into().map_err(|_| ProtocolError::BadPosition {
                        expected: VIEWER_POSITION_LEN,
                        actual: body.len(),
                    })?;
                let component = |i: usize| {
                    f32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
                };
                let position = Vec3::new(component(0), component(4), component(8));
                if !position.is_finite() {
                    return Err(ProtocolError::NonFinitePosition);
                }
                Ok(Self::ViewerPosition(position))
            }
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

pub fn encode_set_voxels(destructive: bool, records: &[VoxelRecord]) -> Vec<u8> {
    let mut data = vec![PACKET_TYPE_SET_VOXELS, u8::from(destructive)];
    for record in records {
        record.encode_into(&mut data);
    }
    data
}

pub fn encode_erase_voxels(records: &[VoxelRecord]) -> Vec<u8> {
    let mut data = vec![PACKET_TYPE_ERASE_VOXELS];
    for record in records {
        record.encode_into(&mut data);
    }
    data
}

pub fn encode_viewer_position(position: Vec3) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + VIEWER_POSITION_LEN);
    data.push(PACKET_TYPE_VIEWER_POSITION);
    for component in position.to_array() {
        data.extend_from_slice(&component.to_le_bytes());
    }
    data
}
