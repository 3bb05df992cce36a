//! `[octal code][R][G][B]` voxel records.
//!
//! The same record layout carries single-voxel inserts, deletes (color
//! ignored) and the flat voxel file format.

use crate::color::Rgb;
use crate::octal::{OctalCode, OctalCodeError};
use crate::stream::constants::SIZE_OF_COLOR_DATA;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A malformed record inside a run of records.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("corrupt voxel record at offset {offset}: {source}")]
pub struct RecordError {
    pub offset: usize,
    #[source]
    pub source: OctalCodeError,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoxelRecord {
    pub code: OctalCode,
    pub color: Rgb,
}

impl VoxelRecord {
    pub fn new(code: OctalCode, color: Rgb) -> Self {
        Self { code, color }
    }

    /// Parse one record from the start of `data`, returning it and its size.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), OctalCodeError> {
        let (code, code_len) = OctalCode::parse(data)?;
        let end = code_len + SIZE_OF_COLOR_DATA;
        let Some(rgb) = data.get(code_len..end) else {
            return Err(OctalCodeError::Overflowed {
                needed: end,
                available: data.len(),
            });
        };
        let color = Rgb::new(rgb[0], rgb[1], rgb[2]);
        Ok((Self { code, color }, end))
    }

    /// Parse a back-to-back run of records. Fails on the first bad record.
    pub fn parse_all(data: &[u8]) -> Result<Vec<Self>, RecordError> {
        let mut records = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let (record, len) =
                Self::parse(&data[offset..]).map_err(|source| RecordError { offset, source })?;
            records.push(record);
            offset += len;
        }
        Ok(records)
    }

    pub fn encoded_len(&self) -> usize {
        self.code.len() + SIZE_OF_COLOR_DATA
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.code.as_bytes());
        out.extend_from_slice(&self.color.to_bytes());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }
}
