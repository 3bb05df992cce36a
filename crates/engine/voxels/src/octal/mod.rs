//! Octal codes: bit-packed paths of 3-bit octant selectors.
//!
//! A code addresses one node of the octree over the unit cube. Each section
//! picks one of eight children: bit 2 selects the upper half along x, bit 1
//! along y, bit 0 along z.
//!
//! # Example
//!
//! ```
//! use voxels::OctalCode;
//!
//! let code = OctalCode::from_sections(&[5, 1]).unwrap();
//! assert_eq!(code.depth(), 2);
//! assert_eq!(code.to_string(), "5.1");
//! assert_eq!(code.parent(), Some(OctalCode::from_sections(&[5]).unwrap()));
//! ```

pub mod codec;
mod geometry;

pub use codec::{
    branch_index_with_descendant, bytes_required_for_code_length, child_octal_code,
    chop_octal_code, compare_octal_codes, is_ancestor_of, number_of_three_bit_sections_in_code,
    rebase_octal_code, section_value, set_section_value, NUMBER_OF_CHILDREN,
};
pub use geometry::{octant_offset, point_to_voxel, voxel_details_for_code, VoxelPositionSize};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Octal code errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OctalCodeError {
    /// The code needs more bytes than the buffer holds
    #[error("octal code overflowed: needs {needed} bytes, {available} available")]
    Overflowed { needed: usize, available: usize },

    /// Empty buffer, no header to read
    #[error("octal code length unknown: empty buffer")]
    UnknownLength,

    /// Section value outside 0..=7
    #[error("invalid child index {0}")]
    InvalidChildIndex(u8),

    /// Voxel size must be finite and positive
    #[error("invalid voxel size {0}")]
    InvalidVoxelSize(f32),

    /// Point coordinates must be finite
    #[error("invalid voxel position ({x}, {y}, {z})")]
    InvalidPosition { x: f32, y: f32, z: f32 },

    /// Operation needs a strictly deeper code
    #[error("code of depth {descendant_depth} is not below depth {ancestor_depth}")]
    NotDescendant {
        ancestor_depth: usize,
        descendant_depth: usize,
    },
}

/// Result of [`compare_octal_codes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OctalCodeComparison {
    LessThan,
    GreaterThan,
    ExactMatch,
    IllegalCode,
}

/// Extra level used by ancestor checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChildCheck {
    /// Compare against the descendant code as is.
    #[default]
    NodeOnly,
    /// Treat the descendant as one level deeper with this child index.
    Child(u8),
}

/// A validated octal code.
///
/// The buffer always holds exactly one canonical code (padding bits zero), so
/// byte equality is code equality. Ordering follows [`compare_octal_codes`]:
/// depth-first pre-order, ancestors first.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct OctalCode {
    bytes: Vec<u8>,
    depth: usize,
    header: usize,
}

impl OctalCode {
    /// The depth-0 code of the tree root.
    pub fn root() -> Self {
        Self {
            bytes: vec![0],
            depth: 0,
            header: 1,
        }
    }

    /// Parse the code at the start of `data`, returning it and the number of
    /// bytes it occupied.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), OctalCodeError> {
        let (depth, len) = codec::code_length(data)?;
        let header = codec::header_len(depth);
        let mut bytes = data[..len].to_vec();

        let used_bits = depth * codec::BITS_IN_OCTAL % codec::BITS_IN_BYTE;
        if used_bits != 0 {
            if let Some(last) = bytes.last_mut() {
                *last &= 0xFFu8 << (codec::BITS_IN_BYTE - used_bits);
            }
        }

        Ok((
            Self {
                bytes,
                depth,
                header,
            },
            len,
        ))
    }

    pub fn from_sections(sections: &[u8]) -> Result<Self, OctalCodeError> {
        let bytes = codec::encode_sections(sections)?;
        Ok(Self {
            header: codec::header_len(sections.len()),
            depth: sections.len(),
            bytes,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    /// Encoded size in bytes, header included.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Section at `level`, or `None` past the code's depth.
    pub fn section(&self, level: usize) -> Option<u8> {
        (level < self.depth).then(|| codec::read_section(&self.bytes, self.header, level))
    }

    pub fn sections(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.depth).map(move |level| codec::read_section(&self.bytes, self.header, level))
    }

    /// Child index of this code within its parent.
    pub fn last_section(&self) -> Option<u8> {
        self.depth.checked_sub(1).and_then(|level| self.section(level))
    }

    /// Code of the child at `index`.
    pub fn child(&self, index: u8) -> Result<Self, OctalCodeError> {
        if usize::from(index) >= NUMBER_OF_CHILDREN {
            return Err(OctalCodeError::InvalidChildIndex(index));
        }
        Ok(self.push_section(index))
    }

    /// Append one section; `index` must be below 8.
    pub(crate) fn push_section(&self, index: u8) -> Self {
        debug_assert!(usize::from(index) < NUMBER_OF_CHILDREN);
        let depth = self.depth + 1;
        let mut bytes = Vec::with_capacity(bytes_required_for_code_length(depth));
        codec::write_header(&mut bytes, depth);
        let header = bytes.len();
        bytes.extend_from_slice(&self.bytes[self.header..]);
        bytes.resize(header + codec::section_bytes(depth), 0);

        let (byte, bit) = codec::section_location(header, self.depth);
        set_section_value(&mut bytes[byte..], bit, index);
        Self {
            bytes,
            depth,
            header,
        }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let sections: Vec<u8> = self.sections().take(self.depth - 1).collect();
        Self::from_sections(&sections).ok()
    }

    /// Which child of `self` leads to `descendant`, if it is strictly below.
    pub fn branch_index_with_descendant(&self, descendant: &OctalCode) -> Option<u8> {
        if descendant.depth <= self.depth {
            return None;
        }
        descendant.section(self.depth)
    }

    pub fn compare(&self, other: &OctalCode) -> OctalCodeComparison {
        compare_octal_codes(&self.bytes, &other.bytes)
    }

    pub fn is_ancestor_of(&self, descendant: &OctalCode, check: ChildCheck) -> bool {
        is_ancestor_of(&self.bytes, &descendant.bytes, check)
    }

    /// Ancestor check that excludes the code itself.
    pub fn is_strict_ancestor_of(&self, descendant: &OctalCode) -> bool {
        self.depth < descendant.depth && self.is_ancestor_of(descendant, ChildCheck::NodeOnly)
    }

    /// Remove the top `levels` sections; `None` when nothing remains.
    pub fn chop(&self, levels: usize) -> Option<Self> {
        if self.depth <= levels {
            return None;
        }
        let sections: Vec<u8> = self.sections().skip(levels).collect();
        Self::from_sections(&sections).ok()
    }

    /// Prefix this code with the path of `new_parent`.
    pub fn rebase(&self, new_parent: &OctalCode) -> Self {
        self.sections()
            .fold(new_parent.clone(), |code, section| code.push_section(section))
    }

    /// Code of the voxel of edge `s` that contains the point.
    pub fn from_point(x: f32, y: f32, z: f32, s: f32) -> Result<Self, OctalCodeError> {
        let sections = geometry::sections_for_point(x, y, z, s)?;
        Self::from_sections(&sections)
    }

    pub fn position_size(&self) -> VoxelPositionSize {
        voxel_details_for_code(self)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Default for OctalCode {
    fn default() -> Self {
        Self::root()
    }
}

impl TryFrom<Vec<u8>> for OctalCode {
    type Error = OctalCodeError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        let (code, len) = Self::parse(&bytes)?;
        if len != bytes.len() {
            return Err(OctalCodeError::Overflowed {
                needed: len,
                available: bytes.len(),
            });
        }
        Ok(code)
    }
}

impl TryFrom<&[u8]> for OctalCode {
    type Error = OctalCodeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::parse(bytes).map(|(code, _)| code)
    }
}

impl From<OctalCode> for Vec<u8> {
    fn from(code: OctalCode) -> Self {
        code.bytes
    }
}

impl AsRef<[u8]> for OctalCode {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl Ord for OctalCode {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.compare(other) {
            OctalCodeComparison::LessThan => Ordering::Less,
            OctalCodeComparison::GreaterThan => Ordering::Greater,
            OctalCodeComparison::ExactMatch | OctalCodeComparison::IllegalCode => Ordering::Equal,
        }
    }
}

impl PartialOrd for OctalCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OctalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "root");
        }
        for (level, section) in self.sections().enumerate() {
            if level > 0 {
                write!(f, ".")?;
            }
            write!(f, "{section}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for OctalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OctalCode({self})")
    }
}
