//! Inbound bitstream decoding.
//!
//! Decoding is two-phase: the buffer is parsed and bounds-checked into
//! [`DecodedRecord`]s first, and only a fully valid buffer is applied to the
//! tree.

use super::constants::{MAX_RECURSION_DEPTH, PACKET_TYPE_VOXEL_DATA, SIZE_OF_COLOR_DATA};
use super::{is_child_bit_set, BitstreamError};
use crate::color::{ColorSum, Rgb};
use crate::octal::{OctalCode, NUMBER_OF_CHILDREN};
use crate::tree::{NodeId, VoxelTree};

/// One node's block: the colors of its children and their nested blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBlock {
    pub colors: [Option<Rgb>; NUMBER_OF_CHILDREN],
    pub children: [Option<Box<DecodedBlock>>; NUMBER_OF_CHILDREN],
}

impl DecodedBlock {
    /// Number of blocks in this subtree, this one included.
    pub fn block_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .flatten()
            .map(|child| child.block_count())
            .sum::<usize>()
    }

    /// Visit every block with the code of the node it belongs to.
    pub fn for_each_block(&self, code: &OctalCode, f: &mut impl FnMut(&OctalCode, &DecodedBlock)) {
        f(code, self);
        for (index, child) in self.children.iter().enumerate() {
            if let Some(child) = child {
                child.for_each_block(&code.push_section(index as u8), f);
            }
        }
    }
}

/// A `'V'` record: a block rooted at an explicit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub code: OctalCode,
    pub block: DecodedBlock,
}

/// Parse every record in `data`.
pub fn parse_bitstream(data: &[u8]) -> Result<Vec<DecodedRecord>, BitstreamError> {
    let mut parser = BlockParser::new(data);
    let mut records = Vec::new();
    while !parser.at_end() {
        records.push(parser.parse_record()?);
    }
    Ok(records)
}

/// Parse a single block (no record header) from the start of `data`,
/// returning it and the bytes consumed.
pub fn parse_node_data(data: &[u8]) -> Result<(DecodedBlock, usize), BitstreamError> {
    let mut parser = BlockParser::new(data);
    let block = parser.parse_block()?;
    Ok((block, parser.offset))
}

/// Bitstream parser state
struct BlockParser<'a> {
    data: &'a [u8],
    offset: usize,
    recursion_depth: usize,
}

impl<'a> BlockParser<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            recursion_depth: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], BitstreamError> {
        let available = self.data.len() - self.offset;
        if available < len {
            return Err(BitstreamError::Truncated {
                offset: self.offset,
                expected_bytes: len,
                available_bytes: available,
            });
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, BitstreamError> {
        Ok(self.take(1)?[0])
    }

    fn parse_record(&mut self) -> Result<DecodedRecord, BitstreamError> {
        let record_offset = self.offset;
        let record_type = self.read_u8()?;
        if record_type != PACKET_TYPE_VOXEL_DATA {
            return Err(BitstreamError::UnexpectedRecordType {
                found: record_type,
                offset: record_offset,
            });
        }

        let code_offset = self.offset;
        let (code, len) = OctalCode::parse(&self.data[code_offset..]).map_err(|source| {
            BitstreamError::OctalCode {
                offset: code_offset,
                source,
            }
        })?;
        self.offset += len;

        let block = self.parse_block()?;
        Ok(DecodedRecord { code, block })
    }

    fn parse_block(&mut self) -> Result<DecodedBlock, BitstreamError> {
        if self.recursion_depth >= MAX_RECURSION_DEPTH {
            return Err(BitstreamError::RecursionLimit {
                max_depth: MAX_RECURSION_DEPTH,
            });
        }

        self.recursion_depth += 1;
        let result = self.parse_block_impl();
        self.recursion_depth -= 1;

        result
    }

    fn parse_block_impl(&mut self) -> Result<DecodedBlock, BitstreamError> {
        let mut block = DecodedBlock::default();

        let color_mask = self.read_u8()?;
        let colored = color_mask.count_ones() as usize;
        let rgb = self.take(colored * SIZE_OF_COLOR_DATA)?;
        let mut triples = rgb.chunks_exact(SIZE_OF_COLOR_DATA);
        for (index, color) in block.colors.iter_mut().enumerate() {
            if is_child_bit_set(color_mask, index) {
                *color = triples.next().map(|c| Rgb::new(c[0], c[1], c[2]));
            }
        }

        let exists_mask = self.read_u8()?;
        for (index, child) in block.children.iter_mut().enumerate() {
            if is_child_bit_set(exists_mask, index) {
                *child = Some(Box::new(self.parse_block()?));
            }
        }

        Ok(block)
    }
}

impl VoxelTree {
    /// Decode a packet of `'V'` records into the tree.
    ///
    /// Nothing is applied unless the whole buffer parses. Returns the number
    /// of records applied.
    pub fn read_bitstream_to_tree(&mut self, data: &[u8]) -> Result<usize, BitstreamError> {
        let records = parse_bitstream(data)?;
        for record in &records {
            let target = self.get_or_create_node(&record.code);
            self.apply_block(target, &record.block);
        }
        self.stats.bytes_read += data.len() as u64;
        tracing::debug!(records = records.len(), bytes = data.len(), "applied bitstream");
        Ok(records.len())
    }

    /// Decode one block into the subtree under `node`, returning the bytes
    /// consumed. Nothing is applied if the block is malformed.
    pub fn read_node_data(&mut self, node: NodeId, data: &[u8]) -> Result<usize, BitstreamError> {
        let (block, consumed) = parse_node_data(data)?;
        self.apply_block(node, &block);
        self.stats.bytes_read += consumed as u64;
        Ok(consumed)
    }

    fn apply_block(&mut self, node: NodeId, block: &DecodedBlock) {
        let mut sum = ColorSum::new();
        for (index, color) in block.colors.iter().enumerate() {
            if let Some(color) = *color {
                let child = self.add_child_at_index(node, index);
                self.node_mut(child).set_color(Some(color));
                self.stats.voxels_colored += 1;
                sum.add(color);
            }
        }

        for (index, child_block) in block.children.iter().enumerate() {
            if let Some(child_block) = child_block {
                let child = self.add_child_at_index(node, index);
                self.apply_block(child, child_block);
            }
        }

        self.node_mut(node).set_color(sum.average());
    }
}
