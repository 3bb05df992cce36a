//! Byte-level octal code codec.
//!
//! These functions operate on raw `&[u8]` codes as they appear on the wire.
//! [`OctalCode`](super::OctalCode) wraps a validated buffer and forwards to
//! them.
//!
//! # Layout
//!
//! ```text
//! [header][section bytes]
//!
//! header    depth n; one byte when n < 255, otherwise a run of 0xFF bytes
//!           (each worth 255) ended by a byte < 255 holding the remainder
//! sections  ceil(n * 3 / 8) bytes of packed 3-bit values, first level in
//!           the most significant bits, trailing padding bits zero
//! ```

use super::{ChildCheck, OctalCodeComparison, OctalCodeError};

pub const BITS_IN_BYTE: usize = 8;
pub const BITS_IN_OCTAL: usize = 3;
pub const NUMBER_OF_CHILDREN: usize = 8;

const HEADER_CONTINUATION: u8 = 0xFF;
const SECTION_MASK: u8 = 0b111;

/// Number of header bytes for a code of `sections` levels.
pub fn header_len(sections: usize) -> usize {
    sections / HEADER_CONTINUATION as usize + 1
}

/// Number of packed section bytes for a code of `sections` levels.
pub fn section_bytes(sections: usize) -> usize {
    (sections * BITS_IN_OCTAL).div_ceil(BITS_IN_BYTE)
}

/// Total encoded size of a code with `sections` levels, header included.
pub fn bytes_required_for_code_length(sections: usize) -> usize {
    header_len(sections) + section_bytes(sections)
}

/// Decode the depth header at the start of `code`.
///
/// Only the header is inspected; use [`code_length`] to also check the
/// section bytes are present.
pub fn number_of_three_bit_sections_in_code(code: &[u8]) -> Result<usize, OctalCodeError> {
    if code.is_empty() {
        return Err(OctalCodeError::UnknownLength);
    }

    let mut sections = 0usize;
    for &byte in code {
        sections += byte as usize;
        if byte != HEADER_CONTINUATION {
            return Ok(sections);
        }
    }

    Err(OctalCodeError::Overflowed {
        needed: code.len() + 1,
        available: code.len(),
    })
}

/// Depth and total encoded length of the code at the start of `code`.
pub fn code_length(code: &[u8]) -> Result<(usize, usize), OctalCodeError> {
    let sections = number_of_three_bit_sections_in_code(code)?;
    let needed = bytes_required_for_code_length(sections);
    if needed > code.len() {
        return Err(OctalCodeError::Overflowed {
            needed,
            available: code.len(),
        });
    }
    Ok((sections, needed))
}

/// Read the 3-bit value starting `bit_offset` bits into `bytes[0]`.
///
/// Offsets 6 and 7 straddle into `bytes[1]`.
///
/// # Panics
///
/// Panics if `bit_offset > 7` or the straddled byte is missing.
pub fn section_value(bytes: &[u8], bit_offset: u8) -> u8 {
    assert!((bit_offset as usize) < BITS_IN_BYTE, "bit offset {bit_offset} out of range");
    let right_shift = BITS_IN_BYTE as i32 - bit_offset as i32 - BITS_IN_OCTAL as i32;
    if right_shift >= 0 {
        (bytes[0] >> right_shift) & SECTION_MASK
    } else {
        let spill = (-right_shift) as u32;
        let high = (bytes[0] << spill) & SECTION_MASK;
        let low = bytes[1] >> (BITS_IN_BYTE as u32 - spill);
        high | low
    }
}

/// Write the low 3 bits of `value` starting `bit_offset` bits into `bytes[0]`.
///
/// Bits outside the section are preserved.
///
/// # Panics
///
/// Panics if `bit_offset > 7` or the straddled byte is missing.
pub fn set_section_value(bytes: &mut [u8], bit_offset: u8, value: u8) {
    assert!((bit_offset as usize) < BITS_IN_BYTE, "bit offset {bit_offset} out of range");
    let value = value & SECTION_MASK;
    let right_shift = BITS_IN_BYTE as i32 - bit_offset as i32 - BITS_IN_OCTAL as i32;
    if right_shift >= 0 {
        let mask = SECTION_MASK << right_shift;
        bytes[0] = (bytes[0] & !mask) | (value << right_shift);
    } else {
        let spill = (-right_shift) as u32;
        let high_mask = SECTION_MASK >> spill;
        bytes[0] = (bytes[0] & !high_mask) | (value >> spill);

        let low_shift = BITS_IN_BYTE as u32 - spill;
        let low_mask = 0xFFu8 << low_shift;
        let low_bits = value & ((1 << spill) - 1);
        bytes[1] = (bytes[1] & !low_mask) | (low_bits << low_shift);
    }
}

/// Byte index and bit offset of section `section` in a code whose header is
/// `header` bytes long.
pub(crate) fn section_location(header: usize, section: usize) -> (usize, u8) {
    let bit = section * BITS_IN_OCTAL;
    (header + bit / BITS_IN_BYTE, (bit % BITS_IN_BYTE) as u8)
}

/// Read section `section` of a code with known header length.
pub(crate) fn read_section(code: &[u8], header: usize, section: usize) -> u8 {
    let (byte, bit) = section_location(header, section);
    section_value(&code[byte..], bit)
}

/// Append a depth header for `sections` levels to `out`.
pub(crate) fn write_header(out: &mut Vec<u8>, sections: usize) {
    let mut remaining = sections;
    while remaining >= HEADER_CONTINUATION as usize {
        out.push(HEADER_CONTINUATION);
        remaining -= HEADER_CONTINUATION as usize;
    }
    out.push(remaining as u8);
}

/// Encode a code from its section values.
pub fn encode_sections(sections: &[u8]) -> Result<Vec<u8>, OctalCodeError> {
    if let Some(&bad) = sections.iter().find(|&&s| s as usize >= NUMBER_OF_CHILDREN) {
        return Err(OctalCodeError::InvalidChildIndex(bad));
    }

    let depth = sections.len();
    let mut out = Vec::with_capacity(bytes_required_for_code_length(depth));
    write_header(&mut out, depth);
    let header = out.len();
    out.resize(header + section_bytes(depth), 0);

    for (index, &value) in sections.iter().enumerate() {
        let (byte, bit) = section_location(header, index);
        set_section_value(&mut out[byte..], bit, value);
    }
    Ok(out)
}

/// Section values of the code at the start of `code`.
pub fn decode_sections(code: &[u8]) -> Result<Vec<u8>, OctalCodeError> {
    let (depth, _) = code_length(code)?;
    let header = header_len(depth);
    Ok((0..depth).map(|s| read_section(code, header, s)).collect())
}

/// Code of the child of `parent` at `child_index`.
pub fn child_octal_code(parent: &[u8], child_index: u8) -> Result<Vec<u8>, OctalCodeError> {
    if child_index as usize >= NUMBER_OF_CHILDREN {
        return Err(OctalCodeError::InvalidChildIndex(child_index));
    }
    let (depth, _) = code_length(parent)?;
    let old_header = header_len(depth);
    let child_depth = depth + 1;

    let mut out = Vec::with_capacity(bytes_required_for_code_length(child_depth));
    write_header(&mut out, child_depth);
    let header = out.len();
    out.extend_from_slice(&parent[old_header..old_header + section_bytes(depth)]);
    out.resize(header + section_bytes(child_depth), 0);

    let (byte, bit) = section_location(header, depth);
    set_section_value(&mut out[byte..], bit, child_index);
    Ok(out)
}

/// Which child of `ancestor` leads towards `descendant`.
pub fn branch_index_with_descendant(
    ancestor: &[u8],
    descendant: &[u8],
) -> Result<u8, OctalCodeError> {
    let (ancestor_depth, _) = code_length(ancestor)?;
    let (descendant_depth, _) = code_length(descendant)?;
    if descendant_depth <= ancestor_depth {
        return Err(OctalCodeError::NotDescendant {
            ancestor_depth,
            descendant_depth,
        });
    }
    Ok(read_section(
        descendant,
        header_len(descendant_depth),
        ancestor_depth,
    ))
}

/// Order two codes section by section, then by depth.
///
/// A code sorts before its descendants. Malformed input reports
/// [`OctalCodeComparison::IllegalCode`].
pub fn compare_octal_codes(a: &[u8], b: &[u8]) -> OctalCodeComparison {
    let (Ok((a_depth, _)), Ok((b_depth, _))) = (code_length(a), code_length(b)) else {
        return OctalCodeComparison::IllegalCode;
    };
    let (a_header, b_header) = (header_len(a_depth), header_len(b_depth));

    for section in 0..a_depth.min(b_depth) {
        let a_value = read_section(a, a_header, section);
        let b_value = read_section(b, b_header, section);
        if a_value != b_value {
            return if a_value < b_value {
                OctalCodeComparison::LessThan
            } else {
                OctalCodeComparison::GreaterThan
            };
        }
    }

    match a_depth.cmp(&b_depth) {
        std::cmp::Ordering::Less => OctalCodeComparison::LessThan,
        std::cmp::Ordering::Greater => OctalCodeComparison::GreaterThan,
        std::cmp::Ordering::Equal => OctalCodeComparison::ExactMatch,
    }
}

/// Whether `ancestor` lies on the path to `descendant`.
///
/// With [`ChildCheck::Child`] the descendant is treated as having one extra
/// level with that section value. The root is an ancestor of everything and
/// every code is its own ancestor. Malformed input is never an ancestor.
pub fn is_ancestor_of(ancestor: &[u8], descendant: &[u8], check: ChildCheck) -> bool {
    let (Ok((ancestor_depth, _)), Ok((descendant_depth, _))) =
        (code_length(ancestor), code_length(descendant))
    else {
        return false;
    };
    if ancestor_depth == 0 {
        return true;
    }

    let extra = match check {
        ChildCheck::NodeOnly => None,
        ChildCheck::Child(index) => Some(index & SECTION_MASK),
    };
    let effective_depth = descendant_depth + usize::from(extra.is_some());
    if ancestor_depth > effective_depth {
        return false;
    }

    let (ancestor_header, descendant_header) =
        (header_len(ancestor_depth), header_len(descendant_depth));
    (0..ancestor_depth).all(|section| {
        let expected = if section < descendant_depth {
            read_section(descendant, descendant_header, section)
        } else {
            extra.unwrap_or_default()
        };
        read_section(ancestor, ancestor_header, section) == expected
    })
}

/// Drop the top `levels` sections, keeping the tail as a new code.
///
/// Returns `None` when nothing would remain.
pub fn chop_octal_code(code: &[u8], levels: usize) -> Result<Option<Vec<u8>>, OctalCodeError> {
    let sections = decode_sections(code)?;
    if sections.len() <= levels {
        return Ok(None);
    }
    encode_sections(&sections[levels..]).map(Some)
}

/// Prefix `code` with the path of `new_parent`. Inverse of [`chop_octal_code`].
pub fn rebase_octal_code(code: &[u8], new_parent: &[u8]) -> Result<Vec<u8>, OctalCodeError> {
    let mut sections = decode_sections(new_parent)?;
    sections.extend(decode_sections(code)?);
    encode_sections(&sections)
}
