//! Fixed-width packing of lookup-table indices into little-endian u32 words.
//!
//! Value `i` of a stream packed at `bits` bits occupies bits
//! `[(i % k) * bits, (i % k) * bits + bits)` of word `i / k`, where
//! `k = 32 / bits`. The last word is zero-filled. A width of zero stores
//! nothing: the block is a single constant taken from its lookup table.

use crate::error::{Result, SegmentationError};
use crate::format::{check_encoded_bits, WORD_SIZE};

#[inline]
fn value_mask(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

/// Number of values that share one 32-bit word at `bits` width.
#[inline]
pub fn values_per_word(bits: u32) -> usize {
    (32 / bits) as usize
}

/// Number of words needed to hold `count` values at `bits` width.
pub fn packed_words(count: usize, bits: u32) -> usize {
    if bits == 0 {
        0
    } else {
        count.div_ceil(values_per_word(bits))
    }
}

/// Append `values` packed at `bits` width to `out`, returning the number of
/// words written.
pub fn pack_into(out: &mut Vec<u8>, values: &[u32], bits: u32) -> Result<usize> {
    check_encoded_bits(bits)?;
    if bits == 0 {
        return Ok(0);
    }
    let mask = value_mask(bits);
    let per_word = values_per_word(bits);
    out.reserve(packed_words(values.len(), bits) * WORD_SIZE);

    let mut words = 0;
    for group in values.chunks(per_word) {
        let mut word = 0u32;
        for (slot, &value) in group.iter().enumerate() {
            if value & !mask != 0 {
                return Err(SegmentationError::InvariantViolation(format!(
                    "value {} does not fit in {} bits",
                    value, bits
                )));
            }
            word |= value << (slot as u32 * bits);
        }
        out.extend_from_slice(&word.to_le_bytes());
        words += 1;
    }
    Ok(words)
}

/// Pack `values` at `bits` width into a fresh byte vector.
pub fn pack(values: &[u32], bits: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    pack_into(&mut out, values, bits)?;
    Ok(out)
}

/// Unpack at least `count` values stored at `bits` width.
///
/// Whole words are always expanded, so the result length is `count` rounded
/// up to a multiple of `32 / bits`; callers slice off the tail they need.
pub fn unpack(packed: &[u8], bits: u32, count: usize) -> Result<Vec<u32>> {
    check_encoded_bits(bits)?;
    if bits == 0 {
        return Err(SegmentationError::InvariantViolation(
            "cannot unpack values stored with 0 bits".to_string(),
        ));
    }
    let words = packed_words(count, bits);
    let available = packed.len() / WORD_SIZE;
    if available < words {
        return Err(SegmentationError::TruncatedBuffer {
            what: "encoded values",
            offset: 0,
            needed: words,
            available,
        });
    }

    let mask = value_mask(bits);
    let per_word = values_per_word(bits);
    let mut values = Vec::with_capacity(words * per_word);
    for bytes in packed.chunks_exact(WORD_SIZE).take(words) {
        let word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        for slot in 0..per_word {
            values.push((word >> (slot as u32 * bits)) & mask);
        }
    }
    Ok(values)
}
