//! Encoding and decoding of a single block: a lookup table of the block's
//! distinct values plus the packed per-voxel indices into it.

use ndarray::{Array3, ArrayView3};

use crate::bitpack::{pack_into, unpack};
use crate::error::{Result, SegmentationError};
use crate::format::{read_word, word_position, BlockHeader, WORD_SIZE};
use crate::lookup::LookupTableStore;

/// Index written for voxels of an edge block that lie outside the chunk.
/// They decode to the first lookup-table entry and are clipped away.
pub const PADDING_INDEX: u32 = 0;

/// Sorted distinct values of `block` and the index of every voxel into them.
pub fn unique_with_inverse(block: &ArrayView3<'_, u32>) -> (Vec<u32>, Vec<u32>) {
    let mut table: Vec<u32> = block.iter().copied().collect();
    table.sort_unstable();
    table.dedup();

    let inverse = block
        .iter()
        .map(|value| table.binary_search(value).unwrap_or_else(|slot| slot) as u32)
        .collect();
    (table, inverse)
}

/// Encode `block` into `channel`, writing its header at `header_offset`.
///
/// `block` holds the true voxels; it may be smaller than `block_shape` at the
/// trailing edges of a chunk, in which case the index array is padded with
/// [`PADDING_INDEX`]. The lookup table goes through `tables` and may be shared
/// with earlier blocks; the packed indices are always appended.
pub fn encode_block(
    block: &ArrayView3<'_, u32>,
    block_shape: [usize; 3],
    tables: &mut LookupTableStore,
    channel: &mut Vec<u8>,
    header_offset: usize,
) -> Result<BlockHeader> {
    let (dz, dy, dx) = block.dim();
    let [bz, by, bx] = block_shape;
    if dz > bz || dy > by || dx > bx {
        return Err(SegmentationError::InvariantViolation(format!(
            "block of shape {:?} is larger than the block shape {:?}",
            [dz, dy, dx],
            block_shape
        )));
    }

    let (table, inverse) = unique_with_inverse(block);
    let indices = if [dz, dy, dx] == block_shape {
        inverse
    } else {
        let mut padded = vec![PADDING_INDEX; bz * by * bx];
        let mut source = inverse.into_iter();
        for z in 0..dz {
            for y in 0..dy {
                let row = (z * by + y) * bx;
                for slot in &mut padded[row..row + dx] {
                    *slot = source.next().unwrap_or(PADDING_INDEX);
                }
            }
        }
        padded
    };

    let lookup = tables.get_or_create(channel, &table)?;
    let encoded_values_offset = word_position(channel)?;
    pack_into(channel, &indices, lookup.encoded_bits)?;

    let header = BlockHeader::new(lookup.offset, lookup.encoded_bits, encoded_values_offset)?;
    let slot = channel
        .get_mut(header_offset..header_offset + header.to_bytes().len())
        .ok_or_else(|| {
            SegmentationError::InvariantViolation(format!(
                "block header at byte {} lies outside the reserved header region",
                header_offset
            ))
        })?;
    slot.copy_from_slice(&header.to_bytes());
    Ok(header)
}

/// Decode the block whose header sits at `header_offset` of `channel`.
///
/// The result always has the full `block_shape`; voxels past the chunk
/// boundary hold padding and must be clipped by the caller.
pub fn decode_block(channel: &[u8], header_offset: usize, block_shape: [usize; 3]) -> Result<Array3<u32>> {
    let header = BlockHeader::read(channel, header_offset)?;
    let lookup_offset = header.lookup_table_offset as usize;
    let [bz, by, bx] = block_shape;

    if header.encoded_bits == 0 {
        let value = read_word(channel, lookup_offset, "lookup table")?;
        return Ok(Array3::from_elem((bz, by, bx), value));
    }

    let voxels = bz * by * bx;
    let start = header.encoded_values_offset as usize * WORD_SIZE;
    let packed = channel.get(start..).unwrap_or_default();
    let mut indices = unpack(packed, header.encoded_bits, voxels).map_err(|err| match err {
        SegmentationError::TruncatedBuffer { what, needed, available, .. } => {
            SegmentationError::TruncatedBuffer {
                what,
                offset: header.encoded_values_offset as usize,
                needed,
                available,
            }
        }
        other => other,
    })?;
    indices.truncate(voxels);

    // Only the referenced prefix of the table is read; a well-formed table has
    // at most 2^bits entries and every index points inside it.
    let entries = indices.iter().max().map_or(0, |&max| max as usize + 1);
    let table = read_table(channel, lookup_offset, entries)?;
    let values = indices.iter().map(|&index| table[index as usize]).collect();

    Array3::from_shape_vec((bz, by, bx), values)
        .map_err(|err| SegmentationError::InvariantViolation(format!("block reshape failed: {err}")))
}

fn read_table(channel: &[u8], offset: usize, entries: usize) -> Result<Vec<u32>> {
    let start = offset * WORD_SIZE;
    let bytes = channel
        .get(start..start + entries * WORD_SIZE)
        .ok_or(SegmentationError::TruncatedBuffer {
            what: "lookup table",
            offset,
            needed: entries,
            available: (channel.len() / WORD_SIZE).saturating_sub(offset),
        })?;
    Ok(bytes
        .chunks_exact(WORD_SIZE)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr3, s};

    #[test]
    fn inverse_indexes_sorted_table() {
        let block = arr3(&[[[7, 3], [3, 9]]]);
        let (table, inverse) = unique_with_inverse(&block.view());
        assert_eq!(table, vec![3, 7, 9]);
        assert_eq!(inverse, vec![1, 0, 0, 2]);
    }

    #[test]
    fn decodes_known_layout_with_padding_rows() {
        // Lookup table [42, 22, 55] at word 2, packed indices [1, 0, 2, 0] at word 5.
        let mut channel = vec![0u8; 8];
        for value in [42u32, 22, 55] {
            channel.extend_from_slice(&value.to_le_bytes());
        }
        pack_into(&mut channel, &[1, 0, 2, 0], 2).unwrap();
        let header = BlockHeader::new(2, 2, 5).unwrap();
        channel[..8].copy_from_slice(&header.to_bytes());

        let block = decode_block(&channel, 0, [1, 4, 4]).unwrap();
        assert_eq!(block.slice(s![0, 0, ..]).to_vec(), vec![22, 42, 55, 42]);
        for row in 1..4 {
            assert_eq!(block.slice(s![0, row, ..]).to_vec(), vec![42; 4]);
        }
    }

    #[test]
    fn constant_block_stores_no_indices() {
        let block = Array3::from_elem((2, 2, 2), 17u32);
        let mut channel = vec![0u8; 8];
        let mut tables = LookupTableStore::new();
        let header = encode_block(&block.view(), [2, 2, 2], &mut tables, &mut channel, 0).unwrap();

        assert_eq!(header.encoded_bits, 0);
        assert_eq!(header.lookup_table_offset, 2);
        assert_eq!(header.encoded_values_offset, 3);
        assert_eq!(channel.len(), 12);
        assert_eq!(decode_block(&channel, 0, [2, 2, 2]).unwrap(), block);
    }

    #[test]
    fn edge_block_is_padded_to_full_shape() {
        let block = arr3(&[[[1, 2, 3], [4, 5, 6]]]);
        let mut channel = vec![0u8; 8];
        let mut tables = LookupTableStore::new();
        let header = encode_block(&block.view(), [2, 4, 4], &mut tables, &mut channel, 0).unwrap();
        assert_eq!(header.encoded_bits, 4);
        // 32 indices at 4 bits -> 4 words after the 6-entry table.
        assert_eq!(channel.len(), 8 + 6 * 4 + 4 * 4);

        let decoded = decode_block(&channel, 0, [2, 4, 4]).unwrap();
        assert_eq!(decoded.slice(s![..1, ..2, ..3]), block);
        assert_eq!(decoded[[1, 3, 3]], 1, "padding decodes to the first table entry");
    }

    #[test]
    fn out_of_range_index_is_truncation() {
        // Two-entry table declared at 1 bit but the buffer ends after one entry.
        let mut channel = vec![0u8; 8];
        pack_into(&mut channel, &[1; 8], 1).unwrap();
        channel.extend_from_slice(&5u32.to_le_bytes());
        let header = BlockHeader::new(3, 1, 2).unwrap();
        channel[..8].copy_from_slice(&header.to_bytes());

        let err = decode_block(&channel, 0, [2, 2, 2]).unwrap_err();
        assert!(matches!(err, SegmentationError::TruncatedBuffer { what: "lookup table", .. }));
    }
}
