use crate::error::{Result, SegmentationError};

/// Bytes per 32-bit word. Every offset stored in a chunk is counted in words.
pub const WORD_SIZE: usize = 4;

/// Size of one block header in bytes: two little-endian u32 words.
pub const BLOCK_HEADER_SIZE: usize = 8;

/// Number of channels in every chunk this codec writes.
pub const NUM_CHANNELS: usize = 1;

/// The only bit widths a block may be packed with.
pub const ALLOWED_ENCODED_BITS: [u32; 7] = [0, 1, 2, 4, 8, 16, 32];

/// Mask for the 24-bit lookup-table offset stored in the low bits of word 0.
pub const LOOKUP_OFFSET_MASK: u32 = 0x00FF_FFFF;

/// Shift of the 8-bit `encoded_bits` field in word 0.
pub const ENCODED_BITS_SHIFT: u32 = 24;

// ── Volume defaults ─────────────────────────────────────────────────────────

/// Default block shape (z, y, x).
pub const DEFAULT_BLOCK_SHAPE: [usize; 3] = [8, 8, 8];

/// Default chunk shape (z, y, x).
pub const DEFAULT_CHUNK_SHAPE: [usize; 3] = [64, 64, 64];

/// Default scale key, i.e. the directory holding the chunk files.
pub const DEFAULT_DATA_KEY: &str = "data";

/// Name of the metadata file at the volume root.
pub const INFO_FILE_NAME: &str = "info";

/// Value of the `encoding` field of a scale in the `info` file.
pub const ENCODING_NAME: &str = "compressed_segmentation";

// ── Bit widths ──────────────────────────────────────────────────────────────

/// Smallest allowed bit width able to index `distinct` lookup-table entries.
///
/// A single distinct value needs no bits at all; the block is then stored as
/// its lookup table alone.
pub fn encoding_bits_for(distinct: usize) -> Result<u32> {
    ALLOWED_ENCODED_BITS
        .iter()
        .copied()
        .find(|&bits| (1u64 << bits) >= distinct as u64)
        .ok_or(SegmentationError::TooManyDistinctValues(distinct))
}

pub fn check_encoded_bits(bits: u32) -> Result<u32> {
    if ALLOWED_ENCODED_BITS.contains(&bits) {
        Ok(bits)
    } else {
        Err(SegmentationError::MalformedHeader(format!(
            "encoded bits must be one of {:?} but got {}",
            ALLOWED_ENCODED_BITS, bits
        )))
    }
}

/// Read the little-endian u32 word at `word_offset`.
pub fn read_word(buf: &[u8], word_offset: usize, what: &'static str) -> Result<u32> {
    let start = word_offset * WORD_SIZE;
    match buf.get(start..start + WORD_SIZE) {
        Some(bytes) => Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(SegmentationError::TruncatedBuffer {
            what,
            offset: word_offset,
            needed: 1,
            available: buf.len() / WORD_SIZE,
        }),
    }
}

/// Word position of the end of `buf`, which must be word-aligned.
pub fn word_position(buf: &[u8]) -> Result<usize> {
    if buf.len() % WORD_SIZE != 0 {
        return Err(SegmentationError::InvariantViolation(format!(
            "buffer length {} is not a multiple of {}",
            buf.len(),
            WORD_SIZE
        )));
    }
    Ok(buf.len() / WORD_SIZE)
}

// ── Chunk header ────────────────────────────────────────────────────────────

/// Per-channel offsets at the start of every chunk.
///
/// Each entry is the offset, in words from the start of the chunk, of the
/// channel's block-header region. With a single channel that is always `1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    pub channel_offsets: [u32; NUM_CHANNELS],
}

impl ChunkHeader {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = NUM_CHANNELS * WORD_SIZE;

    pub fn single_channel() -> Self {
        Self {
            channel_offsets: [NUM_CHANNELS as u32],
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        for (slot, offset) in self.channel_offsets.iter().enumerate() {
            buf[slot * WORD_SIZE..(slot + 1) * WORD_SIZE].copy_from_slice(&offset.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut channel_offsets = [0u32; NUM_CHANNELS];
        for (slot, offset) in channel_offsets.iter_mut().enumerate() {
            *offset = read_word(buf, slot, "chunk header")?;
            if (*offset as usize) < NUM_CHANNELS {
                return Err(SegmentationError::MalformedHeader(format!(
                    "channel {} data offset {} points inside the chunk header",
                    slot, offset
                )));
            }
        }
        Ok(Self { channel_offsets })
    }

    /// Byte range of channel 0's data within the chunk buffer.
    pub fn channel_data<'a>(&self, chunk: &'a [u8]) -> Result<&'a [u8]> {
        let start = self.channel_offsets[0] as usize * WORD_SIZE;
        chunk
            .get(start..)
            .ok_or(SegmentationError::TruncatedBuffer {
                what: "channel data",
                offset: self.channel_offsets[0] as usize,
                needed: 0,
                available: chunk.len() / WORD_SIZE,
            })
    }
}

// ── Block header ────────────────────────────────────────────────────────────

/// Decoded representation of one 64-bit block header.
///
/// Both offsets are in words, measured from the channel base (the first block
/// header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHeader {
    pub lookup_table_offset: u32,
    pub encoded_bits: u32,
    pub encoded_values_offset: u32,
}

impl BlockHeader {
    /// Build a header, rejecting offsets that do not fit their fields.
    pub fn new(lookup_table_offset: usize, encoded_bits: u32, encoded_values_offset: usize) -> Result<Self> {
        if lookup_table_offset > LOOKUP_OFFSET_MASK as usize {
            return Err(SegmentationError::OffsetOverflow {
                field: "lookup table",
                offset: lookup_table_offset,
                bits: 24,
            });
        }
        let encoded_values_offset =
            u32::try_from(encoded_values_offset).map_err(|_| SegmentationError::OffsetOverflow {
                field: "encoded values",
                offset: encoded_values_offset,
                bits: 32,
            })?;
        Ok(Self {
            lookup_table_offset: lookup_table_offset as u32,
            encoded_bits: check_encoded_bits(encoded_bits)?,
            encoded_values_offset,
        })
    }

    /// Byte offset of the header for grid cell `(z, y, x)` in a grid of `grid` cells.
    pub fn byte_offset(cell: [usize; 3], grid: [usize; 3]) -> usize {
        let [z, y, x] = cell;
        let [_, gy, gx] = grid;
        BLOCK_HEADER_SIZE * (x + gx * (y + gy * z))
    }

    /// Serialize to exactly `BLOCK_HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let word0 = (self.lookup_table_offset & LOOKUP_OFFSET_MASK) | (self.encoded_bits << ENCODED_BITS_SHIFT);
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        buf[0..4].copy_from_slice(&word0.to_le_bytes());
        buf[4..8].copy_from_slice(&self.encoded_values_offset.to_le_bytes());
        buf
    }

    /// Split the two header words into their fields without validating them.
    pub fn from_words(word0: u32, word1: u32) -> Self {
        Self {
            lookup_table_offset: word0 & LOOKUP_OFFSET_MASK,
            encoded_bits: word0 >> ENCODED_BITS_SHIFT,
            encoded_values_offset: word1,
        }
    }

    /// Read and validate the header at `byte_offset` of the channel data.
    pub fn read(channel: &[u8], byte_offset: usize) -> Result<Self> {
        let word = byte_offset / WORD_SIZE;
        let header = Self::from_words(
            read_word(channel, word, "block header")?,
            read_word(channel, word + 1, "block header")?,
        );
        check_encoded_bits(header.encoded_bits)?;

        let available = channel.len() / WORD_SIZE;
        if header.lookup_table_offset as usize > available {
            return Err(SegmentationError::TruncatedBuffer {
                what: "lookup table",
                offset: header.lookup_table_offset as usize,
                needed: 1,
                available,
            });
        }
        if header.encoded_bits != 0 && header.encoded_values_offset as usize > available {
            return Err(SegmentationError::TruncatedBuffer {
                what: "encoded values",
                offset: header.encoded_values_offset as usize,
                needed: 1,
                available,
            });
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_header_bit_layout() {
        let header = BlockHeader {
            lookup_table_offset: 0xBEEF00,
            encoded_bits: 0xAB,
            encoded_values_offset: 0xDEAD_BEEF,
        };
        let bytes = header.to_bytes();
        let word0 = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let word1 = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(word0 & 0x00FF_FFFF, 0xBEEF00);
        assert_eq!(word0 >> 24, 0xAB);
        assert_eq!(word1, 0xDEAD_BEEF);
        assert_eq!(BlockHeader::from_words(word0, word1), header);
    }

    #[test]
    fn read_rejects_unknown_bit_width() {
        let header = BlockHeader {
            lookup_table_offset: 2,
            encoded_bits: 3,
            encoded_values_offset: 2,
        };
        let mut channel = header.to_bytes().to_vec();
        channel.extend_from_slice(&7u32.to_le_bytes());
        let err = BlockHeader::read(&channel, 0).unwrap_err();
        assert!(matches!(err, SegmentationError::MalformedHeader(_)), "got {err:?}");
    }

    #[test]
    fn read_rejects_offsets_past_the_end() {
        let header = BlockHeader {
            lookup_table_offset: 40,
            encoded_bits: 2,
            encoded_values_offset: 2,
        };
        let err = BlockHeader::read(&header.to_bytes(), 0).unwrap_err();
        assert!(matches!(err, SegmentationError::TruncatedBuffer { what: "lookup table", .. }));
    }

    #[test]
    fn new_rejects_wide_lookup_offset() {
        let err = BlockHeader::new(1 << 24, 1, 0).unwrap_err();
        assert!(matches!(err, SegmentationError::OffsetOverflow { bits: 24, .. }));
    }

    #[test]
    fn encoding_bits_are_minimal() {
        assert_eq!(encoding_bits_for(0).unwrap(), 0);
        assert_eq!(encoding_bits_for(1).unwrap(), 0);
        assert_eq!(encoding_bits_for(2).unwrap(), 1);
        assert_eq!(encoding_bits_for(3).unwrap(), 2);
        assert_eq!(encoding_bits_for(5).unwrap(), 4);
        assert_eq!(encoding_bits_for(17).unwrap(), 8);
        assert_eq!(encoding_bits_for(257).unwrap(), 16);
        assert_eq!(encoding_bits_for(65_537).unwrap(), 32);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn more_than_u32_distinct_values_are_rejected() {
        assert_eq!(encoding_bits_for(1usize << 32).unwrap(), 32);
        assert!(matches!(
            encoding_bits_for((1usize << 32) + 1),
            Err(SegmentationError::TooManyDistinctValues(n)) if n == (1usize << 32) + 1
        ));
    }

    #[test]
    fn header_offsets_follow_scan_order() {
        let grid = [2, 3, 4];
        assert_eq!(BlockHeader::byte_offset([0, 0, 0], grid), 0);
        assert_eq!(BlockHeader::byte_offset([0, 0, 1], grid), 8);
        assert_eq!(BlockHeader::byte_offset([0, 1, 0], grid), 32);
        assert_eq!(BlockHeader::byte_offset([1, 0, 0], grid), 96);
        assert_eq!(BlockHeader::byte_offset([1, 2, 3], grid), 8 * 23);
    }

    #[test]
    fn chunk_header_points_past_itself() {
        let header = ChunkHeader::single_channel();
        assert_eq!(header.to_bytes(), 1u32.to_le_bytes());
        assert_eq!(ChunkHeader::from_bytes(&header.to_bytes()).unwrap(), header);
        assert!(ChunkHeader::from_bytes(&0u32.to_le_bytes()).is_err());
    }
}
