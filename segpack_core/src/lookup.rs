use std::collections::HashMap;

use xxhash_rust::xxh3::xxh3_64;

use crate::error::Result;
use crate::format::{encoding_bits_for, word_position};

/// Where a lookup table was stored and the width its indices are packed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupEntry {
    /// Word offset of the table from the channel base.
    pub offset: usize,
    pub encoded_bits: u32,
}

#[derive(Debug)]
struct StoredTable {
    bytes: Vec<u8>,
    entry: LookupEntry,
}

/// Deduplicating store of lookup tables for a single chunk encode.
///
/// Tables are content-addressed by their little-endian bytes: two blocks
/// with the same distinct values share one copy in the buffer. Buckets are
/// keyed by the xxh3 hash of the bytes and compared exactly within a bucket.
#[derive(Debug, Default)]
pub struct LookupTableStore {
    buckets: HashMap<u64, Vec<StoredTable>>,
    reused: usize,
}

impl LookupTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the entry for `table`, appending it to `buffer` on first sight.
    pub fn get_or_create(&mut self, buffer: &mut Vec<u8>, table: &[u32]) -> Result<LookupEntry> {
        let bytes: Vec<u8> = table.iter().flat_map(|v| v.to_le_bytes()).collect();
        let bucket = self.buckets.entry(xxh3_64(&bytes)).or_default();

        if let Some(stored) = bucket.iter().find(|stored| stored.bytes == bytes) {
            self.reused += 1;
            return Ok(stored.entry);
        }

        let entry = LookupEntry {
            offset: word_position(buffer)?,
            encoded_bits: encoding_bits_for(table.len())?,
        };
        buffer.extend_from_slice(&bytes);
        bucket.push(StoredTable { bytes, entry });
        Ok(entry)
    }

    /// Number of distinct tables written so far.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lookups answered from the store without writing.
    pub fn reused(&self) -> usize {
        self.reused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SegmentationError;

    #[test]
    fn identical_tables_are_written_once() {
        let mut buffer = vec![0u8; 16];
        let mut store = LookupTableStore::new();

        let first = store.get_or_create(&mut buffer, &[1, 5, 9]).unwrap();
        assert_eq!(first, LookupEntry { offset: 4, encoded_bits: 2 });
        assert_eq!(buffer.len(), 28);

        let other = store.get_or_create(&mut buffer, &[7]).unwrap();
        assert_eq!(other, LookupEntry { offset: 7, encoded_bits: 0 });

        let again = store.get_or_create(&mut buffer, &[1, 5, 9]).unwrap();
        assert_eq!(again, first);
        assert_eq!(buffer.len(), 32);
        assert_eq!(store.len(), 2);
        assert_eq!(store.reused(), 1);
    }

    #[test]
    fn table_bytes_are_little_endian() {
        let mut buffer = Vec::new();
        let mut store = LookupTableStore::new();
        store.get_or_create(&mut buffer, &[0x0102_0304, 7]).unwrap();
        assert_eq!(buffer, [4, 3, 2, 1, 7, 0, 0, 0]);
    }

    #[test]
    fn misaligned_buffer_is_a_bug() {
        let mut buffer = vec![0u8; 5];
        let err = LookupTableStore::new()
            .get_or_create(&mut buffer, &[1])
            .unwrap_err();
        assert!(matches!(err, SegmentationError::InvariantViolation(_)));
    }
}
