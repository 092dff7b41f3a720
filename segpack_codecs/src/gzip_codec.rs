use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use segpack_core::codec::ContentEncoding;
use segpack_core::Result;

/// Gzip-wrapped chunk files.
///
/// Static file servers can hand these out with `Content-Encoding: gzip`, so
/// the viewer still receives the plain chunk buffer.
pub struct GzipEncoding {
    /// Compression level (0 = store, 9 = smallest).
    pub level: u32,
}

impl Default for GzipEncoding {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipEncoding {
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }
}

impl ContentEncoding for GzipEncoding {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn encode(&self, chunk: &[u8]) -> Result<Vec<u8>> {
        let mut enc = GzEncoder::new(Vec::with_capacity(chunk.len() / 2), Compression::new(self.level));
        enc.write_all(chunk)?;
        Ok(enc.finish()?)
    }

    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>> {
        let mut raw = Vec::new();
        GzDecoder::new(stored).read_to_end(&mut raw)?;
        Ok(raw)
    }
}
