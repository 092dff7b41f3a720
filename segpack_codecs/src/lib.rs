mod gzip_codec;
mod passthrough;

pub use gzip_codec::GzipEncoding;
pub use passthrough::RawEncoding;

use segpack_core::{ContentEncoding, Result, SegmentationError};
use std::sync::Arc;

/// First two bytes of every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Resolve a content encoding from its command-line name.
pub fn encoding_by_name(name: &str) -> Result<Arc<dyn ContentEncoding>> {
    encoding_with_level(name, GzipEncoding::default().level)
}

/// Like [`encoding_by_name`], with an explicit gzip level. Ignored for raw.
pub fn encoding_with_level(name: &str, gzip_level: u32) -> Result<Arc<dyn ContentEncoding>> {
    match name {
        "raw" | "none" => Ok(Arc::new(RawEncoding)),
        "gzip" | "gz" => Ok(Arc::new(GzipEncoding::new(gzip_level))),
        other => Err(SegmentationError::Metadata(format!(
            "unknown content encoding '{}'; expected raw or gzip",
            other
        ))),
    }
}

/// Pick the encoding a stored chunk file was written with.
///
/// A raw chunk starts with its chunk header, a small word offset whose first
/// byte is never 0x1f for single-channel data, so the gzip magic is
/// unambiguous.
pub fn detect_encoding(stored: &[u8]) -> Arc<dyn ContentEncoding> {
    if stored.starts_with(&GZIP_MAGIC) {
        Arc::new(GzipEncoding::default())
    } else {
        Arc::new(RawEncoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trips_and_is_detected() {
        let chunk: Vec<u8> = (0..4096u32).flat_map(|v| (v % 3).to_le_bytes()).collect();
        let gzip = GzipEncoding::default();
        let stored = gzip.encode(&chunk).unwrap();
        assert!(stored.len() < chunk.len());
        assert_eq!(detect_encoding(&stored).name(), "gzip");
        assert_eq!(detect_encoding(&stored).decode(&stored).unwrap(), chunk);
    }

    #[test]
    fn raw_chunks_are_detected_as_raw() {
        let chunk = [1u8, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(detect_encoding(&chunk).name(), "raw");
        assert_eq!(RawEncoding.encode(&chunk).unwrap(), chunk);
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(encoding_by_name("zstd").is_err());
        assert_eq!(encoding_by_name("gz").unwrap().name(), "gzip");
    }

    #[test]
    fn gzip_level_is_applied() {
        let chunk: Vec<u8> = (0..8192u32).flat_map(|v| (v % 251).to_le_bytes()).collect();
        let stored = encoding_with_level("gzip", 0).unwrap().encode(&chunk).unwrap();
        let best = encoding_with_level("gzip", 9).unwrap().encode(&chunk).unwrap();
        assert!(stored.len() > chunk.len());
        assert!(best.len() < chunk.len());
        assert_eq!(detect_encoding(&best).decode(&best).unwrap(), chunk);
        assert_eq!(encoding_with_level("raw", 9).unwrap().name(), "raw");
        assert!(encoding_with_level("lz4", 1).is_err());
    }
}
