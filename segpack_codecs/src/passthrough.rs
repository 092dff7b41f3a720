use segpack_core::codec::ContentEncoding;
use segpack_core::Result;

/// Stores chunk buffers verbatim.
///
/// This is what a viewer fetching chunk files over plain HTTP expects, and
/// the default for the CLI.
pub struct RawEncoding;

impl ContentEncoding for RawEncoding {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn encode(&self, chunk: &[u8]) -> Result<Vec<u8>> {
        Ok(chunk.to_vec())
    }

    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>> {
        Ok(stored.to_vec())
    }
}
