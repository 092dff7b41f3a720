use crate::error::Result;

/// Byte-level encoding applied to each chunk file on disk.
///
/// The compressed-segmentation buffer is written verbatim by the raw
/// encoding; other implementations (gzip) wrap it for storage and must give
/// back the exact buffer on `decode`. Implementations are shared across the
/// writer's worker threads and must keep no per-chunk state.
pub trait ContentEncoding: Send + Sync {
    /// Name used on the command line and in log output.
    fn name(&self) -> &'static str;

    /// Wrap an encoded chunk buffer for storage.
    fn encode(&self, chunk: &[u8]) -> Result<Vec<u8>>;

    /// Recover the encoded chunk buffer from stored bytes.
    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>>;
}
