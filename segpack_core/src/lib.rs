pub mod bitpack;
pub mod block;
pub mod chunk;
pub mod codec;
pub mod error;
pub mod format;
pub mod info;
pub mod lookup;
pub mod reader;
pub mod volume;
pub mod writer;

pub use chunk::{decode_block_at, decode_chunk, encode_chunk, read_block_headers, Chunk, ChunkBounds};
pub use codec::ContentEncoding;
pub use error::{Result, SegmentationError};
pub use format::{BlockHeader, ChunkHeader};
pub use info::VolumeInfo;
pub use lookup::LookupTableStore;
pub use reader::VolumeReader;
pub use volume::{chunk_bounds, read_raw_volume, write_raw_volume, VoxelType};
pub use writer::{VolumeWriter, WriteSummary, WriterOptions};
