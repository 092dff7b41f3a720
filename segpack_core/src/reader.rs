use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use ndarray::{s, Array3};
use rayon::prelude::*;

use crate::chunk::{decode_block_at, decode_chunk, ChunkBounds};
use crate::codec::ContentEncoding;
use crate::error::{Result, SegmentationError};
use crate::info::VolumeInfo;
use crate::volume::chunk_bounds;

/// Reader for a volume directory produced by [`crate::VolumeWriter`].
///
/// # Open sequence
/// 1. Read and validate `<root>/info` (one scale, compressed segmentation, uint32).
/// 2. Derive the chunk grid from the volume and chunk sizes.
///
/// Chunk files are only touched when a chunk or block is requested.
pub struct VolumeReader {
    root: PathBuf,
    info: VolumeInfo,
    volume_shape: [usize; 3],
    chunk_shape: [usize; 3],
    block_shape: [usize; 3],
    encoding: Arc<dyn ContentEncoding>,
}

impl VolumeReader {
    pub fn open(root: impl AsRef<Path>, encoding: Arc<dyn ContentEncoding>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let info = VolumeInfo::read(&root)?;
        let volume_shape = info.volume_shape()?;
        let chunk_shape = info.chunk_shape()?;
        let block_shape = info.block_shape()?;
        if chunk_shape.contains(&0) || block_shape.contains(&0) {
            return Err(SegmentationError::Metadata(format!(
                "chunk size {:?} / block size {:?} has a zero dimension",
                chunk_shape, block_shape
            )));
        }
        debug!(
            "opened {}: volume {:?}, chunks {:?}, blocks {:?}",
            root.display(),
            volume_shape,
            chunk_shape,
            block_shape
        );
        Ok(Self {
            root,
            info,
            volume_shape,
            chunk_shape,
            block_shape,
            encoding,
        })
    }

    pub fn info(&self) -> &VolumeInfo {
        &self.info
    }

    /// Volume shape, z, y, x.
    pub fn volume_shape(&self) -> [usize; 3] {
        self.volume_shape
    }

    pub fn chunk_shape(&self) -> [usize; 3] {
        self.chunk_shape
    }

    pub fn block_shape(&self) -> [usize; 3] {
        self.block_shape
    }

    /// Bounds of every chunk in the volume, in write order.
    pub fn chunk_bounds(&self) -> Result<Vec<ChunkBounds>> {
        chunk_bounds(self.volume_shape, self.chunk_shape)
    }

    /// The encoded (but no longer content-encoded) buffer of one chunk.
    pub fn read_chunk_buffer(&self, bounds: &ChunkBounds) -> Result<Vec<u8>> {
        let key = &self.info.scale()?.key;
        let stored = fs::read(self.root.join(key).join(bounds.file_name()))?;
        self.encoding.decode(&stored)
    }

    /// Decode one chunk.
    pub fn read_chunk(&self, bounds: &ChunkBounds) -> Result<Array3<u32>> {
        let buffer = self.read_chunk_buffer(bounds)?;
        decode_chunk(&buffer, bounds.shape(), self.block_shape)
    }

    /// Decode a single block of one chunk, clipped to the chunk.
    pub fn read_block(&self, bounds: &ChunkBounds, cell: [usize; 3]) -> Result<Array3<u32>> {
        let buffer = self.read_chunk_buffer(bounds)?;
        decode_block_at(&buffer, bounds.shape(), self.block_shape, cell)
    }

    /// Decode every chunk and assemble the full volume.
    pub fn read_volume(&self) -> Result<Array3<u32>> {
        let bounds = self.chunk_bounds()?;
        let chunks = bounds
            .par_iter()
            .map(|b| self.read_chunk(b))
            .collect::<Result<Vec<_>>>()?;

        let [z, y, x] = self.volume_shape;
        let mut volume = Array3::<u32>::zeros((z, y, x));
        for (b, chunk) in bounds.iter().zip(&chunks) {
            volume
                .slice_mut(s![b.start[0]..b.end[0], b.start[1]..b.end[1], b.start[2]..b.end[2]])
                .assign(chunk);
        }
        info!("decoded {} chunks from {}", chunks.len(), self.root.display());
        Ok(volume)
    }
}
