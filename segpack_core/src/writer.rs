use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use ndarray::{s, ArrayView3};
use rayon::prelude::*;

use crate::chunk::{encode_chunk, ChunkBounds};
use crate::codec::ContentEncoding;
use crate::error::{Result, SegmentationError};
use crate::format::{DEFAULT_BLOCK_SHAPE, DEFAULT_CHUNK_SHAPE, DEFAULT_DATA_KEY};
use crate::info::VolumeInfo;
use crate::volume::chunk_bounds;

/// How a volume is cut into chunks and blocks and where it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterOptions {
    /// Chunk shape, z, y, x. Each chunk becomes one file.
    pub chunk_shape: [usize; 3],
    /// Block shape, z, y, x, inside every chunk.
    pub block_shape: [usize; 3],
    /// Voxel size, z, y, x, recorded in the `info` file.
    pub resolution: [f64; 3],
    /// Directory under the root holding the chunk files.
    pub key: String,
    /// Replace every non-zero label with this value before encoding.
    pub convert_non_zero_to: Option<u32>,
    /// Remove an existing output directory instead of failing.
    pub overwrite: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            chunk_shape: DEFAULT_CHUNK_SHAPE,
            block_shape: DEFAULT_BLOCK_SHAPE,
            resolution: [1.0; 3],
            key: DEFAULT_DATA_KEY.to_string(),
            convert_non_zero_to: None,
            overwrite: false,
        }
    }
}

/// Totals reported by [`VolumeWriter::write_volume`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub chunks: usize,
    /// Size of the volume as u32 voxels.
    pub raw_bytes: u64,
    /// Bytes of chunk files written, after content encoding.
    pub stored_bytes: u64,
}

/// Writer for a single-scale compressed-segmentation volume directory.
///
/// # Layout written
/// ```text
/// <root>/info                         ← JSON metadata, written last
/// <root>/<key>/<x0>-<x1>_<y0>-<y1>_<z0>-<z1>   ← one file per chunk
/// ```
/// Chunks are independent: each one is encoded with its own buffer and
/// lookup-table store, so they are encoded and written in parallel.
pub struct VolumeWriter {
    root: PathBuf,
    options: WriterOptions,
    encoding: Arc<dyn ContentEncoding>,
}

impl VolumeWriter {
    /// Prepare `root` for writing.
    ///
    /// Fails if `root` already exists, unless `options.overwrite` is set, in
    /// which case the old directory is removed first.
    pub fn create(root: impl AsRef<Path>, options: WriterOptions, encoding: Arc<dyn ContentEncoding>) -> Result<Self> {
        for (name, shape) in [("chunk", options.chunk_shape), ("block", options.block_shape)] {
            if shape.contains(&0) {
                return Err(SegmentationError::InvalidShape(format!(
                    "{} shape {:?} has a zero dimension",
                    name, shape
                )));
            }
        }

        let root = root.as_ref().to_path_buf();
        if root.exists() {
            if !options.overwrite {
                return Err(SegmentationError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("output directory {} already exists", root.display()),
                )));
            }
            info!("removing existing output directory {}", root.display());
            fs::remove_dir_all(&root)?;
        }
        fs::create_dir_all(root.join(&options.key))?;

        Ok(Self {
            root,
            options,
            encoding,
        })
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    fn chunk_path(&self, bounds: &ChunkBounds) -> PathBuf {
        self.root.join(&self.options.key).join(bounds.file_name())
    }

    /// Encode and store the chunk of `volume` covered by `bounds`.
    ///
    /// Returns the number of bytes written.
    pub fn write_chunk(&self, volume: &ArrayView3<'_, u32>, bounds: ChunkBounds) -> Result<u64> {
        let (z, y, x) = volume.dim();
        let dim = [z, y, x];
        if (0..3).any(|axis| bounds.start[axis] > bounds.end[axis] || bounds.end[axis] > dim[axis]) {
            return Err(SegmentationError::InvalidShape(format!(
                "chunk {:?}..{:?} lies outside volume of shape {:?}",
                bounds.start, bounds.end, dim
            )));
        }
        let data = volume.slice(s![
            bounds.start[0]..bounds.end[0],
            bounds.start[1]..bounds.end[1],
            bounds.start[2]..bounds.end[2]
        ]);
        let chunk = encode_chunk(data, bounds, self.options.block_shape, self.options.convert_non_zero_to)?;
        let stored = self.encoding.encode(&chunk.buffer)?;
        let path = self.chunk_path(&bounds);
        fs::write(&path, &stored)?;
        debug!(
            "wrote {} ({} bytes, {} encoding)",
            path.display(),
            stored.len(),
            self.encoding.name()
        );
        Ok(stored.len() as u64)
    }

    /// Encode every chunk of `volume`, then write the `info` file.
    pub fn write_volume(&self, volume: ArrayView3<'_, u32>) -> Result<WriteSummary> {
        let (z, y, x) = volume.dim();
        let shape = [z, y, x];
        let bounds = chunk_bounds(shape, self.options.chunk_shape)?;
        info!(
            "encoding {:?} volume as {} chunks of {:?} (blocks {:?})",
            shape,
            bounds.len(),
            self.options.chunk_shape,
            self.options.block_shape
        );

        let stored_bytes = bounds
            .par_iter()
            .map(|b| self.write_chunk(&volume, *b))
            .try_reduce(|| 0, |a, b| Ok(a + b))?;

        VolumeInfo::segmentation(
            &self.options.key,
            shape,
            self.options.chunk_shape,
            self.options.block_shape,
            self.options.resolution,
        )
        .write(&self.root)?;

        let summary = WriteSummary {
            chunks: bounds.len(),
            raw_bytes: (volume.len() * std::mem::size_of::<u32>()) as u64,
            stored_bytes,
        };
        info!(
            "wrote {} chunks to {} ({} bytes)",
            summary.chunks,
            self.root.display(),
            summary.stored_bytes
        );
        Ok(summary)
    }
}
