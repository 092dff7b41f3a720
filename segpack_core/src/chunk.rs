//! Chunk-level encode and decode: the grid of blocks, the chunk header and
//! the block-header region.
//!
//! # Layout written
//! ```text
//! [CHUNK HEADER: 1 word, offset of the channel data, always 1]
//! [BLOCK HEADERS: 8 bytes × gz·gy·gx, scan order z, y, x]  ← channel base
//! [LOOKUP TABLES and PACKED INDICES, in block visit order]
//! ```
//! Offsets inside block headers count words from the channel base.

use log::debug;
use ndarray::{s, Array3, ArrayView3};

use crate::block::{decode_block, encode_block};
use crate::error::{Result, SegmentationError};
use crate::format::{BlockHeader, ChunkHeader, BLOCK_HEADER_SIZE};
use crate::lookup::LookupTableStore;

/// Origin (inclusive) and extent (exclusive) of a chunk in its volume, z, y, x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkBounds {
    pub start: [usize; 3],
    pub end: [usize; 3],
}

impl ChunkBounds {
    pub fn new(start: [usize; 3], end: [usize; 3]) -> Self {
        Self { start, end }
    }

    /// Bounds of a chunk of `shape` anchored at the volume origin.
    pub fn from_shape(shape: [usize; 3]) -> Self {
        Self::new([0; 3], shape)
    }

    pub fn shape(&self) -> [usize; 3] {
        [
            self.end[0].saturating_sub(self.start[0]),
            self.end[1].saturating_sub(self.start[1]),
            self.end[2].saturating_sub(self.start[2]),
        ]
    }

    /// Chunk file name, `"{x0}-{x1}_{y0}-{y1}_{z0}-{z1}"`.
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}_{}-{}_{}-{}",
            self.start[2], self.end[2], self.start[1], self.end[1], self.start[0], self.end[0]
        )
    }
}

/// One encoded chunk: its place in the volume and its serialized bytes.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub bounds: ChunkBounds,
    pub buffer: Vec<u8>,
}

impl Chunk {
    pub fn file_name(&self) -> String {
        self.bounds.file_name()
    }
}

fn check_block_shape(block_shape: [usize; 3]) -> Result<()> {
    if block_shape.contains(&0) {
        return Err(SegmentationError::InvalidShape(format!(
            "block shape {:?} has a zero dimension",
            block_shape
        )));
    }
    Ok(())
}

/// Number of blocks along each axis needed to cover `shape`.
pub fn grid_shape(shape: [usize; 3], block_shape: [usize; 3]) -> [usize; 3] {
    [
        shape[0].div_ceil(block_shape[0]),
        shape[1].div_ceil(block_shape[1]),
        shape[2].div_ceil(block_shape[2]),
    ]
}

/// In-bounds extent of grid cell `cell`: the block shape, clipped at the
/// trailing edge of the chunk.
pub fn clipped_extent(cell: [usize; 3], block_shape: [usize; 3], chunk_shape: [usize; 3]) -> [usize; 3] {
    std::array::from_fn(|axis| block_shape[axis].min(chunk_shape[axis] - cell[axis] * block_shape[axis]))
}

/// Grid cells in scan order: z outer, y middle, x inner.
fn grid_cells(grid: [usize; 3]) -> impl Iterator<Item = [usize; 3]> {
    let [gz, gy, gx] = grid;
    (0..gz).flat_map(move |z| (0..gy).flat_map(move |y| (0..gx).map(move |x| [z, y, x])))
}

/// Encode a chunk of segmentation labels.
///
/// `bounds` locates the chunk in its volume and must span exactly
/// `volume.dim()`. When `convert_non_zero_to` is set every non-zero label is
/// replaced by that value before encoding, turning a multi-label volume into
/// a binary mask.
pub fn encode_chunk(
    volume: ArrayView3<'_, u32>,
    bounds: ChunkBounds,
    block_shape: [usize; 3],
    convert_non_zero_to: Option<u32>,
) -> Result<Chunk> {
    check_block_shape(block_shape)?;
    let (z, y, x) = volume.dim();
    let shape = [z, y, x];
    if bounds.shape() != shape {
        return Err(SegmentationError::InvalidShape(format!(
            "chunk bounds {:?}..{:?} do not match volume shape {:?}",
            bounds.start, bounds.end, shape
        )));
    }

    let grid = grid_shape(shape, block_shape);
    let block_count = grid.iter().product::<usize>();
    let mut channel = vec![0u8; block_count * BLOCK_HEADER_SIZE];
    let mut tables = LookupTableStore::new();

    for cell in grid_cells(grid) {
        let [bz, by, bx] = block_shape;
        let [cz, cy, cx] = cell;
        let block = volume.slice(s![
            cz * bz..((cz + 1) * bz).min(z),
            cy * by..((cy + 1) * by).min(y),
            cx * bx..((cx + 1) * bx).min(x)
        ]);
        let offset = BlockHeader::byte_offset(cell, grid);
        match convert_non_zero_to {
            Some(label) => {
                let mask = block.mapv(|v| if v != 0 { label } else { 0 });
                encode_block(&mask.view(), block_shape, &mut tables, &mut channel, offset)?;
            }
            None => {
                encode_block(&block, block_shape, &mut tables, &mut channel, offset)?;
            }
        }
    }

    debug!(
        "encoded chunk {}: {} blocks, {} lookup tables ({} shared), {} bytes",
        bounds.file_name(),
        block_count,
        tables.len(),
        tables.reused(),
        channel.len() + ChunkHeader::SIZE
    );

    let mut buffer = Vec::with_capacity(ChunkHeader::SIZE + channel.len());
    buffer.extend_from_slice(&ChunkHeader::single_channel().to_bytes());
    buffer.extend_from_slice(&channel);
    Ok(Chunk { bounds, buffer })
}

/// Decode a chunk buffer back into a `chunk_shape` array.
pub fn decode_chunk(buffer: &[u8], chunk_shape: [usize; 3], block_shape: [usize; 3]) -> Result<Array3<u32>> {
    check_block_shape(block_shape)?;
    let channel = ChunkHeader::from_bytes(buffer)?.channel_data(buffer)?;
    let grid = grid_shape(chunk_shape, block_shape);
    let [z, y, x] = chunk_shape;
    let mut decoded = Array3::<u32>::zeros((z, y, x));

    for cell in grid_cells(grid) {
        let block = decode_block(channel, BlockHeader::byte_offset(cell, grid), block_shape)?;
        let [ez, ey, ex] = clipped_extent(cell, block_shape, chunk_shape);
        let [bz, by, bx] = block_shape;
        let [cz, cy, cx] = cell;
        decoded
            .slice_mut(s![
                cz * bz..cz * bz + ez,
                cy * by..cy * by + ey,
                cx * bx..cx * bx + ex
            ])
            .assign(&block.slice(s![..ez, ..ey, ..ex]));
    }
    Ok(decoded)
}

/// Decode only the block at grid cell `cell`, clipped to the chunk.
pub fn decode_block_at(
    buffer: &[u8],
    chunk_shape: [usize; 3],
    block_shape: [usize; 3],
    cell: [usize; 3],
) -> Result<Array3<u32>> {
    check_block_shape(block_shape)?;
    let grid = grid_shape(chunk_shape, block_shape);
    if (0..3).any(|axis| cell[axis] >= grid[axis]) {
        return Err(SegmentationError::InvalidShape(format!(
            "block {:?} is outside the {:?} block grid",
            cell, grid
        )));
    }
    let channel = ChunkHeader::from_bytes(buffer)?.channel_data(buffer)?;
    let block = decode_block(channel, BlockHeader::byte_offset(cell, grid), block_shape)?;
    let [ez, ey, ex] = clipped_extent(cell, block_shape, chunk_shape);
    Ok(block.slice(s![..ez, ..ey, ..ex]).to_owned())
}

/// Parse every block header of a chunk, in scan order.
pub fn read_block_headers(
    buffer: &[u8],
    chunk_shape: [usize; 3],
    block_shape: [usize; 3],
) -> Result<Vec<([usize; 3], BlockHeader)>> {
    check_block_shape(block_shape)?;
    let channel = ChunkHeader::from_bytes(buffer)?.channel_data(buffer)?;
    let grid = grid_shape(chunk_shape, block_shape);
    grid_cells(grid)
        .map(|cell| Ok((cell, BlockHeader::read(channel, BlockHeader::byte_offset(cell, grid))?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::WORD_SIZE;

    fn labels(shape: [usize; 3]) -> Array3<u32> {
        let [z, y, x] = shape;
        Array3::from_shape_fn((z, y, x), |(k, j, i)| ((k * 7 + j * 3 + i) % 5) as u32)
    }

    #[test]
    fn grid_rounds_up() {
        assert_eq!(grid_shape([8, 8, 8], [8, 8, 8]), [1, 1, 1]);
        assert_eq!(grid_shape([9, 16, 3], [8, 8, 8]), [2, 2, 1]);
        assert_eq!(grid_shape([0, 4, 4], [2, 2, 2]), [0, 2, 2]);
    }

    #[test]
    fn clipping_only_touches_trailing_axes() {
        assert_eq!(clipped_extent([0, 0, 0], [4, 4, 4], [6, 8, 5]), [4, 4, 4]);
        assert_eq!(clipped_extent([1, 1, 0], [4, 4, 4], [6, 8, 5]), [2, 4, 4]);
        assert_eq!(clipped_extent([1, 0, 1], [4, 4, 4], [6, 8, 5]), [2, 4, 1]);
    }

    #[test]
    fn header_region_follows_chunk_header() {
        let volume = labels([4, 4, 4]);
        let chunk = encode_chunk(volume.view(), ChunkBounds::from_shape([4, 4, 4]), [2, 2, 2], None).unwrap();
        assert_eq!(&chunk.buffer[..4], &1u32.to_le_bytes());

        // The first lookup table lands right after the 8 block headers.
        let headers = read_block_headers(&chunk.buffer, [4, 4, 4], [2, 2, 2]).unwrap();
        assert_eq!(headers.len(), 8);
        assert_eq!(headers[0].1.lookup_table_offset, 16);
        assert_eq!(chunk.buffer.len() % WORD_SIZE, 0);
    }

    #[test]
    fn round_trips_ragged_shape() {
        let volume = labels([5, 7, 9]);
        let chunk = encode_chunk(volume.view(), ChunkBounds::from_shape([5, 7, 9]), [2, 4, 4], None).unwrap();
        assert_eq!(decode_chunk(&chunk.buffer, [5, 7, 9], [2, 4, 4]).unwrap(), volume);
    }

    #[test]
    fn single_block_access_is_clipped() {
        let volume = labels([5, 7, 9]);
        let chunk = encode_chunk(volume.view(), ChunkBounds::from_shape([5, 7, 9]), [4, 4, 4], None).unwrap();
        let block = decode_block_at(&chunk.buffer, [5, 7, 9], [4, 4, 4], [1, 1, 2]).unwrap();
        assert_eq!(block, volume.slice(s![4.., 4.., 8..]));
        assert!(decode_block_at(&chunk.buffer, [5, 7, 9], [4, 4, 4], [2, 0, 0]).is_err());
    }

    #[test]
    fn rejects_mismatched_bounds_and_zero_blocks() {
        let volume = labels([2, 2, 2]);
        assert!(matches!(
            encode_chunk(volume.view(), ChunkBounds::from_shape([2, 2, 3]), [2, 2, 2], None),
            Err(SegmentationError::InvalidShape(_))
        ));
        assert!(matches!(
            encode_chunk(volume.view(), ChunkBounds::from_shape([2, 2, 2]), [0, 2, 2], None),
            Err(SegmentationError::InvalidShape(_))
        ));
    }

    #[test]
    fn file_name_is_x_y_z_ranges() {
        let bounds = ChunkBounds::new([0, 64, 128], [64, 128, 150]);
        assert_eq!(bounds.file_name(), "128-150_64-128_0-64");
        assert_eq!(bounds.shape(), [64, 64, 22]);
    }

    #[test]
    fn empty_chunk_has_only_a_header() {
        let volume = Array3::<u32>::zeros((0, 3, 3));
        let chunk = encode_chunk(volume.view(), ChunkBounds::from_shape([0, 3, 3]), [2, 2, 2], None).unwrap();
        assert_eq!(chunk.buffer.len(), 4);
        assert_eq!(decode_chunk(&chunk.buffer, [0, 3, 3], [2, 2, 2]).unwrap().len(), 0);
    }
}
