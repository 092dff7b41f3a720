use std::fs;
use std::path::Path;

use ndarray::Array3;

use crate::chunk::ChunkBounds;
use crate::error::{Result, SegmentationError};

/// Bounds of every chunk of `chunk_shape` covering a volume of `volume_shape`,
/// z outer, x inner. Chunks at the trailing edges are clipped to the volume.
pub fn chunk_bounds(volume_shape: [usize; 3], chunk_shape: [usize; 3]) -> Result<Vec<ChunkBounds>> {
    if chunk_shape.contains(&0) {
        return Err(SegmentationError::InvalidShape(format!(
            "chunk shape {:?} has a zero dimension",
            chunk_shape
        )));
    }
    let axis_starts = |axis: usize| (0..volume_shape[axis]).step_by(chunk_shape[axis]);

    let mut bounds = Vec::new();
    for z in axis_starts(0) {
        for y in axis_starts(1) {
            for x in axis_starts(2) {
                let start = [z, y, x];
                let end = std::array::from_fn(|axis| (start[axis] + chunk_shape[axis]).min(volume_shape[axis]));
                bounds.push(ChunkBounds::new(start, end));
            }
        }
    }
    Ok(bounds)
}

/// Width of the voxels in a flat raw volume file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoxelType {
    U8,
    U16,
    U32,
}

impl VoxelType {
    pub fn size(self) -> usize {
        match self {
            VoxelType::U8 => 1,
            VoxelType::U16 => 2,
            VoxelType::U32 => 4,
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "u8" | "uint8" => Ok(VoxelType::U8),
            "u16" | "uint16" => Ok(VoxelType::U16),
            "u32" | "uint32" => Ok(VoxelType::U32),
            other => Err(SegmentationError::InvalidShape(format!(
                "unknown voxel type '{}'; expected u8, u16 or u32",
                other
            ))),
        }
    }
}

/// Widen little-endian raw voxels in z, y, x order into a `shape` volume.
pub fn volume_from_bytes(bytes: &[u8], shape: [usize; 3], voxel_type: VoxelType) -> Result<Array3<u32>> {
    let expected = shape.iter().product::<usize>() * voxel_type.size();
    if bytes.len() != expected {
        return Err(SegmentationError::InvalidShape(format!(
            "raw volume holds {} bytes but shape {:?} of {:?} needs {}",
            bytes.len(),
            shape,
            voxel_type,
            expected
        )));
    }
    let values: Vec<u32> = match voxel_type {
        VoxelType::U8 => bytes.iter().map(|&b| u32::from(b)).collect(),
        VoxelType::U16 => bytes
            .chunks_exact(2)
            .map(|b| u32::from(u16::from_le_bytes([b[0], b[1]])))
            .collect(),
        VoxelType::U32 => bytes
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    };
    let [z, y, x] = shape;
    Array3::from_shape_vec((z, y, x), values)
        .map_err(|err| SegmentationError::InvariantViolation(format!("volume reshape failed: {err}")))
}

/// Load a flat raw volume file.
pub fn read_raw_volume(path: impl AsRef<Path>, shape: [usize; 3], voxel_type: VoxelType) -> Result<Array3<u32>> {
    let bytes = fs::read(path)?;
    volume_from_bytes(&bytes, shape, voxel_type)
}

/// Store `volume` as flat little-endian u32 voxels in z, y, x order.
pub fn write_raw_volume(path: impl AsRef<Path>, volume: &Array3<u32>) -> Result<()> {
    let bytes: Vec<u8> = volume.iter().flat_map(|v| v.to_le_bytes()).collect();
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cover_volume_and_clip_edges() {
        let bounds = chunk_bounds([3, 5, 4], [2, 4, 4]).unwrap();
        assert_eq!(bounds.len(), 4);
        assert_eq!(bounds[0], ChunkBounds::new([0, 0, 0], [2, 4, 4]));
        assert_eq!(bounds[1], ChunkBounds::new([0, 4, 0], [2, 5, 4]));
        assert_eq!(bounds[3], ChunkBounds::new([2, 4, 0], [3, 5, 4]));
        let voxels: usize = bounds.iter().map(|b| b.shape().iter().product::<usize>()).sum();
        assert_eq!(voxels, 3 * 5 * 4);
    }

    #[test]
    fn widens_sixteen_bit_voxels() {
        let bytes = [1u8, 0, 0, 1, 255, 255, 0, 0];
        let volume = volume_from_bytes(&bytes, [1, 2, 2], VoxelType::U16).unwrap();
        assert_eq!(volume.iter().copied().collect::<Vec<_>>(), vec![1, 256, 65_535, 0]);
    }

    #[test]
    fn rejects_length_mismatch() {
        assert!(volume_from_bytes(&[0u8; 7], [1, 2, 1], VoxelType::U32).is_err());
        assert!(VoxelType::from_name("f32").is_err());
    }
}
