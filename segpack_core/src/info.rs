//! The `info` metadata file describing a single-scale segmentation volume.
//!
//! Arrays are stored x, y, z in the file; the rest of the crate works in
//! z, y, x, so every accessor here reverses.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentationError};
use crate::format::{ENCODING_NAME, INFO_FILE_NAME, NUM_CHANNELS};

pub const VOLUME_TYPE: &str = "neuroglancer_multiscale_volume";
pub const DATA_TYPE: &str = "uint32";
pub const LAYER_TYPE: &str = "segmentation";

fn reversed<T: Copy>(v: [T; 3]) -> [T; 3] {
    [v[2], v[1], v[0]]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleInfo {
    pub key: String,
    /// Volume size, x, y, z.
    pub size: [usize; 3],
    #[serde(default)]
    pub voxel_offset: [i64; 3],
    /// Voxel size, x, y, z.
    pub resolution: [f64; 3],
    pub chunk_sizes: Vec<[usize; 3]>,
    pub encoding: String,
    pub compressed_segmentation_block_size: [usize; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    #[serde(rename = "@type")]
    pub volume_type: String,
    pub data_type: String,
    pub num_channels: usize,
    pub scales: Vec<ScaleInfo>,
    #[serde(rename = "type")]
    pub layer_type: String,
}

impl VolumeInfo {
    /// Metadata for one compressed-segmentation scale; shapes are z, y, x.
    pub fn segmentation(
        key: &str,
        volume_shape: [usize; 3],
        chunk_shape: [usize; 3],
        block_shape: [usize; 3],
        resolution: [f64; 3],
    ) -> Self {
        Self {
            volume_type: VOLUME_TYPE.to_string(),
            data_type: DATA_TYPE.to_string(),
            num_channels: NUM_CHANNELS,
            scales: vec![ScaleInfo {
                key: key.to_string(),
                size: reversed(volume_shape),
                voxel_offset: [0; 3],
                resolution: reversed(resolution),
                chunk_sizes: vec![reversed(chunk_shape)],
                encoding: ENCODING_NAME.to_string(),
                compressed_segmentation_block_size: reversed(block_shape),
            }],
            layer_type: LAYER_TYPE.to_string(),
        }
    }

    /// Check that this is a volume the reader can decode and return its scale.
    pub fn scale(&self) -> Result<&ScaleInfo> {
        if self.data_type != DATA_TYPE {
            return Err(SegmentationError::Metadata(format!(
                "data type '{}' is not {}",
                self.data_type, DATA_TYPE
            )));
        }
        if self.num_channels != NUM_CHANNELS {
            return Err(SegmentationError::Metadata(format!(
                "{} channels, only {} is supported",
                self.num_channels, NUM_CHANNELS
            )));
        }
        let scale = match self.scales.as_slice() {
            [scale] => scale,
            scales => {
                return Err(SegmentationError::Metadata(format!(
                    "{} scales, exactly one is supported",
                    scales.len()
                )))
            }
        };
        if scale.encoding != ENCODING_NAME {
            return Err(SegmentationError::Metadata(format!(
                "encoding '{}' is not {}",
                scale.encoding, ENCODING_NAME
            )));
        }
        if scale.chunk_sizes.len() != 1 {
            return Err(SegmentationError::Metadata(format!(
                "{} chunk sizes, exactly one is supported",
                scale.chunk_sizes.len()
            )));
        }
        Ok(scale)
    }

    pub fn volume_shape(&self) -> Result<[usize; 3]> {
        Ok(reversed(self.scale()?.size))
    }

    pub fn chunk_shape(&self) -> Result<[usize; 3]> {
        Ok(reversed(self.scale()?.chunk_sizes[0]))
    }

    pub fn block_shape(&self) -> Result<[usize; 3]> {
        Ok(reversed(self.scale()?.compressed_segmentation_block_size))
    }

    pub fn write(&self, dir: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(dir.as_ref().join(INFO_FILE_NAME), json)?;
        Ok(())
    }

    pub fn read(dir: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(dir.as_ref().join(INFO_FILE_NAME))?;
        Ok(serde_json::from_str(&json)?)
    }
}
