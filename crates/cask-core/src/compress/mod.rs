use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::config::{CompressionAlgorithm, CompressionConfig};
use crate::error::{CaskError, Result};

const TAG_NONE: u8 = 0x00;
const TAG_LZ4: u8 = 0x01;
const TAG_ZSTD: u8 = 0x02;

/// Transform applied to every blob payload before it is packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Compression {
    None,
    #[default]
    Lz4,
    Zstd {
        level: i32,
    },
}

impl Compression {
    pub fn from_config(config: &CompressionConfig) -> Self {
        match config.algorithm {
            CompressionAlgorithm::None => Compression::None,
            CompressionAlgorithm::Lz4 => Compression::Lz4,
            CompressionAlgorithm::Zstd => Compression::Zstd {
                level: config.zstd_level,
            },
        }
    }
}

/// Compress data and prepend a 1-byte tag identifying the codec.
pub fn compress(compression: Compression, data: &[u8]) -> Result<Vec<u8>> {
    let (tag, body) = match compression {
        Compression::None => (TAG_NONE, data.to_vec()),
        Compression::Lz4 => (TAG_LZ4, lz4_flex::compress_prepend_size(data)),
        Compression::Zstd { level } => (
            TAG_ZSTD,
            zstd::bulk::compress(data, level)
                .map_err(|e| CaskError::Other(format!("zstd compress: {e}")))?,
        ),
    };
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(tag);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decompress data by reading the 1-byte tag prefix and dispatching.
/// Output larger than `limit` bytes is rejected.
pub fn decompress(data: &[u8], limit: u64) -> Result<Vec<u8>> {
    let (&tag, payload) = data
        .split_first()
        .ok_or_else(|| CaskError::Decompression("empty data".into()))?;
    match tag {
        TAG_NONE => {
            if payload.len() as u64 > limit {
                return Err(CaskError::Decompression(format!(
                    "stored size ({}) exceeds limit of {limit} bytes",
                    payload.len()
                )));
            }
            Ok(payload.to_vec())
        }
        TAG_LZ4 => {
            let size_prefix: [u8; 4] = payload
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| CaskError::Decompression("lz4: payload too short".into()))?;
            let uncompressed_size = u32::from_le_bytes(size_prefix) as u64;
            if uncompressed_size > limit {
                return Err(CaskError::Decompression(format!(
                    "lz4: decompressed size ({uncompressed_size}) exceeds limit of {limit} bytes"
                )));
            }
            lz4_flex::decompress_size_prepended(payload)
                .map_err(|e| CaskError::Decompression(format!("lz4: {e}")))
        }
        TAG_ZSTD => {
            let mut decoder = zstd::stream::Decoder::new(std::io::Cursor::new(payload))
                .map_err(|e| CaskError::Decompression(format!("zstd init: {e}")))?;
            let mut output = Vec::new();
            decoder
                .by_ref()
                .take(limit.saturating_add(1))
                .read_to_end(&mut output)
                .map_err(|e| CaskError::Decompression(format!("zstd: {e}")))?;
            if output.len() as u64 > limit {
                return Err(CaskError::Decompression(format!(
                    "zstd: decompressed size exceeds limit of {limit} bytes"
                )));
            }
            Ok(output)
        }
        _ => Err(CaskError::UnknownCompressionTag(tag)),
    }
}
