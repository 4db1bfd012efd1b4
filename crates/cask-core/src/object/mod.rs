pub mod mime;

use cask_types::{Checksum, ChecksumHasher};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A chunk as referenced from its object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub checksum: Checksum,
    pub length: u32,
    /// Shannon entropy in bits per byte.
    pub entropy: f64,
}

/// The content of one file, as an ordered list of chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    /// Hash of all chunk payloads concatenated in order.
    pub checksum: Checksum,
    pub chunks: Vec<ChunkRef>,
    pub content_type: String,
    /// Size-weighted average of chunk entropies.
    pub entropy: f64,
    pub size: u64,
    /// Byte-value histogram over the whole content (256 buckets).
    #[serde(default)]
    pub byte_distribution: Vec<u64>,
}

impl Object {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

/// Shannon entropy of `data` in bits per byte, within `[0, 8]`.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    let mut freq = [0u64; 256];
    for &b in data {
        freq[b as usize] += 1;
    }
    entropy_of(&freq, data.len() as u64)
}

fn entropy_of(freq: &[u64; 256], total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    freq.iter()
        .filter(|&&n| n > 0)
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Builds an [`Object`] from a file's chunks, fed in stream order.
pub struct ObjectAssembler {
    hasher: ChecksumHasher,
    chunks: Vec<ChunkRef>,
    content_type: Option<String>,
    size: u64,
    weighted_entropy: f64,
    freq: [u64; 256],
}

impl ObjectAssembler {
    /// Start an object for `path`; the extension seeds the content type.
    pub fn new(path: &str) -> Self {
        Self {
            hasher: ChecksumHasher::new(),
            chunks: Vec::new(),
            content_type: mime::by_extension(path).map(str::to_string),
            size: 0,
            weighted_entropy: 0.0,
            freq: [0; 256],
        }
    }

    /// Account for the next chunk and return its reference.
    pub fn feed(&mut self, data: &[u8]) -> ChunkRef {
        if self.content_type.is_none() {
            self.content_type = Some(mime::sniff(data).to_string());
        }
        self.hasher.update(data);

        let mut chunk_freq = [0u64; 256];
        for &b in data {
            chunk_freq[b as usize] += 1;
        }
        for (total, n) in self.freq.iter_mut().zip(chunk_freq.iter()) {
            *total += n;
        }
        let entropy = entropy_of(&chunk_freq, data.len() as u64);
        self.weighted_entropy += entropy * data.len() as f64;
        self.size += data.len() as u64;

        let chunk = ChunkRef {
            checksum: Checksum::compute(data),
            length: data.len() as u32,
            entropy,
        };
        self.chunks.push(chunk.clone());
        chunk
    }

    pub fn byte_frequency(&self) -> &[u64; 256] {
        &self.freq
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn finish(self) -> Object {
        let entropy = if self.size == 0 {
            0.0
        } else {
            self.weighted_entropy / self.size as f64
        };
        Object {
            checksum: self.hasher.finalize(),
            chunks: self.chunks,
            content_type: self
                .content_type
                .unwrap_or_else(|| mime::OCTET_STREAM.to_string()),
            entropy,
            size: self.size,
            byte_distribution: self.freq.to_vec(),
        }
    }
}
