use fastcdc::v2020::{AVERAGE_MAX, AVERAGE_MIN, MAXIMUM_MAX, MAXIMUM_MIN, MINIMUM_MAX, MINIMUM_MIN};
use serde::{Deserialize, Serialize};

use super::defaults::*;
use crate::error::{CaskError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaskConfig {
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub chunker: ChunkerConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub restore: RestoreConfig,
    /// Root directory for local caches.
    /// Default: platform cache dir + "cask" (e.g. ~/.cache/cask/).
    #[serde(default)]
    pub cache_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository location: bare path or `file://` URL.
    pub url: String,
    /// Size in bytes after which the packer seals the current packfile.
    #[serde(default = "default_packfile_max_size")]
    pub packfile_max_size: u32,
    /// Fan-out of the snapshot trees.
    #[serde(default = "default_btree_order")]
    pub btree_order: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkerConfig {
    #[serde(default = "default_min_size")]
    pub min_size: u32,
    #[serde(default = "default_normal_size")]
    pub normal_size: u32,
    #[serde(default = "default_max_size")]
    pub max_size: u32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            normal_size: default_normal_size(),
            max_size: default_max_size(),
        }
    }
}

impl ChunkerConfig {
    /// Reject orderings and sizes the FastCDC cutter cannot handle.
    pub fn validate(&self) -> Result<()> {
        if !(self.min_size <= self.normal_size && self.normal_size <= self.max_size) {
            return Err(CaskError::Config(format!(
                "chunker sizes must satisfy min <= normal <= max (got {}/{}/{})",
                self.min_size, self.normal_size, self.max_size
            )));
        }
        let in_range = (MINIMUM_MIN..=MINIMUM_MAX).contains(&self.min_size)
            && (AVERAGE_MIN..=AVERAGE_MAX).contains(&self.normal_size)
            && (MAXIMUM_MIN..=MAXIMUM_MAX).contains(&self.max_size);
        if !in_range {
            return Err(CaskError::Config(format!(
                "chunker sizes out of range: min {}..={}, normal {}..={}, max {}..={}",
                MINIMUM_MIN, MINIMUM_MAX, AVERAGE_MIN, AVERAGE_MAX, MAXIMUM_MIN, MAXIMUM_MAX
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    None,
    Lz4,
    Zstd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: CompressionAlgorithm,
    #[serde(default = "default_zstd_level")]
    pub zstd_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            zstd_level: default_zstd_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Worker count; defaults to twice the CPU count.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Reuse objects of unchanged files from the previous run.
    #[serde(default = "default_file_cache")]
    pub file_cache: bool,
    /// Cache entries older than this are ignored and the file is re-read.
    #[serde(default = "default_file_cache_ttl_secs")]
    pub file_cache_ttl_secs: u64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            file_cache: default_file_cache(),
            file_cache_ttl_secs: default_file_cache_ttl_secs(),
            tags: Vec::new(),
        }
    }
}

impl BackupConfig {
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
            .unwrap_or_else(default_max_concurrency)
            .max(1)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreConfig {
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub skip_permissions: bool,
}

impl RestoreConfig {
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
            .unwrap_or_else(default_max_concurrency)
            .max(1)
    }
}
