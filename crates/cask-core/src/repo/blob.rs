use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CaskError, Result};

/// Decoded size limit for chunks. Well above the largest chunk FastCDC
/// can cut.
pub const MAX_CHUNK_BLOB_SIZE: u64 = 32 * 1024 * 1024;

/// Decoded size limit for every other blob type. An object's chunk list
/// grows with file size, so this bound is much larger.
pub const MAX_METADATA_BLOB_SIZE: u64 = 1024 * 1024 * 1024;

/// Kind of a blob stored in a packfile. The discriminant is the on-disk tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlobType {
    Snapshot = 0,
    Chunk = 1,
    Object = 2,
    VfsNode = 3,
    Entry = 4,
    ErrorNode = 5,
    Data = 6,
}

impl BlobType {
    pub const ALL: [BlobType; 7] = [
        BlobType::Snapshot,
        BlobType::Chunk,
        BlobType::Object,
        BlobType::VfsNode,
        BlobType::Entry,
        BlobType::ErrorNode,
        BlobType::Data,
    ];

    pub fn from_u8(v: u8) -> Result<Self> {
        Self::ALL
            .get(v as usize)
            .copied()
            .ok_or(CaskError::UnknownBlobType(v))
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Whether the blob's key is the checksum of its own decoded bytes.
    ///
    /// Snapshot ids are random and objects are keyed by their content
    /// hash rather than by their serialized form.
    pub fn is_content_addressed(self) -> bool {
        !matches!(self, BlobType::Snapshot | BlobType::Object)
    }

    /// Largest decoded payload accepted for this type, on write and read.
    pub fn max_size(self) -> u64 {
        match self {
            BlobType::Chunk => MAX_CHUNK_BLOB_SIZE,
            _ => MAX_METADATA_BLOB_SIZE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlobType::Snapshot => "snapshot",
            BlobType::Chunk => "chunk",
            BlobType::Object => "object",
            BlobType::VfsNode => "vfs-node",
            BlobType::Entry => "entry",
            BlobType::ErrorNode => "error-node",
            BlobType::Data => "data",
        }
    }
}

impl fmt::Display for BlobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
