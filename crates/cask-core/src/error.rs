use cask_types::Checksum;
use thiserror::Error;

use crate::repo::BlobType;

pub type Result<T> = std::result::Result<T, CaskError>;

#[derive(Debug, Error)]
pub enum CaskError {
    #[error("repository not found at '{0}'")]
    RepoNotFound(String),

    #[error("repository already exists at '{0}'")]
    RepoAlreadyExists(String),

    #[error("unsupported repository version: {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot not found: '{0}'")]
    SnapshotNotFound(String),

    #[error("state not found: {0}")]
    StateNotFound(Checksum),

    #[error("{blob_type} blob not found: {checksum}")]
    BlobNotFound {
        blob_type: BlobType,
        checksum: Checksum,
    },

    #[error("packfile not found: {0}")]
    PackfileNotFound(Checksum),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: Checksum, actual: Checksum },

    #[error("invalid repository format: {0}")]
    InvalidFormat(String),

    #[error("unknown blob type tag: {0}")]
    UnknownBlobType(u8),

    #[error("unknown compression tag: {0}")]
    UnknownCompressionTag(u8),

    #[error("{blob_type} blob of {size} bytes exceeds the limit of {limit} bytes")]
    BlobTooLarge {
        blob_type: BlobType,
        size: u64,
        limit: u64,
    },

    #[error("decompression error: {0}")]
    Decompression(String),

    #[error("no such file or directory: '{0}'")]
    PathNotFound(String),

    #[error("not a directory: '{0}'")]
    NotADirectory(String),

    #[error("not a regular file: '{0}'")]
    NotAFile(String),

    #[error("key already exists")]
    KeyExists,

    #[error("store is read-only")]
    ReadOnly,

    #[error("tree node not found: {0}")]
    NodeNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("unsupported location scheme: '{0}'")]
    UnsupportedScheme(String),

    #[error("'{0}' is already registered")]
    DuplicateRegistration(String),

    #[error("operation aborted: {0}")]
    Aborted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl CaskError {
    /// Per-path errors a backup records and moves past instead of failing.
    pub fn is_soft_path_error(&self) -> bool {
        match self {
            CaskError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
            CaskError::PathNotFound(_) | CaskError::BlobTooLarge { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_path_errors() {
        let not_found = CaskError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        let denied = CaskError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        let other = CaskError::Io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert!(not_found.is_soft_path_error());
        assert!(denied.is_soft_path_error());
        assert!(!other.is_soft_path_error());
        assert!(!CaskError::KeyExists.is_soft_path_error());
        let too_large = CaskError::BlobTooLarge {
            blob_type: BlobType::Object,
            size: 2,
            limit: 1,
        };
        assert!(too_large.is_soft_path_error());
    }

    #[test]
    fn blob_not_found_message_names_type() {
        let err = CaskError::BlobNotFound {
            blob_type: BlobType::Chunk,
            checksum: Checksum([0xab; 32]),
        };
        assert_eq!(err.to_string(), "chunk blob not found: abababababababab");
    }
}
