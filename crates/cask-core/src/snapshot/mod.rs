use cask_types::Checksum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CaskError, Result};
use crate::repo::{BlobType, Repository};
use crate::vfs::{Filesystem, Summary};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Where a snapshot's data came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImporterInfo {
    pub kind: String,
    pub origin: String,
    pub directory: String,
}

/// Counters collected while a backup runs. Stored as a `Data` blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStats {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub devices: u64,
    pub pipes: u64,
    pub sockets: u64,
    pub errors: u64,

    pub chunks: u64,
    pub chunks_transferred: u64,
    pub chunks_transfer_size: u64,
    pub objects: u64,
    pub objects_transferred: u64,
    pub objects_transfer_size: u64,

    pub entries: u64,
    pub cache_hits: u64,
    pub bytes_scanned: u64,
}

/// Snapshot header, stored as a `Snapshot` blob under a random id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub id: Checksum,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    /// Root node of the VFS tree.
    pub root: Checksum,
    /// `Entry` blob of the `/` directory.
    pub root_entry: Checksum,
    /// Root node of the error tree.
    pub errors: Checksum,
    /// `Data` blob holding [`BackupStats`].
    pub statistics: Checksum,
    /// Summary of the scan root directory.
    pub summary: Summary,
    pub importer: ImporterInfo,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Snapshot {
    pub fn load(repo: &Repository, id: &Checksum) -> Result<Self> {
        if !repo.blob_exists(BlobType::Snapshot, id) {
            return Err(CaskError::SnapshotNotFound(id.to_hex()));
        }
        let snapshot: Snapshot = rmp_serde::from_slice(&repo.get_blob(BlobType::Snapshot, id)?)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CaskError::UnsupportedVersion(snapshot.version));
        }
        Ok(snapshot)
    }

    pub fn store(&self, repo: &Repository) -> Result<()> {
        repo.put_blob(BlobType::Snapshot, self.id, &rmp_serde::to_vec_named(self)?)?;
        Ok(())
    }

    pub fn statistics(&self, repo: &Repository) -> Result<BackupStats> {
        Ok(rmp_serde::from_slice(&repo.get_blob(BlobType::Data, &self.statistics)?)?)
    }

    pub fn filesystem<'a>(&self, repo: &'a Repository) -> Result<Filesystem<'a>> {
        Filesystem::new(repo, self.root, self.errors)
    }
}

/// Every live snapshot, oldest first.
pub fn list(repo: &Repository) -> Result<Vec<Snapshot>> {
    let mut snapshots = repo
        .list_snapshots()
        .iter()
        .map(|id| Snapshot::load(repo, id))
        .collect::<Result<Vec<_>>>()?;
    snapshots.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    Ok(snapshots)
}

/// Resolve `latest` or a unique hex prefix of a snapshot id.
pub fn resolve(repo: &Repository, spec: &str) -> Result<Checksum> {
    if spec == "latest" {
        return list(repo)?
            .last()
            .map(|s| s.id)
            .ok_or_else(|| CaskError::SnapshotNotFound(spec.to_string()));
    }
    let prefix = spec.to_ascii_lowercase();
    let matches: Vec<Checksum> = repo
        .list_snapshots()
        .into_iter()
        .filter(|id| id.to_hex().starts_with(&prefix))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(CaskError::SnapshotNotFound(spec.to_string())),
        _ => Err(CaskError::Other(format!(
            "snapshot prefix '{spec}' is ambiguous ({} matches)",
            matches.len()
        ))),
    }
}

/// Split `id[:path]` into the snapshot reference and a path inside it.
pub fn split_reference(reference: &str) -> (&str, &str) {
    match reference.split_once(':') {
        Some((id, path)) if !path.is_empty() => (id, path),
        Some((id, _)) => (id, "/"),
        None => (reference, "/"),
    }
}
