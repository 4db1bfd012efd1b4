//! Copy snapshots from one repository into another.
//!
//! Blobs are content-addressed, so a copy is a walk over everything a
//! snapshot reaches, skipping what the target already holds. The snapshot
//! header goes in last and the target is committed once at the end, so an
//! interrupted sync never exposes a snapshot with missing blobs.

use cask_types::Checksum;
use tracing::{debug, info};

use crate::error::Result;
use crate::object::Object;
use crate::repo::{BlobType, Repository};
use crate::vfs::Entry;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub snapshots: usize,
    /// Already present in the target.
    pub snapshots_skipped: usize,
    pub blobs_copied: u64,
    pub blobs_skipped: u64,
    pub bytes_copied: u64,
}

struct Copier<'a> {
    src: &'a Repository,
    dst: &'a Repository,
    stats: SyncStats,
}

impl Copier<'_> {
    fn copy(&mut self, blob_type: BlobType, id: &Checksum) -> Result<()> {
        if self.dst.blob_exists(blob_type, id) {
            self.stats.blobs_skipped += 1;
            return Ok(());
        }
        let data = self.src.get_blob(blob_type, id)?;
        self.dst.put_blob(blob_type, *id, &data)?;
        self.stats.blobs_copied += 1;
        self.stats.bytes_copied += data.len() as u64;
        Ok(())
    }

    fn copy_entry(&mut self, id: &Checksum) -> Result<()> {
        if self.dst.blob_exists(BlobType::Entry, id) {
            self.stats.blobs_skipped += 1;
            return Ok(());
        }
        let entry = Entry::deserialize(&self.src.get_blob(BlobType::Entry, id)?)?;
        if let Some(object_id) = &entry.object {
            self.copy_object(object_id)?;
        }
        self.copy(BlobType::Entry, id)
    }

    fn copy_object(&mut self, id: &Checksum) -> Result<()> {
        if self.dst.blob_exists(BlobType::Object, id) {
            self.stats.blobs_skipped += 1;
            return Ok(());
        }
        let object = Object::deserialize(&self.src.get_blob(BlobType::Object, id)?)?;
        for chunk in &object.chunks {
            self.copy(BlobType::Chunk, &chunk.checksum)?;
        }
        self.copy(BlobType::Object, id)
    }

    fn copy_snapshot(&mut self, id: &Checksum) -> Result<()> {
        if self.dst.blob_exists(BlobType::Snapshot, id) {
            debug!(snapshot = %id, "already in target");
            self.stats.snapshots_skipped += 1;
            return Ok(());
        }
        let snapshot = self.src.get_snapshot(id)?;
        let fs = snapshot.filesystem(self.src)?;

        for (_, entry) in fs.entries()? {
            self.copy_entry(&entry)?;
        }
        self.copy_entry(&snapshot.root_entry)?;

        let mut nodes = Vec::new();
        fs.tree().visit_nodes(&mut |ptr| {
            nodes.push(*ptr);
            Ok(())
        })?;
        for node in &nodes {
            self.copy(BlobType::VfsNode, node)?;
        }
        nodes.clear();
        fs.error_tree().visit_nodes(&mut |ptr| {
            nodes.push(*ptr);
            Ok(())
        })?;
        for node in &nodes {
            self.copy(BlobType::ErrorNode, node)?;
        }

        self.copy(BlobType::Data, &snapshot.statistics)?;
        self.copy(BlobType::Snapshot, id)?;
        self.stats.snapshots += 1;
        debug!(snapshot = %id, "snapshot copied");
        Ok(())
    }
}

/// Copy `snapshots` from `src` into `dst` and commit the target.
pub fn run(src: &Repository, dst: &Repository, snapshots: &[Checksum]) -> Result<SyncStats> {
    let mut copier = Copier {
        src,
        dst,
        stats: SyncStats::default(),
    };
    for id in snapshots {
        copier.copy_snapshot(id)?;
    }
    dst.commit()?;
    let stats = copier.stats;
    info!(
        snapshots = stats.snapshots,
        skipped = stats.snapshots_skipped,
        blobs = stats.blobs_copied,
        bytes = stats.bytes_copied,
        "sync finished"
    );
    Ok(stats)
}

/// Copy every live snapshot of `src` into `dst`.
pub fn run_all(src: &Repository, dst: &Repository) -> Result<SyncStats> {
    run(src, dst, &src.list_snapshots())
}
