//! Read-only listings of repository internals.

use cask_types::Checksum;

use crate::error::Result;
use crate::object::Object;
use crate::repo::packfile::{read_index, Footer, IndexEntry};
use crate::repo::{BlobType, Repository};
use crate::snapshot::{self, Snapshot};
use crate::state::StateMetadata;

#[derive(Debug, Clone)]
pub struct StateInfo {
    pub id: Checksum,
    pub metadata: StateMetadata,
    /// Blob count per type, in [`BlobType::ALL`] order.
    pub blobs: Vec<(BlobType, usize)>,
    pub packfiles: Vec<Checksum>,
    pub snapshots: Vec<Checksum>,
}

#[derive(Debug, Clone)]
pub struct PackfileInfo {
    pub id: Checksum,
    pub size: u64,
    pub footer: Footer,
    pub entries: Vec<IndexEntry>,
}

/// Persisted state ids. Empty for a repository without commits.
pub fn states(repo: &Repository) -> Result<Vec<Checksum>> {
    repo.get_states()
}

pub fn state(repo: &Repository, id: &Checksum) -> Result<StateInfo> {
    let state = repo.get_state(id)?;
    Ok(StateInfo {
        id: *id,
        metadata: state.metadata(),
        blobs: BlobType::ALL.iter().map(|&t| (t, state.blob_count(t))).collect(),
        packfiles: state.list_packfiles(),
        snapshots: state.list_snapshots(),
    })
}

pub fn packfiles(repo: &Repository) -> Result<Vec<Checksum>> {
    repo.list_packfiles()
}

pub fn packfile(repo: &Repository, id: &Checksum) -> Result<PackfileInfo> {
    let (footer, entries) = read_index(repo.storage(), id)?;
    Ok(PackfileInfo {
        id: *id,
        size: footer.packfile_size(),
        footer,
        entries,
    })
}

/// Ids of every object blob the repository knows, sorted.
pub fn objects(repo: &Repository) -> Vec<Checksum> {
    repo.state().list_blobs(BlobType::Object)
}

pub fn object(repo: &Repository, id: &Checksum) -> Result<Object> {
    Object::deserialize(&repo.get_blob(BlobType::Object, id)?)
}

pub fn snapshots(repo: &Repository) -> Result<Vec<Snapshot>> {
    snapshot::list(repo)
}
