use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use cask_types::Checksum;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::repo::BlobType;

pub const STATE_VERSION: u32 = 1;

/// Physical location of a blob payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub packfile: Checksum,
    pub offset: u32,
    pub length: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMetadata {
    pub version: u32,
    pub created: DateTime<Utc>,
    /// Set on in-memory states folded from many persisted ones.
    pub aggregate: bool,
    /// States this one was derived from.
    pub extends: Vec<Checksum>,
}

impl Default for StateMetadata {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            created: Utc::now(),
            aggregate: false,
            extends: Vec::new(),
        }
    }
}

/// Persisted form of a [`State`].
#[derive(Serialize, Deserialize)]
struct StateDocument {
    metadata: StateMetadata,
    blobs: Vec<(BlobType, Vec<(Checksum, Location)>)>,
    contains: Vec<Checksum>,
    deleted_snapshots: Vec<(Checksum, DateTime<Utc>)>,
}

type LocationMap = HashMap<Checksum, Location>;

/// Maps blob checksums to packfile locations.
///
/// Each blob type has its own lock, so chunk and object registration
/// never contend. Writes are first-writer-wins: an existing location is
/// never replaced.
pub struct State {
    maps: Vec<RwLock<LocationMap>>,
    contains: RwLock<HashSet<Checksum>>,
    deleted_snapshots: RwLock<HashMap<Checksum, DateTime<Utc>>>,
    metadata: RwLock<StateMetadata>,
    dirty: AtomicBool,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub fn new() -> Self {
        Self {
            maps: BlobType::ALL
                .iter()
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
            contains: RwLock::new(HashSet::new()),
            deleted_snapshots: RwLock::new(HashMap::new()),
            metadata: RwLock::new(StateMetadata::default()),
            dirty: AtomicBool::new(false),
        }
    }

    /// An empty aggregate for folding persisted states into.
    pub fn new_aggregate() -> Self {
        let state = Self::new();
        state.metadata.write().aggregate = true;
        state
    }

    /// A fresh, empty state that extends every state merged into `self`.
    pub fn derive(&self) -> Self {
        let state = Self::new();
        let mut extends: Vec<Checksum> = self.contains.read().iter().copied().collect();
        extends.sort();
        state.metadata.write().extends = extends;
        state
    }

    fn map(&self, blob_type: BlobType) -> &RwLock<LocationMap> {
        &self.maps[blob_type.index()]
    }

    /// Record where a blob lives. Returns `false` if it was already known.
    pub fn set_packfile_for_blob(
        &self,
        blob_type: BlobType,
        packfile: Checksum,
        checksum: Checksum,
        offset: u32,
        length: u32,
    ) -> bool {
        let mut map = self.map(blob_type).write();
        if map.contains_key(&checksum) {
            return false;
        }
        map.insert(
            checksum,
            Location {
                packfile,
                offset,
                length,
            },
        );
        self.dirty.store(true, Ordering::Release);
        true
    }

    pub fn set_packfile_for_chunk(&self, packfile: Checksum, checksum: Checksum, offset: u32, length: u32) -> bool {
        self.set_packfile_for_blob(BlobType::Chunk, packfile, checksum, offset, length)
    }

    pub fn set_packfile_for_object(&self, packfile: Checksum, checksum: Checksum, offset: u32, length: u32) -> bool {
        self.set_packfile_for_blob(BlobType::Object, packfile, checksum, offset, length)
    }

    pub fn get_subpart_for_blob(&self, blob_type: BlobType, checksum: &Checksum) -> Option<Location> {
        self.map(blob_type).read().get(checksum).copied()
    }

    pub fn get_subpart_for_chunk(&self, checksum: &Checksum) -> Option<Location> {
        self.get_subpart_for_blob(BlobType::Chunk, checksum)
    }

    pub fn get_subpart_for_object(&self, checksum: &Checksum) -> Option<Location> {
        self.get_subpart_for_blob(BlobType::Object, checksum)
    }

    pub fn blob_exists(&self, blob_type: BlobType, checksum: &Checksum) -> bool {
        self.map(blob_type).read().contains_key(checksum)
    }

    /// Fold `delta` into `self` and remember `state_id` as merged.
    ///
    /// Existing entries win, so merging the same delta twice is a no-op.
    pub fn merge(&self, state_id: Checksum, delta: &State) {
        if std::ptr::eq(self, delta) {
            return;
        }
        for blob_type in BlobType::ALL {
            let src = delta.map(blob_type).read();
            let mut dst = self.map(blob_type).write();
            for (checksum, location) in src.iter() {
                dst.entry(*checksum).or_insert(*location);
            }
        }
        {
            let src = delta.deleted_snapshots.read();
            let mut dst = self.deleted_snapshots.write();
            for (id, when) in src.iter() {
                dst.entry(*id).or_insert(*when);
            }
        }
        let nested: Vec<Checksum> = delta.contains.read().iter().copied().collect();
        let mut contains = self.contains.write();
        contains.extend(nested);
        contains.insert(state_id);
    }

    /// Whether `state_id` has been merged into this state.
    pub fn contains(&self, state_id: &Checksum) -> bool {
        self.contains.read().contains(state_id)
    }

    pub fn merged_states(&self) -> Vec<Checksum> {
        let mut ids: Vec<Checksum> = self.contains.read().iter().copied().collect();
        ids.sort();
        ids
    }

    pub fn dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn reset_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Drop every entry, keeping metadata. Used after a delta is persisted.
    pub fn clear(&self) {
        for map in &self.maps {
            map.write().clear();
        }
        self.deleted_snapshots.write().clear();
        self.contains.write().clear();
        self.reset_dirty();
    }

    /// Empty the state and start it over as a delta of `parent`.
    pub fn reset_onto(&self, parent: &State) {
        self.clear();
        let mut metadata = self.metadata.write();
        metadata.extends = parent.merged_states();
        metadata.created = Utc::now();
    }

    pub fn metadata(&self) -> StateMetadata {
        self.metadata.read().clone()
    }

    pub fn blob_count(&self, blob_type: BlobType) -> usize {
        self.map(blob_type).read().len()
    }

    /// Checksums of every blob of one type, sorted.
    pub fn list_blobs(&self, blob_type: BlobType) -> Vec<Checksum> {
        let mut out: Vec<Checksum> = self.map(blob_type).read().keys().copied().collect();
        out.sort();
        out
    }

    /// Snapshot ids known to this state and not marked deleted, sorted.
    pub fn list_snapshots(&self) -> Vec<Checksum> {
        let deleted = self.deleted_snapshots.read();
        let mut out: Vec<Checksum> = self
            .map(BlobType::Snapshot)
            .read()
            .keys()
            .filter(|id| !deleted.contains_key(id))
            .copied()
            .collect();
        out.sort();
        out
    }

    pub fn delete_snapshot(&self, id: Checksum) {
        self.deleted_snapshots.write().insert(id, Utc::now());
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_snapshot_deleted(&self, id: &Checksum) -> bool {
        self.deleted_snapshots.read().contains_key(id)
    }

    /// Packfiles referenced by any location.
    pub fn list_packfiles(&self) -> Vec<Checksum> {
        let mut seen = HashSet::new();
        for map in &self.maps {
            seen.extend(map.read().values().map(|l| l.packfile));
        }
        let mut out: Vec<Checksum> = seen.into_iter().collect();
        out.sort();
        out
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let blobs = BlobType::ALL
            .iter()
            .map(|t| {
                let mut entries: Vec<(Checksum, Location)> =
                    self.map(*t).read().iter().map(|(k, v)| (*k, *v)).collect();
                entries.sort_by_key(|(k, _)| *k);
                (*t, entries)
            })
            .collect();
        let doc = StateDocument {
            metadata: self.metadata(),
            blobs,
            contains: self.merged_states(),
            deleted_snapshots: self
                .deleted_snapshots
                .read()
                .iter()
                .map(|(k, v)| (*k, *v))
                .collect(),
        };
        Ok(rmp_serde::to_vec_named(&doc)?)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let doc: StateDocument = rmp_serde::from_slice(data)?;
        let state = Self::new();
        for (blob_type, entries) in doc.blobs {
            state.map(blob_type).write().extend(entries);
        }
        state.contains.write().extend(doc.contains);
        state.deleted_snapshots.write().extend(doc.deleted_snapshots);
        *state.metadata.write() = doc.metadata;
        Ok(state)
    }
}
