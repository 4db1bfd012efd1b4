pub mod blob;
pub mod file_cache;
pub mod packfile;

use std::sync::Arc;

use cask_types::Checksum;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compress::{self, Compression};
use crate::config::{CaskConfig, ChunkerConfig};
use crate::error::{CaskError, Result};
use crate::snapshot::Snapshot;
use crate::state::{Location, State};
use crate::storage::StorageBackend;

pub use self::blob::BlobType;
use self::packfile::{packfile_key, read_blob, PackWriter};

pub const REPO_VERSION: u32 = 1;

const CONFIG_KEY: &str = "config";
const STATES_PREFIX: &str = "states/";
const PACKFILES_PREFIX: &str = "packfiles/";

/// Persisted at the `config` key. Fixes chunking and packing parameters
/// for the lifetime of the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    pub version: u32,
    pub id: Checksum,
    pub created: DateTime<Utc>,
    pub chunker: ChunkerConfig,
    pub packfile_max_size: u32,
    pub btree_order: usize,
    pub compression: Compression,
}

impl RepoConfig {
    pub fn new(chunker: ChunkerConfig, packfile_max_size: u32, btree_order: usize, compression: Compression) -> Self {
        Self {
            version: REPO_VERSION,
            id: Checksum::random(),
            created: Utc::now(),
            chunker,
            packfile_max_size,
            btree_order,
            compression,
        }
    }

    pub fn from_config(config: &CaskConfig) -> Self {
        Self::new(
            config.chunker.clone(),
            config.repository.packfile_max_size,
            config.repository.btree_order,
            Compression::from_config(&config.compression),
        )
    }

    fn validate(&self) -> Result<()> {
        if self.version != REPO_VERSION {
            return Err(CaskError::UnsupportedVersion(self.version));
        }
        self.chunker.validate()?;
        if self.packfile_max_size == 0 {
            return Err(CaskError::Config("packfile_max_size must be positive".into()));
        }
        if self.btree_order < 3 {
            return Err(CaskError::Config(format!(
                "btree_order must be at least 3 (got {})",
                self.btree_order
            )));
        }
        Ok(())
    }
}

fn state_key(id: &Checksum) -> String {
    format!("{STATES_PREFIX}{}", id.to_hex())
}

/// Last path segment of a storage key, parsed as a checksum.
fn checksum_from_key(key: &str) -> Option<Checksum> {
    Checksum::from_hex(key.rsplit('/').next()?)
}

/// A handle to an opened repository.
///
/// All methods take `&self`, so one handle can be shared by worker threads.
/// Reads consult the aggregate state (every persisted state merged) and
/// then the session delta; writes land in the packer and, once sealed,
/// in the delta until [`Repository::commit`].
pub struct Repository {
    storage: Arc<dyn StorageBackend>,
    pub config: RepoConfig,
    state: State,
    delta: State,
    packer: Mutex<PackWriter>,
}

impl Repository {
    /// Initialize a new repository.
    pub fn init(storage: Box<dyn StorageBackend>, config: RepoConfig) -> Result<Self> {
        let storage: Arc<dyn StorageBackend> = Arc::from(storage);
        if storage.exists(CONFIG_KEY)? {
            return Err(CaskError::RepoAlreadyExists("repository".into()));
        }
        config.validate()?;

        storage.put(CONFIG_KEY, &rmp_serde::to_vec_named(&config)?)?;
        storage.create_dir(STATES_PREFIX)?;
        storage.create_dir(PACKFILES_PREFIX)?;
        info!(repo = %config.id, "repository initialized");

        let state = State::new_aggregate();
        let delta = state.derive();
        Ok(Self {
            storage,
            config,
            state,
            delta,
            packer: Mutex::new(PackWriter::new()),
        })
    }

    /// Open an existing repository and merge every persisted state.
    pub fn open(storage: Box<dyn StorageBackend>) -> Result<Self> {
        let storage: Arc<dyn StorageBackend> = Arc::from(storage);
        let raw = storage
            .get(CONFIG_KEY)?
            .ok_or_else(|| CaskError::RepoNotFound("config not found".into()))?;
        let config: RepoConfig = rmp_serde::from_slice(&raw)?;
        config.validate()?;

        let state = State::new_aggregate();
        let mut merged = 0usize;
        for key in storage.list(STATES_PREFIX)? {
            let Some(id) = checksum_from_key(&key) else {
                debug!(key, "skipping non-state key");
                continue;
            };
            let delta = Self::load_state(storage.as_ref(), &id)?;
            state.merge(id, &delta);
            merged += 1;
        }
        debug!(repo = %config.id, states = merged, "repository opened");

        let delta = state.derive();
        Ok(Self {
            storage,
            config,
            state,
            delta,
            packer: Mutex::new(PackWriter::new()),
        })
    }

    pub fn storage(&self) -> &dyn StorageBackend {
        self.storage.as_ref()
    }

    pub fn compression(&self) -> Compression {
        self.config.compression
    }

    fn load_state(storage: &dyn StorageBackend, id: &Checksum) -> Result<State> {
        let raw = storage
            .get(&state_key(id))?
            .ok_or(CaskError::StateNotFound(*id))?;
        State::deserialize(&raw)
    }

    fn locate(&self, blob_type: BlobType, checksum: &Checksum) -> Option<Location> {
        self.state
            .get_subpart_for_blob(blob_type, checksum)
            .or_else(|| self.delta.get_subpart_for_blob(blob_type, checksum))
    }

    /// Known to the repository, either persisted or staged in this session.
    pub fn blob_exists(&self, blob_type: BlobType, checksum: &Checksum) -> bool {
        self.state.blob_exists(blob_type, checksum)
            || self.delta.blob_exists(blob_type, checksum)
            || self.packer.lock().contains(blob_type, checksum)
    }

    /// Stage a blob for writing. Returns `false` if the blob was already
    /// known, in which case nothing is written. Blobs larger than
    /// [`BlobType::max_size`] are refused, since they could not be read back.
    pub fn put_blob(&self, blob_type: BlobType, checksum: Checksum, data: &[u8]) -> Result<bool> {
        let limit = blob_type.max_size();
        if data.len() as u64 > limit {
            return Err(CaskError::BlobTooLarge {
                blob_type,
                size: data.len() as u64,
                limit,
            });
        }
        if self.state.blob_exists(blob_type, &checksum) || self.delta.blob_exists(blob_type, &checksum) {
            return Ok(false);
        }
        let payload = compress::compress(self.config.compression, data)?;

        let mut packer = self.packer.lock();
        // Re-check under the packer lock: a concurrent flush or commit may
        // have moved the blob out of the packer.
        if self.state.blob_exists(blob_type, &checksum)
            || self.delta.blob_exists(blob_type, &checksum)
            || !packer.add_blob(blob_type, checksum, &payload)?
        {
            return Ok(false);
        }
        if packer.should_flush(self.config.packfile_max_size as usize) {
            self.flush_locked(&mut packer)?;
        }
        Ok(true)
    }

    /// Fetch and decode a blob. Content-addressed blobs are verified.
    pub fn get_blob(&self, blob_type: BlobType, checksum: &Checksum) -> Result<Vec<u8>> {
        let pending = match self.locate(blob_type, checksum) {
            Some(_) => None,
            None => self
                .packer
                .lock()
                .pending_blob(blob_type, checksum)
                .map(<[u8]>::to_vec),
        };
        let payload = match pending {
            Some(payload) => payload,
            None => {
                let loc = self.locate(blob_type, checksum).ok_or(CaskError::BlobNotFound {
                    blob_type,
                    checksum: *checksum,
                })?;
                read_blob(self.storage.as_ref(), &loc.packfile, loc.offset, loc.length)?
            }
        };
        let data = compress::decompress(&payload, blob_type.max_size())?;
        if blob_type.is_content_addressed() {
            let actual = Checksum::compute(&data);
            if actual != *checksum {
                return Err(CaskError::ChecksumMismatch {
                    expected: *checksum,
                    actual,
                });
            }
        }
        Ok(data)
    }

    /// Bytes currently staged in the packer.
    pub fn packer_size(&self) -> usize {
        self.packer.lock().size()
    }

    /// Seal and write the pending packfile, if any.
    pub fn flush(&self) -> Result<()> {
        let mut packer = self.packer.lock();
        self.flush_locked(&mut packer)
    }

    fn flush_locked(&self, packer: &mut PackWriter) -> Result<()> {
        if packer.is_empty() {
            return Ok(());
        }
        let sealed = packer.seal()?;
        self.storage.put(&packfile_key(&sealed.id), &sealed.bytes)?;
        for entry in &sealed.entries {
            self.delta
                .set_packfile_for_blob(entry.blob_type, sealed.id, entry.checksum, entry.offset, entry.length);
        }
        debug!(
            packfile = %sealed.id,
            blobs = sealed.entries.len(),
            bytes = sealed.bytes.len(),
            "packfile written"
        );
        Ok(())
    }

    /// Flush, persist the session delta as a new state and fold it into
    /// the aggregate. Returns the new state id, or `None` when there was
    /// nothing to write.
    ///
    /// The packer lock is held throughout, so a concurrent flush cannot
    /// land locations in the delta between persisting and clearing it.
    pub fn commit(&self) -> Result<Option<Checksum>> {
        let mut packer = self.packer.lock();
        self.flush_locked(&mut packer)?;
        if !self.delta.dirty() {
            return Ok(None);
        }
        let id = Checksum::random();
        self.storage.put(&state_key(&id), &self.delta.serialize()?)?;
        self.state.merge(id, &self.delta);
        self.delta.reset_onto(&self.state);
        info!(state = %id, "state committed");
        Ok(Some(id))
    }

    /// Ids of every persisted state, sorted.
    pub fn get_states(&self) -> Result<Vec<Checksum>> {
        let mut ids: Vec<Checksum> = self
            .storage
            .list(STATES_PREFIX)?
            .iter()
            .filter_map(|k| checksum_from_key(k))
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn get_state(&self, id: &Checksum) -> Result<State> {
        Self::load_state(self.storage.as_ref(), id)
    }

    /// Ids of every packfile in storage, sorted.
    pub fn list_packfiles(&self) -> Result<Vec<Checksum>> {
        let mut ids: Vec<Checksum> = self
            .storage
            .list(PACKFILES_PREFIX)?
            .iter()
            .filter_map(|k| checksum_from_key(k))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Live snapshot ids, sorted.
    pub fn list_snapshots(&self) -> Vec<Checksum> {
        let mut ids = self.state.list_snapshots();
        for id in self.delta.list_snapshots() {
            if !self.state.is_snapshot_deleted(&id) && !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids.retain(|id| !self.delta.is_snapshot_deleted(id));
        ids.sort();
        ids
    }

    pub fn get_snapshot(&self, id: &Checksum) -> Result<Snapshot> {
        if self.is_snapshot_deleted(id) {
            return Err(CaskError::SnapshotNotFound(id.to_hex()));
        }
        Snapshot::load(self, id)
    }

    fn is_snapshot_deleted(&self, id: &Checksum) -> bool {
        self.state.is_snapshot_deleted(id) || self.delta.is_snapshot_deleted(id)
    }

    /// Mark a snapshot deleted. Takes effect for other handles after commit.
    pub fn delete_snapshot(&self, id: &Checksum) -> Result<()> {
        if !self.blob_exists(BlobType::Snapshot, id) {
            return Err(CaskError::SnapshotNotFound(id.to_hex()));
        }
        // Delta writes happen under the packer lock; see `commit`.
        let _packer = self.packer.lock();
        self.delta.delete_snapshot(*id);
        info!(snapshot = %id, "snapshot marked deleted");
        Ok(())
    }

    /// The aggregate of every persisted state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Location of a blob, if it has been written to a packfile.
    pub fn blob_location(&self, blob_type: BlobType, checksum: &Checksum) -> Option<Location> {
        self.locate(blob_type, checksum)
    }
}
