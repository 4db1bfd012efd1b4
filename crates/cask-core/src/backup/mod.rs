//! Backup pipeline: scan, chunk and store files, then build the snapshot
//! trees bottom-up.

pub(crate) mod concurrency;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use cask_types::Checksum;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use self::concurrency::Semaphore;
use crate::btree::{BTree, InMemoryStore, MemTree, RepositoryStore};
use crate::chunker::Chunker;
use crate::config::{BackupConfig, CaskConfig};
use crate::error::{CaskError, Result};
use crate::events::{Event, Events};
use crate::importer::{Importer, ScanRecord, ScanResult};
use crate::object::{Object, ObjectAssembler};
use crate::repo::file_cache::{FileCache, FileCacheEntry};
use crate::repo::{BlobType, Repository};
use crate::snapshot::{BackupStats, ImporterInfo, Snapshot, SNAPSHOT_VERSION};
use crate::vfs::path::{is_within, parent_path};
use crate::vfs::{path_cmp, Entry, EntryKind, ErrorEntry, FileSummary, Summary};

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub name: String,
    pub tags: Vec<String>,
    pub max_concurrency: usize,
    pub file_cache: bool,
    pub file_cache_ttl_secs: u64,
    /// Overrides the platform cache directory.
    pub cache_dir: Option<PathBuf>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self::from_backup_config(&BackupConfig::default(), None)
    }
}

impl BackupOptions {
    pub fn from_config(config: &CaskConfig) -> Self {
        Self::from_backup_config(&config.backup, config.cache_dir.as_deref().map(PathBuf::from))
    }

    fn from_backup_config(config: &BackupConfig, cache_dir: Option<PathBuf>) -> Self {
        Self {
            name: String::new(),
            tags: config.tags.clone(),
            max_concurrency: config.max_concurrency(),
            file_cache: config.file_cache,
            file_cache_ttl_secs: config.file_cache_ttl_secs,
            cache_dir,
        }
    }
}

#[derive(Default)]
struct Counters {
    files: AtomicU64,
    directories: AtomicU64,
    symlinks: AtomicU64,
    devices: AtomicU64,
    pipes: AtomicU64,
    sockets: AtomicU64,
    errors: AtomicU64,
    chunks: AtomicU64,
    chunks_transferred: AtomicU64,
    chunks_transfer_size: AtomicU64,
    objects: AtomicU64,
    objects_transferred: AtomicU64,
    objects_transfer_size: AtomicU64,
    cache_hits: AtomicU64,
    bytes_scanned: AtomicU64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl Counters {
    fn count_kind(&self, kind: EntryKind) {
        let counter = match kind {
            EntryKind::File => &self.files,
            EntryKind::Directory => &self.directories,
            EntryKind::Symlink => &self.symlinks,
            EntryKind::Device => &self.devices,
            EntryKind::Pipe => &self.pipes,
            EntryKind::Socket => &self.sockets,
        };
        bump(counter, 1);
    }

    fn stats(&self, entries: u64) -> BackupStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        BackupStats {
            files: get(&self.files),
            directories: get(&self.directories),
            symlinks: get(&self.symlinks),
            devices: get(&self.devices),
            pipes: get(&self.pipes),
            sockets: get(&self.sockets),
            errors: get(&self.errors),
            chunks: get(&self.chunks),
            chunks_transferred: get(&self.chunks_transferred),
            chunks_transfer_size: get(&self.chunks_transfer_size),
            objects: get(&self.objects),
            objects_transferred: get(&self.objects_transferred),
            objects_transfer_size: get(&self.objects_transfer_size),
            entries,
            cache_hits: get(&self.cache_hits),
            bytes_scanned: get(&self.bytes_scanned),
        }
    }
}

/// A task failure: either confined to one path, or fatal to the backup.
enum TaskError {
    Path(CaskError),
    Fatal(CaskError),
}

impl From<CaskError> for TaskError {
    /// A file that vanished or became unreadable mid-backup only costs
    /// that file.
    fn from(e: CaskError) -> Self {
        if e.is_soft_path_error() {
            TaskError::Path(e)
        } else {
            TaskError::Fatal(e)
        }
    }
}

/// A stored non-directory entry.
struct Stored {
    entry: Checksum,
    summary: FileSummary,
}

/// State shared by the feeding loop and the file workers.
struct Pipeline<'a> {
    repo: &'a Repository,
    importer: &'a dyn Importer,
    events: &'a Events,
    opts: &'a BackupOptions,
    root: String,
    now: i64,
    old_cache: FileCache,
    new_cache: Mutex<FileCache>,
    counters: Counters,
    stored: Mutex<HashMap<String, Stored>>,
    errors: Mutex<Vec<ErrorEntry>>,
    abort: AtomicBool,
    first_error: Mutex<Option<CaskError>>,
}

impl<'a> Pipeline<'a> {
    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    fn fail(&self, err: CaskError) {
        self.abort.store(true, Ordering::Release);
        let mut slot = self.first_error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn record_error(&self, path: &str, error: String) {
        warn!(path, "backup: {error}");
        bump(&self.counters.errors, 1);
        self.errors.lock().push(ErrorEntry {
            path: path.to_string(),
            error: error.clone(),
        });
        self.events.emit(Event::PathError {
            path: path.to_string(),
            error,
        });
    }

    fn store_entry(&self, entry: &Entry) -> Result<Checksum> {
        let bytes = entry.serialize()?;
        let checksum = Checksum::compute(&bytes);
        self.repo.put_blob(BlobType::Entry, checksum, &bytes)?;
        Ok(checksum)
    }

    /// Symlinks, devices, pipes and sockets: metadata only.
    fn store_special(&self, record: ScanRecord) -> Result<()> {
        let mut entry = Entry::new(&record.pathname, record.kind, record.file_info);
        entry.symlink_target = record.target;
        entry.xattrs = record.xattrs;
        let checksum = self.store_entry(&entry)?;
        self.counters.count_kind(entry.kind);
        let summary = FileSummary {
            kind: entry.kind,
            size: entry.file_info.size,
            mode: entry.file_info.mode,
            mtime_ns: entry.file_info.mtime_ns,
            ..Default::default()
        };
        self.stored.lock().insert(
            record.pathname,
            Stored {
                entry: checksum,
                summary,
            },
        );
        Ok(())
    }

    fn run_file_task(&self, record: ScanRecord) {
        if self.aborted() {
            return;
        }
        let path = record.pathname.clone();
        match self.process_file(record) {
            Ok(()) => {}
            Err(TaskError::Path(e)) => self.record_error(&path, e.to_string()),
            Err(TaskError::Fatal(e)) => {
                warn!(path = %path, "backup aborted: {e}");
                self.fail(e);
            }
        }
    }

    /// Object for an unchanged file, from the file cache.
    fn cached_object(&self, record: &ScanRecord) -> Option<(Object, i64)> {
        if !self.opts.file_cache {
            return None;
        }
        let info = &record.file_info;
        let hit = self.old_cache.lookup(
            &record.pathname,
            info.mtime_ns,
            info.size,
            info.dev,
            info.ino,
            self.opts.file_cache_ttl_secs,
            self.now,
        )?;
        match self.repo.get_blob(BlobType::Object, &hit.object) {
            Ok(bytes) => Object::deserialize(&bytes).ok().map(|o| (o, hit.cached_at)),
            Err(e) => {
                debug!(path = %record.pathname, "file cache hit unusable: {e}");
                None
            }
        }
    }

    /// Chunk the file and store chunks and object.
    fn chunk_file(&self, record: &ScanRecord) -> std::result::Result<Object, TaskError> {
        let reader = self
            .importer
            .new_reader(&record.pathname)
            .map_err(TaskError::Path)?;
        let chunker = Chunker::new(reader, &self.repo.config.chunker)?.with_size_hint(record.file_info.size);
        let mut assembler = ObjectAssembler::new(&record.pathname);
        for chunk in chunker {
            if self.aborted() {
                return Err(TaskError::Fatal(CaskError::Aborted("backup aborted".into())));
            }
            let data = chunk.map_err(TaskError::Path)?;
            let chunk_ref = assembler.feed(&data);
            bump(&self.counters.chunks, 1);
            if self.repo.put_blob(BlobType::Chunk, chunk_ref.checksum, &data)? {
                bump(&self.counters.chunks_transferred, 1);
                bump(&self.counters.chunks_transfer_size, data.len() as u64);
            }
        }
        let object = assembler.finish();
        let bytes = object.serialize()?;
        if self.repo.put_blob(BlobType::Object, object.checksum, &bytes)? {
            bump(&self.counters.objects_transferred, 1);
            bump(&self.counters.objects_transfer_size, bytes.len() as u64);
        }
        Ok(object)
    }

    fn process_file(&self, record: ScanRecord) -> std::result::Result<(), TaskError> {
        let (object, cached_at) = match self.cached_object(&record) {
            Some(hit) => {
                bump(&self.counters.cache_hits, 1);
                self.events.emit(Event::FileCached {
                    path: record.pathname.clone(),
                });
                hit
            }
            None => {
                let object = self.chunk_file(&record)?;
                bump(&self.counters.bytes_scanned, object.size);
                self.events.emit(Event::FileStored {
                    path: record.pathname.clone(),
                    size: object.size,
                });
                (object, self.now)
            }
        };
        bump(&self.counters.objects, 1);
        self.counters.count_kind(EntryKind::File);

        let mut entry = Entry::new(&record.pathname, EntryKind::File, record.file_info);
        entry.object = Some(object.checksum);
        entry.xattrs = record.xattrs;
        let checksum = self.store_entry(&entry)?;

        let info = &entry.file_info;
        if self.opts.file_cache {
            self.new_cache.lock().insert(
                record.pathname.clone(),
                FileCacheEntry {
                    mtime_ns: info.mtime_ns,
                    size: info.size,
                    dev: info.dev,
                    ino: info.ino,
                    object: object.checksum,
                    cached_at,
                },
            );
        }
        let summary = FileSummary {
            kind: EntryKind::File,
            size: info.size,
            objects: 1,
            chunks: object.chunks.len() as u64,
            mode: info.mode,
            mtime_ns: info.mtime_ns,
            content_type: object.content_type,
            entropy: object.entropy,
        };
        self.stored.lock().insert(
            record.pathname,
            Stored {
                entry: checksum,
                summary,
            },
        );
        Ok(())
    }
}

/// Run a backup of everything `importer` yields and commit the snapshot.
pub fn run(repo: &Repository, importer: &dyn Importer, opts: &BackupOptions, events: &Events) -> Result<Snapshot> {
    let started = Instant::now();
    let timestamp = Utc::now();
    let root = importer.root();
    info!(root = %root, kind = importer.kind(), "backup started");
    events.emit(Event::BackupStarted { root: root.clone() });

    let cache_path = if opts.file_cache {
        FileCache::cache_path(&repo.config.id, opts.cache_dir.as_deref())
    } else {
        None
    };
    let mut old_cache = cache_path.as_deref().map(FileCache::load).unwrap_or_default();
    let pruned = old_cache.prune_stale_entries(&|object| repo.blob_exists(BlobType::Object, object));
    if pruned > 0 {
        debug!(pruned, "dropped file cache entries for missing objects");
    }

    let pipeline = Pipeline {
        repo,
        importer,
        events,
        opts,
        root: root.clone(),
        now: timestamp.timestamp(),
        old_cache,
        new_cache: Mutex::new(FileCache::new()),
        counters: Counters::default(),
        stored: Mutex::new(HashMap::new()),
        errors: Mutex::new(Vec::new()),
        abort: AtomicBool::new(false),
        first_error: Mutex::new(None),
    };

    let directories = scan_and_process(&pipeline)?;
    if let Some(err) = pipeline.first_error.lock().take() {
        return Err(err);
    }
    if pipeline.aborted() {
        return Err(CaskError::Aborted("backup aborted".into()));
    }

    let Pipeline {
        counters,
        stored,
        errors,
        new_cache,
        ..
    } = pipeline;
    let stored = stored.into_inner();
    let mut errors = errors.into_inner();

    // Bottom-up directory pass.
    let built = build_directories(repo, events, &directories, &stored, &errors)?;
    let root_summary = built
        .get(&root)
        .or_else(|| built.get("/"))
        .map(|(_, summary)| summary.clone())
        .unwrap_or_default();
    let root_entry = built
        .get("/")
        .map(|(checksum, _)| *checksum)
        .ok_or_else(|| CaskError::InvalidFormat("scan produced no record for '/'".into()))?;

    let mut paths: Vec<(String, Checksum)> = stored
        .into_iter()
        .map(|(path, s)| (path, s.entry))
        .chain(built.into_iter().map(|(path, (checksum, _))| (path, checksum)))
        .collect();
    paths.sort_by(|a, b| path_cmp(&a.0, &b.0));
    let entries = paths.len() as u64;

    let order = repo.config.btree_order;
    let mut vfs: MemTree<String, Checksum> = BTree::new(InMemoryStore::new(), path_cmp, order)?;
    for (path, checksum) in paths {
        vfs.insert(path, checksum)?;
    }
    let vfs_root: Checksum = vfs.persist(&RepositoryStore::new(repo, BlobType::VfsNode))?;

    errors.sort_by(|a, b| path_cmp(&a.path, &b.path));
    let mut error_tree: MemTree<String, String> = BTree::new(InMemoryStore::new(), path_cmp, order)?;
    for e in errors {
        match error_tree.insert(e.path, e.error) {
            Ok(()) | Err(CaskError::KeyExists) => {}
            Err(e) => return Err(e),
        }
    }
    let errors_root: Checksum = error_tree.persist(&RepositoryStore::new(repo, BlobType::ErrorNode))?;

    let stats = counters.stats(entries);
    let stats_bytes = rmp_serde::to_vec_named(&stats)?;
    let statistics = Checksum::compute(&stats_bytes);
    repo.put_blob(BlobType::Data, statistics, &stats_bytes)?;

    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        id: Checksum::random(),
        timestamp,
        duration_ms: started.elapsed().as_millis() as u64,
        root: vfs_root,
        root_entry,
        errors: errors_root,
        statistics,
        summary: root_summary,
        importer: ImporterInfo {
            kind: importer.kind().to_string(),
            origin: importer.origin(),
            directory: root.clone(),
        },
        name: opts.name.clone(),
        tags: opts.tags.clone(),
    };
    snapshot.store(repo)?;
    repo.commit()?;
    importer.close()?;

    if let Some(path) = cache_path {
        let cache = new_cache.into_inner();
        match cache.save(&path) {
            Ok(()) => debug!(entries = cache.len(), path = %path.display(), "file cache saved"),
            Err(e) => warn!(path = %path.display(), "failed to save file cache: {e}"),
        }
    }

    info!(
        snapshot = %snapshot.id,
        files = stats.files,
        directories = stats.directories,
        errors = stats.errors,
        chunks_transferred = stats.chunks_transferred,
        "backup finished"
    );
    events.emit(Event::BackupDone {
        snapshot: snapshot.id,
        duration: started.elapsed(),
    });
    Ok(snapshot)
}

/// Drain the scan, storing files on the worker pool. Returns the directory
/// records seen.
fn scan_and_process(pipeline: &Pipeline<'_>) -> Result<HashMap<String, ScanRecord>> {
    let workers = pipeline.opts.max_concurrency.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("cask-backup-{i}"))
        .build()
        .map_err(|e| CaskError::Other(format!("failed to build thread pool: {e}")))?;
    let gate = Semaphore::new(workers);
    let scan = pipeline.importer.scan()?;
    let mut directories = HashMap::new();

    let fed = pool.in_place_scope(|s| -> Result<()> {
        for result in scan.iter() {
            if pipeline.aborted() {
                break;
            }
            let record = match result {
                ScanResult::Record(record) => record,
                ScanResult::Error(e) => {
                    if is_within(&pipeline.root, &e.pathname) {
                        let err = CaskError::Aborted(format!("cannot read '{}': {}", e.pathname, e.error));
                        pipeline.fail(err);
                        gate.poison();
                        break;
                    }
                    pipeline.record_error(&e.pathname, e.error);
                    continue;
                }
            };
            match record.kind {
                EntryKind::Directory => {
                    if is_within(&record.pathname, &pipeline.root) {
                        pipeline.counters.count_kind(EntryKind::Directory);
                    }
                    directories.insert(record.pathname.clone(), record);
                }
                EntryKind::File => {
                    let permit = gate.acquire()?;
                    s.spawn(move |_| {
                        let _permit = permit;
                        pipeline.run_file_task(record);
                    });
                }
                _ => {
                    if let Err(e) = pipeline.store_special(record) {
                        pipeline.fail(e);
                        gate.poison();
                        break;
                    }
                }
            }
        }
        Ok(())
    });
    if let Err(e) = fed {
        pipeline.fail(e);
    }
    Ok(directories)
}

/// Build directory entries deepest first, so every child is summarized
/// before its parent.
fn build_directories(
    repo: &Repository,
    events: &Events,
    directories: &HashMap<String, ScanRecord>,
    stored: &HashMap<String, Stored>,
    errors: &[ErrorEntry],
) -> Result<HashMap<String, (Checksum, Summary)>> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for path in directories.keys().chain(stored.keys()) {
        if path != "/" {
            children.entry(parent_path(path)).or_default().push(path.as_str());
        }
    }
    let mut error_counts: HashMap<&str, u64> = HashMap::new();
    for e in errors {
        *error_counts.entry(parent_path(&e.path)).or_default() += 1;
    }

    let mut order: Vec<&String> = directories.keys().collect();
    order.sort_by(|a, b| path_cmp(a, b));

    let mut built: HashMap<String, (Checksum, Summary)> = HashMap::with_capacity(order.len());
    for path in order.into_iter().rev() {
        let record = &directories[path];
        let mut summary = Summary::default();
        for child in children.get(path.as_str()).map(Vec::as_slice).unwrap_or_default() {
            if let Some(s) = stored.get(*child) {
                summary.update_with_file(&s.summary);
            } else if let Some((_, child_summary)) = built.get(*child) {
                let info = &directories[*child].file_info;
                summary.update_with_file(&FileSummary {
                    kind: EntryKind::Directory,
                    mode: info.mode,
                    mtime_ns: info.mtime_ns,
                    ..Default::default()
                });
                summary.update_below(child_summary);
            }
        }
        summary.directory.errors += error_counts.get(path.as_str()).copied().unwrap_or(0);
        summary.update_averages();

        let mut entry = Entry::new(path, EntryKind::Directory, record.file_info.clone());
        entry.xattrs = record.xattrs.clone();
        entry.summary = Some(summary);
        let bytes = entry.serialize()?;
        let checksum = Checksum::compute(&bytes);
        repo.put_blob(BlobType::Entry, checksum, &bytes)?;
        events.emit(Event::DirectoryDone { path: path.clone() });

        let summary = entry.summary.unwrap_or_default();
        built.insert(path.clone(), (checksum, summary));
    }
    Ok(built)
}
