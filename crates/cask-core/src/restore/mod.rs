//! Restore pipeline: write a snapshot subtree through an exporter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use cask_types::Checksum;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backup::concurrency::Semaphore;
use crate::config::RestoreConfig;
use crate::error::{CaskError, Result};
use crate::events::{Event, Events};
use crate::exporter::Exporter;
use crate::repo::Repository;
use crate::vfs::path::{base_name, join, parent_path};
use crate::vfs::{clean_path, Entry, EntryKind, Filesystem};

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Snapshot path to restore.
    pub path: String,
    /// Place `path` at the exporter root instead of under its full path.
    pub rebase: bool,
    pub max_concurrency: usize,
    pub skip_permissions: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self::from_config(&RestoreConfig::default())
    }
}

impl RestoreOptions {
    pub fn from_config(config: &RestoreConfig) -> Self {
        Self {
            path: "/".into(),
            rebase: false,
            max_concurrency: config.max_concurrency(),
            skip_permissions: config.skip_permissions,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub hardlinks: u64,
    pub bytes: u64,
    pub errors: u64,
}

#[derive(Default)]
struct Counters {
    files: AtomicU64,
    directories: AtomicU64,
    symlinks: AtomicU64,
    hardlinks: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn stats(&self) -> RestoreStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RestoreStats {
            files: get(&self.files),
            directories: get(&self.directories),
            symlinks: get(&self.symlinks),
            hardlinks: get(&self.hardlinks),
            bytes: get(&self.bytes),
            errors: get(&self.errors),
        }
    }
}

struct Restorer<'a> {
    fs: &'a Filesystem<'a>,
    exporter: &'a dyn Exporter,
    events: &'a Events,
    opts: &'a RestoreOptions,
    pool: rayon::ThreadPool,
    gate: Semaphore,
    /// Directory whose contents land at the exporter root, when rebasing.
    base: String,
    /// `dev:ino` of multiply-linked files to their first restored path.
    hardlinks: Mutex<HashMap<String, String>>,
    counters: Counters,
}

impl<'a> Restorer<'a> {
    fn target(&self, path: &str) -> String {
        if !self.opts.rebase || self.base == "/" {
            return path.to_string();
        }
        match path.strip_prefix(self.base.as_str()) {
            Some(rest) => clean_path(rest),
            None => path.to_string(),
        }
    }

    fn child_failed(&self, path: &str, err: &CaskError) {
        warn!(path, "restore failed: {err}");
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn restore(&self, entry: &Entry) -> Result<()> {
        match entry.kind {
            EntryKind::Directory => self.restore_dir(entry),
            EntryKind::File => self.restore_file(entry),
            EntryKind::Symlink => self.restore_symlink(entry),
            kind => {
                self.events.emit(Event::Skipped {
                    path: entry.path.clone(),
                    reason: format!("{} entries are not restored", kind.as_str()),
                });
                Ok(())
            }
        }
    }

    /// Children of `entry` are restored before its own metadata is applied.
    /// Subdirectories recurse on this thread; files go to the pool.
    fn restore_dir(&self, entry: &Entry) -> Result<()> {
        let target = self.target(&entry.path);
        let children = match self
            .exporter
            .create_directory(&target)
            .and_then(|()| self.fs.read_dir(&entry.path))
        {
            Ok(children) => children,
            Err(e) => {
                self.child_failed(&entry.path, &e);
                return Err(e);
            }
        };

        let failed = AtomicBool::new(false);
        self.pool.in_place_scope(|s| {
            for child in &children {
                match child.kind {
                    EntryKind::File => {
                        let permit = match self.gate.acquire() {
                            Ok(p) => p,
                            Err(e) => {
                                self.child_failed(&child.path, &e);
                                failed.store(true, Ordering::Release);
                                break;
                            }
                        };
                        let failed = &failed;
                        s.spawn(move |_| {
                            let _permit = permit;
                            if let Err(e) = self.restore_file(child) {
                                self.child_failed(&child.path, &e);
                                failed.store(true, Ordering::Release);
                            }
                        });
                    }
                    // Subdirectories count their own failures.
                    EntryKind::Directory => {
                        if self.restore_dir(child).is_err() {
                            failed.store(true, Ordering::Release);
                        }
                    }
                    _ => {
                        if let Err(e) = self.restore(child) {
                            self.child_failed(&child.path, &e);
                            failed.store(true, Ordering::Release);
                        }
                    }
                }
            }
        });

        if failed.load(Ordering::Acquire) {
            self.events.emit(Event::DirectoryCorrupted {
                path: entry.path.clone(),
            });
            return Err(CaskError::Other(format!("'{}' was not fully restored", entry.path)));
        }
        if !self.opts.skip_permissions {
            if let Err(e) = self.exporter.set_permissions(&target, &entry.file_info) {
                self.child_failed(&entry.path, &e);
                return Err(e);
            }
        }
        self.counters.directories.fetch_add(1, Ordering::Relaxed);
        self.events.emit(Event::DirectoryRestored {
            path: entry.path.clone(),
        });
        Ok(())
    }

    fn restore_file(&self, entry: &Entry) -> Result<()> {
        let target = self.target(&entry.path);
        if entry.file_info.nlink > 1 {
            // Held across the first write so later links find a complete file.
            let mut links = self.hardlinks.lock();
            if let Some(existing) = links.get(&entry.file_info.inode_key()) {
                self.exporter.create_link(existing, &target)?;
                self.counters.hardlinks.fetch_add(1, Ordering::Relaxed);
                debug!(path = %target, existing = %existing, "hardlinked");
                return Ok(());
            }
            self.write_file(entry, &target)?;
            links.insert(entry.file_info.inode_key(), target);
            return Ok(());
        }
        self.write_file(entry, &target)
    }

    fn write_file(&self, entry: &Entry, target: &str) -> Result<()> {
        let mut reader = self.fs.open_file(entry)?;
        self.exporter.store_file(target, &mut reader, entry.size())?;
        if !self.opts.skip_permissions {
            self.exporter.set_permissions(target, &entry.file_info)?;
        }
        self.counters.files.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes.fetch_add(entry.size(), Ordering::Relaxed);
        self.events.emit(Event::FileRestored {
            path: entry.path.clone(),
            size: entry.size(),
        });
        Ok(())
    }

    fn restore_symlink(&self, entry: &Entry) -> Result<()> {
        let link_target = entry
            .symlink_target
            .as_deref()
            .ok_or_else(|| CaskError::InvalidFormat(format!("symlink '{}' has no target", entry.path)))?;
        self.exporter.create_symlink(link_target, &self.target(&entry.path))?;
        self.counters.symlinks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Restore `opts.path` of a snapshot. Per-path failures are counted in
/// [`RestoreStats::errors`]; only setup failures return an error.
pub fn run(
    repo: &Repository,
    snapshot_id: &Checksum,
    exporter: &dyn Exporter,
    opts: &RestoreOptions,
    events: &Events,
) -> Result<RestoreStats> {
    let snapshot = repo.get_snapshot(snapshot_id)?;
    let fs = snapshot.filesystem(repo)?;
    let entry = fs.get_entry(&opts.path)?;
    info!(snapshot = %snapshot.id, path = %entry.path, dest = %exporter.root(), "restore started");
    events.emit(Event::RestoreStarted {
        snapshot: snapshot.id,
        path: entry.path.clone(),
    });

    let workers = opts.max_concurrency.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("cask-restore-{i}"))
        .build()
        .map_err(|e| CaskError::Other(format!("failed to build thread pool: {e}")))?;

    // Rebasing a single file places it at the root under its own name.
    let base = if entry.is_dir() {
        entry.path.clone()
    } else {
        parent_path(&entry.path).to_string()
    };
    let restorer = Restorer {
        fs: &fs,
        exporter,
        events,
        opts,
        pool,
        gate: Semaphore::new(workers),
        base,
        hardlinks: Mutex::new(HashMap::new()),
        counters: Counters::default(),
    };

    if !entry.is_dir() {
        // Parents of a lone file are created bare.
        let parent = restorer.target(parent_path(&entry.path));
        exporter.create_directory(&parent)?;
        debug!(dest = %join(&parent, base_name(&entry.path)), "restoring single entry");
    }
    if let Err(e) = restorer.restore(&entry) {
        if !entry.is_dir() {
            restorer.child_failed(&entry.path, &e);
        }
    }
    exporter.close()?;

    let stats = restorer.counters.stats();
    info!(
        files = stats.files,
        directories = stats.directories,
        symlinks = stats.symlinks,
        hardlinks = stats.hardlinks,
        bytes = stats.bytes,
        errors = stats.errors,
        "restore finished"
    );
    events.emit(Event::RestoreDone {
        files: stats.files,
        bytes: stats.bytes,
    });
    Ok(stats)
}
