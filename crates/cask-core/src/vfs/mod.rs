//! Read-only view of a snapshot as a filesystem.
//!
//! The snapshot tree maps clean absolute paths (ordered by [`path_cmp`]) to
//! checksums of `Entry` blobs. Directory listings are prefix scans over
//! that order, so no per-directory child lists are stored.

pub mod entry;
pub mod path;
pub mod reader;
pub mod summary;

use cask_types::Checksum;

use crate::btree::{BTree, RepositoryStore, Storer};
use crate::error::{CaskError, Result};
use crate::object::Object;
use crate::repo::{BlobType, Repository};

pub use self::entry::{Entry, EntryKind, ErrorEntry, FileInfo, Xattr};
pub use self::path::{clean_path, path_cmp};
pub use self::reader::FileReader;
pub use self::summary::{FileSummary, Summary, SummaryCounts};

pub type VfsTree<'a> = BTree<String, Checksum, Checksum, RepositoryStore<'a, String, Checksum>>;
pub type ErrorTree<'a> = BTree<String, Checksum, String, RepositoryStore<'a, String, String>>;

/// An open directory with its immediate children.
pub struct DirHandle {
    pub entry: Entry,
    pub children: Vec<Entry>,
}

pub enum Handle<'a> {
    Directory(DirHandle),
    File(FileReader<'a>),
}

pub struct Filesystem<'a> {
    repo: &'a Repository,
    tree: VfsTree<'a>,
    errors: ErrorTree<'a>,
}

impl<'a> Filesystem<'a> {
    /// Open the snapshot trees rooted at `root` and `errors_root`.
    pub fn new(repo: &'a Repository, root: Checksum, errors_root: Checksum) -> Result<Self> {
        let order = repo.config.btree_order;
        let tree = BTree::from_root(
            root,
            RepositoryStore::read_only(repo, BlobType::VfsNode),
            path_cmp,
            order,
        );
        tree.store().get(&root)?;
        let errors = BTree::from_root(
            errors_root,
            RepositoryStore::read_only(repo, BlobType::ErrorNode),
            path_cmp,
            order,
        );
        Ok(Self { repo, tree, errors })
    }

    pub fn tree(&self) -> &VfsTree<'a> {
        &self.tree
    }

    pub fn error_tree(&self) -> &ErrorTree<'a> {
        &self.errors
    }

    fn load_entry(&self, checksum: &Checksum) -> Result<Entry> {
        Entry::deserialize(&self.repo.get_blob(BlobType::Entry, checksum)?)
    }

    pub fn get_entry(&self, path: &str) -> Result<Entry> {
        let path = clean_path(path);
        match self.tree.find(&path)? {
            Some(checksum) => self.load_entry(&checksum),
            None => Err(CaskError::PathNotFound(path)),
        }
    }

    pub fn stat(&self, path: &str) -> Result<FileInfo> {
        Ok(self.get_entry(path)?.file_info)
    }

    /// Paths and entry checksums of the immediate children of `dir`.
    fn child_checksums(&self, dir: &str) -> Result<Vec<(String, Checksum)>> {
        let prefix = path::child_prefix(dir);
        let depth = path::component_count(dir) + 1;
        let mut out = Vec::new();
        for item in self.tree.scan_from(&prefix)? {
            let (key, checksum) = item?;
            if key == dir {
                continue;
            }
            if !key.starts_with(&prefix) || path::component_count(&key) != depth {
                break;
            }
            out.push((key, checksum));
        }
        Ok(out)
    }

    pub fn read_dir(&self, path: &str) -> Result<Vec<Entry>> {
        let entry = self.get_entry(path)?;
        if !entry.is_dir() {
            return Err(CaskError::NotADirectory(entry.path));
        }
        self.child_checksums(&entry.path)?
            .iter()
            .map(|(_, checksum)| self.load_entry(checksum))
            .collect()
    }

    pub fn open(&self, path: &str) -> Result<Handle<'a>> {
        let entry = self.get_entry(path)?;
        match entry.kind {
            EntryKind::Directory => {
                let children = self.read_dir(&entry.path)?;
                Ok(Handle::Directory(DirHandle { entry, children }))
            }
            EntryKind::File => Ok(Handle::File(self.open_file(&entry)?)),
            _ => Err(CaskError::NotAFile(entry.path)),
        }
    }

    pub fn open_file(&self, entry: &Entry) -> Result<FileReader<'a>> {
        let checksum = entry
            .object
            .ok_or_else(|| CaskError::NotAFile(entry.path.clone()))?;
        Ok(FileReader::new(self.repo, self.get_object(&checksum)?))
    }

    pub fn get_object(&self, checksum: &Checksum) -> Result<Object> {
        Object::deserialize(&self.repo.get_blob(BlobType::Object, checksum)?)
    }

    /// Depth-first walk from `path`, each directory before its children.
    pub fn walk(&self, path: &str, visitor: &mut dyn FnMut(&Entry) -> Result<()>) -> Result<()> {
        let entry = self.get_entry(path)?;
        self.walk_entry(&entry, visitor)
    }

    fn walk_entry(&self, entry: &Entry, visitor: &mut dyn FnMut(&Entry) -> Result<()>) -> Result<()> {
        visitor(entry)?;
        if entry.is_dir() {
            for (_, checksum) in self.child_checksums(&entry.path)? {
                let child = self.load_entry(&checksum)?;
                self.walk_entry(&child, visitor)?;
            }
        }
        Ok(())
    }

    /// Every regular-file path in the snapshot.
    pub fn files(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for item in self.tree.scan_all()? {
            let (path, checksum) = item?;
            if self.load_entry(&checksum)?.is_file() {
                out.push(path);
            }
        }
        Ok(out)
    }

    /// Every `(path, entry checksum)` pair, in tree order.
    pub fn entries(&self) -> Result<Vec<(String, Checksum)>> {
        self.tree.scan_all()?.collect()
    }

    /// Errors recorded at or below `prefix`, in tree order.
    ///
    /// Descendants of one directory are contiguous only within a depth, so
    /// this seeks once per depth band instead of scanning the whole tree.
    pub fn errors(&self, prefix: &str) -> Result<Vec<ErrorEntry>> {
        let prefix = clean_path(prefix);
        if prefix == "/" {
            return self
                .errors
                .scan_all()?
                .map(|item| item.map(|(path, error)| ErrorEntry { path, error }))
                .collect();
        }

        let mut out = Vec::new();
        if let Some(error) = self.errors.find(&prefix)? {
            out.push(ErrorEntry {
                path: prefix.clone(),
                error,
            });
        }
        let below = path::child_prefix(&prefix);
        let base = path::component_count(&prefix) + 1;
        let mut depth = base;
        loop {
            // Sorts before every real key of this depth that starts with `below`.
            let seek = format!("{below}\0{}", "/".repeat(depth - base));
            let mut next = None;
            for item in self.errors.scan_from(&seek)? {
                let (path, error) = item?;
                let d = path::component_count(&path);
                if d > depth {
                    next = Some(d);
                    break;
                }
                if !path.starts_with(&below) {
                    next = Some(depth + 1);
                    break;
                }
                out.push(ErrorEntry { path, error });
            }
            match next {
                Some(d) => depth = d,
                None => return Ok(out),
            }
        }
    }
}
