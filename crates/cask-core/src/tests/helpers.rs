use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};

use crate::backup::BackupOptions;
use crate::compress::Compression;
use crate::config::ChunkerConfig;
use crate::error::{CaskError, Result};
use crate::exporter::Exporter;
use crate::importer::{Importer, ScanError, ScanRecord, ScanResult};
use crate::repo::{RepoConfig, Repository};
use crate::testutil::MemoryBackend;
use crate::vfs::path::{base_name, parent_path};
use crate::vfs::{path_cmp, EntryKind, FileInfo};

pub const MTIME_NS: i64 = 1_700_000_000_000_000_000;

pub fn small_chunker() -> ChunkerConfig {
    ChunkerConfig {
        min_size: 512,
        normal_size: 2048,
        max_size: 8192,
    }
}

pub fn repo_config() -> RepoConfig {
    RepoConfig::new(small_chunker(), 64 * 1024, 4, Compression::Lz4)
}

pub fn mem_repo() -> Repository {
    Repository::init(Box::new(MemoryBackend::new()), repo_config()).unwrap()
}

/// Repository plus a handle on its backend, for tampering.
pub fn shared_repo() -> (Arc<MemoryBackend>, Repository) {
    let backend = Arc::new(MemoryBackend::new());
    let repo = Repository::init(Box::new(Arc::clone(&backend)), repo_config()).unwrap();
    (backend, repo)
}

/// Deterministic incompressible bytes.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf[..]);
    buf
}

#[derive(Debug, Clone)]
pub enum MemNode {
    Dir,
    File { data: Vec<u8>, ino: u64, nlink: u64 },
    Symlink(String),
    Pipe,
    /// Listed by the scan, but reading it fails.
    Unreadable,
}

/// Importer over an in-memory tree.
pub struct MemImporter {
    root: String,
    nodes: BTreeMap<String, MemNode>,
    scan_errors: Vec<ScanError>,
    next_ino: u64,
}

impl MemImporter {
    pub fn new(root: &str) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(root.to_string(), MemNode::Dir);
        Self {
            root: root.to_string(),
            nodes,
            scan_errors: Vec::new(),
            next_ino: 100,
        }
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.nodes.insert(path.to_string(), MemNode::Dir);
        self
    }

    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.next_ino += 1;
        let ino = self.next_ino;
        self.nodes.insert(
            path.to_string(),
            MemNode::File {
                data: data.to_vec(),
                ino,
                nlink: 1,
            },
        );
        self
    }

    /// Two names for one inode.
    pub fn hardlinked(mut self, a: &str, b: &str, data: &[u8]) -> Self {
        self.next_ino += 1;
        let ino = self.next_ino;
        for path in [a, b] {
            self.nodes.insert(
                path.to_string(),
                MemNode::File {
                    data: data.to_vec(),
                    ino,
                    nlink: 2,
                },
            );
        }
        self
    }

    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.nodes.insert(path.to_string(), MemNode::Symlink(target.to_string()));
        self
    }

    pub fn pipe(mut self, path: &str) -> Self {
        self.nodes.insert(path.to_string(), MemNode::Pipe);
        self
    }

    pub fn unreadable(mut self, path: &str) -> Self {
        self.nodes.insert(path.to_string(), MemNode::Unreadable);
        self
    }

    pub fn scan_error(mut self, path: &str, error: &str) -> Self {
        self.scan_errors.push(ScanError {
            pathname: path.to_string(),
            error: error.to_string(),
        });
        self
    }

    fn record(&self, path: &str, node: &MemNode) -> ScanRecord {
        let mut info = FileInfo {
            name: base_name(path).to_string(),
            mode: 0o644,
            mtime_ns: MTIME_NS,
            dev: 1,
            nlink: 1,
            ..Default::default()
        };
        let mut target = None;
        let kind = match node {
            MemNode::Dir => {
                info.mode = 0o755;
                EntryKind::Directory
            }
            MemNode::File { data, ino, nlink } => {
                info.size = data.len() as u64;
                info.ino = *ino;
                info.nlink = *nlink;
                EntryKind::File
            }
            MemNode::Unreadable => EntryKind::File,
            MemNode::Symlink(t) => {
                target = Some(t.clone());
                EntryKind::Symlink
            }
            MemNode::Pipe => EntryKind::Pipe,
        };
        let children = self
            .nodes
            .keys()
            .filter(|p| p.as_str() != path && parent_path(p) == path)
            .map(|p| base_name(p).to_string())
            .collect();
        ScanRecord {
            kind,
            pathname: path.to_string(),
            target,
            file_info: info,
            xattrs: Vec::new(),
            children,
        }
    }
}

impl Importer for MemImporter {
    fn origin(&self) -> String {
        "memory".into()
    }

    fn kind(&self) -> &str {
        "mem"
    }

    fn root(&self) -> String {
        self.root.clone()
    }

    fn scan(&self) -> Result<Receiver<ScanResult>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut ancestors = Vec::new();
        let mut cursor = self.root.as_str();
        while cursor != "/" {
            cursor = parent_path(cursor);
            ancestors.push(cursor.to_string());
        }
        for dir in ancestors.iter().rev() {
            let _ = tx.send(ScanResult::Record(self.record(dir, &MemNode::Dir)));
        }

        let mut paths: Vec<&String> = self.nodes.keys().collect();
        paths.sort_by(|a, b| path_cmp(a, b));
        for path in paths {
            let _ = tx.send(ScanResult::Record(self.record(path, &self.nodes[path])));
        }
        for e in &self.scan_errors {
            let _ = tx.send(ScanResult::Error(e.clone()));
        }
        Ok(rx)
    }

    fn new_reader(&self, pathname: &str) -> Result<Box<dyn Read + Send>> {
        match self.nodes.get(pathname) {
            Some(MemNode::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(MemNode::Unreadable) => Err(CaskError::Io(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            ))),
            _ => Err(CaskError::PathNotFound(pathname.to_string())),
        }
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exported {
    Dir,
    File(Vec<u8>),
    Symlink(String),
    Link(String),
}

/// Exporter that records everything in memory.
#[derive(Default)]
pub struct MemExporter {
    pub nodes: Mutex<BTreeMap<String, Exported>>,
    /// Paths in the order their permissions were applied.
    pub permissions: Mutex<Vec<String>>,
    /// `store_file` fails for this path.
    pub fail_on: Option<String>,
}

impl MemExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(path: &str) -> Self {
        Self {
            fail_on: Some(path.to_string()),
            ..Self::default()
        }
    }

    pub fn get(&self, path: &str) -> Option<Exported> {
        self.nodes.lock().get(path).cloned()
    }
}

impl Exporter for MemExporter {
    fn root(&self) -> String {
        "memory".into()
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        self.nodes.lock().insert(path.to_string(), Exported::Dir);
        Ok(())
    }

    fn store_file(&self, path: &str, reader: &mut dyn Read, size: u64) -> Result<()> {
        if self.fail_on.as_deref() == Some(path) {
            return Err(CaskError::Other(format!("refusing to write {path}")));
        }
        let mut data = Vec::with_capacity(size as usize);
        reader.read_to_end(&mut data)?;
        self.nodes.lock().insert(path.to_string(), Exported::File(data));
        Ok(())
    }

    fn create_symlink(&self, target: &str, path: &str) -> Result<()> {
        self.nodes
            .lock()
            .insert(path.to_string(), Exported::Symlink(target.to_string()));
        Ok(())
    }

    fn create_link(&self, existing: &str, path: &str) -> Result<()> {
        self.nodes
            .lock()
            .insert(path.to_string(), Exported::Link(existing.to_string()));
        Ok(())
    }

    fn set_permissions(&self, path: &str, _info: &FileInfo) -> Result<()> {
        self.permissions.lock().push(path.to_string());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub fn backup_opts() -> BackupOptions {
    BackupOptions {
        file_cache: false,
        max_concurrency: 4,
        ..Default::default()
    }
}
