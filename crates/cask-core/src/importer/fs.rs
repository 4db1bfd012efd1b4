use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crossbeam_channel::{bounded, Receiver, Sender};
use ignore::WalkBuilder;
use tracing::{debug, warn};

use super::{Importer, ScanError, ScanRecord, ScanResult};
use crate::error::{CaskError, Result};
use crate::platform::fs as pfs;
use crate::vfs::path::base_name;
use crate::vfs::EntryKind;

const SCAN_QUEUE: usize = 1024;

/// Render a native path as a clean `/`-separated absolute path.
fn vfs_path(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        if let Component::Normal(part) = component {
            out.push('/');
            out.push_str(&pfs::encode_os_str(part));
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

fn error_path(e: &ignore::Error) -> Option<&Path> {
    match e {
        ignore::Error::WithPath { path, .. } => Some(path),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => error_path(err),
        _ => None,
    }
}

/// Scans a local directory tree.
pub struct FsImporter {
    root: PathBuf,
}

impl FsImporter {
    pub fn new(location: &str) -> Result<Self> {
        let root = std::fs::canonicalize(location)?;
        Ok(Self { root })
    }

    /// Ancestors of the root are recorded from metadata alone. Their other
    /// entries are outside the backup, and a directory that can be
    /// traversed but not listed must not fail the scan.
    fn record_ancestor(path: &Path) -> ScanResult {
        Self::record_with(path, false)
    }

    fn record(path: &Path) -> ScanResult {
        Self::record_with(path, true)
    }

    fn record_with(path: &Path, list_children: bool) -> ScanResult {
        let pathname = vfs_path(path);
        let metadata = match std::fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) => return ScanResult::Error(ScanError { pathname, error: e.to_string() }),
        };
        let kind = pfs::entry_kind(&metadata.file_type());
        let file_info = pfs::file_info(base_name(&pathname), &metadata);
        let target = match kind {
            EntryKind::Symlink => match std::fs::read_link(path) {
                Ok(t) => Some(pfs::encode_os_str(t.as_os_str())),
                Err(e) => return ScanResult::Error(ScanError { pathname, error: e.to_string() }),
            },
            _ => None,
        };
        let children = match kind {
            EntryKind::Directory if list_children => match std::fs::read_dir(path) {
                Ok(rd) => {
                    let mut names: Vec<String> = rd
                        .filter_map(|e| e.ok())
                        .map(|e| pfs::encode_os_str(&e.file_name()))
                        .collect();
                    names.sort();
                    names
                }
                Err(e) => return ScanResult::Error(ScanError { pathname, error: e.to_string() }),
            },
            _ => Vec::new(),
        };
        ScanResult::Record(ScanRecord {
            kind,
            pathname,
            target,
            file_info,
            xattrs: Vec::new(),
            children,
        })
    }

    fn walk(root: PathBuf, tx: Sender<ScanResult>) {
        let mut ancestors: Vec<&Path> = root.ancestors().skip(1).collect();
        ancestors.reverse();
        for dir in ancestors {
            if tx.send(Self::record_ancestor(dir)).is_err() {
                return;
            }
        }

        let mut builder = WalkBuilder::new(&root);
        builder
            .follow_links(false)
            .standard_filters(false)
            .sort_by_file_name(std::ffi::OsStr::cmp);

        let mut count = 0u64;
        for item in builder.build() {
            let result = match item {
                Ok(entry) => Self::record(entry.path()),
                Err(e) => {
                    let path = error_path(&e).unwrap_or(&root);
                    warn!(path = %path.display(), "scan error: {e}");
                    ScanResult::Error(ScanError {
                        pathname: vfs_path(path),
                        error: e.to_string(),
                    })
                }
            };
            count += 1;
            if tx.send(result).is_err() {
                debug!("scan receiver dropped, stopping walk");
                return;
            }
        }
        debug!(root = %root.display(), entries = count, "scan finished");
    }
}

impl Importer for FsImporter {
    fn origin(&self) -> String {
        std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into())
    }

    fn kind(&self) -> &str {
        "fs"
    }

    fn root(&self) -> String {
        vfs_path(&self.root)
    }

    fn scan(&self) -> Result<Receiver<ScanResult>> {
        let (tx, rx) = bounded(SCAN_QUEUE);
        let root = self.root.clone();
        std::thread::Builder::new()
            .name("cask-scan".into())
            .spawn(move || Self::walk(root, tx))
            .map_err(|e| CaskError::Other(format!("failed to spawn scanner: {e}")))?;
        Ok(rx)
    }

    fn new_reader(&self, pathname: &str) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(pfs::native_path(pathname))?))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(importer: &FsImporter) -> Vec<ScanResult> {
        importer.scan().unwrap().iter().collect()
    }

    #[test]
    fn vfs_path_is_clean() {
        assert_eq!(vfs_path(Path::new("/")), "/");
        assert_eq!(vfs_path(Path::new("/a/b/")), "/a/b");
    }

    #[test]
    fn scan_emits_ancestors_then_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let importer = FsImporter::new(dir.path().to_str().unwrap()).unwrap();
        let root = importer.root();
        let results = collect(&importer);
        let paths: Vec<&str> = results.iter().map(|r| r.pathname()).collect();

        assert_eq!(paths[0], "/");
        let root_pos = paths.iter().position(|p| *p == root).unwrap();
        for ancestor in &paths[..root_pos] {
            assert!(root.starts_with(ancestor), "{ancestor} is not above {root}");
        }
        assert_eq!(
            &paths[root_pos..],
            &[
                root.as_str(),
                &format!("{root}/a.txt"),
                &format!("{root}/sub"),
                &format!("{root}/sub/b.txt"),
            ]
        );

        let ScanResult::Record(root_record) = &results[root_pos] else {
            panic!("root should be a record");
        };
        assert_eq!(root_record.kind, EntryKind::Directory);
        assert_eq!(root_record.children, vec!["a.txt", "sub"]);
    }

    #[test]
    fn reader_returns_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"content").unwrap();
        let importer = FsImporter::new(dir.path().to_str().unwrap()).unwrap();
        let mut out = String::new();
        importer
            .new_reader(&format!("{}/f", importer.root()))
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "content");
    }

    #[test]
    fn ancestors_are_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("root")).unwrap();
        std::fs::write(dir.path().join("sibling"), b"outside").unwrap();
        let importer = FsImporter::new(dir.path().join("root").to_str().unwrap()).unwrap();
        let root = importer.root();

        let parent = vfs_path(dir.path().canonicalize().unwrap().as_path());
        let ScanResult::Record(record) = collect(&importer)
            .into_iter()
            .find(|r| r.pathname() == parent)
            .unwrap()
        else {
            panic!("parent should be a record");
        };
        assert_eq!(record.kind, EntryKind::Directory);
        assert!(record.children.is_empty());
        assert!(root.starts_with(&parent));
    }

    #[cfg(unix)]
    #[test]
    fn unlistable_ancestor_still_scans() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir_all(locked.join("root")).unwrap();
        std::fs::write(locked.join("root/f"), b"f").unwrap();
        // Traversable but not listable.
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o311)).unwrap();

        let importer = FsImporter::new(locked.join("root").to_str().unwrap()).unwrap();
        let results = collect(&importer);
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        let locked_path = vfs_path(&locked.canonicalize().unwrap());
        assert!(results.iter().all(|r| matches!(r, ScanResult::Record(_))));
        assert!(results.iter().any(|r| r.pathname() == locked_path));
        assert!(results.iter().any(|r| r.pathname() == format!("{}/f", importer.root())));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_scan_and_read_back() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let name = OsStr::from_bytes(b"caf\xe9.txt");
        std::fs::write(dir.path().join(name), b"latin1").unwrap();
        let importer = FsImporter::new(dir.path().to_str().unwrap()).unwrap();

        let expected = format!("{}/caf\\xe9.txt", importer.root());
        let results = collect(&importer);
        assert!(results.iter().any(|r| r.pathname() == expected));
        let ScanResult::Record(root) = results.iter().find(|r| r.pathname() == importer.root()).unwrap() else {
            panic!("root should be a record");
        };
        assert_eq!(root.children, vec![r"caf\xe9.txt"]);

        let mut out = String::new();
        importer.new_reader(&expected).unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "latin1");
    }

    #[test]
    fn missing_root_fails() {
        assert!(FsImporter::new("/definitely/not/here/cask").is_err());
    }
}
