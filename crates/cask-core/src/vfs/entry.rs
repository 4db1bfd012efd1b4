use cask_types::Checksum;
use serde::{Deserialize, Serialize};

use super::path::{base_name, parent_path};
use super::summary::Summary;
use crate::error::Result;

pub const ENTRY_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    File,
    Directory,
    Symlink,
    Device,
    Pipe,
    Socket,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::Symlink => "symlink",
            EntryKind::Device => "device",
            EntryKind::Pipe => "pipe",
            EntryKind::Socket => "socket",
        }
    }
}

/// Filesystem metadata captured at scan time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    /// Permission bits including setuid, setgid and sticky.
    pub mode: u32,
    pub mtime_ns: i64,
    pub dev: u64,
    pub ino: u64,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub groupname: Option<String>,
}

impl FileInfo {
    /// Key identifying the inode, for hardlink detection.
    pub fn inode_key(&self) -> String {
        format!("{}:{}", self.dev, self.ino)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Xattr {
    pub name: String,
    pub value: Vec<u8>,
}

/// One path in a snapshot. Stored as an `Entry` blob; the VFS tree maps
/// the path to that blob's checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub version: u32,
    pub path: String,
    pub parent_path: String,
    pub name: String,
    pub kind: EntryKind,
    pub file_info: FileInfo,
    #[serde(default)]
    pub symlink_target: Option<String>,
    /// Object holding file content, for regular files.
    #[serde(default)]
    pub object: Option<Checksum>,
    /// Set on directories.
    #[serde(default)]
    pub summary: Option<Summary>,
    #[serde(default)]
    pub xattrs: Vec<Xattr>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Entry {
    /// `path` must already be clean.
    pub fn new(path: &str, kind: EntryKind, file_info: FileInfo) -> Self {
        Self {
            version: ENTRY_VERSION,
            path: path.to_string(),
            parent_path: parent_path(path).to_string(),
            name: base_name(path).to_string(),
            kind,
            file_info,
            symlink_target: None,
            object: None,
            summary: None,
            xattrs: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn size(&self) -> u64 {
        self.file_info.size
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

/// A per-path failure recorded during backup, stored in the error tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub path: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_splits_path() {
        let e = Entry::new("/a/b/c.txt", EntryKind::File, FileInfo::default());
        assert_eq!(e.parent_path, "/a/b");
        assert_eq!(e.name, "c.txt");
        assert!(e.is_file());

        let root = Entry::new("/", EntryKind::Directory, FileInfo::default());
        assert_eq!(root.parent_path, "/");
        assert_eq!(root.name, "/");
    }

    #[test]
    fn serialize_roundtrip_keeps_summary() {
        let mut e = Entry::new("/d", EntryKind::Directory, FileInfo::default());
        let mut summary = Summary::default();
        summary.directory.files = 3;
        e.summary = Some(summary);
        e.tags.push("home".into());
        let back = Entry::deserialize(&e.serialize().unwrap()).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn inode_key_format() {
        let info = FileInfo {
            dev: 3,
            ino: 77,
            ..Default::default()
        };
        assert_eq!(info.inode_key(), "3:77");
    }
}
