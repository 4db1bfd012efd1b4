//! Sources a backup reads from.

pub mod fs;

use std::io::Read;

use crossbeam_channel::Receiver;

use crate::error::Result;
use crate::vfs::{EntryKind, FileInfo, Xattr};

pub use self::fs::FsImporter;

/// One path found by a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub kind: EntryKind,
    /// Clean absolute path.
    pub pathname: String,
    /// Link target, for symlinks.
    pub target: Option<String>,
    pub file_info: FileInfo,
    pub xattrs: Vec<Xattr>,
    /// Names of immediate children, for directories.
    pub children: Vec<String>,
}

/// A path the scan could not read.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanError {
    pub pathname: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanResult {
    Record(ScanRecord),
    Error(ScanError),
}

impl ScanResult {
    pub fn pathname(&self) -> &str {
        match self {
            ScanResult::Record(r) => &r.pathname,
            ScanResult::Error(e) => &e.pathname,
        }
    }
}

pub trait Importer: Send + Sync {
    /// Where the data comes from, e.g. the host name.
    fn origin(&self) -> String;

    /// Importer scheme, e.g. `fs`.
    fn kind(&self) -> &str;

    /// Clean absolute path of the scan root.
    fn root(&self) -> String;

    /// Start scanning. Every ancestor directory of the root is emitted
    /// first, then the tree below the root with parents before children.
    fn scan(&self) -> Result<Receiver<ScanResult>>;

    fn new_reader(&self, pathname: &str) -> Result<Box<dyn Read + Send>>;

    fn close(&self) -> Result<()>;
}
