//! Destinations a restore writes to.

pub mod fs;

use std::io::Read;

use crate::error::Result;
use crate::vfs::FileInfo;

pub use self::fs::FsExporter;

/// A restore target. Paths are clean absolute paths relative to the
/// exporter's root: `/a/b` lands at `<root>/a/b`.
pub trait Exporter: Send + Sync {
    fn root(&self) -> String;

    fn create_directory(&self, path: &str) -> Result<()>;

    /// Write `size` bytes from `reader` to a new file at `path`.
    fn store_file(&self, path: &str, reader: &mut dyn Read, size: u64) -> Result<()>;

    fn create_symlink(&self, target: &str, path: &str) -> Result<()>;

    /// Hardlink `path` to the already-restored `existing`.
    fn create_link(&self, existing: &str, path: &str) -> Result<()>;

    fn set_permissions(&self, path: &str, info: &FileInfo) -> Result<()>;

    fn close(&self) -> Result<()>;
}
