use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use super::Exporter;
use crate::error::{CaskError, Result};
use crate::platform::fs as pfs;
use crate::vfs::FileInfo;

/// Restores into a local directory.
pub struct FsExporter {
    root: PathBuf,
}

impl FsExporter {
    /// The root directory is created if missing.
    pub fn new(location: &str) -> Result<Self> {
        std::fs::create_dir_all(location)?;
        Ok(Self {
            root: std::fs::canonicalize(location)?,
        })
    }

    /// Snapshot paths carry escaped native names; decode before joining.
    fn target(&self, path: &str) -> Result<PathBuf> {
        let mut out = self.root.clone();
        for component in pfs::native_path(path).components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(CaskError::InvalidFormat(format!(
                        "refusing to restore unsafe path: {path}"
                    )));
                }
            }
        }
        Ok(out)
    }

    fn ensure_parent(target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl Exporter for FsExporter {
    fn root(&self) -> String {
        pfs::encode_os_str(self.root.as_os_str())
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        std::fs::create_dir_all(self.target(path)?)?;
        Ok(())
    }

    fn store_file(&self, path: &str, reader: &mut dyn Read, size: u64) -> Result<()> {
        let target = self.target(path)?;
        Self::ensure_parent(&target)?;
        let mut file = std::fs::File::create(&target)?;
        let written = io::copy(reader, &mut file)?;
        if written != size {
            return Err(CaskError::InvalidFormat(format!(
                "{path}: restored {written} bytes, expected {size}"
            )));
        }
        Ok(())
    }

    fn create_symlink(&self, target: &str, path: &str) -> Result<()> {
        let link = self.target(path)?;
        Self::ensure_parent(&link)?;
        let _ = std::fs::remove_file(&link);
        pfs::create_symlink(&pfs::native_path(target), &link)?;
        Ok(())
    }

    fn create_link(&self, existing: &str, path: &str) -> Result<()> {
        let original = self.target(existing)?;
        let link = self.target(path)?;
        Self::ensure_parent(&link)?;
        let _ = std::fs::remove_file(&link);
        std::fs::hard_link(original, link)?;
        Ok(())
    }

    fn set_permissions(&self, path: &str, info: &FileInfo) -> Result<()> {
        let target = self.target(path)?;
        // Symlink metadata is not restored.
        if std::fs::symlink_metadata(&target)?.file_type().is_symlink() {
            return Ok(());
        }
        if let Err(e) = pfs::apply_mode(&target, info.mode) {
            warn!(path = %target.display(), "failed to set mode: {e}");
        }
        if let Err(e) = pfs::set_file_mtime(&target, info.mtime_ns) {
            debug!(path = %target.display(), "failed to set mtime: {e}");
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
