use std::fs;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{CaskError, Result};
use crate::storage::StorageBackend;

/// Repository storage in a local directory.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: &str) -> Result<Self> {
        let root_path = PathBuf::from(root);
        // Canonicalize existing roots so listing strips the right prefix.
        let root = if root_path.exists() {
            fs::canonicalize(&root_path)?
        } else {
            root_path
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys must stay inside the root: relative, no `..`, no backslashes.
    fn validate_key(key: &str) -> Result<()> {
        let reason = if key.is_empty() {
            Some("empty")
        } else if key.starts_with('/') || key.starts_with('\\') {
            Some("absolute path")
        } else if key.contains('\\') {
            Some("contains backslash")
        } else if Path::new(key)
            .components()
            .any(|c| c == Component::ParentDir)
        {
            Some("parent traversal")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(CaskError::InvalidFormat(format!(
                "unsafe storage key '{key}': {reason}"
            ))),
            None => Ok(()),
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        Self::validate_key(key)?;
        Ok(self.root.join(key))
    }

    /// Write through a temp file in the target directory, then rename.
    fn atomic_write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn collect_keys(&self, dir: &Path, keys: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.collect_keys(&entry.path(), keys)?;
            } else if file_type.is_file() {
                if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                    let key = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }
        Ok(())
    }
}

fn not_found_as_none<T>(res: std::io::Result<T>) -> Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl StorageBackend for LocalBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        not_found_as_none(fs::read(self.resolve(key)?))
    }

    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
        let Some(mut file) = not_found_as_none(fs::File::open(self.resolve(key)?))? else {
            return Ok(None);
        };
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(length as usize);
        file.take(length).read_to_end(&mut buf)?;
        if (buf.len() as u64) < length {
            return Err(CaskError::InvalidFormat(format!(
                "short read on {key} at offset {offset}: expected {length} bytes, got {}",
                buf.len()
            )));
        }
        Ok(Some(buf))
    }

    fn size(&self, key: &str) -> Result<Option<u64>> {
        Ok(not_found_as_none(fs::metadata(self.resolve(key)?))?
            .filter(|meta| meta.is_file())
            .map(|meta| meta.len()))
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        match self.atomic_write(&path, data) {
            Err(CaskError::Io(ref e)) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                debug!(key, "created parent directories");
                self.atomic_write(&path, data)
            }
            other => other,
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        not_found_as_none(fs::remove_file(self.resolve(key)?)).map(|_| ())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.size(key)?.is_some())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.resolve(prefix.trim_end_matches('/'))?
        };
        let mut keys = Vec::new();
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => self.collect_keys(&dir, &mut keys)?,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(keys)
    }

    fn create_dir(&self, key: &str) -> Result<()> {
        fs::create_dir_all(self.resolve(key.trim_end_matches('/'))?)?;
        Ok(())
    }
}
