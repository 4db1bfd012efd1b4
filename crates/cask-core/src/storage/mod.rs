pub mod local_backend;

use crate::error::{CaskError, Result};

use self::local_backend::LocalBackend;

/// Key/value blob storage underneath a repository.
///
/// Keys are `/`-separated relative paths such as `packfiles/ab/ab12…`.
pub trait StorageBackend: Send + Sync {
    /// Read a whole object. `Ok(None)` when the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Read `length` bytes starting at `offset`.
    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>>;

    /// Size in bytes of an object, if present.
    fn size(&self, key: &str) -> Result<Option<u64>>;

    fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool>;

    /// All keys under `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    fn create_dir(&self, key: &str) -> Result<()>;
}

/// Build a backend for a repository location: a bare path or a `file://` URL.
pub fn backend_from_url(url: &str) -> Result<Box<dyn StorageBackend>> {
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(Box::new(LocalBackend::new(path)?));
    }
    match url.split_once("://") {
        Some((scheme, _)) => Err(CaskError::UnsupportedScheme(scheme.to_string())),
        None => Ok(Box::new(LocalBackend::new(url)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_from_url_accepts_paths_and_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        assert!(backend_from_url(path).is_ok());
        assert!(backend_from_url(&format!("file://{path}")).is_ok());
    }

    #[test]
    fn backend_from_url_rejects_remote_schemes() {
        assert!(matches!(
            backend_from_url("s3://bucket/prefix"),
            Err(CaskError::UnsupportedScheme(s)) if s == "s3"
        ));
    }
}
