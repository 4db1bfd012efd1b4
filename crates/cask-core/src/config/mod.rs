mod defaults;
mod types;

use std::path::Path;

use tracing::debug;

use crate::error::{CaskError, Result};

pub use self::defaults::default_max_concurrency;
pub use self::types::*;

/// Load and validate a YAML configuration file.
pub fn load_config(path: &Path) -> Result<CaskConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        CaskError::Config(format!("cannot read config '{}': {e}", path.display()))
    })?;
    let config = parse_config(&raw)?;
    debug!(path = %path.display(), url = %config.repository.url, "loaded config");
    Ok(config)
}

/// Parse configuration from a YAML document.
pub fn parse_config(raw: &str) -> Result<CaskConfig> {
    let config: CaskConfig = serde_yaml::from_str(raw)?;
    config.chunker.validate()?;
    if config.repository.packfile_max_size == 0 {
        return Err(CaskError::Config(
            "repository.packfile_max_size must be non-zero".into(),
        ));
    }
    if config.repository.btree_order < 3 {
        return Err(CaskError::Config(format!(
            "repository.btree_order must be at least 3 (got {})",
            config.repository.btree_order
        )));
    }
    Ok(config)
}

/// Starter configuration written by `cask init`.
pub fn minimal_config_template(url: &str) -> String {
    format!(
        "repository:\n  url: \"{url}\"\n\nchunker:\n  min_size: 65536\n  normal_size: 1048576\n  max_size: 4194304\n\ncompression:\n  algorithm: lz4\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_applies_defaults() {
        let cfg = parse_config("repository:\n  url: /tmp/repo\n").unwrap();
        assert_eq!(cfg.repository.url, "/tmp/repo");
        assert_eq!(cfg.repository.packfile_max_size, 20 * 1024 * 1024);
        assert_eq!(cfg.repository.btree_order, 50);
        assert_eq!(cfg.chunker.min_size, 64 * 1024);
        assert_eq!(cfg.chunker.normal_size, 1024 * 1024);
        assert_eq!(cfg.chunker.max_size, 4 * 1024 * 1024);
        assert_eq!(cfg.compression.algorithm, CompressionAlgorithm::Lz4);
        assert!(cfg.backup.file_cache);
        assert!(cfg.backup.max_concurrency() >= 1);
        assert!(cfg.cache_dir.is_none());
    }

    #[test]
    fn template_parses() {
        let cfg = parse_config(&minimal_config_template("/srv/backups")).unwrap();
        assert_eq!(cfg.repository.url, "/srv/backups");
    }

    #[test]
    fn rejects_inverted_chunker_sizes() {
        let raw = "repository:\n  url: r\nchunker:\n  min_size: 4096\n  normal_size: 2048\n  max_size: 8192\n";
        assert!(matches!(parse_config(raw), Err(CaskError::Config(_))));
    }

    #[test]
    fn rejects_tiny_btree_order() {
        let raw = "repository:\n  url: r\n  btree_order: 2\n";
        assert!(matches!(parse_config(raw), Err(CaskError::Config(_))));
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(matches!(
            parse_config("repository: [unterminated"),
            Err(CaskError::ConfigParse(_))
        ));
    }

    #[test]
    fn load_config_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(err.to_string().contains("cannot read config"));
    }
}
