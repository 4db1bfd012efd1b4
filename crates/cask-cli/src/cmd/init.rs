use cask_core::config::CaskConfig;
use cask_core::repo::{RepoConfig, Repository};
use cask_core::storage::backend_from_url;

use super::CmdResult;

pub(crate) fn run_init(cfg: &CaskConfig) -> CmdResult {
    let storage = backend_from_url(&cfg.repository.url)?;
    let repo = Repository::init(storage, RepoConfig::from_config(cfg))?;
    println!("Repository initialized at: {}", cfg.repository.url);
    println!("Repository id: {}", repo.config.id.to_hex());
    Ok(())
}
