use cask_core::config::CaskConfig;

use super::{open_repo, resolve_reference, CmdResult};

pub(crate) fn run_rm(cfg: &CaskConfig, references: &[String]) -> CmdResult {
    let repo = open_repo(cfg)?;
    // Resolve everything first so `latest` means the same snapshot throughout.
    let ids = references
        .iter()
        .map(|r| resolve_reference(&repo, r).map(|(id, _)| id))
        .collect::<Result<Vec<_>, _>>()?;
    for id in &ids {
        repo.delete_snapshot(id)?;
        println!("Deleted snapshot {}", id.to_hex());
    }
    repo.commit()?;
    Ok(())
}
