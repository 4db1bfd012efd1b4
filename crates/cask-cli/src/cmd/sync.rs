use cask_core::config::CaskConfig;
use cask_core::repo::Repository;
use cask_core::storage::backend_from_url;
use cask_core::sync::{self, SyncStats};

use super::{open_repo, resolve_reference, CmdResult};
use crate::cli::SyncDirection;
use crate::format::format_bytes;

fn copy(src: &Repository, dst: &Repository, snapshot: Option<&str>) -> Result<SyncStats, Box<dyn std::error::Error>> {
    let stats = match snapshot {
        Some(reference) => {
            let (id, _) = resolve_reference(src, reference)?;
            sync::run(src, dst, &[id])?
        }
        None => sync::run_all(src, dst)?,
    };
    println!(
        "Synced {} snapshots ({} already present): {} blobs, {} copied",
        stats.snapshots,
        stats.snapshots_skipped,
        stats.blobs_copied,
        format_bytes(stats.bytes_copied)
    );
    Ok(stats)
}

pub(crate) fn run_sync(cfg: &CaskConfig, direction: SyncDirection, url: &str, snapshot: Option<&str>) -> CmdResult {
    let local = open_repo(cfg)?;
    let peer = Repository::open(backend_from_url(url)?)?;
    match direction {
        SyncDirection::To => {
            copy(&local, &peer, snapshot)?;
        }
        SyncDirection::From => {
            copy(&peer, &local, snapshot)?;
        }
        SyncDirection::With => {
            copy(&local, &peer, snapshot)?;
            copy(&peer, &local, snapshot)?;
        }
    }
    Ok(())
}
