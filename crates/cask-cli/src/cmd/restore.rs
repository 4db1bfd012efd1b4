use cask_core::config::CaskConfig;
use cask_core::registry::ExporterRegistry;
use cask_core::restore::{self, RestoreOptions};

use super::{open_repo, resolve_reference, spawn_reporter, CmdResult};
use crate::format::format_bytes;

pub(crate) fn run_restore(
    cfg: &CaskConfig,
    reference: &str,
    dest: &str,
    rebase: bool,
    skip_permissions: bool,
) -> CmdResult {
    let repo = open_repo(cfg)?;
    let (snapshot_id, path) = resolve_reference(&repo, reference)?;
    let exporter = ExporterRegistry::with_defaults().create(dest)?;

    let opts = RestoreOptions {
        path,
        rebase,
        skip_permissions: skip_permissions || cfg.restore.skip_permissions,
        ..RestoreOptions::from_config(&cfg.restore)
    };

    let (events, reporter) = spawn_reporter();
    let result = restore::run(&repo, &snapshot_id, exporter.as_ref(), &opts, &events);
    drop(events);
    let _ = reporter.join();
    let stats = result?;

    println!(
        "Restored {} files, {} directories, {} symlinks, {} hardlinks ({}) to {}",
        stats.files,
        stats.directories,
        stats.symlinks,
        stats.hardlinks,
        format_bytes(stats.bytes),
        exporter.root()
    );
    if stats.errors > 0 {
        return Err(format!("{} paths failed to restore", stats.errors).into());
    }
    Ok(())
}
