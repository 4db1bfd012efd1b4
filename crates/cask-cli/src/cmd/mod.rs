pub(crate) mod backup;
pub(crate) mod check;
pub(crate) mod config;
pub(crate) mod info;
pub(crate) mod init;
pub(crate) mod ls;
pub(crate) mod restore;
pub(crate) mod rm;
pub(crate) mod sync;

use std::thread::JoinHandle;

use cask_core::config::CaskConfig;
use cask_core::error::CaskError;
use cask_core::events::{Event, Events};
use cask_core::repo::Repository;
use cask_core::snapshot;
use cask_core::storage::backend_from_url;
use cask_types::Checksum;

use crate::cli::{Commands, InfoCommand};

pub(crate) type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub(crate) fn dispatch(command: &Commands, cfg: &CaskConfig) -> CmdResult {
    match command {
        // Handled before a config is loaded.
        Commands::Config { .. } => Ok(()),
        Commands::Init => init::run_init(cfg),
        Commands::Backup {
            path,
            name,
            tags,
            no_cache,
        } => backup::run_backup(cfg, path, name.as_deref(), tags, *no_cache),
        Commands::Restore {
            snapshot,
            dest,
            rebase,
            skip_permissions,
        } => restore::run_restore(cfg, snapshot, dest, *rebase, *skip_permissions),
        Commands::Check { snapshot, fast } => check::run_check(cfg, snapshot.as_deref(), *fast),
        Commands::Ls { snapshot } => ls::run_ls(cfg, snapshot.as_deref()),
        Commands::Sync {
            direction,
            url,
            snapshot,
        } => sync::run_sync(cfg, *direction, url, snapshot.as_deref()),
        Commands::Rm { snapshots } => rm::run_rm(cfg, snapshots),
        Commands::Info { command } => match command {
            InfoCommand::State { id } => info::run_state(cfg, id.as_deref()),
            InfoCommand::Packfile { id } => info::run_packfile(cfg, id.as_deref()),
            InfoCommand::Snapshot { snapshot } => info::run_snapshot(cfg, snapshot),
            InfoCommand::Object { id } => info::run_object(cfg, id.as_deref()),
            InfoCommand::Vfs { reference } => info::run_vfs(cfg, reference),
        },
    }
}

pub(crate) fn open_repo(cfg: &CaskConfig) -> Result<Repository, CaskError> {
    Repository::open(backend_from_url(&cfg.repository.url)?)
}

/// Resolve `snapshot[:path]` to a snapshot id and a path inside it.
pub(crate) fn resolve_reference(repo: &Repository, reference: &str) -> Result<(Checksum, String), CaskError> {
    let (id, path) = snapshot::split_reference(reference);
    Ok((snapshot::resolve(repo, id)?, path.to_string()))
}

/// Unique id in `ids` starting with `prefix`.
pub(crate) fn resolve_prefix(ids: &[Checksum], prefix: &str, what: &str) -> Result<Checksum, Box<dyn std::error::Error>> {
    let prefix = prefix.to_ascii_lowercase();
    let matches: Vec<&Checksum> = ids.iter().filter(|id| id.to_hex().starts_with(&prefix)).collect();
    match matches.as_slice() {
        [id] => Ok(**id),
        [] => Err(format!("no {what} matching '{prefix}'").into()),
        _ => Err(format!("{what} prefix '{prefix}' is ambiguous ({} matches)", matches.len()).into()),
    }
}

/// Print per-path problems to stderr as the pipeline reports them.
pub(crate) fn spawn_reporter() -> (Events, JoinHandle<()>) {
    let (tx, rx) = crossbeam_channel::bounded(256);
    let handle = std::thread::spawn(move || {
        for event in rx {
            match event {
                Event::PathError { path, error } => eprintln!("warning: {path}: {error}"),
                Event::DirectoryCorrupted { path } => eprintln!("warning: {path}: not fully restored"),
                Event::Skipped { path, reason } => eprintln!("skipped: {path}: {reason}"),
                _ => {}
            }
        }
    });
    (Events::new(tx), handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_resolution() {
        let a = Checksum([0xab; 32]);
        let b = Checksum([0xac; 32]);
        let ids = [a, b];
        assert_eq!(resolve_prefix(&ids, "ABAB", "state").unwrap(), a);
        assert!(resolve_prefix(&ids, "a", "state").is_err());
        assert!(resolve_prefix(&ids, "ff", "state").is_err());
    }
}
