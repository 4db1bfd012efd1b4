use cask_core::backup::{self, BackupOptions};
use cask_core::config::CaskConfig;
use cask_core::registry::ImporterRegistry;

use super::{open_repo, spawn_reporter, CmdResult};
use crate::format::{format_bytes, short_id};
use crate::table::TableStyle;

pub(crate) fn run_backup(
    cfg: &CaskConfig,
    path: &str,
    name: Option<&str>,
    tags: &[String],
    no_cache: bool,
) -> CmdResult {
    let repo = open_repo(cfg)?;
    let importer = ImporterRegistry::with_defaults().create(path)?;

    let mut opts = BackupOptions::from_config(cfg);
    if let Some(name) = name {
        opts.name = name.to_string();
    }
    opts.tags.extend(tags.iter().cloned());
    if no_cache {
        opts.file_cache = false;
    }

    let (events, reporter) = spawn_reporter();
    let result = backup::run(&repo, importer.as_ref(), &opts, &events);
    drop(events);
    let _ = reporter.join();
    let snapshot = result?;
    let stats = snapshot.statistics(&repo)?;

    let style = TableStyle::detect();
    let mut table = style.kv_table();
    style.kv(&mut table, "Snapshot", short_id(&snapshot.id));
    style.kv(&mut table, "Source", &snapshot.importer.directory);
    style.kv(&mut table, "Files", stats.files);
    style.kv(&mut table, "Directories", stats.directories);
    style.kv(&mut table, "Size", format_bytes(snapshot.summary.total().size));
    style.kv(&mut table, "Read", format_bytes(stats.bytes_scanned));
    style.kv(&mut table, "Added", format_bytes(stats.chunks_transfer_size));
    style.kv(&mut table, "Cache hits", stats.cache_hits);
    style.kv(&mut table, "Errors", stats.errors);
    style.kv(&mut table, "Duration", format!("{:.1}s", snapshot.duration_ms as f64 / 1000.0));
    println!("{table}");

    if stats.errors > 0 {
        eprintln!(
            "{} paths could not be backed up; see `cask info snapshot {}`",
            stats.errors,
            short_id(&snapshot.id)
        );
    }
    Ok(())
}
