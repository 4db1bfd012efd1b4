use comfy_table::Cell;

use cask_core::config::CaskConfig;
use cask_core::snapshot;

use super::{open_repo, resolve_reference, CmdResult};
use crate::format::{format_bytes, format_mode, format_mtime, format_time, short_id};
use crate::table::TableStyle;

pub(crate) fn run_ls(cfg: &CaskConfig, reference: Option<&str>) -> CmdResult {
    let repo = open_repo(cfg)?;
    let style = TableStyle::detect();

    let Some(reference) = reference else {
        let snapshots = snapshot::list(&repo)?;
        if snapshots.is_empty() {
            println!("No snapshots found.");
            return Ok(());
        }
        let mut table = style.data_table(&["ID", "Date", "Source", "Name", "Files", "Size"]);
        for s in &snapshots {
            let total = s.summary.total();
            table.add_row(vec![
                Cell::new(short_id(&s.id)),
                Cell::new(format_time(&s.timestamp)),
                Cell::new(&s.importer.directory),
                Cell::new(if s.name.is_empty() { "-" } else { s.name.as_str() }),
                Cell::new(total.files),
                Cell::new(format_bytes(total.size)),
            ]);
        }
        println!("{table}");
        return Ok(());
    };

    let (id, path) = resolve_reference(&repo, reference)?;
    let fs = repo.get_snapshot(&id)?.filesystem(&repo)?;
    let entry = fs.get_entry(&path)?;
    let entries = if entry.is_dir() { fs.read_dir(&entry.path)? } else { vec![entry] };

    let mut table = style.data_table(&["Mode", "Size", "Modified", "Name"]);
    for e in &entries {
        let name = match &e.symlink_target {
            Some(target) => format!("{} -> {target}", e.name),
            None => e.name.clone(),
        };
        table.add_row(vec![
            Cell::new(format_mode(e.kind, &e.file_info)),
            Cell::new(format_bytes(e.size())),
            Cell::new(format_mtime(e.file_info.mtime_ns)),
            Cell::new(name),
        ]);
    }
    println!("{table}");
    Ok(())
}
