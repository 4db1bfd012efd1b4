use comfy_table::Cell;

use cask_core::config::CaskConfig;
use cask_core::info;

use super::{open_repo, resolve_prefix, resolve_reference, CmdResult};
use crate::format::{format_bytes, format_mode, format_mtime, format_time};
use crate::table::TableStyle;

pub(crate) fn run_state(cfg: &CaskConfig, id: Option<&str>) -> CmdResult {
    let repo = open_repo(cfg)?;
    let ids = info::states(&repo)?;
    let Some(prefix) = id else {
        for id in &ids {
            println!("{}", id.to_hex());
        }
        return Ok(());
    };

    let state = info::state(&repo, &resolve_prefix(&ids, prefix, "state")?)?;
    let style = TableStyle::detect();
    let mut table = style.kv_table();
    style.kv(&mut table, "State", state.id.to_hex());
    style.kv(&mut table, "Version", state.metadata.version);
    style.kv(&mut table, "Created", format_time(&state.metadata.created));
    for (blob_type, count) in &state.blobs {
        style.kv(&mut table, &format!("{blob_type} blobs"), count);
    }
    style.kv(&mut table, "Packfiles", state.packfiles.len());
    println!("{table}");
    for packfile in &state.packfiles {
        println!("packfile {}", packfile.to_hex());
    }
    for snapshot in &state.snapshots {
        println!("snapshot {}", snapshot.to_hex());
    }
    Ok(())
}

pub(crate) fn run_packfile(cfg: &CaskConfig, id: Option<&str>) -> CmdResult {
    let repo = open_repo(cfg)?;
    let ids = info::packfiles(&repo)?;
    let Some(prefix) = id else {
        for id in &ids {
            println!("{}", id.to_hex());
        }
        return Ok(());
    };

    let pack = info::packfile(&repo, &resolve_prefix(&ids, prefix, "packfile")?)?;
    let style = TableStyle::detect();
    let mut header = style.kv_table();
    style.kv(&mut header, "Packfile", pack.id.to_hex());
    style.kv(&mut header, "Version", pack.footer.version);
    style.kv(&mut header, "Size", format_bytes(pack.size));
    style.kv(&mut header, "Blobs", pack.footer.count);
    style.kv(&mut header, "Index offset", pack.footer.index_offset);
    style.kv(&mut header, "Index checksum", pack.footer.index_checksum.to_hex());
    println!("{header}");
    println!();

    let mut table = style.data_table(&["Type", "Checksum", "Offset", "Length"]);
    for entry in &pack.entries {
        table.add_row(vec![
            Cell::new(entry.blob_type),
            Cell::new(entry.checksum.to_hex()),
            Cell::new(entry.offset),
            Cell::new(entry.length),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub(crate) fn run_snapshot(cfg: &CaskConfig, reference: &str) -> CmdResult {
    let repo = open_repo(cfg)?;
    let (id, _) = resolve_reference(&repo, reference)?;
    let snapshot = repo.get_snapshot(&id)?;
    let stats = snapshot.statistics(&repo)?;
    let total = snapshot.summary.total();

    let style = TableStyle::detect();
    let mut table = style.kv_table();
    style.kv(&mut table, "Snapshot", snapshot.id.to_hex());
    style.kv(&mut table, "Date", format_time(&snapshot.timestamp));
    style.kv(&mut table, "Name", &snapshot.name);
    style.kv(&mut table, "Tags", snapshot.tags.join(", "));
    style.kv(&mut table, "Importer", format!("{} ({})", snapshot.importer.kind, snapshot.importer.origin));
    style.kv(&mut table, "Source", &snapshot.importer.directory);
    style.kv(&mut table, "Tree root", snapshot.root.to_hex());
    style.kv(&mut table, "Root entry", snapshot.root_entry.to_hex());
    style.kv(&mut table, "Duration", format!("{} ms", snapshot.duration_ms));
    style.kv(&mut table, "Files", stats.files);
    style.kv(&mut table, "Directories", stats.directories);
    style.kv(&mut table, "Symlinks", stats.symlinks);
    style.kv(&mut table, "Size", format_bytes(total.size));
    style.kv(&mut table, "Chunks", format!("{} ({} new)", stats.chunks, stats.chunks_transferred));
    style.kv(&mut table, "Objects", format!("{} ({} new)", stats.objects, stats.objects_transferred));
    style.kv(&mut table, "Avg entropy", format!("{:.2}", total.avg_entropy));
    style.kv(&mut table, "Errors", stats.errors);
    println!("{table}");

    let errors = snapshot.filesystem(&repo)?.errors("/")?;
    if !errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &errors {
            println!("  {}: {}", e.path, e.error);
        }
    }
    Ok(())
}

pub(crate) fn run_object(cfg: &CaskConfig, id: Option<&str>) -> CmdResult {
    let repo = open_repo(cfg)?;
    let ids = info::objects(&repo);
    let Some(prefix) = id else {
        for id in &ids {
            println!("{}", id.to_hex());
        }
        return Ok(());
    };

    let id = resolve_prefix(&ids, prefix, "object")?;
    let object = info::object(&repo, &id)?;
    let style = TableStyle::detect();
    let mut header = style.kv_table();
    style.kv(&mut header, "Object", id.to_hex());
    style.kv(&mut header, "Content checksum", object.checksum.to_hex());
    style.kv(&mut header, "Content type", &object.content_type);
    style.kv(&mut header, "Size", format_bytes(object.size));
    style.kv(&mut header, "Entropy", format!("{:.2}", object.entropy));
    style.kv(&mut header, "Chunks", object.chunks.len());
    println!("{header}");
    println!();

    let mut table = style.data_table(&["Checksum", "Length", "Entropy"]);
    for chunk in &object.chunks {
        table.add_row(vec![
            Cell::new(chunk.checksum.to_hex()),
            Cell::new(chunk.length),
            Cell::new(format!("{:.2}", chunk.entropy)),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub(crate) fn run_vfs(cfg: &CaskConfig, reference: &str) -> CmdResult {
    let repo = open_repo(cfg)?;
    let (id, path) = resolve_reference(&repo, reference)?;
    let fs = repo.get_snapshot(&id)?.filesystem(&repo)?;
    let entry = fs.get_entry(&path)?;

    let style = TableStyle::detect();
    let mut table = style.kv_table();
    style.kv(&mut table, "Path", &entry.path);
    style.kv(&mut table, "Type", entry.kind.as_str());
    style.kv(&mut table, "Mode", format_mode(entry.kind, &entry.file_info));
    style.kv(&mut table, "Size", format_bytes(entry.size()));
    style.kv(&mut table, "Modified", format_mtime(entry.file_info.mtime_ns));
    style.kv(&mut table, "Owner", format!("{}:{}", entry.file_info.uid, entry.file_info.gid));
    style.kv(&mut table, "Links", entry.file_info.nlink);
    if let Some(target) = &entry.symlink_target {
        style.kv(&mut table, "Target", target);
    }
    if let Some(object_id) = &entry.object {
        let object = fs.get_object(object_id)?;
        style.kv(&mut table, "Object", object_id.to_hex());
        style.kv(&mut table, "Content type", &object.content_type);
        style.kv(&mut table, "Entropy", format!("{:.2}", object.entropy));
        style.kv(&mut table, "Chunks", object.chunks.len());
    }
    if let Some(summary) = &entry.summary {
        let total = summary.total();
        style.kv(&mut table, "Children", summary.directory.children);
        style.kv(&mut table, "Files below", total.files);
        style.kv(&mut table, "Size below", format_bytes(total.size));
    }
    println!("{table}");
    Ok(())
}
