//! Repository integrity checks.

use std::collections::HashSet;

use cask_types::Checksum;
use tracing::{debug, info};

use crate::error::Result;
use crate::object::Object;
use crate::repo::packfile::verify_packfile;
use crate::repo::{BlobType, Repository};
use crate::snapshot::Snapshot;
use crate::vfs::Entry;

/// A single integrity issue found during check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckError {
    pub context: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub snapshots_checked: usize,
    pub entries_checked: usize,
    pub objects_checked: usize,
    pub chunks_checked: usize,
    pub chunks_verified: usize,
    pub packfiles_verified: usize,
    pub errors: Vec<CheckError>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, context: impl Into<String>, message: impl ToString) {
        self.errors.push(CheckError {
            context: context.into(),
            message: message.to_string(),
        });
    }
}

/// Blobs already checked, shared across snapshots.
#[derive(Default)]
struct Seen {
    objects: HashSet<Checksum>,
    chunks: HashSet<Checksum>,
    packfiles: HashSet<Checksum>,
}

/// Check one snapshot. `fast` skips reading chunk data and packfiles.
pub fn run(repo: &Repository, snapshot_id: &Checksum, fast: bool) -> Result<CheckReport> {
    let mut report = CheckReport::default();
    let mut seen = Seen::default();
    check_snapshot(repo, snapshot_id, fast, &mut report, &mut seen)?;
    verify_packfiles(repo, fast, &mut report, &seen);
    Ok(report)
}

/// Check every live snapshot.
pub fn run_all(repo: &Repository, fast: bool) -> Result<CheckReport> {
    let mut report = CheckReport::default();
    let mut seen = Seen::default();
    for id in repo.list_snapshots() {
        check_snapshot(repo, &id, fast, &mut report, &mut seen)?;
    }
    verify_packfiles(repo, fast, &mut report, &seen);
    info!(
        snapshots = report.snapshots_checked,
        errors = report.errors.len(),
        "check finished"
    );
    Ok(report)
}

fn check_snapshot(
    repo: &Repository,
    id: &Checksum,
    fast: bool,
    report: &mut CheckReport,
    seen: &mut Seen,
) -> Result<()> {
    let snapshot = Snapshot::load(repo, id)?;
    let context = format!("snapshot {id}");
    debug!(snapshot = %id, fast, "checking snapshot");
    report.snapshots_checked += 1;

    if !repo.blob_exists(BlobType::Data, &snapshot.statistics) {
        report.error(&context, "statistics blob missing");
    }
    let fs = match snapshot.filesystem(repo) {
        Ok(fs) => fs,
        Err(e) => {
            report.error(&context, format!("cannot open tree: {e}"));
            return Ok(());
        }
    };
    if let Err(e) = fs.tree().verify() {
        report.error(&context, format!("vfs tree: {e}"));
    }
    if let Err(e) = fs.error_tree().verify() {
        report.error(&context, format!("error tree: {e}"));
    }

    let entries = match fs.entries() {
        Ok(entries) => entries,
        Err(e) => {
            report.error(&context, format!("cannot scan tree: {e}"));
            return Ok(());
        }
    };
    for (path, checksum) in entries {
        report.entries_checked += 1;
        let entry = match repo.get_blob(BlobType::Entry, &checksum).and_then(|b| Entry::deserialize(&b)) {
            Ok(entry) => entry,
            Err(e) => {
                report.error(&path, e);
                continue;
            }
        };
        if entry.path != path {
            report.error(&path, format!("entry records path '{}'", entry.path));
        }
        if let Some(object) = entry.object {
            check_object(repo, &path, &object, fast, report, seen);
        }
    }
    Ok(())
}

fn check_object(repo: &Repository, path: &str, id: &Checksum, fast: bool, report: &mut CheckReport, seen: &mut Seen) {
    if !seen.objects.insert(*id) {
        return;
    }
    report.objects_checked += 1;
    let object = match repo.get_blob(BlobType::Object, id).and_then(|b| Object::deserialize(&b)) {
        Ok(object) => object,
        Err(e) => {
            report.error(path, e);
            return;
        }
    };
    for chunk in &object.chunks {
        if !seen.chunks.insert(chunk.checksum) {
            continue;
        }
        report.chunks_checked += 1;
        if !repo.blob_exists(BlobType::Chunk, &chunk.checksum) {
            report.error(path, format!("chunk {} missing", chunk.checksum.to_hex()));
            continue;
        }
        if let Some(loc) = repo.blob_location(BlobType::Chunk, &chunk.checksum) {
            seen.packfiles.insert(loc.packfile);
        }
        if fast {
            continue;
        }
        match repo.get_blob(BlobType::Chunk, &chunk.checksum) {
            Ok(data) if data.len() == chunk.length as usize => report.chunks_verified += 1,
            Ok(data) => report.error(
                path,
                format!(
                    "chunk {} is {} bytes, object expects {}",
                    chunk.checksum.to_hex(),
                    data.len(),
                    chunk.length
                ),
            ),
            Err(e) => report.error(path, e),
        }
    }
}

fn verify_packfiles(repo: &Repository, fast: bool, report: &mut CheckReport, seen: &Seen) {
    if fast {
        return;
    }
    let mut ids: Vec<&Checksum> = seen.packfiles.iter().collect();
    ids.sort();
    for id in ids {
        match verify_packfile(repo.storage(), id) {
            Ok(_) => report.packfiles_verified += 1,
            Err(e) => report.error(format!("packfile {}", id.to_hex()), e),
        }
    }
}
