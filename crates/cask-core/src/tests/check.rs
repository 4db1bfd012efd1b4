use crate::backup;
use crate::check;
use crate::events::Events;
use crate::repo::packfile::packfile_key;
use crate::repo::BlobType;

use super::helpers::{backup_opts, mem_repo, random_bytes, shared_repo, MemImporter};

fn importer() -> MemImporter {
    MemImporter::new("/data")
        .file("/data/a", &random_bytes(40_000, 11))
        .file("/data/b", b"small")
        .dir("/data/sub")
        .file("/data/sub/c", &random_bytes(9_000, 12))
}

#[test]
fn clean_repository_passes() {
    let repo = mem_repo();
    let snap = backup::run(&repo, &importer(), &backup_opts(), &Events::none()).unwrap();

    let full = check::run(&repo, &snap.id, false).unwrap();
    assert!(full.is_ok(), "{:?}", full.errors);
    assert_eq!(full.snapshots_checked, 1);
    assert_eq!(full.objects_checked, 3);
    assert_eq!(full.chunks_verified, full.chunks_checked);
    assert!(full.packfiles_verified >= 1);
    // "/", "/data", "/data/sub" and three files.
    assert_eq!(full.entries_checked, 6);

    let fast = check::run(&repo, &snap.id, true).unwrap();
    assert!(fast.is_ok());
    assert_eq!(fast.chunks_verified, 0);
    assert_eq!(fast.packfiles_verified, 0);
}

#[test]
fn run_all_shares_work_across_snapshots() {
    let repo = mem_repo();
    backup::run(&repo, &importer(), &backup_opts(), &Events::none()).unwrap();
    backup::run(&repo, &importer(), &backup_opts(), &Events::none()).unwrap();

    let report = check::run_all(&repo, false).unwrap();
    assert!(report.is_ok());
    assert_eq!(report.snapshots_checked, 2);
    assert_eq!(report.objects_checked, 3);
    assert_eq!(report.entries_checked, 12);
}

#[test]
fn corrupted_chunk_is_reported() {
    let (backend, repo) = shared_repo();
    let snap = backup::run(&repo, &importer(), &backup_opts(), &Events::none()).unwrap();

    let fs = snap.filesystem(&repo).unwrap();
    let object = fs.get_object(&fs.get_entry("/data/a").unwrap().object.unwrap()).unwrap();
    let chunk = &object.chunks[0];
    let loc = repo.blob_location(BlobType::Chunk, &chunk.checksum).unwrap();
    backend.tamper(&packfile_key(&loc.packfile), |bytes| {
        let at = loc.offset as usize + loc.length as usize / 2;
        bytes[at] ^= 0xff;
    });

    assert!(check::run(&repo, &snap.id, true).unwrap().is_ok());
    let report = check::run(&repo, &snap.id, false).unwrap();
    assert!(!report.is_ok());
    assert!(report.errors.iter().any(|e| e.context == "/data/a"));
}

#[test]
fn missing_snapshot_fails() {
    let repo = mem_repo();
    assert!(check::run(&repo, &cask_types::Checksum([1; 32]), true).is_err());
}
