use std::io::Read;

use crate::backup;
use crate::check;
use crate::events::Events;
use crate::info;
use crate::repo::{BlobType, Repository};
use crate::sync;
use crate::vfs::Handle;

use super::helpers::{backup_opts, mem_repo, random_bytes, shared_repo, MemImporter};

fn importer() -> MemImporter {
    MemImporter::new("/data")
        .file("/data/big", &random_bytes(30_000, 21))
        .file("/data/small", b"tiny")
        .dir("/data/sub")
        .file("/data/sub/copy", b"tiny")
        .symlink("/data/link", "small")
        .scan_error("/data/gone", "vanished")
}

fn read(fs: &crate::vfs::Filesystem<'_>, path: &str) -> Vec<u8> {
    let Handle::File(mut reader) = fs.open(path).unwrap() else {
        panic!("{path} should be a file");
    };
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    out
}

#[test]
fn synced_snapshot_is_complete_in_target() {
    let src = mem_repo();
    let snap = backup::run(&src, &importer(), &backup_opts(), &Events::none()).unwrap();
    let (backend, dst) = shared_repo();

    let stats = sync::run(&src, &dst, &[snap.id]).unwrap();
    assert_eq!(stats.snapshots, 1);
    assert!(stats.blobs_copied > 0);

    let reopened = Repository::open(Box::new(backend)).unwrap();
    assert_eq!(reopened.list_snapshots(), vec![snap.id]);
    let report = check::run(&reopened, &snap.id, false).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);

    let copied = reopened.get_snapshot(&snap.id).unwrap();
    let fs = copied.filesystem(&reopened).unwrap();
    assert_eq!(read(&fs, "/data/big"), random_bytes(30_000, 21));
    assert_eq!(fs.get_entry("/data/link").unwrap().symlink_target.as_deref(), Some("small"));
    assert_eq!(fs.errors("/data").unwrap().len(), 1);
    assert_eq!(copied.statistics(&reopened).unwrap().files, 3);
}

#[test]
fn second_sync_copies_nothing() {
    let src = mem_repo();
    let snap = backup::run(&src, &importer(), &backup_opts(), &Events::none()).unwrap();
    let dst = mem_repo();

    sync::run(&src, &dst, &[snap.id]).unwrap();
    let again = sync::run(&src, &dst, &[snap.id]).unwrap();
    assert_eq!(again.snapshots, 0);
    assert_eq!(again.snapshots_skipped, 1);
    assert_eq!(again.blobs_copied, 0);
}

#[test]
fn shared_content_is_not_copied_twice() {
    let src = mem_repo();
    let first = backup::run(&src, &importer(), &backup_opts(), &Events::none()).unwrap();
    let second = backup::run(
        &src,
        &importer().file("/data/extra", b"new"),
        &backup_opts(),
        &Events::none(),
    )
    .unwrap();
    let dst = mem_repo();

    let one = sync::run(&src, &dst, &[first.id]).unwrap();
    let chunks_after_first = dst.state().blob_count(BlobType::Chunk);
    let two = sync::run(&src, &dst, &[second.id]).unwrap();
    assert!(two.bytes_copied < one.bytes_copied);
    assert_eq!(dst.state().blob_count(BlobType::Chunk), chunks_after_first + 1);
    assert_eq!(dst.list_snapshots().len(), 2);
}

#[test]
fn run_all_skips_deleted_snapshots() {
    let src = mem_repo();
    let kept = backup::run(&src, &importer(), &backup_opts(), &Events::none()).unwrap();
    let dropped = backup::run(&src, &importer(), &backup_opts(), &Events::none()).unwrap();
    src.delete_snapshot(&dropped.id).unwrap();
    src.commit().unwrap();

    let dst = mem_repo();
    let stats = sync::run_all(&src, &dst).unwrap();
    assert_eq!(stats.snapshots, 1);
    assert_eq!(dst.list_snapshots(), vec![kept.id]);
}

#[test]
fn object_info_lists_chunks() {
    let repo = mem_repo();
    let snap = backup::run(&repo, &importer(), &backup_opts(), &Events::none()).unwrap();
    let entry = snap.filesystem(&repo).unwrap().get_entry("/data/big").unwrap();
    let id = entry.object.unwrap();

    assert!(info::objects(&repo).contains(&id));
    let object = info::object(&repo, &id).unwrap();
    assert_eq!(object.size, 30_000);
    assert!(object.chunks.len() > 1);
    assert_eq!(object.chunks.iter().map(|c| c.length as u64).sum::<u64>(), 30_000);
}
