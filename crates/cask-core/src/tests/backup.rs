use std::time::Duration;

use crate::backup::{self, BackupOptions};
use crate::error::CaskError;
use crate::events::{Event, Events};
use crate::repo::BlobType;
use crate::snapshot::{self, Snapshot};
use crate::vfs::EntryKind;

use super::helpers::{backup_opts, mem_repo, random_bytes, MemImporter};

#[test]
fn identical_files_share_chunks_and_object() {
    let repo = mem_repo();
    let data = random_bytes(30_000, 7);
    let importer = MemImporter::new("/data")
        .file("/data/one.bin", &data)
        .file("/data/two.bin", &data);
    let snap = backup::run(&repo, &importer, &backup_opts(), &Events::none()).unwrap();
    let stats = snap.statistics(&repo).unwrap();

    assert_eq!(stats.files, 2);
    assert_eq!(stats.objects, 2);
    assert_eq!(stats.objects_transferred, 1);
    assert!(stats.chunks > 2);
    assert_eq!(stats.chunks_transferred * 2, stats.chunks);
    assert_eq!(stats.chunks_transfer_size, 30_000);
    assert_eq!(stats.bytes_scanned, 60_000);

    let fs = snap.filesystem(&repo).unwrap();
    let one = fs.get_entry("/data/one.bin").unwrap();
    let two = fs.get_entry("/data/two.bin").unwrap();
    assert_eq!(one.object, two.object);
}

#[test]
fn unreadable_file_is_recorded_not_fatal() {
    let repo = mem_repo();
    let (tx, rx) = crossbeam_channel::unbounded();
    let importer = MemImporter::new("/data")
        .file("/data/ok.txt", b"fine")
        .unreadable("/data/locked");
    let snap = backup::run(&repo, &importer, &backup_opts(), &Events::new(tx)).unwrap();

    let stats = snap.statistics(&repo).unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.errors, 1);
    assert_eq!(snap.summary.directory.errors, 1);

    let events: Vec<Event> = rx.try_iter().collect();
    assert!(matches!(events.first(), Some(Event::BackupStarted { .. })));
    assert!(matches!(events.last(), Some(Event::BackupDone { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::PathError { path, .. } if path == "/data/locked")));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::FileStored { path, size: 4 } if path == "/data/ok.txt")));
}

#[test]
fn scan_error_below_root_is_recorded() {
    let repo = mem_repo();
    let importer = MemImporter::new("/data")
        .file("/data/a", b"a")
        .scan_error("/data/vanished", "no such file");
    let snap = backup::run(&repo, &importer, &backup_opts(), &Events::none()).unwrap();
    let fs = snap.filesystem(&repo).unwrap();
    let errors = fs.errors("/data").unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error, "no such file");
}

#[test]
fn scan_error_at_root_aborts() {
    let repo = mem_repo();
    let importer = MemImporter::new("/data")
        .file("/data/a", b"a")
        .scan_error("/data", "permission denied");
    let err = backup::run(&repo, &importer, &backup_opts(), &Events::none()).unwrap_err();
    assert!(matches!(err, CaskError::Aborted(_)));
    assert!(repo.list_snapshots().is_empty());
}

#[test]
fn summaries_roll_up() {
    let repo = mem_repo();
    let importer = MemImporter::new("/data")
        .file("/data/a.txt", b"hello")
        .dir("/data/sub")
        .file("/data/sub/b.txt", b"world!")
        .file("/data/sub/c.txt", b"")
        .symlink("/data/sub/l", "b.txt")
        .pipe("/data/fifo");
    let snap = backup::run(&repo, &importer, &backup_opts(), &Events::none()).unwrap();
    let stats = snap.statistics(&repo).unwrap();
    assert_eq!(stats.files, 3);
    assert_eq!(stats.directories, 2);
    assert_eq!(stats.symlinks, 1);
    assert_eq!(stats.pipes, 1);
    // "/", "/data", "/data/sub", three files, a symlink and a pipe.
    assert_eq!(stats.entries, 8);

    let top = &snap.summary;
    assert_eq!(top.directory.files, 1);
    assert_eq!(top.directory.directories, 1);
    assert_eq!(top.directory.pipes, 1);
    assert_eq!(top.directory.children, 3);
    assert_eq!(top.directory.size, 5);
    assert_eq!(top.below.files, 2);
    assert_eq!(top.below.symlinks, 1);
    assert_eq!(top.below.size, 6);
    assert_eq!(top.total().files, 3);

    let fs = snap.filesystem(&repo).unwrap();
    let sub = fs.get_entry("/data/sub").unwrap();
    let sub_summary = sub.summary.unwrap();
    assert_eq!(sub_summary.directory.children, 3);
    assert_eq!(sub_summary.directory.max_size, 6);
    assert_eq!(fs.get_entry("/data/fifo").unwrap().kind, EntryKind::Pipe);

    let root = fs.get_entry("/").unwrap();
    assert_eq!(root.summary.unwrap().below.files, 3);
    assert!(repo.blob_exists(BlobType::Entry, &snap.root_entry));
}

#[test]
fn file_cache_skips_unchanged_files() {
    let repo = mem_repo();
    let cache = tempfile::tempdir().unwrap();
    let opts = BackupOptions {
        file_cache: true,
        cache_dir: Some(cache.path().to_path_buf()),
        ..backup_opts()
    };
    let build = |b: &[u8]| {
        MemImporter::new("/data")
            .file("/data/a", &random_bytes(10_000, 1))
            .file("/data/b", b)
    };

    let first = backup::run(&repo, &build(b"original"), &opts, &Events::none()).unwrap();
    assert_eq!(first.statistics(&repo).unwrap().cache_hits, 0);

    let (tx, rx) = crossbeam_channel::unbounded();
    let second = backup::run(&repo, &build(b"original"), &opts, &Events::new(tx)).unwrap();
    let stats = second.statistics(&repo).unwrap();
    assert_eq!(stats.cache_hits, 2);
    assert_eq!(stats.chunks_transferred, 0);
    assert_eq!(stats.bytes_scanned, 0);
    assert_eq!(rx.try_iter().filter(|e| matches!(e, Event::FileCached { .. })).count(), 2);

    let third = backup::run(&repo, &build(b"changed content"), &opts, &Events::none()).unwrap();
    assert_eq!(third.statistics(&repo).unwrap().cache_hits, 1);
    let fs = third.filesystem(&repo).unwrap();
    assert_eq!(fs.stat("/data/b").unwrap().size, 15);
}

#[test]
fn snapshots_resolve_by_latest_and_prefix() {
    let repo = mem_repo();
    let importer = MemImporter::new("/data").file("/data/a", b"a");
    let opts = BackupOptions {
        name: "nightly".into(),
        tags: vec!["t1".into()],
        ..backup_opts()
    };
    let first = backup::run(&repo, &importer, &opts, &Events::none()).unwrap();
    std::thread::sleep(Duration::from_millis(5));
    let second = backup::run(&repo, &importer, &backup_opts(), &Events::none()).unwrap();

    let listed: Vec<_> = snapshot::list(&repo).unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(listed, vec![first.id, second.id]);
    assert_eq!(snapshot::resolve(&repo, "latest").unwrap(), second.id);
    assert_eq!(snapshot::resolve(&repo, &first.id.to_hex()[..12]).unwrap(), first.id);
    assert!(matches!(
        snapshot::resolve(&repo, "zz"),
        Err(CaskError::SnapshotNotFound(_))
    ));

    let loaded = Snapshot::load(&repo, &first.id).unwrap();
    assert_eq!(loaded.name, "nightly");
    assert_eq!(loaded.tags, vec!["t1".to_string()]);
    assert_eq!(loaded.importer.kind, "mem");
    assert_eq!(loaded.importer.directory, "/data");
    assert_eq!(loaded.root, first.root);
}

#[test]
fn backup_is_visible_after_reopen() {
    let (backend, repo) = super::helpers::shared_repo();
    let importer = MemImporter::new("/data").file("/data/a", b"persisted");
    let snap = backup::run(&repo, &importer, &backup_opts(), &Events::none()).unwrap();
    drop(repo);

    let reopened = crate::repo::Repository::open(Box::new(backend)).unwrap();
    assert_eq!(reopened.list_snapshots(), vec![snap.id]);
    let fs = Snapshot::load(&reopened, &snap.id).unwrap().filesystem(&reopened).unwrap();
    assert_eq!(fs.stat("/data/a").unwrap().size, 9);
}
