use cask_core::vfs::{EntryKind, FileInfo};
use cask_types::Checksum;
use chrono::{DateTime, Utc};

pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

pub(crate) fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) fn format_mtime(mtime_ns: i64) -> String {
    format_time(&DateTime::from_timestamp_nanos(mtime_ns))
}

/// First 16 hex digits, enough to address a snapshot on the command line.
pub(crate) fn short_id(id: &Checksum) -> String {
    id.to_hex()[..16].to_string()
}

/// `ls -l` style type and permission string.
pub(crate) fn format_mode(kind: EntryKind, info: &FileInfo) -> String {
    let type_char = match kind {
        EntryKind::File => '-',
        EntryKind::Directory => 'd',
        EntryKind::Symlink => 'l',
        EntryKind::Device => 'c',
        EntryKind::Pipe => 'p',
        EntryKind::Socket => 's',
    };
    let mut out = String::with_capacity(10);
    out.push(type_char);
    for shift in [6u32, 3, 0] {
        let bits = (info.mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}
