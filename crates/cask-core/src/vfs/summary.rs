use serde::{Deserialize, Serialize};

use super::entry::EntryKind;
use crate::object::mime::{self, MimeFamily};

pub const HIGH_ENTROPY: f64 = 7.0;
pub const LOW_ENTROPY: f64 = 2.0;

const S_ISUID: u32 = 0o4000;
const S_ISGID: u32 = 0o2000;
const S_ISVTX: u32 = 0o1000;

/// What a directory needs to know about one child.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub kind: EntryKind,
    pub size: u64,
    pub objects: u64,
    pub chunks: u64,
    pub mode: u32,
    pub mtime_ns: i64,
    pub content_type: String,
    pub entropy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub devices: u64,
    pub pipes: u64,
    pub sockets: u64,
    pub children: u64,

    pub setuid: u64,
    pub setgid: u64,
    pub sticky: u64,

    pub objects: u64,
    pub chunks: u64,

    pub min_size: u64,
    pub max_size: u64,
    pub avg_size: u64,
    pub size: u64,

    pub min_mtime_ns: i64,
    pub max_mtime_ns: i64,

    pub min_entropy: f64,
    pub max_entropy: f64,
    pub sum_entropy: f64,
    pub avg_entropy: f64,
    pub hi_entropy: u64,
    pub lo_entropy: u64,

    pub mime_text: u64,
    pub mime_image: u64,
    pub mime_audio: u64,
    pub mime_video: u64,
    pub mime_application: u64,
    pub mime_other: u64,

    pub errors: u64,
}

// Zero means "unset" for the minimum fields.
fn min_set<T: PartialOrd + Default + Copy>(current: T, value: T) -> T {
    let unset = T::default();
    if current == unset || (value != unset && value < current) {
        value
    } else {
        current
    }
}

fn max<T: PartialOrd + Copy>(current: T, value: T) -> T {
    if value > current {
        value
    } else {
        current
    }
}

impl SummaryCounts {
    /// Fold in totals from `other`, one level further down.
    fn absorb(&mut self, other: &SummaryCounts) {
        self.files += other.files;
        self.directories += other.directories;
        self.symlinks += other.symlinks;
        self.devices += other.devices;
        self.pipes += other.pipes;
        self.sockets += other.sockets;
        self.children += other.children;
        self.setuid += other.setuid;
        self.setgid += other.setgid;
        self.sticky += other.sticky;
        self.objects += other.objects;
        self.chunks += other.chunks;

        self.min_size = min_set(self.min_size, other.min_size);
        self.max_size = max(self.max_size, other.max_size);
        self.size += other.size;

        self.min_mtime_ns = min_set(self.min_mtime_ns, other.min_mtime_ns);
        self.max_mtime_ns = max(self.max_mtime_ns, other.max_mtime_ns);

        self.min_entropy = min_set(self.min_entropy, other.min_entropy);
        self.max_entropy = max(self.max_entropy, other.max_entropy);
        self.sum_entropy += other.sum_entropy;
        self.hi_entropy += other.hi_entropy;
        self.lo_entropy += other.lo_entropy;

        self.mime_text += other.mime_text;
        self.mime_image += other.mime_image;
        self.mime_audio += other.mime_audio;
        self.mime_video += other.mime_video;
        self.mime_application += other.mime_application;
        self.mime_other += other.mime_other;

        self.errors += other.errors;
    }

    fn update_averages(&mut self) {
        if self.files > 0 {
            self.avg_size = self.size / self.files;
            self.avg_entropy = self.sum_entropy / self.files as f64;
        }
    }
}

/// Aggregates for a directory: its immediate children, and everything
/// further below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub directory: SummaryCounts,
    pub below: SummaryCounts,
}

impl Summary {
    /// Account for one immediate child.
    pub fn update_with_file(&mut self, file: &FileSummary) {
        let d = &mut self.directory;
        match file.kind {
            EntryKind::File => d.files += 1,
            EntryKind::Directory => d.directories += 1,
            EntryKind::Symlink => d.symlinks += 1,
            EntryKind::Device => d.devices += 1,
            EntryKind::Pipe => d.pipes += 1,
            EntryKind::Socket => d.sockets += 1,
        }
        d.children += 1;

        if file.mode & S_ISUID != 0 {
            d.setuid += 1;
        }
        if file.mode & S_ISGID != 0 {
            d.setgid += 1;
        }
        if file.mode & S_ISVTX != 0 {
            d.sticky += 1;
        }

        d.objects += file.objects;
        d.chunks += file.chunks;

        d.min_mtime_ns = min_set(d.min_mtime_ns, file.mtime_ns);
        d.max_mtime_ns = max(d.max_mtime_ns, file.mtime_ns);

        if file.kind != EntryKind::File {
            return;
        }

        d.min_size = min_set(d.min_size, file.size);
        d.max_size = max(d.max_size, file.size);
        d.size += file.size;

        d.min_entropy = min_set(d.min_entropy, file.entropy);
        d.max_entropy = max(d.max_entropy, file.entropy);
        d.sum_entropy += file.entropy;
        if file.entropy >= HIGH_ENTROPY {
            d.hi_entropy += 1;
        } else if file.entropy <= LOW_ENTROPY {
            d.lo_entropy += 1;
        }

        if !file.content_type.is_empty() {
            match mime::family(&file.content_type) {
                MimeFamily::Text => d.mime_text += 1,
                MimeFamily::Image => d.mime_image += 1,
                MimeFamily::Audio => d.mime_audio += 1,
                MimeFamily::Video => d.mime_video += 1,
                MimeFamily::Application => d.mime_application += 1,
                MimeFamily::Other => d.mime_other += 1,
            }
        }
    }

    /// Fold a subdirectory's summary into `below`.
    pub fn update_below(&mut self, child: &Summary) {
        self.below.absorb(&child.directory);
        self.below.absorb(&child.below);
    }

    pub fn update_averages(&mut self) {
        self.directory.update_averages();
        self.below.update_averages();
    }

    /// Totals across the directory and everything below it.
    pub fn total(&self) -> SummaryCounts {
        let mut total = self.directory.clone();
        total.absorb(&self.below);
        total.update_averages();
        total
    }
}
