use std::ffi::{OsStr, OsString};
use std::fs::{FileType, Metadata};
use std::path::{Path, PathBuf};

use crate::vfs::{EntryKind, FileInfo};

pub fn entry_kind(file_type: &FileType) -> EntryKind {
    if file_type.is_dir() {
        return EntryKind::Directory;
    }
    if file_type.is_symlink() {
        return EntryKind::Symlink;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_block_device() || file_type.is_char_device() {
            return EntryKind::Device;
        }
        if file_type.is_fifo() {
            return EntryKind::Pipe;
        }
        if file_type.is_socket() {
            return EntryKind::Socket;
        }
    }
    EntryKind::File
}

pub fn file_info(name: &str, metadata: &Metadata) -> FileInfo {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;

        FileInfo {
            name: name.to_string(),
            size: metadata.len(),
            mode: metadata.mode() & 0o7777,
            mtime_ns: metadata.mtime() * 1_000_000_000 + metadata.mtime_nsec(),
            dev: metadata.dev(),
            ino: metadata.ino(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            nlink: metadata.nlink(),
            username: None,
            groupname: None,
        }
    }

    #[cfg(not(unix))]
    {
        let readonly = metadata.permissions().readonly();
        let mode = match (metadata.is_dir(), readonly) {
            (true, true) => 0o555,
            (true, false) => 0o755,
            (false, true) => 0o444,
            (false, false) => 0o644,
        };
        let mtime_ns = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos().min(i64::MAX as u128) as i64)
            .unwrap_or(0);
        FileInfo {
            name: name.to_string(),
            size: metadata.len(),
            mode,
            mtime_ns,
            nlink: 1,
            ..Default::default()
        }
    }
}

pub fn apply_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    #[cfg(not(unix))]
    {
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_readonly((mode & 0o200) == 0);
        std::fs::set_permissions(path, perms)
    }
}

pub fn create_symlink(link_target: &Path, target: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(link_target, target)
    }

    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(link_target, target)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (link_target, target);
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "symlink creation is not supported on this platform",
        ))
    }
}

fn push_escaped(out: &mut String, valid: &str) {
    for ch in valid.chars() {
        if ch == '\\' {
            out.push_str("\\\\");
        } else {
            out.push(ch);
        }
    }
}

/// Native name or path as a snapshot string. Bytes that are not UTF-8
/// become `\xHH` and a literal backslash becomes `\\`, so
/// [`decode_os_str`] gives back the exact original.
#[cfg(unix)]
pub fn encode_os_str(name: &OsStr) -> String {
    use std::os::unix::ffi::OsStrExt;

    let mut rest = name.as_bytes();
    let mut out = String::with_capacity(rest.len());
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                push_escaped(&mut out, valid);
                return out;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                push_escaped(&mut out, &String::from_utf8_lossy(valid));
                let bad = e.error_len().unwrap_or(after.len());
                for byte in &after[..bad] {
                    out.push_str(&format!("\\x{byte:02x}"));
                }
                rest = &after[bad..];
            }
        }
    }
}

#[cfg(not(unix))]
pub fn encode_os_str(name: &OsStr) -> String {
    let mut out = String::new();
    push_escaped(&mut out, &name.to_string_lossy());
    out
}

fn unescape(name: &str) -> Vec<u8> {
    let raw = name.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' {
            match raw.get(i + 1) {
                Some(b'\\') => {
                    out.push(b'\\');
                    i += 2;
                    continue;
                }
                Some(b'x') => {
                    let byte = raw
                        .get(i + 2..i + 4)
                        .and_then(|h| std::str::from_utf8(h).ok())
                        .and_then(|h| u8::from_str_radix(h, 16).ok());
                    if let Some(byte) = byte {
                        out.push(byte);
                        i += 4;
                        continue;
                    }
                }
                _ => {}
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}

/// Inverse of [`encode_os_str`].
pub fn decode_os_str(name: &str) -> OsString {
    if !name.contains('\\') {
        return OsString::from(name);
    }
    let bytes = unescape(name);
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        OsString::from_vec(bytes)
    }
    #[cfg(not(unix))]
    {
        OsString::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Native path for a snapshot path string.
pub fn native_path(path: &str) -> PathBuf {
    PathBuf::from(decode_os_str(path))
}

/// Set the modification time of a file or directory, following symlinks.
pub fn set_file_mtime(path: &Path, mtime_ns: i64) -> std::io::Result<()> {
    use std::time::{Duration, SystemTime};

    let time = if mtime_ns >= 0 {
        SystemTime::UNIX_EPOCH + Duration::from_nanos(mtime_ns as u64)
    } else {
        SystemTime::UNIX_EPOCH - Duration::from_nanos(mtime_ns.unsigned_abs())
    };
    let file = std::fs::File::open(path)?;
    file.set_modified(time)
}
