use std::collections::HashMap;

use cask_types::Checksum;
use tracing::debug;

use crate::error::{CaskError, Result};
use crate::storage::StorageBackend;

use super::blob::BlobType;

/// Packfile format version written into every footer.
pub const PACKFILE_VERSION: u32 = 100;
/// `[type u8][checksum 32][length u32]` ahead of every payload.
pub const RECORD_HEADER_SIZE: usize = 1 + 32 + 4;
/// `[type u8][checksum 32][offset u32][length u32]`.
pub const INDEX_ENTRY_SIZE: usize = 1 + 32 + 4 + 4;
/// `[version u32][timestamp i64][count u32][index_offset u32][index_checksum 32]`.
pub const FOOTER_SIZE: usize = 4 + 8 + 4 + 4 + 32;

/// Storage key of a packfile.
pub fn packfile_key(id: &Checksum) -> String {
    format!("packfiles/{}/{}", id.shard_prefix(), id.to_hex())
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

fn checksum_at(buf: &[u8], at: usize) -> Checksum {
    let mut b = [0u8; 32];
    b.copy_from_slice(&buf[at..at + 32]);
    Checksum(b)
}

/// Where one blob's payload sits inside its packfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub blob_type: BlobType,
    pub checksum: Checksum,
    /// Offset of the payload, past the record header.
    pub offset: u32,
    pub length: u32,
}

impl IndexEntry {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.blob_type.as_u8());
        out.extend_from_slice(&self.checksum.0);
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.length.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != INDEX_ENTRY_SIZE {
            return Err(CaskError::InvalidFormat(format!(
                "index entry is {} bytes, expected {INDEX_ENTRY_SIZE}",
                buf.len()
            )));
        }
        Ok(Self {
            blob_type: BlobType::from_u8(buf[0])?,
            checksum: checksum_at(buf, 1),
            offset: le_u32(buf, 33),
            length: le_u32(buf, 37),
        })
    }
}

/// Fixed-size trailer at the end of every packfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub version: u32,
    /// Seal time in nanoseconds since the Unix epoch.
    pub timestamp: i64,
    pub count: u32,
    pub index_offset: u32,
    pub index_checksum: Checksum,
}

impl Footer {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.index_offset.to_le_bytes());
        out.extend_from_slice(&self.index_checksum.0);
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != FOOTER_SIZE {
            return Err(CaskError::InvalidFormat(format!(
                "footer is {} bytes, expected {FOOTER_SIZE}",
                buf.len()
            )));
        }
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&buf[4..12]);
        let footer = Self {
            version: le_u32(buf, 0),
            timestamp: i64::from_le_bytes(ts),
            count: le_u32(buf, 12),
            index_offset: le_u32(buf, 16),
            index_checksum: checksum_at(buf, 20),
        };
        if footer.version != PACKFILE_VERSION {
            return Err(CaskError::InvalidFormat(format!(
                "unsupported packfile version {}",
                footer.version
            )));
        }
        Ok(footer)
    }

    fn index_len(&self) -> u64 {
        self.count as u64 * INDEX_ENTRY_SIZE as u64
    }

    /// Total packfile size implied by this footer.
    pub fn packfile_size(&self) -> u64 {
        self.index_offset as u64 + self.index_len() + FOOTER_SIZE as u64
    }
}

/// A packfile sealed in memory, ready to be written.
#[derive(Debug)]
pub struct SealedPack {
    /// Checksum of the serialized index.
    pub id: Checksum,
    pub bytes: Vec<u8>,
    pub entries: Vec<IndexEntry>,
}

/// Accumulates blob records and seals them into a packfile.
#[derive(Default)]
pub struct PackWriter {
    bytes: Vec<u8>,
    entries: Vec<IndexEntry>,
    pending: HashMap<(BlobType, Checksum), usize>,
}

impl PackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. Returns `false` if the same blob is already pending.
    pub fn add_blob(&mut self, blob_type: BlobType, checksum: Checksum, payload: &[u8]) -> Result<bool> {
        if self.contains(blob_type, &checksum) {
            return Ok(false);
        }
        let offset = self.bytes.len() + RECORD_HEADER_SIZE;
        let end = offset as u64 + payload.len() as u64;
        if end > u32::MAX as u64 {
            return Err(CaskError::InvalidFormat(format!(
                "packfile would exceed 4 GiB adding {blob_type} {checksum}"
            )));
        }
        let length = payload.len() as u32;
        self.bytes.push(blob_type.as_u8());
        self.bytes.extend_from_slice(&checksum.0);
        self.bytes.extend_from_slice(&length.to_le_bytes());
        self.bytes.extend_from_slice(payload);

        self.pending.insert((blob_type, checksum), self.entries.len());
        self.entries.push(IndexEntry {
            blob_type,
            checksum,
            offset: offset as u32,
            length,
        });
        Ok(true)
    }

    pub fn contains(&self, blob_type: BlobType, checksum: &Checksum) -> bool {
        self.pending.contains_key(&(blob_type, *checksum))
    }

    /// Payload of a blob that has been added but not sealed yet.
    pub fn pending_blob(&self, blob_type: BlobType, checksum: &Checksum) -> Option<&[u8]> {
        let entry = &self.entries[*self.pending.get(&(blob_type, *checksum))?];
        let start = entry.offset as usize;
        Some(&self.bytes[start..start + entry.length as usize])
    }

    /// Bytes of records staged so far.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn blob_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn should_flush(&self, max_size: usize) -> bool {
        !self.is_empty() && self.bytes.len() >= max_size
    }

    /// Append index and footer, and reset the writer for reuse.
    pub fn seal(&mut self) -> Result<SealedPack> {
        if self.is_empty() {
            return Err(CaskError::Other("cannot seal empty packfile".into()));
        }
        let index_offset = self.bytes.len();
        let index_end = index_offset as u64 + (self.entries.len() * INDEX_ENTRY_SIZE) as u64;
        if index_end > u32::MAX as u64 {
            return Err(CaskError::InvalidFormat("packfile index exceeds 4 GiB".into()));
        }

        let mut bytes = std::mem::take(&mut self.bytes);
        let entries = std::mem::take(&mut self.entries);
        self.pending.clear();

        bytes.reserve(entries.len() * INDEX_ENTRY_SIZE + FOOTER_SIZE);
        for entry in &entries {
            entry.encode_into(&mut bytes);
        }
        let index_checksum = Checksum::compute(&bytes[index_offset..]);
        let footer = Footer {
            version: PACKFILE_VERSION,
            timestamp: chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            count: entries.len() as u32,
            index_offset: index_offset as u32,
            index_checksum,
        };
        footer.encode_into(&mut bytes);

        debug!(
            packfile = %index_checksum,
            blobs = entries.len(),
            bytes = bytes.len(),
            "sealed packfile"
        );
        Ok(SealedPack {
            id: index_checksum,
            bytes,
            entries,
        })
    }
}

fn decode_index(footer: &Footer, index: &[u8]) -> Result<Vec<IndexEntry>> {
    let actual = Checksum::compute(index);
    if actual != footer.index_checksum {
        return Err(CaskError::ChecksumMismatch {
            expected: footer.index_checksum,
            actual,
        });
    }
    index
        .chunks_exact(INDEX_ENTRY_SIZE)
        .map(IndexEntry::decode)
        .collect()
}

/// Parse footer and index from a complete packfile image.
pub fn parse_packfile(bytes: &[u8]) -> Result<(Footer, Vec<IndexEntry>)> {
    if bytes.len() < FOOTER_SIZE {
        return Err(CaskError::InvalidFormat("packfile too small".into()));
    }
    let footer = Footer::decode(&bytes[bytes.len() - FOOTER_SIZE..])?;
    if footer.packfile_size() != bytes.len() as u64 {
        return Err(CaskError::InvalidFormat(format!(
            "packfile footer describes {} bytes, file has {}",
            footer.packfile_size(),
            bytes.len()
        )));
    }
    let start = footer.index_offset as usize;
    let index = &bytes[start..start + footer.index_len() as usize];
    let entries = decode_index(&footer, index)?;
    Ok((footer, entries))
}

/// Read only the footer, with one ranged read from the end.
pub fn read_footer(storage: &dyn StorageBackend, id: &Checksum) -> Result<Footer> {
    let key = packfile_key(id);
    let size = storage
        .size(&key)?
        .ok_or(CaskError::PackfileNotFound(*id))?;
    if size < FOOTER_SIZE as u64 {
        return Err(CaskError::InvalidFormat(format!("packfile {id} too small")));
    }
    let tail = storage
        .get_range(&key, size - FOOTER_SIZE as u64, FOOTER_SIZE as u64)?
        .ok_or(CaskError::PackfileNotFound(*id))?;
    let footer = Footer::decode(&tail)?;
    if footer.packfile_size() != size {
        return Err(CaskError::InvalidFormat(format!(
            "packfile {id}: footer describes {} bytes, file has {size}",
            footer.packfile_size()
        )));
    }
    Ok(footer)
}

/// Read and verify the index without touching blob payloads.
pub fn read_index(storage: &dyn StorageBackend, id: &Checksum) -> Result<(Footer, Vec<IndexEntry>)> {
    let footer = read_footer(storage, id)?;
    let index = storage
        .get_range(&packfile_key(id), footer.index_offset as u64, footer.index_len())?
        .ok_or(CaskError::PackfileNotFound(*id))?;
    let entries = decode_index(&footer, &index)?;
    Ok((footer, entries))
}

/// Ranged read of one payload.
pub fn read_blob(storage: &dyn StorageBackend, id: &Checksum, offset: u32, length: u32) -> Result<Vec<u8>> {
    storage
        .get_range(&packfile_key(id), offset as u64, length as u64)?
        .ok_or(CaskError::PackfileNotFound(*id))
}

/// Full structural check: id, index checksum, and every record header.
pub fn verify_packfile(storage: &dyn StorageBackend, id: &Checksum) -> Result<Vec<IndexEntry>> {
    let bytes = storage
        .get(&packfile_key(id))?
        .ok_or(CaskError::PackfileNotFound(*id))?;
    let (footer, entries) = parse_packfile(&bytes)?;
    if footer.index_checksum != *id {
        return Err(CaskError::ChecksumMismatch {
            expected: *id,
            actual: footer.index_checksum,
        });
    }
    for entry in &entries {
        let start = (entry.offset as usize)
            .checked_sub(RECORD_HEADER_SIZE)
            .ok_or_else(|| CaskError::InvalidFormat(format!("record offset {} too small", entry.offset)))?;
        let end = entry.offset as usize + entry.length as usize;
        if end > footer.index_offset as usize {
            return Err(CaskError::InvalidFormat(format!(
                "record {} overlaps packfile index",
                entry.checksum
            )));
        }
        let header = &bytes[start..entry.offset as usize];
        let same = header[0] == entry.blob_type.as_u8()
            && checksum_at(header, 1) == entry.checksum
            && le_u32(header, 33) == entry.length;
        if !same {
            return Err(CaskError::InvalidFormat(format!(
                "record header for {} {} disagrees with index",
                entry.blob_type, entry.checksum
            )));
        }
    }
    Ok(entries)
}
