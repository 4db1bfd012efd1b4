use std::io::{self, Read, Seek, SeekFrom};

use crate::object::Object;
use crate::repo::{BlobType, Repository};

/// Sequential reader over an object's chunks. Only the chunk under the
/// cursor is held in memory.
pub struct FileReader<'a> {
    repo: &'a Repository,
    object: Object,
    /// Start offset of each chunk within the object.
    offsets: Vec<u64>,
    pos: u64,
    current: Option<(usize, Vec<u8>)>,
}

impl<'a> FileReader<'a> {
    pub fn new(repo: &'a Repository, object: Object) -> Self {
        let mut offsets = Vec::with_capacity(object.chunks.len());
        let mut at = 0u64;
        for chunk in &object.chunks {
            offsets.push(at);
            at += chunk.length as u64;
        }
        Self {
            repo,
            object,
            offsets,
            pos: 0,
            current: None,
        }
    }

    pub fn object(&self) -> &Object {
        &self.object
    }

    pub fn size(&self) -> u64 {
        self.object.size
    }

    fn load_chunk(&mut self, idx: usize) -> io::Result<&[u8]> {
        let loaded = matches!(&self.current, Some((i, _)) if *i == idx);
        if !loaded {
            let chunk = &self.object.chunks[idx];
            let data = self
                .repo
                .get_blob(BlobType::Chunk, &chunk.checksum)
                .map_err(io::Error::other)?;
            if data.len() != chunk.length as usize {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "chunk {} is {} bytes, object expects {}",
                        chunk.checksum,
                        data.len(),
                        chunk.length
                    ),
                ));
            }
            self.current = Some((idx, data));
        }
        match &self.current {
            Some((_, data)) => Ok(data),
            None => Ok(&[]),
        }
    }
}

impl Read for FileReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.object.size || self.offsets.is_empty() {
            return Ok(0);
        }
        let idx = self.offsets.partition_point(|&o| o <= self.pos) - 1;
        let within = (self.pos - self.offsets[idx]) as usize;
        let data = self.load_chunk(idx)?;
        let available = &data[within.min(data.len())..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for FileReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.object.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )),
        }
    }
}
