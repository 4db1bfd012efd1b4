use std::io::{ErrorKind, Read};

use fastcdc::v2020::FastCDC;

use crate::config::ChunkerConfig;
use crate::error::Result;

/// Decides where the next chunk ends.
pub trait Cutter: Send + Sync {
    /// Length of the first chunk in `window`.
    ///
    /// `window` holds `max_size` bytes, or fewer once the stream is exhausted.
    fn cut(&self, window: &[u8]) -> usize;
}

/// FastCDC (2020) rolling-hash boundaries.
#[derive(Debug, Clone)]
pub struct FastCdcCutter {
    min_size: u32,
    normal_size: u32,
    max_size: u32,
}

impl FastCdcCutter {
    pub fn new(config: &ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            min_size: config.min_size,
            normal_size: config.normal_size,
            max_size: config.max_size,
        })
    }
}

impl Cutter for FastCdcCutter {
    fn cut(&self, window: &[u8]) -> usize {
        FastCDC::new(window, self.min_size, self.normal_size, self.max_size)
            .next()
            .map(|chunk| chunk.length)
            .unwrap_or(window.len())
    }
}

/// Splits a byte stream into content-defined chunks.
///
/// Empty input yields exactly one empty chunk. Input shorter than
/// `min_size` comes back whole as a single chunk. A read error is
/// yielded once and ends the stream.
pub struct Chunker<R, C = FastCdcCutter> {
    reader: R,
    cutter: C,
    min_size: usize,
    max_size: usize,
    size_hint: Option<u64>,
    buf: Vec<u8>,
    eof: bool,
    emitted: bool,
    done: bool,
}

impl<R: Read> Chunker<R, FastCdcCutter> {
    pub fn new(reader: R, config: &ChunkerConfig) -> Result<Self> {
        let cutter = FastCdcCutter::new(config)?;
        Ok(Self::with_cutter(
            reader,
            cutter,
            config.min_size as usize,
            config.max_size as usize,
        ))
    }
}

impl<R: Read, C: Cutter> Chunker<R, C> {
    pub fn with_cutter(reader: R, cutter: C, min_size: usize, max_size: usize) -> Self {
        Self {
            reader,
            cutter,
            min_size,
            max_size: max_size.max(1),
            size_hint: None,
            buf: Vec::new(),
            eof: false,
            emitted: false,
            done: false,
        }
    }

    /// Expected stream length, usually the file size from the scan.
    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    fn small_input(&self) -> bool {
        self.size_hint.is_some_and(|s| s < self.min_size as u64)
    }

    /// Top up `buf` to `max_size` bytes, or everything if the input is small.
    fn fill(&mut self) -> Result<()> {
        if self.small_input() && !self.eof {
            self.reader.read_to_end(&mut self.buf)?;
            self.eof = true;
            return Ok(());
        }
        while !self.eof && self.buf.len() < self.max_size {
            let start = self.buf.len();
            self.buf.resize(self.max_size, 0);
            match self.reader.read(&mut self.buf[start..]) {
                Ok(0) => {
                    self.buf.truncate(start);
                    self.eof = true;
                }
                Ok(n) => self.buf.truncate(start + n),
                Err(e) if e.kind() == ErrorKind::Interrupted => self.buf.truncate(start),
                Err(e) => {
                    self.buf.truncate(start);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}

impl<R: Read, C: Cutter> Iterator for Chunker<R, C> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(e) = self.fill() {
            self.done = true;
            return Some(Err(e));
        }
        if self.buf.is_empty() {
            self.done = true;
            if self.emitted {
                return None;
            }
            self.emitted = true;
            return Some(Ok(Vec::new()));
        }

        let whole = !self.emitted && self.eof && self.buf.len() < self.min_size;
        let len = if whole {
            self.buf.len()
        } else {
            self.cutter
                .cut(&self.buf)
                .clamp(1, self.buf.len().min(self.max_size))
        };
        self.emitted = true;
        if len == self.buf.len() {
            return Some(Ok(std::mem::take(&mut self.buf)));
        }
        Some(Ok(self.buf.drain(..len).collect()))
    }
}
