//! Image format registry
//!
//! Sniffs the real format and dimensions of fetched bytes from their leading
//! magic bytes. Formats are registered as `(magic, decoder)` pairs; `?` in a
//! magic pattern matches any byte. Registration is append-only and publishes
//! a fresh snapshot, so detection never takes a lock.

mod formats;

use std::io::{self, Read};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::options::ImageType;

/// Format errors
#[derive(Debug, Error)]
pub enum FormatError {
    /// No registered magic matched
    #[error("unknown image format")]
    UnknownFormat,

    /// Magic matched but the header could not be decoded
    #[error("malformed image header: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// What a decoder reports about an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageMeta {
    pub format: &'static str,
    pub width: u32,
    pub height: u32,
}

impl ImageMeta {
    /// Output type matching the detected format, if it is one we can emit
    pub fn image_type(&self) -> Option<ImageType> {
        self.format.parse().ok()
    }
}

/// A reader that can look ahead without consuming
pub trait PeekRead: Read {
    /// Return up to `n` upcoming bytes without consuming them.
    /// Fewer bytes are returned only at end of stream.
    fn peek(&mut self, n: usize) -> io::Result<&[u8]>;
}

/// Buffers just enough of `R` to serve `peek`
pub struct PeekReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
}

impl<R: Read> PeekReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            pos: 0,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }
}

impl<R: Read> PeekRead for PeekReader<R> {
    fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        if self.pos > 0 && self.buffered() < n {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }

        let mut chunk = [0u8; 512];
        while self.buffered() < n {
            let want = (n - self.buffered()).min(chunk.len());
            let read = match self.inner.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.buf.extend_from_slice(&chunk[..read]);
        }

        let end = self.pos + n.min(self.buffered());
        Ok(&self.buf[self.pos..end])
    }
}

impl<R: Read> Read for PeekReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.buffered() == 0 {
            return self.inner.read(out);
        }

        let n = out.len().min(self.buffered());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }
        Ok(n)
    }
}

/// Header decoder for one format; reads from the start of the image
pub type DecodeMeta = Arc<dyn Fn(&mut dyn PeekRead) -> Result<ImageMeta, FormatError> + Send + Sync>;

#[derive(Clone)]
struct FormatEntry {
    magic: &'static [u8],
    decode: DecodeMeta,
}

/// Ordered table of format sniffers
pub struct FormatRegistry {
    formats: ArcSwap<Vec<FormatEntry>>,
    writer: Mutex<()>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            formats: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
        }
    }

    /// Registry preloaded with JPEG, PNG, GIF, WebP and BMP
    pub fn with_builtin_formats() -> Self {
        let registry = Self::new();
        formats::register_builtin(&registry);
        registry
    }

    /// Append a format; earlier registrations are tried first
    pub fn register<F>(&self, magic: &'static [u8], decode: F)
    where
        F: Fn(&mut dyn PeekRead) -> Result<ImageMeta, FormatError> + Send + Sync + 'static,
    {
        let _guard = self.writer.lock();
        let mut next = self.formats.load().as_ref().clone();
        next.push(FormatEntry {
            magic,
            decode: Arc::new(decode),
        });
        self.formats.store(Arc::new(next));
    }

    pub fn len(&self) -> usize {
        self.formats.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detect the format of `reader` and decode its header
    ///
    /// Only the first matching format's decoder runs. Nothing is consumed
    /// until a magic matches.
    pub fn detect(&self, reader: &mut dyn PeekRead) -> Result<ImageMeta, FormatError> {
        let formats = self.formats.load();

        for entry in formats.iter() {
            let head = reader.peek(entry.magic.len())?;
            if matches_magic(entry.magic, head) {
                return (entry.decode)(reader);
            }
        }

        Err(FormatError::UnknownFormat)
    }
}

fn matches_magic(magic: &[u8], head: &[u8]) -> bool {
    magic.len() == head.len()
        && magic
            .iter()
            .zip(head)
            .all(|(expected, actual)| *expected == b'?' || expected == actual)
}

static GLOBAL: OnceLock<FormatRegistry> = OnceLock::new();

/// Process-wide registry with the built-in formats
pub fn global() -> &'static FormatRegistry {
    GLOBAL.get_or_init(FormatRegistry::with_builtin_formats)
}

/// Register a format in the process-wide registry
pub fn register_format<F>(magic: &'static [u8], decode: F)
where
    F: Fn(&mut dyn PeekRead) -> Result<ImageMeta, FormatError> + Send + Sync + 'static,
{
    global().register(magic, decode);
}

/// Detect format and dimensions using the process-wide registry
pub fn decode_meta<R: Read>(reader: R) -> Result<ImageMeta, FormatError> {
    global().detect(&mut PeekReader::new(reader))
}
