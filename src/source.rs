//! Byte-source adapter over seekable streams.
//!
//! The reader pulls compressed bytes through the [`ByteSource`] trait so
//! that it can serve plain files, in-memory buffers, and any other
//! seekable stream alike. File-backed sources additionally expose their
//! path, which lets the reader fan a single large read out across several
//! independent file handles.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::Result;

/// A seekable, finite stream of compressed bytes.
pub trait ByteSource: Send {
    /// Read up to `buf.len()` bytes, returning the number read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reposition the stream to an absolute byte offset.
    fn seek_to(&mut self, pos: u64) -> Result<()>;

    /// Current absolute byte offset.
    fn position(&self) -> u64;

    /// Total stream length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the read cursor has reached the end of the stream.
    fn is_eof(&self) -> bool {
        self.position() >= self.len()
    }

    /// Bytes between the read cursor and the end of the stream.
    fn bytes_left(&self) -> u64 {
        self.len().saturating_sub(self.position())
    }

    /// The backing file path, if the source is file-backed.
    ///
    /// Returning `Some` opts the source into the multi-handle read path.
    fn path(&self) -> Option<&Path> {
        None
    }

    /// Fill `buf` exactly, erroring on a short read.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "byte source exhausted during read_exact",
                )
                .into());
            }
            filled += n;
        }
        Ok(())
    }
}

/// A [`ByteSource`] backed by a file on disk.
pub struct FileSource {
    file: File,
    path: PathBuf,
    len: u64,
    pos: u64,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            path,
            len,
            pos: 0,
        })
    }
}

impl ByteSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.file.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// A [`ByteSource`] over any seekable in-memory or custom stream.
pub struct StreamSource<R> {
    inner: R,
    len: u64,
    pos: u64,
}

impl<R: Read + Seek + Send> StreamSource<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, len, pos: 0 })
    }
}

impl<R: Read + Seek + Send> ByteSource for StreamSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn len(&self) -> u64 {
        self.len
    }
}
