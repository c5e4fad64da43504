//! Sequential binary record I/O over a single backing file.
//!
//! [`RecordStream`] is the primitive every cache file goes through. It is
//! opened read+write (created if absent), can seek to the start, the end or an
//! explicit offset, and exposes typed little-endian reads and writes of the
//! field types the cache records are made of.
//!
//! Records carry no framing of their own: a record is the concatenation of
//! its fields in a fixed order, and variable-length fields (strings, blobs)
//! are prefixed with their `u32` byte length.
//!
//! # Example
//!
//! ```no_run
//! use thumbcache::stream::{RecordStream, SeekOrigin};
//!
//! let mut stream = RecordStream::new("/tmp/example.bin");
//! stream.open().unwrap();
//! stream.seek(SeekOrigin::End).unwrap();
//! stream.write_string("image/png").unwrap();
//! stream.sync().unwrap();
//!
//! stream.seek(SeekOrigin::Start).unwrap();
//! let mime = stream.read_string().unwrap();
//! assert_eq!(mime, "image/png");
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Errors raised by [`RecordStream`].
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    /// The stream has no backing filename.
    #[error("No filename configured for stream")]
    NotConfigured,

    /// The stream is not open.
    #[error("Stream is not open")]
    NotOpen,

    /// An explicit seek went past the end of the file.
    #[error("Seek to {position} is past the end of the file ({size} bytes)")]
    SeekOutOfRange {
        /// Requested offset
        position: u64,
        /// Current file size
        size: u64,
    },

    /// The file ended in the middle of a field.
    #[error("Unexpected end of file")]
    UnexpectedEof,

    /// The data read back does not form a valid field.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A variable-length field is too long for its `u32` length prefix.
    #[error("Field of {0} bytes exceeds the maximum length")]
    TooLarge(usize),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Where a [`RecordStream::seek`] repositions to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Beginning of the file.
    Start,
    /// End of the file (the append position).
    End,
    /// An explicit byte offset, which must not exceed the file size.
    Set(u64),
}

/// A record that can be written to and read back from a [`RecordStream`].
///
/// Implementations write their fields in a fixed order and read them back in
/// the same order.
pub trait Record: Sized {
    /// Append this record's fields at the current position.
    fn write_to(&self, stream: &mut RecordStream) -> StreamResult<()>;

    /// Read one record starting at the current position.
    fn read_from(stream: &mut RecordStream) -> StreamResult<Self>;
}

/// The open handle together with its current buffering mode.
#[derive(Debug)]
enum Handle {
    Idle(File),
    Reading(BufReader<File>),
    Writing(BufWriter<File>),
}

/// Append/seek-capable binary reader and writer over one file.
#[derive(Debug, Default)]
pub struct RecordStream {
    path: Option<PathBuf>,
    handle: Option<Handle>,
}

impl RecordStream {
    /// Create a closed stream for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            handle: None,
        }
    }

    /// The configured backing path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Open the backing file for read+write, creating it if absent.
    ///
    /// Opening an already open stream is a no-op.
    pub fn open(&mut self) -> StreamResult<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let path = self.path.as_ref().ok_or(StreamError::NotConfigured)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        self.handle = Some(Handle::Idle(file));
        Ok(())
    }

    /// Release the handle, flushing pending writes. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(Handle::Writing(mut writer)) = self.handle.take() {
            if let Err(e) = writer.flush() {
                log::warn!("Failed to flush {} on close: {}", self.display(), e);
            }
        }
    }

    /// Whether the stream currently holds an open handle.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Reposition the stream. Returns the new absolute offset.
    ///
    /// Buffered read-ahead is discarded and pending writes are flushed
    /// before moving.
    pub fn seek(&mut self, origin: SeekOrigin) -> StreamResult<u64> {
        let file = self.reset()?;
        let target = match origin {
            SeekOrigin::Start => SeekFrom::Start(0),
            SeekOrigin::End => SeekFrom::End(0),
            SeekOrigin::Set(position) => {
                let size = file.metadata()?.len();
                if position > size {
                    return Err(StreamError::SeekOutOfRange { position, size });
                }
                SeekFrom::Start(position)
            }
        };
        Ok(file.seek(target)?)
    }

    /// Current length of the backing file in bytes, including pending writes.
    pub fn size(&mut self) -> StreamResult<u64> {
        let len = match self.handle.as_mut().ok_or(StreamError::NotOpen)? {
            Handle::Idle(file) => file.metadata()?.len(),
            Handle::Reading(reader) => reader.get_ref().metadata()?.len(),
            Handle::Writing(writer) => {
                writer.flush()?;
                writer.get_ref().metadata()?.len()
            }
        };
        Ok(len)
    }

    /// Current logical position.
    pub fn position(&mut self) -> StreamResult<u64> {
        let pos = match self.handle.as_mut().ok_or(StreamError::NotOpen)? {
            Handle::Idle(file) => file.stream_position()?,
            Handle::Reading(reader) => reader.stream_position()?,
            Handle::Writing(writer) => writer.stream_position()?,
        };
        Ok(pos)
    }

    /// Whether the position is at (or past) the end of the file.
    pub fn at_end(&mut self) -> StreamResult<bool> {
        Ok(self.position()? >= self.size()?)
    }

    /// Flush buffered writes and force them to stable storage.
    pub fn sync(&mut self) -> StreamResult<()> {
        let file = self.reset()?;
        file.sync_all()?;
        Ok(())
    }

    // ---- writes ----

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) -> StreamResult<()> {
        self.writer()?.write_all(&[value])?;
        Ok(())
    }

    /// Write a little-endian `u32`.
    pub fn write_u32(&mut self, value: u32) -> StreamResult<()> {
        self.writer()?.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Write a little-endian `i64`.
    pub fn write_i64(&mut self, value: i64) -> StreamResult<()> {
        self.writer()?.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Write a length-prefixed byte blob.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> StreamResult<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| StreamError::TooLarge(bytes.len()))?;
        let writer = self.writer()?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(bytes)?;
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> StreamResult<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Append a record at the current position.
    pub fn write_record<R: Record>(&mut self, record: &R) -> StreamResult<()> {
        record.write_to(self)
    }

    // ---- reads ----

    /// Read a single byte.
    pub fn read_u8(&mut self) -> StreamResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Read a little-endian `u32`.
    pub fn read_u32(&mut self) -> StreamResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read a little-endian `i64`.
    pub fn read_i64(&mut self) -> StreamResult<i64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    /// Read a length-prefixed byte blob.
    ///
    /// A length prefix larger than the rest of the file is reported as
    /// [`StreamError::Corrupt`] without allocating.
    pub fn read_bytes(&mut self) -> StreamResult<Vec<u8>> {
        let len = u64::from(self.read_u32()?);
        let remaining = self.size()?.saturating_sub(self.position()?);
        if len > remaining {
            return Err(StreamError::Corrupt(format!(
                "length prefix {} exceeds the {} remaining bytes",
                len, remaining
            )));
        }
        let mut buf = vec![0u8; len as usize];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> StreamResult<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| StreamError::Corrupt(e.to_string()))
    }

    /// Read one record starting at the current position.
    pub fn read_record<R: Record>(&mut self) -> StreamResult<R> {
        R::read_from(self)
    }

    // ---- buffering ----

    fn read_exact(&mut self, buf: &mut [u8]) -> StreamResult<()> {
        self.reader()?.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => StreamError::UnexpectedEof,
            _ => StreamError::Io(e),
        })
    }

    /// Drop any buffering and hand back the raw file at the logical position.
    fn reset(&mut self) -> StreamResult<&mut File> {
        let handle = self.handle.take().ok_or(StreamError::NotOpen)?;
        let file = match handle {
            Handle::Idle(file) => file,
            Handle::Reading(mut reader) => {
                let pos = reader.stream_position()?;
                let mut file = reader.into_inner();
                file.seek(SeekFrom::Start(pos))?;
                file
            }
            Handle::Writing(writer) => writer.into_inner().map_err(|e| e.into_error())?,
        };
        let handle = self.handle.insert(Handle::Idle(file));
        match handle {
            Handle::Idle(file) => Ok(file),
            _ => unreachable!("handle was just reset to idle"),
        }
    }

    fn reader(&mut self) -> StreamResult<&mut BufReader<File>> {
        if !matches!(self.handle, Some(Handle::Reading(_))) {
            self.reset()?;
            if let Some(Handle::Idle(file)) = self.handle.take() {
                self.handle = Some(Handle::Reading(BufReader::new(file)));
            }
        }
        match self.handle.as_mut() {
            Some(Handle::Reading(reader)) => Ok(reader),
            _ => Err(StreamError::NotOpen),
        }
    }

    fn writer(&mut self) -> StreamResult<&mut BufWriter<File>> {
        if !matches!(self.handle, Some(Handle::Writing(_))) {
            self.reset()?;
            if let Some(Handle::Idle(file)) = self.handle.take() {
                self.handle = Some(Handle::Writing(BufWriter::new(file)));
            }
        }
        match self.handle.as_mut() {
            Some(Handle::Writing(writer)) => Ok(writer),
            _ => Err(StreamError::NotOpen),
        }
    }

    fn display(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unnamed stream>".to_string())
    }
}

impl Drop for RecordStream {
    fn drop(&mut self) {
        self.close();
    }
}
