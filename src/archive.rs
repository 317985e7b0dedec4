//! The archive handle.
//!
//! An [`Archive`] owns exactly one engine session and is bound to one
//! [`Mode`] for its whole life. Calling a write operation on a read handle,
//! or the reverse, is a programming error and panics before the engine is
//! touched.

use chrono::NaiveDateTime;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::engine::{
    CompressionMethod, DEFAULT_LEVEL, Engine, EntryRecord, LookupOptions, StatusCode,
};
use crate::error::{Error, Result, ZipErrorKind};
use crate::io::BackingStore;

/// Longest entry name a [`FileStat`] will carry, in bytes.
pub const MAX_NAME_LEN: usize = 512;

/// What an archive session was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

/// Snapshot of one entry's central directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub index: usize,
    pub name: String,
    /// Uncompressed size in bytes
    pub size: u64,
    pub compressed_size: u64,
    pub crc32: u32,
    pub method: CompressionMethod,
    pub is_dir: bool,
    pub is_encrypted: bool,
    /// Whether this crate can extract the entry
    pub is_supported: bool,
    pub modified: Option<NaiveDateTime>,
}

impl FileStat {
    fn from_record(index: usize, record: EntryRecord) -> Result<Self> {
        check_name_len(&record.file_name)?;
        Ok(Self {
            index,
            size: record.uncompressed_size,
            compressed_size: record.compressed_size,
            crc32: record.crc32,
            method: record.compression_method,
            is_dir: record.is_directory(),
            is_encrypted: record.is_encrypted(),
            is_supported: record.is_supported(),
            modified: record.modified(),
            name: record.file_name,
        })
    }
}

/// One open ZIP archive session.
///
/// Dropping a write-mode archive with pending insertions finalizes it. Use
/// [`Archive::close`] or [`Archive::finalize`] to observe finalize errors.
///
/// ```no_run
/// use zipkit::{Archive, LookupOptions, Mode};
///
/// # fn main() -> zipkit::Result<()> {
/// let mut out = Archive::open_path("bundle.zip", Mode::Write)?;
/// out.add_file_from_memory("hello.txt", b"hi there", None)?;
/// out.add_dir("assets", None)?;
/// out.close()?;
///
/// let mut archive = Archive::open_path("bundle.zip", Mode::Read)?;
/// let hello = archive.read_file_alloc("hello.txt", LookupOptions::EXACT)?;
/// assert_eq!(hello, b"hi there");
/// # Ok(())
/// # }
/// ```
pub struct Archive {
    mode: Mode,
    engine: Engine,
    needs_finalize: bool,
    /// Set when finalize failed; the archive can no longer be completed.
    finalize_error: Option<StatusCode>,
}

impl Archive {
    /// Open `store` for reading or for writing a fresh archive.
    pub fn open<S: BackingStore + ?Sized>(store: &S, mode: Mode) -> Result<Self> {
        let engine = match mode {
            Mode::Read => Engine::open_read(store),
            Mode::Write => Engine::open_write(store),
        }
        .inspect_err(|status| tracing::debug!(?mode, %status, "failed to open archive"))?;

        tracing::debug!(?mode, entries = engine.num_entries(), "opened archive");
        Ok(Self {
            mode,
            engine,
            needs_finalize: false,
            finalize_error: None,
        })
    }

    /// Open an archive file on disk.
    pub fn open_path<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self> {
        Self::open(path.as_ref(), mode)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of entries, fixed when the archive was opened.
    pub fn number_of_files(&self) -> usize {
        self.require(Mode::Read, "number_of_files");
        self.engine.num_entries()
    }

    /// Add an entry from an in-memory buffer.
    ///
    /// A name ending in `/` is a directory marker and must come with empty
    /// `bytes`. `level` runs from 0 (store) to 10; `None` picks 6.
    ///
    /// # Panics
    ///
    /// On a read-mode archive, after [`Archive::finalize`], or for a
    /// directory marker with content.
    pub fn add_file_from_memory(
        &mut self,
        name: &str,
        bytes: &[u8],
        level: Option<u8>,
    ) -> Result<()> {
        self.require_open_writer("add_file_from_memory");
        assert!(
            !name.ends_with('/') || bytes.is_empty(),
            "directory marker {name:?} cannot carry {} bytes of content",
            bytes.len()
        );
        check_name_len(name)?;

        self.engine
            .add_from_buffer(name, bytes, level.unwrap_or(DEFAULT_LEVEL))?;
        self.needs_finalize = true;
        tracing::debug!(name, size = bytes.len(), "added entry from memory");
        Ok(())
    }

    /// Add an entry whose content the engine streams from `source`.
    ///
    /// # Panics
    ///
    /// On a read-mode archive, after [`Archive::finalize`], or when `name`
    /// is a directory marker.
    pub fn add_file_from_path<P: AsRef<Path>>(
        &mut self,
        name: &str,
        source: P,
        level: Option<u8>,
    ) -> Result<()> {
        self.require_open_writer("add_file_from_path");
        assert!(
            !name.ends_with('/'),
            "directory marker {name:?} cannot be added from a path"
        );
        check_name_len(name)?;

        let source = source.as_ref();
        self.engine
            .add_from_file(name, source, level.unwrap_or(DEFAULT_LEVEL))?;
        self.needs_finalize = true;
        tracing::debug!(name, source = %source.display(), "added entry from file");
        Ok(())
    }

    /// Look up `name` and return its full content in a new buffer.
    ///
    /// The buffer is allocated fallibly at exactly the entry's size; on any
    /// failure it is discarded.
    pub fn read_file_alloc(&mut self, name: &str, options: LookupOptions) -> Result<Vec<u8>> {
        self.require(Mode::Read, "read_file_alloc");
        let index = self.get_file_index(name, options)?;
        let size = self.engine.stat(index)?.uncompressed_size;
        self.read_to_vec(index, size)
    }

    /// Extract entry `index` into `dest`, returning the number of bytes written.
    ///
    /// `dest` must be at least the entry's size, otherwise this fails with
    /// [`ZipErrorKind::BufferTooSmall`].
    pub fn read_file(&mut self, index: usize, dest: &mut [u8]) -> Result<usize> {
        self.require(Mode::Read, "read_file");
        Ok(self.engine.extract_to_buffer(index, dest)?)
    }

    /// Index of the entry called `name`.
    pub fn get_file_index(&mut self, name: &str, options: LookupOptions) -> Result<usize> {
        self.require(Mode::Read, "get_file_index");
        Ok(self.engine.locate(name, options)?)
    }

    pub fn get_file_stat(&mut self, index: usize) -> Result<FileStat> {
        self.require(Mode::Read, "get_file_stat");
        let record = self.engine.stat(index)?;
        FileStat::from_record(index, record)
    }

    /// Stat every entry, in index order.
    pub fn list_files(&mut self) -> Result<Vec<FileStat>> {
        self.require(Mode::Read, "list_files");
        (0..self.engine.num_entries())
            .map(|index| self.get_file_stat(index))
            .collect()
    }

    /// Extract entry `index` to `output_path`, creating parent directories.
    ///
    /// Directory entries create the directory itself.
    pub fn extract_to_file<P: AsRef<Path>>(&mut self, index: usize, output_path: P) -> Result<()> {
        self.require(Mode::Read, "extract_to_file");
        let stat = self.get_file_stat(index)?;
        let output_path = output_path.as_ref();

        if stat.is_dir {
            fs::create_dir_all(output_path).map_err(|_| ZipErrorKind::FileCreateFailed)?;
            return Ok(());
        }

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|_| ZipErrorKind::FileCreateFailed)?;
            }
        }

        let data = self.read_to_vec(index, stat.size)?;
        let mut file = fs::File::create(output_path).map_err(|_| ZipErrorKind::FileCreateFailed)?;
        file.write_all(&data)
            .map_err(|_| ZipErrorKind::FileWriteFailed)?;

        tracing::debug!(name = %stat.name, path = %output_path.display(), "extracted entry");
        Ok(())
    }

    /// Write the central directory now, reporting any failure.
    ///
    /// The write session is complete afterwards, whether or not this
    /// succeeded; further insertions panic. A failure is reported again by
    /// every later `finalize` and by [`Archive::close`].
    pub fn finalize(&mut self) -> Result<()> {
        self.require(Mode::Write, "finalize");
        if let Some(status) = self.finalize_error {
            return Err(status.into());
        }
        // The caller sees this outcome, so drop must not try again
        self.needs_finalize = false;
        self.engine
            .finalize()
            .inspect_err(|&status| self.finalize_error = Some(status))?;
        tracing::debug!(entries = self.engine.num_entries(), "finalized archive");
        Ok(())
    }

    /// Finalize pending insertions and release the session.
    pub fn close(mut self) -> Result<()> {
        if let Some(status) = self.finalize_error {
            return Err(status.into());
        }
        if self.mode == Mode::Write && self.needs_finalize {
            self.finalize()?;
        }
        self.engine.close()?;
        tracing::debug!(mode = ?self.mode, "closed archive");
        Ok(())
    }

    /// The most recent engine failure on this session, if the last call failed.
    pub fn last_error(&self) -> Option<ZipErrorKind> {
        let status = self.engine.last_error();
        (!status.is_ok()).then(|| ZipErrorKind::from_status(status))
    }

    pub(crate) fn require(&self, mode: Mode, operation: &str) {
        assert!(
            self.mode == mode,
            "{operation} needs a {mode:?}-mode archive, this one is {:?}",
            self.mode
        );
    }

    fn require_open_writer(&self, operation: &str) {
        self.require(Mode::Write, operation);
        assert!(
            !self.engine.is_finalized() && self.finalize_error.is_none(),
            "{operation} called after the archive was finalized"
        );
    }

    fn read_to_vec(&mut self, index: usize, size: u64) -> Result<Vec<u8>> {
        let len = usize::try_from(size).map_err(|_| Error::OutOfMemory { requested: size })?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| Error::OutOfMemory { requested: size })?;
        buf.resize(len, 0);

        let written = self.engine.extract_to_buffer(index, &mut buf)?;
        buf.truncate(written);
        Ok(buf)
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        if self.mode == Mode::Write && self.needs_finalize {
            if let Err(status) = self.engine.finalize() {
                tracing::error!(
                    error = %ZipErrorKind::from_status(status),
                    "failed to finalize archive on drop; call close() to handle this"
                );
            }
            self.needs_finalize = false;
        }
        if let Err(status) = self.engine.close() {
            tracing::warn!(error = %ZipErrorKind::from_status(status), "failed to close archive");
        }
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("mode", &self.mode)
            .field("entries", &self.engine.num_entries())
            .field("needs_finalize", &self.needs_finalize)
            .field("finalize_error", &self.finalize_error)
            .finish()
    }
}

fn check_name_len(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(Error::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}
