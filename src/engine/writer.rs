//! Write sessions.
//!
//! Entries are appended strictly in order: local header, data, and for
//! streamed entries a data descriptor. Nothing is ever rewritten, so the
//! sink only needs [`Write`]. The central directory is kept in memory and
//! emitted by [`ZipWriter::finalize`].

use chrono::{DateTime, Local};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use super::MAX_LEVEL;
use super::status::{EngineResult, StatusCode};
use super::structures::*;

/// Chunk size used when streaming a source file into the archive.
const COPY_CHUNK: usize = 64 * 1024;

/// Tracks how many bytes went through, which is the current archive offset.
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// An open write session.
pub struct ZipWriter {
    sink: CountingWriter<Box<dyn Write + Send>>,
    entries: Vec<EntryRecord>,
    finalized: bool,
}

impl ZipWriter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: CountingWriter {
                inner: sink,
                written: 0,
            },
            entries: Vec::new(),
            finalized: false,
        }
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Add an entry whose content is already in memory.
    ///
    /// Data is deflated up front and stored as-is when that does not make
    /// it smaller. Names ending in `/` become directory entries.
    pub fn add_from_buffer(&mut self, name: &str, data: &[u8], level: u8) -> EngineResult<()> {
        self.check_can_add(name, level)?;
        if data.len() as u64 > MAX_CLASSIC_U32 {
            return Err(StatusCode::FILE_TOO_LARGE);
        }

        let (method, payload): (CompressionMethod, Cow<'_, [u8]>) =
            if level == 0 || data.is_empty() {
                (CompressionMethod::Stored, Cow::Borrowed(data))
            } else {
                let compressed = deflate(data, level)?;
                if compressed.len() < data.len() {
                    (CompressionMethod::Deflate, Cow::Owned(compressed))
                } else {
                    (CompressionMethod::Stored, Cow::Borrowed(data))
                }
            };

        let (last_mod_time, last_mod_date) = to_dos_datetime(Local::now().naive_local());
        let record = EntryRecord {
            file_name: name.to_string(),
            version_made_by: VERSION_20,
            flags: FLAG_UTF8,
            compression_method: method,
            compressed_size: payload.len() as u64,
            uncompressed_size: data.len() as u64,
            crc32: crc32fast::hash(data),
            lfh_offset: self.sink.written,
            last_mod_time,
            last_mod_date,
            external_attrs: if name.ends_with('/') {
                DOS_DIR_ATTRIBUTE
            } else {
                0
            },
        };

        let end = record.lfh_offset + (LFH_SIZE + name.len()) as u64 + record.compressed_size;
        if end > MAX_CLASSIC_U32 {
            return Err(StatusCode::ARCHIVE_TOO_LARGE);
        }

        record
            .write_local_header(&mut self.sink)
            .and_then(|()| self.sink.write_all(&payload))
            .map_err(|_| StatusCode::FILE_WRITE_FAILED)?;

        self.entries.push(record);
        Ok(())
    }

    /// Add an entry streamed from a file on disk.
    ///
    /// The file is never loaded whole; CRC and sizes are computed on the way
    /// through and written in a trailing data descriptor.
    pub fn add_from_file(&mut self, name: &str, path: &Path, level: u8) -> EngineResult<()> {
        self.check_can_add(name, level)?;

        let mut file = File::open(path).map_err(|_| StatusCode::FILE_OPEN_FAILED)?;
        let metadata = file.metadata().map_err(|_| StatusCode::FILE_STAT_FAILED)?;
        if metadata.is_dir() {
            return Err(StatusCode::FILE_OPEN_FAILED);
        }
        if metadata.len() > MAX_CLASSIC_U32 {
            return Err(StatusCode::FILE_TOO_LARGE);
        }

        let modified = metadata
            .modified()
            .map(|t| DateTime::<Local>::from(t).naive_local())
            .unwrap_or_else(|_| Local::now().naive_local());
        let (last_mod_time, last_mod_date) = to_dos_datetime(modified);

        let method = if level == 0 || metadata.len() == 0 {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflate
        };

        let mut record = EntryRecord {
            file_name: name.to_string(),
            version_made_by: VERSION_20,
            flags: FLAG_UTF8 | FLAG_DATA_DESCRIPTOR,
            compression_method: method,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: self.sink.written,
            last_mod_time,
            last_mod_date,
            external_attrs: 0,
        };

        record
            .write_local_header(&mut self.sink)
            .map_err(|_| StatusCode::FILE_WRITE_FAILED)?;

        let data_start = self.sink.written;
        let mut hasher = crc32fast::Hasher::new();
        let total = match method {
            CompressionMethod::Deflate => {
                let mut encoder = DeflateEncoder::new(&mut self.sink, compression(level));
                let total = pump(&mut file, &mut encoder, &mut hasher)?;
                // The encoder only fails when the sink underneath it does
                encoder
                    .finish()
                    .map_err(|_| StatusCode::FILE_WRITE_FAILED)?;
                total
            }
            _ => pump(&mut file, &mut self.sink, &mut hasher)?,
        };

        record.crc32 = hasher.finalize();
        record.uncompressed_size = total;
        record.compressed_size = self.sink.written - data_start;
        if total > MAX_CLASSIC_U32 || record.compressed_size > MAX_CLASSIC_U32 {
            return Err(StatusCode::FILE_TOO_LARGE);
        }
        if self.sink.written > MAX_CLASSIC_U32 {
            return Err(StatusCode::ARCHIVE_TOO_LARGE);
        }

        record
            .write_data_descriptor(&mut self.sink)
            .map_err(|_| StatusCode::FILE_WRITE_FAILED)?;

        self.entries.push(record);
        Ok(())
    }

    /// Write the central directory and end record, then flush.
    ///
    /// A session can be finalized once; later insertions are rejected.
    pub fn finalize(&mut self) -> EngineResult<()> {
        if self.finalized {
            return Err(StatusCode::INVALID_PARAMETER);
        }

        let cd_offset = self.sink.written;
        let cd_size: u64 = self.entries.iter().map(EntryRecord::central_header_len).sum();
        if cd_offset > MAX_CLASSIC_U32 || cd_size > MAX_CLASSIC_U32 {
            return Err(StatusCode::ARCHIVE_TOO_LARGE);
        }

        for entry in &self.entries {
            entry
                .write_central_header(&mut self.sink)
                .map_err(|_| StatusCode::FILE_WRITE_FAILED)?;
        }

        let count = self.entries.len() as u16;
        EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: count,
            total_entries: count,
            cd_size: cd_size as u32,
            cd_offset: cd_offset as u32,
            comment_len: 0,
        }
        .write_to(&mut self.sink)
        .and_then(|()| self.sink.flush())
        .map_err(|_| StatusCode::FILE_WRITE_FAILED)?;

        self.finalized = true;
        Ok(())
    }

    /// Flush the sink.
    pub fn close(&mut self) -> EngineResult<()> {
        self.sink.flush().map_err(|_| StatusCode::FILE_CLOSE_FAILED)
    }

    fn check_can_add(&self, name: &str, level: u8) -> EngineResult<()> {
        if self.finalized || level > MAX_LEVEL {
            return Err(StatusCode::INVALID_PARAMETER);
        }
        validate_name(name)?;
        if self.entries.len() >= MAX_CLASSIC_ENTRIES {
            return Err(StatusCode::TOO_MANY_FILES);
        }
        if self.sink.written > MAX_CLASSIC_U32 {
            return Err(StatusCode::ARCHIVE_TOO_LARGE);
        }
        Ok(())
    }
}

/// Archive names are relative, forward-slash separated and fit a u16 length.
fn validate_name(name: &str) -> EngineResult<()> {
    if name.is_empty()
        || name.starts_with('/')
        || name.contains('\\')
        || name.len() > u16::MAX as usize
    {
        return Err(StatusCode::INVALID_FILENAME);
    }
    Ok(())
}

/// Levels run 0..=10 like the classic engines; flate2 tops out at 9.
fn compression(level: u8) -> Compression {
    Compression::new(u32::from(level.min(9)))
}

fn deflate(data: &[u8], level: u8) -> EngineResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), compression(level));
    encoder
        .write_all(data)
        .map_err(|_| StatusCode::COMPRESSION_FAILED)?;
    encoder.finish().map_err(|_| StatusCode::COMPRESSION_FAILED)
}

/// Copy `src` into `dst`, hashing what was read. Returns the byte count.
fn pump<R: Read, W: Write>(
    src: &mut R,
    dst: &mut W,
    hasher: &mut crc32fast::Hasher,
) -> EngineResult<u64> {
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut total = 0u64;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return Err(StatusCode::FILE_READ_FAILED),
        };
        hasher.update(&buf[..n]);
        dst.write_all(&buf[..n])
            .map_err(|_| StatusCode::FILE_WRITE_FAILED)?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BackingStore, MemoryStore};

    fn writer() -> (ZipWriter, MemoryStore) {
        let store = MemoryStore::new();
        let sink = store.open_write().unwrap();
        (ZipWriter::new(sink), store)
    }

    #[test]
    fn rejects_malformed_names() {
        assert_eq!(validate_name(""), Err(StatusCode::INVALID_FILENAME));
        assert_eq!(validate_name("/abs.txt"), Err(StatusCode::INVALID_FILENAME));
        assert_eq!(validate_name("win\\path.txt"), Err(StatusCode::INVALID_FILENAME));
        assert_eq!(validate_name("dir/file.txt"), Ok(()));
        assert_eq!(validate_name("dir/"), Ok(()));
    }

    #[test]
    fn level_above_maximum_is_invalid() {
        let (mut w, _) = writer();
        assert_eq!(
            w.add_from_buffer("a.txt", b"a", 11),
            Err(StatusCode::INVALID_PARAMETER)
        );
        assert_eq!(w.num_entries(), 0);
    }

    #[test]
    fn incompressible_data_is_stored() {
        let (mut w, _) = writer();
        w.add_from_buffer("one.bin", &[7], 9).unwrap();
        assert_eq!(w.entries[0].compression_method, CompressionMethod::Stored);

        let text = "all work and no play ".repeat(64);
        w.add_from_buffer("text.txt", text.as_bytes(), 6).unwrap();
        assert_eq!(w.entries[1].compression_method, CompressionMethod::Deflate);
        assert!(w.entries[1].compressed_size < w.entries[1].uncompressed_size);
    }

    #[test]
    fn directory_marker_gets_dos_attribute() {
        let (mut w, _) = writer();
        w.add_from_buffer("docs/", &[], 6).unwrap();
        assert!(w.entries[0].is_directory());
        assert_eq!(w.entries[0].external_attrs, DOS_DIR_ATTRIBUTE);
    }

    #[test]
    fn finalize_writes_end_record_once() {
        let (mut w, store) = writer();
        w.add_from_buffer("a.txt", b"abc", 0).unwrap();
        w.finalize().unwrap();

        let bytes = store.to_vec();
        let tail = &bytes[bytes.len() - EndOfCentralDirectory::SIZE..];
        let eocd = EndOfCentralDirectory::from_bytes(tail).unwrap();
        assert_eq!(eocd.total_entries, 1);

        assert_eq!(w.finalize(), Err(StatusCode::INVALID_PARAMETER));
        assert_eq!(
            w.add_from_buffer("b.txt", b"b", 0),
            Err(StatusCode::INVALID_PARAMETER)
        );
    }

    #[test]
    fn missing_source_file_fails_to_open() {
        let (mut w, _) = writer();
        let missing = Path::new("definitely/not/here.txt");
        assert_eq!(
            w.add_from_file("here.txt", missing, 6),
            Err(StatusCode::FILE_OPEN_FAILED)
        );
    }
}
