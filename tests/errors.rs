use anyhow::Result;
use std::fs;
use std::io::{self, Write};
use tempfile::TempDir;

use zipkit::engine::ZipWriter;
use zipkit::{
    Archive, BackingStore, CompressionMethod, Error, LookupOptions, MAX_NAME_LEN, MemoryStore,
    Mode, ReadAt, ZipErrorKind,
};

fn le16(bytes: &[u8], at: usize) -> usize {
    u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize
}

fn le32(bytes: &[u8], at: usize) -> usize {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
}

/// Offset of the `index`th central directory header, for archives without a comment.
fn central_header(bytes: &[u8], index: usize) -> usize {
    let mut at = le32(bytes, bytes.len() - 22 + 16);
    for _ in 0..index {
        at += 46 + le16(bytes, at + 28) + le16(bytes, at + 30) + le16(bytes, at + 32);
    }
    at
}

/// Offset of the first data byte of the entry described at `header`.
fn entry_data(bytes: &[u8], header: usize) -> usize {
    let local = le32(bytes, header + 42);
    local + 30 + le16(bytes, local + 26) + le16(bytes, local + 28)
}

fn single_entry(name: &str, data: &[u8], level: Option<u8>) -> Result<MemoryStore> {
    let store = MemoryStore::new();
    let mut writer = Archive::open(&store, Mode::Write)?;
    writer.add_file_from_memory(name, data, level)?;
    writer.close()?;
    Ok(store)
}

#[test]
fn garbage_is_not_an_archive() -> Result<()> {
    let store = MemoryStore::from_bytes(vec![0xAB; 4096]);
    let err = Archive::open(&store, Mode::Read).unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::CentralDirectoryNotFound));

    let tiny = MemoryStore::from_bytes(b"PK".to_vec());
    let err = Archive::open(&tiny, Mode::Read).unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::NotAnArchive));
    Ok(())
}

#[test]
fn missing_archive_fails_to_open() -> Result<()> {
    let dir = TempDir::new()?;
    let err = Archive::open_path(dir.path().join("absent.zip"), Mode::Read).unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::FileOpenFailed));
    Ok(())
}

#[test]
fn unwritable_destination_fails_to_create() -> Result<()> {
    let dir = TempDir::new()?;
    let err = Archive::open_path(dir.path().join("no/such/dir/out.zip"), Mode::Write).unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::FileCreateFailed));
    Ok(())
}

#[test]
fn missing_source_file() -> Result<()> {
    let dir = TempDir::new()?;
    let store = MemoryStore::new();
    let mut writer = Archive::open(&store, Mode::Write)?;

    let err = writer
        .add_file_from_path("gone.txt", dir.path().join("gone.txt"), None)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::FileOpenFailed));
    assert_eq!(writer.last_error(), Some(ZipErrorKind::FileOpenFailed));

    // A directory is not a valid source either
    let err = writer
        .add_file_from_path("dir.txt", dir.path(), None)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::FileOpenFailed));

    // The session is still usable after a failed insertion
    writer.add_file_from_memory("ok.txt", b"fine", None)?;
    assert_eq!(writer.last_error(), None);
    writer.close()?;

    let mut reader = Archive::open(&store, Mode::Read)?;
    assert_eq!(reader.number_of_files(), 1);
    assert_eq!(reader.read_file_alloc("ok.txt", LookupOptions::EXACT)?, b"fine");
    Ok(())
}

#[test]
fn missing_entry() -> Result<()> {
    let store = single_entry("present.txt", b"here", None)?;
    let mut reader = Archive::open(&store, Mode::Read)?;

    let err = reader
        .read_file_alloc("absent.txt", LookupOptions::EXACT)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::FileNotFound));
    assert!(matches!(err, Error::Zip(ZipErrorKind::FileNotFound)));

    let err = reader.get_file_stat(7).unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::InvalidParameter));
    Ok(())
}

#[test]
fn corrupted_data_fails_crc() -> Result<()> {
    let store = single_entry("a.txt", b"hello world", Some(0))?;
    let mut bytes = store.to_vec();

    // Stored data starts right after the 30-byte local header and the name
    let data_start = 30 + "a.txt".len();
    assert_eq!(&bytes[data_start..data_start + 5], b"hello");
    bytes[data_start] ^= 0x20;

    let corrupted = MemoryStore::from_bytes(bytes);
    let mut reader = Archive::open(&corrupted, Mode::Read)?;
    let err = reader
        .read_file_alloc("a.txt", LookupOptions::EXACT)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::CrcCheckFailed));
    assert_eq!(reader.last_error(), Some(ZipErrorKind::CrcCheckFailed));
    Ok(())
}

#[test]
fn truncated_archive_is_rejected() -> Result<()> {
    let store = single_entry("a.txt", b"some content", None)?;
    let mut bytes = store.to_vec();
    bytes.truncate(bytes.len() - 8);

    let err = Archive::open(&MemoryStore::from_bytes(bytes), Mode::Read).unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::CentralDirectoryNotFound));
    Ok(())
}

#[test]
fn invalid_names_and_levels() -> Result<()> {
    let store = MemoryStore::new();
    let mut writer = Archive::open(&store, Mode::Write)?;

    for bad in ["", "/rooted.txt", "back\\slash.txt"] {
        let err = writer.add_file_from_memory(bad, b"x", None).unwrap_err();
        assert_eq!(err.kind(), Some(ZipErrorKind::InvalidFilename), "{bad:?}");
    }

    let err = writer.add_file_from_memory("x.txt", b"x", Some(11)).unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::InvalidParameter));

    let long = "n".repeat(MAX_NAME_LEN + 1);
    let err = writer.add_file_from_memory(&long, b"x", None).unwrap_err();
    assert!(matches!(
        err,
        Error::NameTooLong { len, max } if len == MAX_NAME_LEN + 1 && max == MAX_NAME_LEN
    ));
    assert_eq!(err.kind(), None);

    writer.add_file_from_memory(&"n".repeat(MAX_NAME_LEN), b"x", None)?;
    Ok(())
}

#[test]
fn dropped_empty_writer_leaves_no_archive() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("empty.zip");
    drop(Archive::open_path(&path, Mode::Write)?);

    assert_eq!(fs::metadata(&path)?.len(), 0);
    let err = Archive::open_path(&path, Mode::Read).unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::NotAnArchive));
    Ok(())
}

#[test]
fn errors_display_their_kind() {
    let err = Error::from(ZipErrorKind::BufferTooSmall);
    assert_eq!(err.to_string(), "ZIP error: buffer too small");

    let err = Error::OutOfMemory { requested: 1 << 40 };
    assert!(err.to_string().contains("1099511627776"));
}

#[test]
fn encrypted_entry_is_unsupported() -> Result<()> {
    let mut bytes = single_entry("secret.txt", b"top secret", Some(0))?.to_vec();
    let header = central_header(&bytes, 0);
    bytes[header + 8] |= 0x01;

    let store = MemoryStore::from_bytes(bytes);
    let mut reader = Archive::open(&store, Mode::Read)?;
    let stat = reader.get_file_stat(0)?;
    assert!(stat.is_encrypted);
    assert!(!stat.is_supported);

    let err = reader
        .read_file_alloc("secret.txt", LookupOptions::EXACT)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::UnsupportedEncryption));
    Ok(())
}

#[test]
fn unknown_method_is_unsupported() -> Result<()> {
    let mut bytes = single_entry("packed.bin", b"lzma would go here", Some(0))?.to_vec();
    let header = central_header(&bytes, 0);
    bytes[header + 10..header + 12].copy_from_slice(&14u16.to_le_bytes());

    let store = MemoryStore::from_bytes(bytes);
    let mut reader = Archive::open(&store, Mode::Read)?;
    let stat = reader.get_file_stat(0)?;
    assert_eq!(stat.method, CompressionMethod::Unknown(14));
    assert!(!stat.is_supported);

    let err = reader
        .read_file_alloc("packed.bin", LookupOptions::EXACT)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::UnsupportedMethod));
    Ok(())
}

fn deflated_entry() -> Result<(Vec<u8>, usize)> {
    let text = "a line of text that deflates well\n".repeat(100);
    let bytes = single_entry("text.txt", text.as_bytes(), Some(9))?.to_vec();
    let header = central_header(&bytes, 0);
    assert_eq!(le16(&bytes, header + 10), 8, "entry should be deflated");
    let data = entry_data(&bytes, header);
    Ok((bytes, data))
}

#[test]
fn invalid_deflate_block_fails_decompression() -> Result<()> {
    let (mut bytes, data) = deflated_entry()?;
    // Final block with the reserved block type 3
    bytes[data] = 0xFF;

    let store = MemoryStore::from_bytes(bytes);
    let mut reader = Archive::open(&store, Mode::Read)?;
    let err = reader
        .read_file_alloc("text.txt", LookupOptions::EXACT)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::DecompressionFailed));
    Ok(())
}

#[test]
fn flipped_deflated_byte_is_detected() -> Result<()> {
    let (mut bytes, data) = deflated_entry()?;
    let header = central_header(&bytes, 0);
    let compressed_len = le32(&bytes, header + 20);
    bytes[data + compressed_len / 2] ^= 0x10;

    let store = MemoryStore::from_bytes(bytes);
    let mut reader = Archive::open(&store, Mode::Read)?;
    let err = reader
        .read_file_alloc("text.txt", LookupOptions::EXACT)
        .unwrap_err();
    assert!(
        matches!(
            err.kind(),
            Some(
                ZipErrorKind::DecompressionFailed
                    | ZipErrorKind::CrcCheckFailed
                    | ZipErrorKind::UnexpectedDecompressedSize
            )
        ),
        "{err:?}"
    );
    Ok(())
}

#[test]
fn stored_name_longer_than_limit() -> Result<()> {
    // Written below the handle, as another tool could have
    let long = format!("{}.txt", "d/".repeat(298));
    assert_eq!(long.len(), 600);

    let store = MemoryStore::new();
    let mut raw = ZipWriter::new(store.open_write()?);
    raw.add_from_buffer(&long, b"x", 0).map_err(Error::from)?;
    raw.add_from_buffer("short.txt", b"y", 0).map_err(Error::from)?;
    raw.finalize().map_err(Error::from)?;
    drop(raw);

    let mut reader = Archive::open(&store, Mode::Read)?;
    assert_eq!(reader.number_of_files(), 2);

    let err = reader.get_file_stat(0).unwrap_err();
    assert!(
        matches!(err, Error::NameTooLong { len: 600, max: MAX_NAME_LEN }),
        "{err:?}"
    );

    // Listing stats every entry, so one oversized name fails all of it
    assert!(matches!(
        reader.list_files(),
        Err(Error::NameTooLong { len: 600, .. })
    ));
    assert_eq!(reader.get_file_stat(1)?.name, "short.txt");

    // Lookup and extraction do not build a FileStat
    assert_eq!(reader.read_file_alloc(&long, LookupOptions::EXACT)?, b"x");
    Ok(())
}

/// A store whose writer fails once `budget` bytes have gone through.
/// It has no `Debug` impl.
struct ShortStore {
    inner: MemoryStore,
    budget: usize,
}

struct ShortWriter {
    inner: Box<dyn Write + Send>,
    left: usize,
}

impl BackingStore for ShortStore {
    fn open_read(&self) -> io::Result<Box<dyn ReadAt>> {
        self.inner.open_read()
    }

    fn open_write(&self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(ShortWriter {
            inner: self.inner.open_write()?,
            left: self.budget,
        }))
    }
}

impl Write for ShortWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() > self.left {
            return Err(io::Error::other("device full"));
        }
        self.left -= buf.len();
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[test]
fn custom_store_round_trip() -> Result<()> {
    let store = ShortStore {
        inner: MemoryStore::new(),
        budget: usize::MAX,
    };
    let mut writer = Archive::open(&store, Mode::Write)?;
    writer.add_file_from_memory("custom.txt", b"through a custom store", None)?;
    writer.close()?;

    let mut reader = Archive::open(&store, Mode::Read)?;
    assert_eq!(
        reader.read_file_alloc("custom.txt", LookupOptions::EXACT)?,
        b"through a custom store"
    );
    Ok(())
}

#[test]
fn failed_finalize_is_reported_by_close() -> Result<()> {
    // Room for the entry (30 + 5 + 3 bytes) but not for the central directory
    let store = ShortStore {
        inner: MemoryStore::new(),
        budget: 40,
    };
    let mut writer = Archive::open(&store, Mode::Write)?;
    writer.add_file_from_memory("a.txt", b"abc", Some(0))?;

    let err = writer.finalize().unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::FileWriteFailed));

    let err = writer.finalize().unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::FileWriteFailed));

    let err = writer.close().unwrap_err();
    assert_eq!(err.kind(), Some(ZipErrorKind::FileWriteFailed));

    assert!(Archive::open(&store, Mode::Read).is_err());
    Ok(())
}
