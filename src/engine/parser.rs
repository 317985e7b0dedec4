//! Read sessions.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header and data
//!
//! The whole central directory is parsed once at open time; the entry list
//! and its indices stay fixed for the life of the session.

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;
use std::io::{self, Cursor, Read};

use crate::io::ReadAt;

use super::LookupOptions;
use super::status::{EngineResult, StatusCode};
use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// An open read session over one archive.
pub struct ZipReader {
    /// The underlying data source
    reader: Box<dyn ReadAt>,
    /// Total size of the archive in bytes
    size: u64,
    entries: Vec<EntryRecord>,
}

impl ZipReader {
    /// Parse the archive's directory and keep the reader for extraction.
    pub fn open(reader: Box<dyn ReadAt>) -> EngineResult<Self> {
        let size = reader.size();
        let mut session = Self {
            reader,
            size,
            entries: Vec::new(),
        };
        session.entries = session.read_central_directory()?;
        Ok(session)
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, index: usize) -> EngineResult<&EntryRecord> {
        self.entries.get(index).ok_or(StatusCode::INVALID_PARAMETER)
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Returns the record and its offset in the archive.
    fn find_eocd(&self) -> EngineResult<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            return Err(StatusCode::NOT_AN_ARCHIVE);
        }

        // Common case first: no archive comment
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = [0u8; EndOfCentralDirectory::SIZE];
        self.read_exact_at(offset, &mut buf)?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && buf[20..22] == [0, 0] {
            return Ok((EndOfCentralDirectory::from_bytes(&buf)?, offset));
        }

        // Otherwise scan backwards through the largest possible comment
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.read_exact_at(search_start, &mut buf)?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }
            // The comment must fit in what follows; trailing padding is tolerated
            let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
            if comment_len <= buf.len() - i - EndOfCentralDirectory::SIZE {
                let eocd =
                    EndOfCentralDirectory::from_bytes(&buf[i..i + EndOfCentralDirectory::SIZE])?;
                return Ok((eocd, search_start + i as u64));
            }
        }

        Err(StatusCode::FAILED_FINDING_CENTRAL_DIR)
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD has saturated fields. The locator sits
    /// immediately before the regular EOCD.
    fn read_zip64_eocd(&self, eocd_offset: u64) -> EngineResult<Zip64EOCD> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or(StatusCode::INVALID_HEADER_OR_CORRUPTED)?;
        let mut locator_buf = [0u8; Zip64EOCDLocator::SIZE];
        self.read_exact_at(locator_offset, &mut locator_buf)?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;
        if locator.total_disks > 1 || locator.disk_with_eocd64 != 0 {
            return Err(StatusCode::UNSUPPORTED_MULTIDISK);
        }
        if locator
            .eocd64_offset
            .checked_add(Zip64EOCD::MIN_SIZE as u64)
            .is_none_or(|end| end > locator_offset)
        {
            return Err(StatusCode::INVALID_HEADER_OR_CORRUPTED);
        }

        let mut eocd64_buf = [0u8; Zip64EOCD::MIN_SIZE];
        self.read_exact_at(locator.eocd64_offset, &mut eocd64_buf)?;
        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// Locate, bound-check and parse the whole Central Directory.
    fn read_central_directory(&self) -> EngineResult<Vec<EntryRecord>> {
        let (eocd, eocd_offset) = self.find_eocd()?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset)?;
            if eocd64.disk_number != 0
                || eocd64.disk_with_cd != 0
                || eocd64.disk_entries != eocd64.total_entries
            {
                return Err(StatusCode::UNSUPPORTED_MULTIDISK);
            }
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            if eocd.disk_number != 0
                || eocd.disk_with_cd != 0
                || eocd.disk_entries != eocd.total_entries
            {
                return Err(StatusCode::UNSUPPORTED_MULTIDISK);
            }
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if total_entries > u32::MAX as u64 {
            return Err(StatusCode::TOO_MANY_FILES);
        }
        if cd_size > u32::MAX as u64 {
            return Err(StatusCode::UNSUPPORTED_CDIR_SIZE);
        }
        if cd_size < total_entries * CDFH_MIN_SIZE as u64
            || cd_offset
                .checked_add(cd_size)
                .is_none_or(|end| end > self.size)
        {
            return Err(StatusCode::INVALID_HEADER_OR_CORRUPTED);
        }

        // One read for the whole directory
        let mut cd_data = Vec::new();
        cd_data
            .try_reserve_exact(cd_size as usize)
            .map_err(|_| StatusCode::ALLOC_FAILED)?;
        cd_data.resize(cd_size as usize, 0);
        self.read_exact_at(cd_offset, &mut cd_data)?;

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());
        for _ in 0..total_entries {
            entries.push(parse_cdfh(&mut cursor)?);
        }

        Ok(entries)
    }

    /// Get the actual data offset for a file entry.
    ///
    /// The local header's name and extra field may differ in length from
    /// the central directory copy, so it has to be read.
    fn data_offset(&self, entry: &EntryRecord) -> EngineResult<u64> {
        let mut lfh_buf = [0u8; LFH_SIZE];
        self.read_exact_at(entry.lfh_offset, &mut lfh_buf)?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(StatusCode::INVALID_HEADER_OR_CORRUPTED);
        }

        let file_name_length = u16::from_le_bytes([lfh_buf[26], lfh_buf[27]]) as u64;
        let extra_field_length = u16::from_le_bytes([lfh_buf[28], lfh_buf[29]]) as u64;

        Ok(entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length)
    }

    /// Find an entry by name.
    pub fn locate(&self, name: &str, options: LookupOptions) -> EngineResult<usize> {
        if name.is_empty() || name.len() > u16::MAX as usize {
            return Err(StatusCode::INVALID_PARAMETER);
        }

        self.entries
            .iter()
            .position(|entry| {
                let candidate = if options.ignore_path {
                    base_name(&entry.file_name)
                } else {
                    entry.file_name.as_str()
                };
                if options.case_sensitive {
                    candidate == name
                } else {
                    candidate.eq_ignore_ascii_case(name)
                }
            })
            .ok_or(StatusCode::FILE_NOT_FOUND)
    }

    /// Decompress entry `index` into the front of `buf`.
    ///
    /// Returns the number of bytes written, which is the entry's size.
    pub fn extract_to_buffer(&self, index: usize, buf: &mut [u8]) -> EngineResult<usize> {
        let entry = self.entry(index)?;

        if entry.is_directory() && entry.uncompressed_size == 0 {
            return Ok(0);
        }
        if entry.is_encrypted() {
            return Err(StatusCode::UNSUPPORTED_ENCRYPTION);
        }
        if !entry.is_supported() {
            return Err(StatusCode::UNSUPPORTED_METHOD);
        }

        let size =
            usize::try_from(entry.uncompressed_size).map_err(|_| StatusCode::BUF_TOO_SMALL)?;
        if buf.len() < size {
            return Err(StatusCode::BUF_TOO_SMALL);
        }
        let out = &mut buf[..size];

        let data_offset = self.data_offset(entry)?;
        if data_offset
            .checked_add(entry.compressed_size)
            .is_none_or(|end| end > self.size)
        {
            return Err(StatusCode::INVALID_HEADER_OR_CORRUPTED);
        }

        match entry.compression_method {
            CompressionMethod::Stored => {
                if entry.compressed_size != entry.uncompressed_size {
                    return Err(StatusCode::INVALID_HEADER_OR_CORRUPTED);
                }
                self.read_exact_at(data_offset, out)?;
            }
            CompressionMethod::Deflate => {
                let compressed_len =
                    usize::try_from(entry.compressed_size).map_err(|_| StatusCode::ALLOC_FAILED)?;
                let mut compressed = Vec::new();
                compressed
                    .try_reserve_exact(compressed_len)
                    .map_err(|_| StatusCode::ALLOC_FAILED)?;
                compressed.resize(compressed_len, 0);
                self.read_exact_at(data_offset, &mut compressed)?;
                inflate(&compressed, out)?;
            }
            CompressionMethod::Unknown(_) => return Err(StatusCode::UNSUPPORTED_METHOD),
        }

        if crc32fast::hash(out) != entry.crc32 {
            return Err(StatusCode::CRC_CHECK_FAILED);
        }

        Ok(size)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> EngineResult<()> {
        self.reader
            .read_exact_at(offset, buf)
            .map_err(|_| StatusCode::FILE_READ_FAILED)
    }
}

/// Parse a Central Directory File Header from a cursor.
///
/// A truncated or mis-signed header means the directory is corrupt.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> EngineResult<EntryRecord> {
    read_cdfh(cursor).map_err(|_| StatusCode::INVALID_HEADER_OR_CORRUPTED)?
}

fn read_cdfh(cursor: &mut Cursor<&[u8]>) -> io::Result<EngineResult<EntryRecord>> {
    // Read and verify the signature (PK\x01\x02)
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        return Ok(Err(StatusCode::INVALID_HEADER_OR_CORRUPTED));
    }

    let version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let file_comment_length = cursor.read_u16::<LittleEndian>()?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let external_attrs = cursor.read_u32::<LittleEndian>()?;
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut file_name_bytes = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name_bytes)?;
    // Non-UTF-8 names (legacy code pages) are kept readable rather than rejected
    let file_name = String::from_utf8_lossy(&file_name_bytes).into_owned();

    let extra_field_end = cursor.position() + extra_field_length as u64;
    if extra_field_end > cursor.get_ref().len() as u64 {
        return Ok(Err(StatusCode::INVALID_HEADER_OR_CORRUPTED));
    }

    while cursor.position() + 4 <= extra_field_end {
        let header_id = cursor.read_u16::<LittleEndian>()?;
        let field_size = cursor.read_u16::<LittleEndian>()?;
        let field_end = cursor.position() + field_size as u64;

        if header_id == ZIP64_EXTRA_ID {
            // Present only for header fields saturated at 0xFFFFFFFF, in this order
            if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                uncompressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                compressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                lfh_offset = cursor.read_u64::<LittleEndian>()?;
            }
        }
        cursor.set_position(field_end);
    }

    cursor.set_position(extra_field_end + file_comment_length as u64);
    if cursor.position() > cursor.get_ref().len() as u64 {
        return Ok(Err(StatusCode::INVALID_HEADER_OR_CORRUPTED));
    }

    Ok(Ok(EntryRecord {
        file_name,
        version_made_by,
        flags,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
        last_mod_time,
        last_mod_date,
        external_attrs,
    }))
}

/// Final path component, splitting on any separator an archiver might have used.
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\', ':']).next().unwrap_or(name)
}

/// Inflate `compressed` so that it fills `out` exactly.
fn inflate(compressed: &[u8], out: &mut [u8]) -> EngineResult<()> {
    let mut decoder = DeflateDecoder::new(compressed);
    let mut filled = 0;
    while filled < out.len() {
        match decoder.read(&mut out[filled..]) {
            Ok(0) => return Err(StatusCode::UNEXPECTED_DECOMPRESSED_SIZE),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(_) => return Err(StatusCode::DECOMPRESSION_FAILED),
        }
    }

    // The stream must end exactly where the recorded size says
    let mut probe = [0u8; 1];
    match decoder.read(&mut probe) {
        Ok(0) => Ok(()),
        Ok(_) => Err(StatusCode::UNEXPECTED_DECOMPRESSED_SIZE),
        Err(_) => Err(StatusCode::DECOMPRESSION_FAILED),
    }
}
