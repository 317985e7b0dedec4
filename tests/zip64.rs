//! Archives in ZIP64 form, built byte by byte.

use anyhow::Result;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

use zipkit::{Archive, CompressionMethod, Error, LookupOptions, MemoryStore, Mode};

struct Entry<'a> {
    name: &'a str,
    data: &'a [u8],
    /// Size recorded in the ZIP64 extra fields.
    uncompressed_size: u64,
}

impl<'a> Entry<'a> {
    fn stored(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            uncompressed_size: data.len() as u64,
        }
    }
}

/// Every size and offset goes through ZIP64 records, the way writers
/// configured to always emit ZIP64 lay it out.
fn zip64_archive(entries: &[Entry<'_>]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut offsets = Vec::new();

    for entry in entries {
        offsets.push(out.len() as u64);
        out.write_all(b"PK\x03\x04")?;
        out.write_u16::<LittleEndian>(45)?;
        out.write_u16::<LittleEndian>(0x0800)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0x21)?;
        out.write_u32::<LittleEndian>(crc32fast::hash(entry.data))?;
        out.write_u32::<LittleEndian>(0xFFFF_FFFF)?;
        out.write_u32::<LittleEndian>(0xFFFF_FFFF)?;
        out.write_u16::<LittleEndian>(entry.name.len() as u16)?;
        out.write_u16::<LittleEndian>(20)?;
        out.write_all(entry.name.as_bytes())?;
        out.write_u16::<LittleEndian>(0x0001)?;
        out.write_u16::<LittleEndian>(16)?;
        out.write_u64::<LittleEndian>(entry.uncompressed_size)?;
        out.write_u64::<LittleEndian>(entry.data.len() as u64)?;
        out.write_all(entry.data)?;
    }

    let cd_offset = out.len() as u64;
    for (entry, &offset) in entries.iter().zip(&offsets) {
        out.write_all(b"PK\x01\x02")?;
        out.write_u16::<LittleEndian>(45)?;
        out.write_u16::<LittleEndian>(45)?;
        out.write_u16::<LittleEndian>(0x0800)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0x21)?;
        out.write_u32::<LittleEndian>(crc32fast::hash(entry.data))?;
        out.write_u32::<LittleEndian>(0xFFFF_FFFF)?;
        out.write_u32::<LittleEndian>(0xFFFF_FFFF)?;
        out.write_u16::<LittleEndian>(entry.name.len() as u16)?;
        out.write_u16::<LittleEndian>(28)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(0xFFFF_FFFF)?;
        out.write_all(entry.name.as_bytes())?;
        out.write_u16::<LittleEndian>(0x0001)?;
        out.write_u16::<LittleEndian>(24)?;
        out.write_u64::<LittleEndian>(entry.uncompressed_size)?;
        out.write_u64::<LittleEndian>(entry.data.len() as u64)?;
        out.write_u64::<LittleEndian>(offset)?;
    }
    let cd_size = out.len() as u64 - cd_offset;

    let eocd64_offset = out.len() as u64;
    out.write_all(b"PK\x06\x06")?;
    out.write_u64::<LittleEndian>(44)?;
    out.write_u16::<LittleEndian>(45)?;
    out.write_u16::<LittleEndian>(45)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u64::<LittleEndian>(entries.len() as u64)?;
    out.write_u64::<LittleEndian>(entries.len() as u64)?;
    out.write_u64::<LittleEndian>(cd_size)?;
    out.write_u64::<LittleEndian>(cd_offset)?;

    out.write_all(b"PK\x06\x07")?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u64::<LittleEndian>(eocd64_offset)?;
    out.write_u32::<LittleEndian>(1)?;

    out.write_all(b"PK\x05\x06")?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(0xFFFF)?;
    out.write_u16::<LittleEndian>(0xFFFF)?;
    out.write_u32::<LittleEndian>(0xFFFF_FFFF)?;
    out.write_u32::<LittleEndian>(0xFFFF_FFFF)?;
    out.write_u16::<LittleEndian>(0)?;
    Ok(out)
}

#[test]
fn reads_zip64_records() -> Result<()> {
    let hello = b"hello from a zip64 archive\n".repeat(4);
    let binary: Vec<u8> = (0..=255u8).collect();
    let bytes = zip64_archive(&[
        Entry::stored("a/hello.txt", &hello),
        Entry::stored("b.bin", &binary),
    ])?;

    let store = MemoryStore::from_bytes(bytes);
    let mut reader = Archive::open(&store, Mode::Read)?;
    assert_eq!(reader.number_of_files(), 2);

    let stats = reader.list_files()?;
    assert_eq!(stats[0].name, "a/hello.txt");
    assert_eq!(stats[0].size, hello.len() as u64);
    assert_eq!(stats[1].name, "b.bin");
    assert_eq!(stats[1].size, 256);
    assert_eq!(stats[1].compressed_size, 256);
    assert_eq!(stats[1].method, CompressionMethod::Stored);

    assert_eq!(reader.read_file_alloc("a/hello.txt", LookupOptions::EXACT)?, hello);
    assert_eq!(reader.read_file_alloc("b.bin", LookupOptions::EXACT)?, binary);
    Ok(())
}

#[test]
fn huge_claimed_size_is_out_of_memory() -> Result<()> {
    let bytes = zip64_archive(&[
        Entry {
            name: "huge.bin",
            data: b"tiny",
            uncompressed_size: 1 << 62,
        },
        Entry::stored("fine.txt", b"fine"),
    ])?;

    let store = MemoryStore::from_bytes(bytes);
    let mut reader = Archive::open(&store, Mode::Read)?;
    assert_eq!(reader.get_file_stat(0)?.size, 1 << 62);

    let err = reader
        .read_file_alloc("huge.bin", LookupOptions::EXACT)
        .unwrap_err();
    assert!(
        matches!(err, Error::OutOfMemory { requested } if requested == 1 << 62),
        "{err:?}"
    );
    assert_eq!(err.kind(), None);

    // The session is unaffected
    assert_eq!(reader.read_file_alloc("fine.txt", LookupOptions::EXACT)?, b"fine");
    Ok(())
}
