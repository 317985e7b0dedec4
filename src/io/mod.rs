//! Backing stores that archive sessions are opened against.
//!
//! A store only has to provide two things: a random-access reader for read
//! sessions and a truncating sequential writer for write sessions. Writers
//! never seek; the engine tracks offsets itself.

mod local;
mod memory;

pub use local::LocalFileReader;
pub use memory::{MemoryStore, MemoryWriter};

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Trait for random access reading from a data source
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill the whole buffer starting at `offset`.
    ///
    /// Fails with [`io::ErrorKind::UnexpectedEof`] if the source ends first.
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "source ended before the requested range",
                    ));
                }
                Ok(n) => {
                    offset += n as u64;
                    buf = &mut buf[n..];
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn read_slice_at(data: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= data.len() {
        return 0;
    }
    let n = buf.len().min(data.len() - start);
    buf[..n].copy_from_slice(&data[start..start + n]);
    n
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(read_slice_at(self, offset, buf))
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

impl ReadAt for &'static [u8] {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(read_slice_at(self, offset, buf))
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

/// Something an archive session can be opened against.
///
/// `open_write` must truncate: a write session always produces a fresh archive.
pub trait BackingStore {
    /// Open the store for random-access reading.
    fn open_read(&self) -> io::Result<Box<dyn ReadAt>>;

    /// Open the store for writing, discarding any previous content.
    fn open_write(&self) -> io::Result<Box<dyn Write + Send>>;
}

impl BackingStore for Path {
    fn open_read(&self) -> io::Result<Box<dyn ReadAt>> {
        Ok(Box::new(LocalFileReader::new(self)?))
    }

    fn open_write(&self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(BufWriter::new(File::create(self)?)))
    }
}

impl BackingStore for PathBuf {
    fn open_read(&self) -> io::Result<Box<dyn ReadAt>> {
        self.as_path().open_read()
    }

    fn open_write(&self) -> io::Result<Box<dyn Write + Send>> {
        self.as_path().open_write()
    }
}
