//! The ZIP codec engine.
//!
//! Everything that touches ZIP bytes lives here: record layouts, central
//! directory parsing, DEFLATE/INFLATE, CRC-32 and entry emission. The
//! [`Archive`](crate::Archive) handle drives it through the narrow surface
//! of [`Engine`] and only ever sees [`StatusCode`]s come back.
//!
//! ## Architecture
//!
//! - [`structures`]: ZIP format records (EOCD, ZIP64, headers, descriptors)
//! - [`parser`]: read sessions
//! - [`writer`]: write sessions
//! - [`status`]: the engine's status code space
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions when reading
//! - STORED and DEFLATE compression methods
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - Writes classic archives only (below 4 GiB, fewer than 65535 entries)

mod parser;
mod status;
mod structures;
mod writer;

pub use parser::ZipReader;
pub use status::{EngineResult, StatusCode};
pub use structures::{CompressionMethod, EntryRecord};
pub use writer::ZipWriter;

use std::path::Path;

use crate::io::BackingStore;

/// Highest accepted compression level.
pub const MAX_LEVEL: u8 = 10;

/// Level used when the caller does not pick one.
pub const DEFAULT_LEVEL: u8 = 6;

/// How [`Engine::locate`] compares names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupOptions {
    /// Require an exact-case match. ASCII case folding otherwise.
    pub case_sensitive: bool,
    /// Compare only the final path component of each entry.
    pub ignore_path: bool,
}

impl LookupOptions {
    /// Full-path, exact-case lookup.
    pub const EXACT: Self = Self {
        case_sensitive: true,
        ignore_path: false,
    };

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    pub fn ignore_path(mut self, yes: bool) -> Self {
        self.ignore_path = yes;
        self
    }
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self::EXACT
    }
}

enum Session {
    Read(ZipReader),
    Write(ZipWriter),
}

/// One engine session, bound to a single backing store.
///
/// Every operation records its outcome so [`Engine::last_error`] reflects
/// the most recent call.
pub struct Engine {
    session: Session,
    last_error: StatusCode,
}

impl Engine {
    pub fn open_read<S: BackingStore + ?Sized>(store: &S) -> EngineResult<Self> {
        let reader = store
            .open_read()
            .map_err(|_| StatusCode::FILE_OPEN_FAILED)?;
        Ok(Self {
            session: Session::Read(ZipReader::open(reader)?),
            last_error: StatusCode::NO_ERROR,
        })
    }

    pub fn open_write<S: BackingStore + ?Sized>(store: &S) -> EngineResult<Self> {
        let sink = store
            .open_write()
            .map_err(|_| StatusCode::FILE_CREATE_FAILED)?;
        Ok(Self {
            session: Session::Write(ZipWriter::new(sink)),
            last_error: StatusCode::NO_ERROR,
        })
    }

    /// Entry count: fixed at open time for reads, growing for writes.
    pub fn num_entries(&self) -> usize {
        match &self.session {
            Session::Read(r) => r.num_entries(),
            Session::Write(w) => w.num_entries(),
        }
    }

    pub fn locate(&mut self, name: &str, options: LookupOptions) -> EngineResult<usize> {
        let result = match &self.session {
            Session::Read(r) => r.locate(name, options),
            Session::Write(_) => Err(StatusCode::INVALID_PARAMETER),
        };
        self.record(result)
    }

    pub fn stat(&mut self, index: usize) -> EngineResult<EntryRecord> {
        let result = match &self.session {
            Session::Read(r) => r.entry(index).cloned(),
            Session::Write(_) => Err(StatusCode::INVALID_PARAMETER),
        };
        self.record(result)
    }

    pub fn extract_to_buffer(&mut self, index: usize, buf: &mut [u8]) -> EngineResult<usize> {
        let result = match &self.session {
            Session::Read(r) => r.extract_to_buffer(index, buf),
            Session::Write(_) => Err(StatusCode::INVALID_PARAMETER),
        };
        self.record(result)
    }

    pub fn add_from_buffer(&mut self, name: &str, data: &[u8], level: u8) -> EngineResult<()> {
        let result = match &mut self.session {
            Session::Write(w) => w.add_from_buffer(name, data, level),
            Session::Read(_) => Err(StatusCode::INVALID_PARAMETER),
        };
        self.record(result)
    }

    pub fn add_from_file(&mut self, name: &str, path: &Path, level: u8) -> EngineResult<()> {
        let result = match &mut self.session {
            Session::Write(w) => w.add_from_file(name, path, level),
            Session::Read(_) => Err(StatusCode::INVALID_PARAMETER),
        };
        self.record(result)
    }

    pub fn finalize(&mut self) -> EngineResult<()> {
        let result = match &mut self.session {
            Session::Write(w) => w.finalize(),
            Session::Read(_) => Err(StatusCode::INVALID_PARAMETER),
        };
        self.record(result)
    }

    pub fn is_finalized(&self) -> bool {
        matches!(&self.session, Session::Write(w) if w.is_finalized())
    }

    /// Flush anything buffered for the backing store.
    ///
    /// The session itself is released when the engine is dropped.
    pub fn close(&mut self) -> EngineResult<()> {
        let result = match &mut self.session {
            Session::Read(_) => Ok(()),
            Session::Write(w) => w.close(),
        };
        self.record(result)
    }

    /// Status of the most recent operation.
    pub fn last_error(&self) -> StatusCode {
        self.last_error
    }

    fn record<T>(&mut self, result: EngineResult<T>) -> EngineResult<T> {
        self.last_error = match &result {
            Ok(_) => StatusCode::NO_ERROR,
            Err(code) => *code,
        };
        result
    }
}
