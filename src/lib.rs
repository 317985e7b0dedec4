//! # zipkit
//!
//! Typed handles for creating and reading ZIP archives.
//!
//! An [`Archive`] is opened in exactly one [`Mode`]. Write sessions append
//! entries from memory, from single files, or from whole directory trees,
//! and are finalized when closed or dropped. Read sessions look entries up
//! by name, report their metadata as [`FileStat`] snapshots, and extract
//! their content.
//!
//! Archives live in any [`BackingStore`]: a path on disk or a
//! [`MemoryStore`].
//!
//! ## Features
//!
//! - STORED and DEFLATE entries, compression levels 0 to 10
//! - Streaming insertion of files, with data descriptors
//! - ZIP64 central directories on read
//! - One closed error enum, [`ZipErrorKind`], covering every engine failure
//!
//! ## Example
//!
//! ```no_run
//! use zipkit::{Archive, LookupOptions, MemoryStore, Mode};
//!
//! fn main() -> zipkit::Result<()> {
//!     let store = MemoryStore::new();
//!
//!     let mut writer = Archive::open(&store, Mode::Write)?;
//!     writer.add_file_from_memory("docs/", b"", None)?;
//!     writer.add_file_from_memory("docs/readme.txt", b"read me", Some(9))?;
//!     writer.close()?;
//!
//!     let mut reader = Archive::open(&store, Mode::Read)?;
//!     for stat in reader.list_files()? {
//!         println!("{} ({} bytes)", stat.name, stat.size);
//!     }
//!
//!     let lookup = LookupOptions::EXACT.case_sensitive(false).ignore_path(true);
//!     let readme = reader.read_file_alloc("README.TXT", lookup)?;
//!     assert_eq!(readme, b"read me");
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod engine;
pub mod error;
pub mod io;
pub mod walk;

pub use archive::{Archive, FileStat, MAX_NAME_LEN, Mode};
pub use engine::{CompressionMethod, DEFAULT_LEVEL, LookupOptions, MAX_LEVEL, StatusCode};
pub use error::{Error, Result, ZipErrorKind};
pub use io::{BackingStore, LocalFileReader, MemoryStore, ReadAt};
pub use walk::{SymlinkPolicy, WalkOptions};
