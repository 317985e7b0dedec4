//! Error types for `zipkit`

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::StatusCode;

/// One kind per engine status.
///
/// The engine's status space is closed, and so is this enum: there is no
/// catch-all member.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZipErrorKind {
    #[error("undefined engine error")]
    Undefined,
    #[error("too many files in archive")]
    TooManyFiles,
    #[error("file too large")]
    FileTooLarge,
    #[error("unsupported compression method")]
    UnsupportedMethod,
    #[error("unsupported encryption")]
    UnsupportedEncryption,
    #[error("unsupported feature")]
    UnsupportedFeature,
    #[error("central directory not found")]
    CentralDirectoryNotFound,
    #[error("not a ZIP archive")]
    NotAnArchive,
    #[error("invalid or corrupted header")]
    CorruptedHeader,
    #[error("multi-disk archives are not supported")]
    UnsupportedMultidisk,
    #[error("decompression failed")]
    DecompressionFailed,
    #[error("compression failed")]
    CompressionFailed,
    #[error("unexpected decompressed size")]
    UnexpectedDecompressedSize,
    #[error("CRC-32 check failed")]
    CrcCheckFailed,
    #[error("unsupported central directory size")]
    UnsupportedCentralDirSize,
    #[error("engine allocation failed")]
    AllocationFailed,
    #[error("file open failed")]
    FileOpenFailed,
    #[error("file create failed")]
    FileCreateFailed,
    #[error("file write failed")]
    FileWriteFailed,
    #[error("file read failed")]
    FileReadFailed,
    #[error("file close failed")]
    FileCloseFailed,
    #[error("file seek failed")]
    FileSeekFailed,
    #[error("file stat failed")]
    FileStatFailed,
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("invalid filename")]
    InvalidFilename,
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("internal engine error")]
    InternalError,
    #[error("file not found in archive")]
    FileNotFound,
    #[error("archive too large")]
    ArchiveTooLarge,
    #[error("validation failed")]
    ValidationFailed,
    #[error("write callback failed")]
    WriteCallbackFailed,
}

impl ZipErrorKind {
    /// Map an engine status to its error kind.
    ///
    /// # Panics
    ///
    /// On [`StatusCode::NO_ERROR`] or any code the engine does not define.
    /// Either means the engine binding itself is broken.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNDEFINED_ERROR => Self::Undefined,
            StatusCode::TOO_MANY_FILES => Self::TooManyFiles,
            StatusCode::FILE_TOO_LARGE => Self::FileTooLarge,
            StatusCode::UNSUPPORTED_METHOD => Self::UnsupportedMethod,
            StatusCode::UNSUPPORTED_ENCRYPTION => Self::UnsupportedEncryption,
            StatusCode::UNSUPPORTED_FEATURE => Self::UnsupportedFeature,
            StatusCode::FAILED_FINDING_CENTRAL_DIR => Self::CentralDirectoryNotFound,
            StatusCode::NOT_AN_ARCHIVE => Self::NotAnArchive,
            StatusCode::INVALID_HEADER_OR_CORRUPTED => Self::CorruptedHeader,
            StatusCode::UNSUPPORTED_MULTIDISK => Self::UnsupportedMultidisk,
            StatusCode::DECOMPRESSION_FAILED => Self::DecompressionFailed,
            StatusCode::COMPRESSION_FAILED => Self::CompressionFailed,
            StatusCode::UNEXPECTED_DECOMPRESSED_SIZE => Self::UnexpectedDecompressedSize,
            StatusCode::CRC_CHECK_FAILED => Self::CrcCheckFailed,
            StatusCode::UNSUPPORTED_CDIR_SIZE => Self::UnsupportedCentralDirSize,
            StatusCode::ALLOC_FAILED => Self::AllocationFailed,
            StatusCode::FILE_OPEN_FAILED => Self::FileOpenFailed,
            StatusCode::FILE_CREATE_FAILED => Self::FileCreateFailed,
            StatusCode::FILE_WRITE_FAILED => Self::FileWriteFailed,
            StatusCode::FILE_READ_FAILED => Self::FileReadFailed,
            StatusCode::FILE_CLOSE_FAILED => Self::FileCloseFailed,
            StatusCode::FILE_SEEK_FAILED => Self::FileSeekFailed,
            StatusCode::FILE_STAT_FAILED => Self::FileStatFailed,
            StatusCode::INVALID_PARAMETER => Self::InvalidParameter,
            StatusCode::INVALID_FILENAME => Self::InvalidFilename,
            StatusCode::BUF_TOO_SMALL => Self::BufferTooSmall,
            StatusCode::INTERNAL_ERROR => Self::InternalError,
            StatusCode::FILE_NOT_FOUND => Self::FileNotFound,
            StatusCode::ARCHIVE_TOO_LARGE => Self::ArchiveTooLarge,
            StatusCode::VALIDATION_FAILED => Self::ValidationFailed,
            StatusCode::WRITE_CALLBACK_FAILED => Self::WriteCallbackFailed,
            StatusCode::NO_ERROR => {
                panic!("internal consistency fault: engine reported failure with status 0")
            }
            StatusCode(code) => {
                panic!("internal consistency fault: undefined engine status {code}")
            }
        }
    }
}

/// The error type for `zipkit` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The engine reported a failure.
    #[error("ZIP error: {0}")]
    Zip(#[from] ZipErrorKind),

    /// A caller-side buffer could not be allocated.
    ///
    /// Distinct from [`ZipErrorKind::AllocationFailed`], which is the
    /// engine's own bookkeeping running out of memory.
    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory { requested: u64 },

    /// An entry name is longer than [`crate::MAX_NAME_LEN`].
    #[error("entry name is {len} bytes, limit is {max}")]
    NameTooLong { len: usize, max: usize },

    /// Directory traversal failed during `add_dir`.
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// A walked path cannot be represented as an archive name.
    #[error("path is not valid UTF-8: {}", path.display())]
    NonUtf8Path { path: PathBuf },
}

impl Error {
    /// The engine error kind, if this error came from the engine.
    pub fn kind(&self) -> Option<ZipErrorKind> {
        match self {
            Error::Zip(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl From<StatusCode> for Error {
    fn from(status: StatusCode) -> Self {
        Error::Zip(ZipErrorKind::from_status(status))
    }
}

/// Result type alias for `zipkit` operations.
pub type Result<T> = std::result::Result<T, Error>;
