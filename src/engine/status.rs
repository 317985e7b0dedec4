use std::fmt;

/// Raw status reported by the engine.
///
/// The engine speaks in these compact codes only; [`crate::ZipErrorKind`]
/// is the structured view callers get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const NO_ERROR: Self = Self(0);
    pub const UNDEFINED_ERROR: Self = Self(1);
    pub const TOO_MANY_FILES: Self = Self(2);
    pub const FILE_TOO_LARGE: Self = Self(3);
    pub const UNSUPPORTED_METHOD: Self = Self(4);
    pub const UNSUPPORTED_ENCRYPTION: Self = Self(5);
    pub const UNSUPPORTED_FEATURE: Self = Self(6);
    pub const FAILED_FINDING_CENTRAL_DIR: Self = Self(7);
    pub const NOT_AN_ARCHIVE: Self = Self(8);
    pub const INVALID_HEADER_OR_CORRUPTED: Self = Self(9);
    pub const UNSUPPORTED_MULTIDISK: Self = Self(10);
    pub const DECOMPRESSION_FAILED: Self = Self(11);
    pub const COMPRESSION_FAILED: Self = Self(12);
    pub const UNEXPECTED_DECOMPRESSED_SIZE: Self = Self(13);
    pub const CRC_CHECK_FAILED: Self = Self(14);
    pub const UNSUPPORTED_CDIR_SIZE: Self = Self(15);
    pub const ALLOC_FAILED: Self = Self(16);
    pub const FILE_OPEN_FAILED: Self = Self(17);
    pub const FILE_CREATE_FAILED: Self = Self(18);
    pub const FILE_WRITE_FAILED: Self = Self(19);
    pub const FILE_READ_FAILED: Self = Self(20);
    pub const FILE_CLOSE_FAILED: Self = Self(21);
    pub const FILE_SEEK_FAILED: Self = Self(22);
    pub const FILE_STAT_FAILED: Self = Self(23);
    pub const INVALID_PARAMETER: Self = Self(24);
    pub const INVALID_FILENAME: Self = Self(25);
    pub const BUF_TOO_SMALL: Self = Self(26);
    pub const INTERNAL_ERROR: Self = Self(27);
    pub const FILE_NOT_FOUND: Self = Self(28);
    pub const ARCHIVE_TOO_LARGE: Self = Self(29);
    pub const VALIDATION_FAILED: Self = Self(30);
    pub const WRITE_CALLBACK_FAILED: Self = Self(31);

    /// One past the highest defined code.
    pub const TOTAL: u32 = 32;

    pub fn is_ok(self) -> bool {
        self == Self::NO_ERROR
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine status {}", self.0)
    }
}

/// Result type used throughout the engine.
pub type EngineResult<T> = std::result::Result<T, StatusCode>;
