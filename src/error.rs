//! Error types.
//!
//! The zip engine reports failures as an [`ErrorCode`], mirroring the fixed
//! numeric codes of libzip. [`ArchiveSession`](crate::ArchiveSession)
//! classifies every engine result into an [`Error`] carrying the archive or
//! entry the operation was working on.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric failure codes reported by the zip engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok,
    MultiDisk,
    Rename,
    Close,
    Seek,
    Read,
    Write,
    Crc,
    ZipClosed,
    NoEntry,
    Exists,
    Open,
    TmpOpen,
    Zlib,
    Memory,
    Changed,
    CompressionNotSupported,
    Eof,
    Invalid,
    NotZip,
    Internal,
    Inconsistent,
    Remove,
    Deleted,
    Unknown(i32),
}

impl ErrorCode {
    /// Inverse of [`ErrorCode::code`]
    #[cfg(test)]
    pub(crate) fn from_code(code: i32) -> Self {
        match code {
            0 => ErrorCode::Ok,
            1 => ErrorCode::MultiDisk,
            2 => ErrorCode::Rename,
            3 => ErrorCode::Close,
            4 => ErrorCode::Seek,
            5 => ErrorCode::Read,
            6 => ErrorCode::Write,
            7 => ErrorCode::Crc,
            8 => ErrorCode::ZipClosed,
            9 => ErrorCode::NoEntry,
            10 => ErrorCode::Exists,
            11 => ErrorCode::Open,
            12 => ErrorCode::TmpOpen,
            13 => ErrorCode::Zlib,
            14 => ErrorCode::Memory,
            15 => ErrorCode::Changed,
            16 => ErrorCode::CompressionNotSupported,
            17 => ErrorCode::Eof,
            18 => ErrorCode::Invalid,
            19 => ErrorCode::NotZip,
            20 => ErrorCode::Internal,
            21 => ErrorCode::Inconsistent,
            22 => ErrorCode::Remove,
            23 => ErrorCode::Deleted,
            other => ErrorCode::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::MultiDisk => 1,
            ErrorCode::Rename => 2,
            ErrorCode::Close => 3,
            ErrorCode::Seek => 4,
            ErrorCode::Read => 5,
            ErrorCode::Write => 6,
            ErrorCode::Crc => 7,
            ErrorCode::ZipClosed => 8,
            ErrorCode::NoEntry => 9,
            ErrorCode::Exists => 10,
            ErrorCode::Open => 11,
            ErrorCode::TmpOpen => 12,
            ErrorCode::Zlib => 13,
            ErrorCode::Memory => 14,
            ErrorCode::Changed => 15,
            ErrorCode::CompressionNotSupported => 16,
            ErrorCode::Eof => 17,
            ErrorCode::Invalid => 18,
            ErrorCode::NotZip => 19,
            ErrorCode::Internal => 20,
            ErrorCode::Inconsistent => 21,
            ErrorCode::Remove => 22,
            ErrorCode::Deleted => 23,
            ErrorCode::Unknown(v) => *v,
        }
    }

    /// Human-readable classification of the code.
    pub fn message(&self) -> String {
        let message = match self {
            ErrorCode::Ok => "No error",
            ErrorCode::MultiDisk => "Multi-disk zip archives not supported",
            ErrorCode::Rename => "Renaming temporary file failed",
            ErrorCode::Close => "Closing zip archive failed",
            ErrorCode::Seek => "Seek error",
            ErrorCode::Read => "Read error",
            ErrorCode::Write => "Write error",
            ErrorCode::Crc => "CRC error",
            ErrorCode::ZipClosed => "Containing zip archive was closed",
            ErrorCode::NoEntry => "No such file",
            ErrorCode::Exists => "File already exists",
            ErrorCode::Open => "Can't open file",
            ErrorCode::TmpOpen => "Failure to create temporary file",
            ErrorCode::Zlib => "Zlib error",
            ErrorCode::Memory => "Malloc failure",
            ErrorCode::Changed => "Entry has been changed",
            ErrorCode::CompressionNotSupported => "Compression method not supported",
            ErrorCode::Eof => "Premature EOF",
            ErrorCode::Invalid => "Invalid argument",
            ErrorCode::NotZip => "Not a zip archive",
            ErrorCode::Internal => "Internal error",
            ErrorCode::Inconsistent => "Zip archive inconsistent",
            ErrorCode::Remove => "Can't remove file",
            ErrorCode::Deleted => "Entry has been deleted",
            ErrorCode::Unknown(code) => {
                return format!("An unknown error has occurred ({code})");
            }
        };
        message.to_string()
    }

    /// Map an I/O failure to the closest engine code.
    pub(crate) fn from_io(err: &io::Error, fallback: ErrorCode) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ErrorCode::NoEntry,
            io::ErrorKind::AlreadyExists => ErrorCode::Exists,
            io::ErrorKind::UnexpectedEof => ErrorCode::Eof,
            io::ErrorKind::OutOfMemory => ErrorCode::Memory,
            io::ErrorKind::InvalidInput => ErrorCode::Invalid,
            _ => fallback,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for ErrorCode {}

/// Which filesystem step of the reconciliation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsAction {
    RenameDirectory,
    RenameFile,
    Overwrite,
    Merge,
}

impl fmt::Display for FsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FsAction::RenameDirectory => "rename directory",
            FsAction::RenameFile => "rename file",
            FsAction::Overwrite => "overwrite file",
            FsAction::Merge => "merge directory",
        })
    }
}

/// Errors surfaced by [`ArchiveSession`](crate::ArchiveSession).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed path, missing parent directory or unreadable source.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The zip engine reported a failure code.
    #[error("{code} (code {}) at <{context}>", .code.code())]
    Engine { code: ErrorCode, context: String },

    /// A rename or delete failed while restoring original names.
    #[error("cannot {action} <{}> to <{}>: {source}", .from.display(), .to.display())]
    Filesystem {
        action: FsAction,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The archive contains names that cannot be materialized safely.
    #[error("broken archive <{archive}>: {reason}")]
    BrokenArchive { archive: String, reason: String },

    /// Not every entry could be extracted or renamed.
    #[error("incomplete archive <{archive}>: {detail}")]
    IncompleteArchive {
        archive: String,
        detail: String,
        code: Option<ErrorCode>,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Engine code behind this error, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Engine { code, .. } => Some(*code),
            Error::IncompleteArchive { code, .. } => *code,
            _ => None,
        }
    }
}
