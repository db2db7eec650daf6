//! # zipname
//!
//! Zip archives whose entry names survive any byte content.
//!
//! Every path segment of an entry name is stored as
//! `<crc32>#<base64>` of the original bytes, so names containing `#`,
//! non-UTF-8 bytes or anything else a zip tool or filesystem might mangle
//! are stored in a plain, portable alphabet. Reading the archive back
//! through an [`ArchiveSession`] reverses the encoding; extraction writes
//! the entries under their stored names first and then renames them on
//! disk to the original names.
//!
//! ## Features
//!
//! - Reversible, checksummed per-segment name encoding ([`codec`])
//! - A self-contained zip engine with staged changes and ZIP64 support ([`zip`])
//! - Two-phase extraction that restores the original names on disk
//! - `create` / `extract` commands behind a small CLI ([`commands`])
//!
//! ## Example
//!
//! ```no_run
//! use zipname::{ArchiveSession, OpenMode};
//!
//! fn main() -> zipname::Result<()> {
//!     let mut session = ArchiveSession::open("photos.zip", OpenMode::CreateNew)?;
//!     session.add_file("/tmp/été #1.jpg", Some(b"vacances/\xe9t\xe9 #1.jpg".as_slice()))?;
//!     session.close()?;
//!
//!     let session = ArchiveSession::open("photos.zip", OpenMode::Existing)?;
//!     for path in session.extract_to(".")? {
//!         println!("{}", path.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod codec;
pub mod commands;
pub mod engine;
pub mod error;
pub mod io;
pub mod session;
pub mod sink;
pub mod zip;

pub use cli::Cli;
pub use engine::ZipEngine;
pub use error::{Error, ErrorCode, FsAction, Result};
pub use session::ArchiveSession;
pub use sink::{ConsoleSink, NullSink, Sink};
pub use zip::{OpenMode, Stat, ZipArchive};
