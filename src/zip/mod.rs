//! ZIP archive reading, writing and editing.
//!
//! This module is the zip engine underneath
//! [`ArchiveSession`](crate::ArchiveSession). It knows nothing about name
//! encoding: names are opaque byte strings and every operation reports
//! failure as an [`ErrorCode`](crate::ErrorCode).
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`extractor`]: Decompression and extraction of single entries
//! - [`writer`]: Sequential writing of a complete archive
//! - [`archive`]: An open archive with staged changes, committed on close
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB, both reading and writing
//! - STORED (no compression) and DEFLATE methods
//! - Entry comments
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

pub mod archive;
pub mod extractor;
pub mod parser;
pub mod structures;
pub mod writer;

pub use archive::{OpenMode, Stat, ZipArchive};
pub use extractor::ZipExtractor;
pub use parser::ZipParser;
pub use structures::*;
pub use writer::{NewEntry, ZipWriter};
