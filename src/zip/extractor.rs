use flate2::read::DeflateDecoder;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::ErrorCode;
use crate::io::ReadAt;

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all files in the archive
    pub fn list_files(&self) -> Result<Vec<ZipFileEntry>, ErrorCode> {
        self.parser.list_files()
    }

    /// Archive-level comment
    pub fn archive_comment(&self) -> Result<Vec<u8>, ErrorCode> {
        self.parser.archive_comment()
    }

    /// Compressed bytes of an entry, for copying it into a new archive
    /// without recompressing
    pub fn read_raw(&self, entry: &ZipFileEntry) -> Result<Vec<u8>, ErrorCode> {
        self.parser.read_raw(entry)
    }

    /// Extract file data to memory, verifying its CRC-32
    pub fn extract_to_memory(&self, entry: &ZipFileEntry) -> Result<Vec<u8>, ErrorCode> {
        if entry.is_encrypted() {
            return Err(ErrorCode::CompressionNotSupported);
        }

        let raw = self.parser.read_raw(entry)?;

        let data = match entry.compression_method {
            CompressionMethod::Stored => raw,
            CompressionMethod::Deflate => {
                // The declared size is untrusted: never allocate from it, and
                // stop one byte past it so oversized output is caught below
                let mut data = Vec::with_capacity(raw.len().saturating_mul(4));
                DeflateDecoder::new(raw.as_slice())
                    .take(entry.uncompressed_size.saturating_add(1))
                    .read_to_end(&mut data)
                    .map_err(|_| ErrorCode::Zlib)?;
                data
            }
            CompressionMethod::Unknown(method) => {
                log::debug!("unsupported compression method {method}");
                return Err(ErrorCode::CompressionNotSupported);
            }
        };

        if data.len() as u64 != entry.uncompressed_size {
            return Err(ErrorCode::Inconsistent);
        }
        if crc32fast::hash(&data) != entry.crc32 {
            return Err(ErrorCode::Crc);
        }

        Ok(data)
    }

    /// Extract file to disk, creating parent directories and applying the
    /// entry's modification time
    pub fn extract_to_file(&self, entry: &ZipFileEntry, output_path: &Path) -> Result<(), ErrorCode> {
        let data = self.extract_to_memory(entry)?;
        write_file(output_path, &data)?;

        if let Some(modified) = entry.modified() {
            let mtime = filetime::FileTime::from_system_time(modified);
            filetime::set_file_mtime(output_path, mtime)
                .map_err(|e| ErrorCode::from_io(&e, ErrorCode::Write))?;
        }

        Ok(())
    }
}

/// Write `data` to `path`, creating parent directories if needed
pub(crate) fn write_file(path: &Path, data: &[u8]) -> Result<(), ErrorCode> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ErrorCode::from_io(&e, ErrorCode::Write))?;
        }
    }

    let mut file = fs::File::create(path).map_err(|e| ErrorCode::from_io(&e, ErrorCode::Open))?;
    file.write_all(data)
        .map_err(|e| ErrorCode::from_io(&e, ErrorCode::Write))
}
