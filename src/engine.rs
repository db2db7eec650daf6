//! The zip engine contract used by [`ArchiveSession`](crate::ArchiveSession).
//!
//! Names crossing this trait are the literal stored names. Every operation
//! reports failure as an [`ErrorCode`]; the session is responsible for
//! translating codes into [`Error`](crate::Error)s.

use std::path::Path;

use crate::error::ErrorCode;
use crate::zip::{Stat, ZipArchive};

pub trait ZipEngine {
    /// Number of entry slots, including deleted ones
    fn num_files(&self) -> usize;

    fn name_index(&self, index: usize) -> Result<Vec<u8>, ErrorCode>;

    fn stat_index(&self, index: usize) -> Result<Stat, ErrorCode>;

    fn stat_name(&self, name: &[u8]) -> Result<Stat, ErrorCode>;

    fn add_file(&mut self, source: &Path, name: &[u8], start: u64, length: u64)
    -> Result<(), ErrorCode>;

    fn add_from_bytes(&mut self, name: &[u8], contents: &[u8]) -> Result<(), ErrorCode>;

    fn add_dir(&mut self, name: &[u8]) -> Result<(), ErrorCode>;

    fn rename(&mut self, name: &[u8], new_name: &[u8]) -> Result<(), ErrorCode>;

    fn delete(&mut self, name: &[u8]) -> Result<(), ErrorCode>;

    fn unchange(&mut self, name: &[u8]) -> Result<(), ErrorCode>;

    fn read(&self, name: &[u8], length: usize) -> Result<Vec<u8>, ErrorCode>;

    fn set_comment(&mut self, name: &[u8], comment: &[u8]) -> Result<(), ErrorCode>;

    fn comment(&self, name: &[u8]) -> Result<Vec<u8>, ErrorCode>;

    /// Extract the single entry `name` below `destination`
    fn extract(&self, destination: &Path, name: &[u8]) -> Result<(), ErrorCode>;

    /// Commit pending changes and release the handle
    fn close(self) -> Result<(), ErrorCode>
    where
        Self: Sized;
}

impl ZipEngine for ZipArchive {
    fn num_files(&self) -> usize {
        ZipArchive::num_files(self)
    }

    fn name_index(&self, index: usize) -> Result<Vec<u8>, ErrorCode> {
        ZipArchive::name_index(self, index)
    }

    fn stat_index(&self, index: usize) -> Result<Stat, ErrorCode> {
        ZipArchive::stat_index(self, index)
    }

    fn stat_name(&self, name: &[u8]) -> Result<Stat, ErrorCode> {
        ZipArchive::stat_name(self, name)
    }

    fn add_file(
        &mut self,
        source: &Path,
        name: &[u8],
        start: u64,
        length: u64,
    ) -> Result<(), ErrorCode> {
        ZipArchive::add_file(self, source, name, start, length)
    }

    fn add_from_bytes(&mut self, name: &[u8], contents: &[u8]) -> Result<(), ErrorCode> {
        ZipArchive::add_from_bytes(self, name, contents)
    }

    fn add_dir(&mut self, name: &[u8]) -> Result<(), ErrorCode> {
        ZipArchive::add_dir(self, name)
    }

    fn rename(&mut self, name: &[u8], new_name: &[u8]) -> Result<(), ErrorCode> {
        ZipArchive::rename(self, name, new_name)
    }

    fn delete(&mut self, name: &[u8]) -> Result<(), ErrorCode> {
        ZipArchive::delete(self, name)
    }

    fn unchange(&mut self, name: &[u8]) -> Result<(), ErrorCode> {
        ZipArchive::unchange(self, name)
    }

    fn read(&self, name: &[u8], length: usize) -> Result<Vec<u8>, ErrorCode> {
        ZipArchive::read(self, name, length)
    }

    fn set_comment(&mut self, name: &[u8], comment: &[u8]) -> Result<(), ErrorCode> {
        ZipArchive::set_comment(self, name, comment)
    }

    fn comment(&self, name: &[u8]) -> Result<Vec<u8>, ErrorCode> {
        ZipArchive::comment(self, name)
    }

    fn extract(&self, destination: &Path, name: &[u8]) -> Result<(), ErrorCode> {
        ZipArchive::extract(self, destination, name)
    }

    fn close(self) -> Result<(), ErrorCode> {
        ZipArchive::close(self)
    }
}
