//! Read/write archive handle with staged changes.
//!
//! Mutations are recorded per entry slot and only written out when the
//! handle is closed. Closing writes the whole archive to a temporary file
//! next to the target and moves it into place, so a failed commit leaves
//! the previous archive untouched.
//!
//! Each entry is held in memory while it is written: staged files are read
//! whole and new entries are deflated into a second buffer. Peak memory is
//! therefore about twice the largest entry, not the archive size.

use std::fs;
use std::io::{BufWriter, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;

use crate::error::ErrorCode;
use crate::io::{LocalFileReader, os_string_from_bytes};

use super::extractor::{ZipExtractor, write_file};
use super::structures::{CompressionMethod, ZipFileEntry};
use super::writer::{NewEntry, ZipWriter};

/// How to open an archive file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// The archive must already exist
    Existing,
    /// Open an existing archive or start a new one
    Create,
    /// Start a new archive; fail if the file exists
    CreateNew,
    /// Start a new archive, discarding any existing content
    Truncate,
}

/// Entry metadata as reported by [`ZipArchive::stat_index`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub name: Vec<u8>,
    pub index: usize,
    pub size: u64,
    pub compressed_size: u64,
    pub crc32: u32,
    pub modified: Option<SystemTime>,
    pub compression_method: CompressionMethod,
    pub is_directory: bool,
}

#[derive(Debug, Clone)]
enum Source {
    /// Content as stored in the opened archive
    Archive,
    File { path: PathBuf, start: u64, length: u64 },
    Bytes(Vec<u8>),
    Directory,
}

#[derive(Debug, Clone)]
struct Slot {
    original: Option<ZipFileEntry>,
    name: Vec<u8>,
    source: Source,
    comment: Option<Vec<u8>>,
    modified: SystemTime,
    deleted: bool,
}

impl Slot {
    fn is_changed(&self) -> bool {
        match &self.original {
            Some(original) => {
                self.deleted
                    || self.name != original.file_name
                    || !matches!(self.source, Source::Archive)
                    || self.comment.is_some()
            }
            None => !self.deleted,
        }
    }

    fn is_directory(&self) -> bool {
        match (&self.source, &self.original) {
            (Source::Directory, _) => true,
            (Source::Archive, Some(original)) => original.is_directory,
            _ => false,
        }
    }

    fn comment(&self) -> &[u8] {
        match (&self.comment, &self.original) {
            (Some(comment), _) => comment,
            (None, Some(original)) => &original.comment,
            (None, None) => &[],
        }
    }
}

/// An open zip archive
pub struct ZipArchive {
    path: PathBuf,
    extractor: Option<ZipExtractor<LocalFileReader>>,
    slots: Vec<Slot>,
    comment: Vec<u8>,
    /// Set when the file must be (re)written on close even without entry
    /// changes: new or truncated archives
    rewrite: bool,
}

impl ZipArchive {
    /// Open `path` according to `mode`
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self, ErrorCode> {
        let exists = path.exists();

        match mode {
            OpenMode::Existing if !exists => return Err(ErrorCode::NoEntry),
            OpenMode::CreateNew if exists => return Err(ErrorCode::Exists),
            _ => {}
        }

        let mut archive = Self {
            path: path.to_path_buf(),
            extractor: None,
            slots: Vec::new(),
            comment: Vec::new(),
            rewrite: !exists || mode == OpenMode::Truncate,
        };

        if exists && mode != OpenMode::Truncate {
            let reader =
                LocalFileReader::new(path).map_err(|e| ErrorCode::from_io(&e, ErrorCode::Open))?;

            // An empty file is treated as an empty archive
            if crate::io::ReadAt::size(&reader) > 0 {
                let extractor = ZipExtractor::new(reader);
                let entries = extractor.list_files()?;
                archive.comment = extractor.archive_comment()?;
                archive.slots = entries
                    .into_iter()
                    .map(|entry| Slot {
                        name: entry.file_name.clone(),
                        modified: entry.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                        original: Some(entry),
                        source: Source::Archive,
                        comment: None,
                        deleted: false,
                    })
                    .collect();
                archive.extractor = Some(extractor);
            } else {
                archive.rewrite = true;
            }
        }

        log::debug!(
            "opened {} ({mode:?}, {} entries)",
            path.display(),
            archive.slots.len()
        );
        Ok(archive)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entry slots, including deleted ones
    pub fn num_files(&self) -> usize {
        self.slots.len()
    }

    /// Whether any change is pending
    pub fn is_changed(&self) -> bool {
        self.rewrite || self.slots.iter().any(Slot::is_changed)
    }

    /// Index of the live entry called `name`
    pub fn locate(&self, name: &[u8]) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| !slot.deleted && slot.name == name)
    }

    fn slot(&self, index: usize) -> Result<&Slot, ErrorCode> {
        match self.slots.get(index) {
            Some(slot) if slot.deleted => Err(ErrorCode::Deleted),
            Some(slot) => Ok(slot),
            None => Err(ErrorCode::Invalid),
        }
    }

    fn index_of(&self, name: &[u8]) -> Result<usize, ErrorCode> {
        self.locate(name).ok_or(ErrorCode::NoEntry)
    }

    pub fn name_index(&self, index: usize) -> Result<Vec<u8>, ErrorCode> {
        Ok(self.slot(index)?.name.clone())
    }

    pub fn stat_index(&self, index: usize) -> Result<Stat, ErrorCode> {
        let slot = self.slot(index)?;

        let (size, compressed_size, crc32, compression_method) = match &slot.source {
            Source::Archive => {
                let original = slot.original.as_ref().ok_or(ErrorCode::Internal)?;
                (
                    original.uncompressed_size,
                    original.compressed_size,
                    original.crc32,
                    original.compression_method,
                )
            }
            Source::Directory => (0, 0, 0, CompressionMethod::Stored),
            Source::Bytes(data) => (
                data.len() as u64,
                data.len() as u64,
                crc32fast::hash(data),
                CompressionMethod::Stored,
            ),
            Source::File { length, .. } => (*length, *length, 0, CompressionMethod::Stored),
        };

        let modified = match (&slot.source, &slot.original) {
            (Source::Archive, Some(original)) => original.modified(),
            _ => Some(slot.modified),
        };

        Ok(Stat {
            name: slot.name.clone(),
            index,
            size,
            compressed_size,
            crc32,
            modified,
            compression_method,
            is_directory: slot.is_directory(),
        })
    }

    pub fn stat_name(&self, name: &[u8]) -> Result<Stat, ErrorCode> {
        self.stat_index(self.index_of(name)?)
    }

    fn stage(&mut self, name: &[u8], source: Source, modified: SystemTime) {
        match self.locate(name) {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.source = source;
                slot.modified = modified;
            }
            None => self.slots.push(Slot {
                original: None,
                name: name.to_vec(),
                source,
                comment: None,
                modified,
                deleted: false,
            }),
        }
    }

    /// Stage `length` bytes of `source` from offset `start` as entry `name`.
    /// A `length` of zero means up to the end of the file. An existing entry
    /// of the same name is replaced.
    pub fn add_file(
        &mut self,
        source: &Path,
        name: &[u8],
        start: u64,
        length: u64,
    ) -> Result<(), ErrorCode> {
        if name.is_empty() {
            return Err(ErrorCode::Invalid);
        }

        let metadata = fs::metadata(source).map_err(|e| ErrorCode::from_io(&e, ErrorCode::Open))?;
        if !metadata.is_file() || start > metadata.len() {
            return Err(ErrorCode::Invalid);
        }

        let available = metadata.len() - start;
        let length = if length == 0 { available } else { length };
        if length > available {
            return Err(ErrorCode::Invalid);
        }

        let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
        let source = Source::File {
            path: source.to_path_buf(),
            start,
            length,
        };
        log::debug!("add file {}", String::from_utf8_lossy(name));
        self.stage(name, source, modified);
        Ok(())
    }

    /// Stage `contents` as entry `name`, replacing an existing entry
    pub fn add_from_bytes(&mut self, name: &[u8], contents: &[u8]) -> Result<(), ErrorCode> {
        if name.is_empty() {
            return Err(ErrorCode::Invalid);
        }
        log::debug!("add bytes {}", String::from_utf8_lossy(name));
        self.stage(name, Source::Bytes(contents.to_vec()), SystemTime::now());
        Ok(())
    }

    /// Stage a directory entry; a trailing `/` is added when missing
    pub fn add_dir(&mut self, name: &[u8]) -> Result<(), ErrorCode> {
        if name.is_empty() {
            return Err(ErrorCode::Invalid);
        }

        let mut dir = name.to_vec();
        if dir.last() != Some(&b'/') {
            dir.push(b'/');
        }
        if self.locate(&dir).is_some() {
            return Err(ErrorCode::Exists);
        }

        log::debug!("add dir {}", String::from_utf8_lossy(&dir));
        self.stage(&dir, Source::Directory, SystemTime::now());
        Ok(())
    }

    pub fn rename(&mut self, name: &[u8], new_name: &[u8]) -> Result<(), ErrorCode> {
        if new_name.is_empty() {
            return Err(ErrorCode::Invalid);
        }
        let index = self.index_of(name)?;
        if name == new_name {
            return Ok(());
        }
        if self.locate(new_name).is_some() {
            return Err(ErrorCode::Exists);
        }
        self.slots[index].name = new_name.to_vec();
        Ok(())
    }

    pub fn delete(&mut self, name: &[u8]) -> Result<(), ErrorCode> {
        let index = self.index_of(name)?;
        self.slots[index].deleted = true;
        Ok(())
    }

    /// Revert all staged changes of one entry. A live entry is looked up by
    /// its current name, a deleted one by the name it had when deleted.
    /// Reverting a newly added entry drops it.
    pub fn unchange(&mut self, name: &[u8]) -> Result<(), ErrorCode> {
        let index = self
            .locate(name)
            .or_else(|| self.slots.iter().position(|s| s.deleted && s.name == name))
            .ok_or(ErrorCode::NoEntry)?;

        let Some(original) = self.slots[index].original.clone() else {
            self.slots[index].deleted = true;
            return Ok(());
        };

        if let Some(other) = self.locate(&original.file_name) {
            if other != index {
                return Err(ErrorCode::Exists);
            }
        }

        let slot = &mut self.slots[index];
        slot.name = original.file_name.clone();
        slot.source = Source::Archive;
        slot.comment = None;
        slot.modified = original.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        slot.deleted = false;
        Ok(())
    }

    /// Contents of entry `name`; a non-zero `length` caps the result
    pub fn read(&self, name: &[u8], length: usize) -> Result<Vec<u8>, ErrorCode> {
        let mut data = self.contents(self.index_of(name)?)?;
        if length > 0 {
            data.truncate(length);
        }
        Ok(data)
    }

    fn contents(&self, index: usize) -> Result<Vec<u8>, ErrorCode> {
        let slot = self.slot(index)?;
        match &slot.source {
            Source::Archive => {
                let original = slot.original.as_ref().ok_or(ErrorCode::Internal)?;
                self.extractor
                    .as_ref()
                    .ok_or(ErrorCode::Internal)?
                    .extract_to_memory(original)
            }
            Source::File {
                path,
                start,
                length,
            } => read_range(path, *start, *length),
            Source::Bytes(data) => Ok(data.clone()),
            Source::Directory => Ok(Vec::new()),
        }
    }

    pub fn set_comment(&mut self, name: &[u8], comment: &[u8]) -> Result<(), ErrorCode> {
        if comment.len() > u16::MAX as usize {
            return Err(ErrorCode::Invalid);
        }
        let index = self.index_of(name)?;
        self.slots[index].comment = Some(comment.to_vec());
        Ok(())
    }

    pub fn comment(&self, name: &[u8]) -> Result<Vec<u8>, ErrorCode> {
        Ok(self.slot(self.index_of(name)?)?.comment().to_vec())
    }

    /// Write entry `name` below `destination`, using the stored name as the
    /// relative path
    pub fn extract(&self, destination: &Path, name: &[u8]) -> Result<(), ErrorCode> {
        let index = self.index_of(name)?;
        let slot = self.slot(index)?;
        let target = entry_path(destination, name)?;

        if slot.is_directory() {
            return fs::create_dir_all(&target)
                .map_err(|e| ErrorCode::from_io(&e, ErrorCode::Write));
        }

        match (&slot.source, &slot.original, &self.extractor) {
            (Source::Archive, Some(original), Some(extractor)) => {
                extractor.extract_to_file(original, &target)
            }
            _ => {
                write_file(&target, &self.contents(index)?)?;
                let mtime = filetime::FileTime::from_system_time(slot.modified);
                filetime::set_file_mtime(&target, mtime)
                    .map_err(|e| ErrorCode::from_io(&e, ErrorCode::Write))
            }
        }
    }

    /// Commit staged changes. Nothing is written when nothing changed.
    pub fn close(self) -> Result<(), ErrorCode> {
        if !self.is_changed() {
            log::debug!("closed {} without changes", self.path.display());
            return Ok(());
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut temp = NamedTempFile::new_in(&dir).map_err(|_| ErrorCode::TmpOpen)?;

        let written = self.write_to(&mut temp)?;

        let permissions = match fs::metadata(&self.path) {
            Ok(metadata) => fs::set_permissions(temp.path(), metadata.permissions()),
            Err(_) => set_default_permissions(temp.path()),
        };
        if let Err(err) = permissions {
            log::debug!("keeping temp file permissions for {}: {err}", self.path.display());
        }

        temp.persist(&self.path).map_err(|_| ErrorCode::Rename)?;
        log::info!("wrote {} ({written} entries)", self.path.display());
        Ok(())
    }

    fn write_to(&self, temp: &mut NamedTempFile) -> Result<usize, ErrorCode> {
        let write_error = |e: std::io::Error| ErrorCode::from_io(&e, ErrorCode::Write);
        let mut writer = ZipWriter::new(BufWriter::new(temp.as_file_mut()));
        let mut written = 0;

        for (index, slot) in self.slots.iter().enumerate() {
            if slot.deleted {
                continue;
            }

            let meta = NewEntry {
                name: slot.name.clone(),
                modified: slot.modified,
                comment: slot.comment().to_vec(),
            };

            match (&slot.source, &slot.original, &self.extractor) {
                (Source::Archive, Some(original), Some(extractor)) => {
                    let raw = extractor.read_raw(original)?;
                    let mut entry = original.clone();
                    entry.file_name = meta.name;
                    entry.comment = meta.comment;
                    writer.add_raw(&entry, &raw).map_err(write_error)?;
                }
                (Source::Directory, _, _) => writer.add_directory(&meta).map_err(write_error)?,
                _ => {
                    let data = self.contents(index)?;
                    writer.add_file(&meta, &data).map_err(write_error)?;
                }
            }
            written += 1;
        }

        writer.finish(&self.comment).map_err(write_error)?;
        Ok(written)
    }
}

fn read_range(path: &Path, start: u64, length: u64) -> Result<Vec<u8>, ErrorCode> {
    let read_error = |e: std::io::Error| ErrorCode::from_io(&e, ErrorCode::Read);
    let mut file = fs::File::open(path).map_err(|e| ErrorCode::from_io(&e, ErrorCode::Open))?;
    file.seek(SeekFrom::Start(start)).map_err(|_| ErrorCode::Seek)?;

    let mut data = Vec::with_capacity(length as usize);
    file.take(length).read_to_end(&mut data).map_err(read_error)?;
    if data.len() as u64 != length {
        return Err(ErrorCode::Eof);
    }
    Ok(data)
}

/// Map a stored name to a path below `destination`. Leading separators and
/// `.` components are dropped; `..` components and NUL bytes are refused.
fn entry_path(destination: &Path, name: &[u8]) -> Result<PathBuf, ErrorCode> {
    let mut path = destination.to_path_buf();
    for segment in name.split(|&b| b == b'/') {
        match segment {
            b"" | b"." => continue,
            b".." => return Err(ErrorCode::Invalid),
            s if s.contains(&0) => return Err(ErrorCode::Invalid),
            s => path.push(os_string_from_bytes(s)),
        }
    }

    if path == destination {
        return Err(ErrorCode::Invalid);
    }
    Ok(path)
}

#[cfg(unix)]
fn set_default_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
