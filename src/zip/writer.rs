//! Sequential ZIP archive writer.
//!
//! Entries are written as local header + data; the central directory and
//! end records are appended by [`ZipWriter::finish`]. Sizes and CRC are
//! known up front, so no data descriptors are used. ZIP64 records are
//! emitted only when a size, offset or entry count exceeds the classic
//! limits.

use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::{self, Write};
use std::time::SystemTime;

use super::structures::*;

/// Writes a complete archive to `W`
pub struct ZipWriter<W: Write> {
    out: W,
    offset: u64,
    entries: Vec<ZipFileEntry>,
}

/// Metadata for a new entry
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub name: Vec<u8>,
    pub modified: SystemTime,
    pub comment: Vec<u8>,
}

impl<W: Write> ZipWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            offset: 0,
            entries: Vec::new(),
        }
    }

    /// Copy an entry from another archive as-is: method, CRC and sizes are
    /// kept and the data is not recompressed
    pub fn add_raw(&mut self, entry: &ZipFileEntry, raw: &[u8]) -> io::Result<()> {
        let mut entry = entry.clone();
        entry.lfh_offset = self.offset;
        entry.compressed_size = raw.len() as u64;
        self.write_entry(entry, raw)
    }

    /// Add a file entry, deflating the data when that makes it smaller.
    /// Both `data` and its deflated copy are held in memory.
    pub fn add_file(&mut self, meta: &NewEntry, data: &[u8]) -> io::Result<()> {
        let crc32 = crc32fast::hash(data);
        let deflated = deflate(data)?;

        let (method, payload) = if deflated.len() < data.len() {
            (CompressionMethod::Deflate, deflated.as_slice())
        } else {
            (CompressionMethod::Stored, data)
        };

        let (last_mod_time, last_mod_date) = to_dos_datetime(meta.modified);
        let entry = ZipFileEntry {
            file_name: meta.name.clone(),
            comment: meta.comment.clone(),
            compression_method: method,
            flags: 0,
            compressed_size: payload.len() as u64,
            uncompressed_size: data.len() as u64,
            crc32,
            lfh_offset: self.offset,
            last_mod_time,
            last_mod_date,
            external_attrs: UNIX_FILE_ATTRS,
            is_directory: false,
        };
        self.write_entry(entry, payload)
    }

    /// Add a directory entry; the name must end with `/`
    pub fn add_directory(&mut self, meta: &NewEntry) -> io::Result<()> {
        let (last_mod_time, last_mod_date) = to_dos_datetime(meta.modified);
        let entry = ZipFileEntry {
            file_name: meta.name.clone(),
            comment: meta.comment.clone(),
            compression_method: CompressionMethod::Stored,
            flags: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: self.offset,
            last_mod_time,
            last_mod_date,
            external_attrs: UNIX_DIR_ATTRS,
            is_directory: true,
        };
        self.write_entry(entry, &[])
    }

    fn write_entry(&mut self, entry: ZipFileEntry, payload: &[u8]) -> io::Result<()> {
        if entry.file_name.len() > u16::MAX as usize || entry.comment.len() > u16::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "entry name or comment exceeds 65535 bytes",
            ));
        }

        let mut header = Vec::with_capacity(LFH_SIZE + entry.file_name.len() + 20);
        entry.write_local_header(&mut header)?;
        self.out.write_all(&header)?;
        self.out.write_all(payload)?;

        self.offset += (header.len() + payload.len()) as u64;
        self.entries.push(entry);
        Ok(())
    }

    /// Write the central directory and end records; returns the sink
    pub fn finish(mut self, comment: &[u8]) -> io::Result<W> {
        let cd_offset = self.offset;
        let mut directory = Vec::new();
        for entry in &self.entries {
            entry.write_central_header(&mut directory)?;
        }
        self.out.write_all(&directory)?;

        let cd_size = directory.len() as u64;
        let count = self.entries.len() as u64;
        let zip64 = count >= ZIP64_U16 as u64
            || cd_size >= ZIP64_U32 as u64
            || cd_offset >= ZIP64_U32 as u64;

        if zip64 {
            let eocd64_offset = cd_offset + cd_size;
            Zip64EOCD::new(count, cd_size, cd_offset).write_to(&mut self.out)?;
            Zip64EOCDLocator {
                disk_with_eocd64: 0,
                eocd64_offset,
                total_disks: 1,
            }
            .write_to(&mut self.out)?;
        }

        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: count.min(ZIP64_U16 as u64) as u16,
            total_entries: count.min(ZIP64_U16 as u64) as u16,
            cd_size: cd_size.min(ZIP64_U32 as u64) as u32,
            cd_offset: cd_offset.min(ZIP64_U32 as u64) as u32,
            comment_len: comment.len() as u16,
        };
        eocd.write_to(&mut self.out, comment)?;

        self.out.flush()?;
        Ok(self.out)
    }
}

fn deflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::ZipExtractor;
    use std::time::{Duration, UNIX_EPOCH};

    fn meta(name: &[u8]) -> NewEntry {
        NewEntry {
            name: name.to_vec(),
            modified: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            comment: Vec::new(),
        }
    }

    struct ReadBack {
        _file: tempfile::NamedTempFile,
        extractor: ZipExtractor<crate::io::LocalFileReader>,
    }

    impl std::ops::Deref for ReadBack {
        type Target = ZipExtractor<crate::io::LocalFileReader>;

        fn deref(&self) -> &Self::Target {
            &self.extractor
        }
    }

    fn read_back(bytes: Vec<u8>) -> ReadBack {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), bytes).unwrap();
        let reader = crate::io::LocalFileReader::new(file.path()).unwrap();
        ReadBack {
            _file: file,
            extractor: ZipExtractor::new(reader),
        }
    }

    #[test]
    fn writes_readable_archive() {
        let mut writer = ZipWriter::new(Vec::new());
        writer.add_file(&meta(b"plain.txt"), b"hello").unwrap();
        writer
            .add_file(&meta(b"repeat.txt"), &b"abc".repeat(1000))
            .unwrap();
        writer.add_directory(&meta(b"dir/")).unwrap();
        let bytes = writer.finish(b"archive comment").unwrap();

        let extractor = read_back(bytes);
        let entries = extractor.list_files().unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].file_name, b"plain.txt");
        assert_eq!(entries[0].compression_method, CompressionMethod::Stored);
        assert_eq!(extractor.extract_to_memory(&entries[0]).unwrap(), b"hello");

        assert_eq!(entries[1].compression_method, CompressionMethod::Deflate);
        assert_eq!(
            extractor.extract_to_memory(&entries[1]).unwrap(),
            b"abc".repeat(1000)
        );

        assert!(entries[2].is_directory);
    }

    #[test]
    fn raw_copy_preserves_compressed_payload() {
        let mut first = ZipWriter::new(Vec::new());
        first
            .add_file(&meta(b"data.bin"), &[7u8; 4096])
            .unwrap();
        let source = read_back(first.finish(b"").unwrap());
        let entry = source.list_files().unwrap().remove(0);
        let raw = source.read_raw(&entry).unwrap();

        let mut renamed = entry.clone();
        renamed.file_name = b"moved.bin".to_vec();
        let mut second = ZipWriter::new(Vec::new());
        second.add_raw(&renamed, &raw).unwrap();
        let copy = read_back(second.finish(b"").unwrap());

        let entries = copy.list_files().unwrap();
        assert_eq!(entries[0].file_name, b"moved.bin");
        assert_eq!(copy.extract_to_memory(&entries[0]).unwrap(), vec![7u8; 4096]);
    }

    #[test]
    fn entry_comments_are_kept() {
        let mut writer = ZipWriter::new(Vec::new());
        let mut with_comment = meta(b"a");
        with_comment.comment = b"note".to_vec();
        writer.add_file(&with_comment, b"x").unwrap();
        let extractor = read_back(writer.finish(b"").unwrap());
        assert_eq!(extractor.list_files().unwrap()[0].comment, b"note");
    }

    #[test]
    fn empty_archive_is_valid() {
        let bytes = ZipWriter::new(Vec::new()).finish(b"").unwrap();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);
        assert!(read_back(bytes).list_files().unwrap().is_empty());
    }
}
