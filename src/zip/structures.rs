use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike};
use std::io::{self, Cursor, Write};
use std::time::SystemTime;

use crate::error::ErrorCode;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Sentinel stored in 16-bit fields whose value lives in ZIP64 records
pub const ZIP64_U16: u16 = 0xFFFF;
/// Sentinel stored in 32-bit fields whose value lives in ZIP64 records
pub const ZIP64_U32: u32 = 0xFFFF_FFFF;
/// Extra field id of the ZIP64 extended information block
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// General purpose flag: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// Version needed to extract: 2.0 (deflate, directories)
pub const VERSION_DEFAULT: u16 = 20;
/// Version needed to extract: 4.5 (ZIP64)
pub const VERSION_ZIP64: u16 = 45;
/// Version made by: UNIX host, APPNOTE 4.5
pub const VERSION_MADE_BY: u16 = (3 << 8) | VERSION_ZIP64;

/// External attributes for a regular file (`-rw-r--r--`)
pub const UNIX_FILE_ATTRS: u32 = 0o100644 << 16;
/// External attributes for a directory (`drwxr-xr-x`, MS-DOS directory bit)
pub const UNIX_DIR_ATTRS: u32 = (0o040755 << 16) | 0x10;

fn read_error(_: io::Error) -> ErrorCode {
    ErrorCode::Inconsistent
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self, ErrorCode> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ErrorCode::NotZip);
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>().map_err(read_error)?,
            disk_with_cd: cursor.read_u16::<LittleEndian>().map_err(read_error)?,
            disk_entries: cursor.read_u16::<LittleEndian>().map_err(read_error)?,
            total_entries: cursor.read_u16::<LittleEndian>().map_err(read_error)?,
            cd_size: cursor.read_u32::<LittleEndian>().map_err(read_error)?,
            cd_offset: cursor.read_u32::<LittleEndian>().map_err(read_error)?,
            comment_len: cursor.read_u16::<LittleEndian>().map_err(read_error)?,
        })
    }

    pub fn write_to<W: Write>(&self, out: &mut W, comment: &[u8]) -> io::Result<()> {
        out.write_all(Self::SIGNATURE)?;
        out.write_u16::<LittleEndian>(self.disk_number)?;
        out.write_u16::<LittleEndian>(self.disk_with_cd)?;
        out.write_u16::<LittleEndian>(self.disk_entries)?;
        out.write_u16::<LittleEndian>(self.total_entries)?;
        out.write_u32::<LittleEndian>(self.cd_size)?;
        out.write_u32::<LittleEndian>(self.cd_offset)?;
        out.write_u16::<LittleEndian>(comment.len() as u16)?;
        out.write_all(comment)
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == ZIP64_U16
            || self.total_entries == ZIP64_U16
            || self.cd_size == ZIP64_U32
            || self.cd_offset == ZIP64_U32
    }

    pub fn is_multi_disk(&self) -> bool {
        self.disk_number != 0 || self.disk_with_cd != 0 || self.disk_entries != self.total_entries
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self, ErrorCode> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ErrorCode::Inconsistent);
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>().map_err(read_error)?,
            eocd64_offset: cursor.read_u64::<LittleEndian>().map_err(read_error)?,
            total_disks: cursor.read_u32::<LittleEndian>().map_err(read_error)?,
        })
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(Self::SIGNATURE)?;
        out.write_u32::<LittleEndian>(self.disk_with_eocd64)?;
        out.write_u64::<LittleEndian>(self.eocd64_offset)?;
        out.write_u32::<LittleEndian>(self.total_disks)
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self, ErrorCode> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ErrorCode::Inconsistent);
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>().map_err(read_error)?,
            version_made_by: cursor.read_u16::<LittleEndian>().map_err(read_error)?,
            version_needed: cursor.read_u16::<LittleEndian>().map_err(read_error)?,
            disk_number: cursor.read_u32::<LittleEndian>().map_err(read_error)?,
            disk_with_cd: cursor.read_u32::<LittleEndian>().map_err(read_error)?,
            disk_entries: cursor.read_u64::<LittleEndian>().map_err(read_error)?,
            total_entries: cursor.read_u64::<LittleEndian>().map_err(read_error)?,
            cd_size: cursor.read_u64::<LittleEndian>().map_err(read_error)?,
            cd_offset: cursor.read_u64::<LittleEndian>().map_err(read_error)?,
        })
    }

    pub fn new(total_entries: u64, cd_size: u64, cd_offset: u64) -> Self {
        Self {
            // size of the remaining record, excluding signature and this field
            eocd64_size: (Self::MIN_SIZE - 12) as u64,
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_ZIP64,
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: total_entries,
            total_entries,
            cd_size,
            cd_offset,
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(Self::SIGNATURE)?;
        out.write_u64::<LittleEndian>(self.eocd64_size)?;
        out.write_u16::<LittleEndian>(self.version_made_by)?;
        out.write_u16::<LittleEndian>(self.version_needed)?;
        out.write_u32::<LittleEndian>(self.disk_number)?;
        out.write_u32::<LittleEndian>(self.disk_with_cd)?;
        out.write_u64::<LittleEndian>(self.disk_entries)?;
        out.write_u64::<LittleEndian>(self.total_entries)?;
        out.write_u64::<LittleEndian>(self.cd_size)?;
        out.write_u64::<LittleEndian>(self.cd_offset)
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    /// Raw name bytes as stored in the central directory
    pub file_name: Vec<u8>,
    pub comment: Vec<u8>,
    pub compression_method: CompressionMethod,
    pub flags: u16,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub external_attrs: u32,
    pub is_directory: bool,
}

impl ZipFileEntry {
    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Modification time interpreted in the local time zone, if the DOS
    /// timestamp is a valid calendar date
    pub fn modified(&self) -> Option<SystemTime> {
        let (year, month, day) = self.mod_date();
        let (hour, minute, second) = self.mod_time();
        let naive = NaiveDate::from_ymd_opt(year.into(), month.into(), day.into())?
            .and_hms_opt(hour.into(), minute.into(), second.into())?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(SystemTime::from)
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Whether sizes or offset require a ZIP64 extra field
    pub fn needs_zip64(&self) -> bool {
        self.compressed_size >= ZIP64_U32 as u64
            || self.uncompressed_size >= ZIP64_U32 as u64
            || self.lfh_offset >= ZIP64_U32 as u64
    }

    fn zip64_extra(&self, include_offset: bool) -> Vec<u8> {
        let len: u16 = if include_offset { 24 } else { 16 };
        let mut extra = Vec::with_capacity(4 + len as usize);
        extra.extend_from_slice(&ZIP64_EXTRA_ID.to_le_bytes());
        extra.extend_from_slice(&len.to_le_bytes());
        extra.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        extra.extend_from_slice(&self.compressed_size.to_le_bytes());
        if include_offset {
            extra.extend_from_slice(&self.lfh_offset.to_le_bytes());
        }
        extra
    }

    fn version_needed(&self) -> u16 {
        if self.needs_zip64() {
            VERSION_ZIP64
        } else {
            VERSION_DEFAULT
        }
    }

    /// Write the local file header that precedes the entry data
    pub fn write_local_header<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let zip64 = self.needs_zip64();
        let extra = if zip64 { self.zip64_extra(false) } else { Vec::new() };

        out.write_all(LFH_SIGNATURE)?;
        out.write_u16::<LittleEndian>(self.version_needed())?;
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        out.write_u16::<LittleEndian>(self.last_mod_time)?;
        out.write_u16::<LittleEndian>(self.last_mod_date)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        if zip64 {
            out.write_u32::<LittleEndian>(ZIP64_U32)?;
            out.write_u32::<LittleEndian>(ZIP64_U32)?;
        } else {
            out.write_u32::<LittleEndian>(self.compressed_size as u32)?;
            out.write_u32::<LittleEndian>(self.uncompressed_size as u32)?;
        }
        out.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        out.write_u16::<LittleEndian>(extra.len() as u16)?;
        out.write_all(&self.file_name)?;
        out.write_all(&extra)
    }

    /// Write the central directory record for this entry
    pub fn write_central_header<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let zip64 = self.needs_zip64();
        let extra = if zip64 { self.zip64_extra(true) } else { Vec::new() };

        out.write_all(CDFH_SIGNATURE)?;
        out.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
        out.write_u16::<LittleEndian>(self.version_needed())?;
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        out.write_u16::<LittleEndian>(self.last_mod_time)?;
        out.write_u16::<LittleEndian>(self.last_mod_date)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        if zip64 {
            out.write_u32::<LittleEndian>(ZIP64_U32)?;
            out.write_u32::<LittleEndian>(ZIP64_U32)?;
        } else {
            out.write_u32::<LittleEndian>(self.compressed_size as u32)?;
            out.write_u32::<LittleEndian>(self.uncompressed_size as u32)?;
        }
        out.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        out.write_u16::<LittleEndian>(extra.len() as u16)?;
        out.write_u16::<LittleEndian>(self.comment.len() as u16)?;
        out.write_u16::<LittleEndian>(0)?; // disk number start
        out.write_u16::<LittleEndian>(0)?; // internal attributes
        out.write_u32::<LittleEndian>(self.external_attrs)?;
        if zip64 {
            out.write_u32::<LittleEndian>(ZIP64_U32)?;
        } else {
            out.write_u32::<LittleEndian>(self.lfh_offset as u32)?;
        }
        out.write_all(&self.file_name)?;
        out.write_all(&extra)?;
        out.write_all(&self.comment)
    }
}

/// Convert a timestamp to DOS (time, date), clamped to the representable
/// range 1980..=2107
pub fn to_dos_datetime(time: SystemTime) -> (u16, u16) {
    let local: DateTime<Local> = time.into();
    if local.year() < 1980 {
        // 1980-01-01 00:00:00
        return (0, (1 << 5) | 1);
    }
    if local.year() > 2107 {
        // 2107-12-31 23:59:58
        return ((23 << 11) | (59 << 5) | 29, (127 << 9) | (12 << 5) | 31);
    }

    let time = ((local.hour() as u16) << 11)
        | ((local.minute() as u16) << 5)
        | (local.second() as u16 / 2);
    let date = (((local.year() - 1980) as u16) << 9)
        | ((local.month() as u16) << 5)
        | local.day() as u16;
    (time, date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn entry(time: u16, date: u16) -> ZipFileEntry {
        ZipFileEntry {
            file_name: b"x".to_vec(),
            comment: Vec::new(),
            compression_method: CompressionMethod::Stored,
            flags: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: 0,
            last_mod_time: time,
            last_mod_date: date,
            external_attrs: UNIX_FILE_ATTRS,
            is_directory: false,
        }
    }

    #[test]
    fn dos_datetime_fields() {
        // 2021-07-15 13:45:30
        let e = entry((13 << 11) | (45 << 5) | 15, (41 << 9) | (7 << 5) | 15);
        assert_eq!(e.mod_date(), (2021, 7, 15));
        assert_eq!(e.mod_time(), (13, 45, 30));
    }

    #[test]
    fn dos_datetime_round_trip_has_two_second_resolution() {
        let when = UNIX_EPOCH + Duration::from_secs(1_600_000_001);
        let (time, date) = to_dos_datetime(when);
        let back = entry(time, date).modified().unwrap();
        let diff = when.duration_since(back).unwrap();
        assert!(diff <= Duration::from_secs(1));
    }

    #[test]
    fn dates_before_1980_clamp() {
        let (time, date) = to_dos_datetime(UNIX_EPOCH);
        assert_eq!(entry(time, date).mod_date(), (1980, 1, 1));
    }

    #[test]
    fn invalid_dos_date_has_no_time() {
        assert!(entry(0, 0).modified().is_none());
    }

    #[test]
    fn large_entries_use_zip64_headers() {
        let mut e = entry(0, (1 << 5) | 1);
        e.uncompressed_size = 5 << 30;
        e.compressed_size = 5 << 30;

        let mut local = Vec::new();
        e.write_local_header(&mut local).unwrap();
        assert_eq!(local.len(), LFH_SIZE + 1 + 20);

        let mut central = Vec::new();
        e.write_central_header(&mut central).unwrap();
        assert_eq!(central.len(), CDFH_MIN_SIZE + 1 + 28);
    }

    #[test]
    fn eocd_round_trip() {
        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: 3,
            total_entries: 3,
            cd_size: 120,
            cd_offset: 4096,
            comment_len: 0,
        };
        let mut buf = Vec::new();
        eocd.write_to(&mut buf, b"").unwrap();
        let parsed = EndOfCentralDirectory::from_bytes(&buf).unwrap();
        assert_eq!(parsed.total_entries, 3);
        assert_eq!(parsed.cd_offset, 4096);
        assert!(!parsed.is_zip64());
        assert!(!parsed.is_multi_disk());
    }
}
