//! Archive handle that transparently encodes entry names.
//!
//! [`ArchiveSession`] wraps a [`ZipEngine`] and rewrites every name
//! argument through [`codec::encode_path`] before it reaches the engine, and
//! every name it hands back through [`codec::decode_path`]. Callers only
//! ever see original names; any other zip tool sees the encoded ones.
//!
//! ```no_run
//! use zipname::{ArchiveSession, OpenMode};
//!
//! # fn main() -> zipname::Result<()> {
//! let mut session = ArchiveSession::open("out.zip", OpenMode::CreateNew)?;
//! session.add_from_string("notes/na#me.txt", "hello")?;
//! session.close()?;
//!
//! let session = ArchiveSession::open("out.zip", OpenMode::Existing)?;
//! session.extract_to("restored")?;
//! # Ok(())
//! # }
//! ```

mod extract;

pub use extract::{ExtractionPlan, PlannedEntry};

use std::path::{Path, PathBuf};

use crate::codec::{self, SEPARATOR};
use crate::engine::ZipEngine;
use crate::error::{Error, ErrorCode, Result};
use crate::io::bytes_from_os_str;
use crate::sink::{NullSink, Sink};
use crate::zip::{OpenMode, Stat, ZipArchive};

/// An open archive whose entry names are encoded on the way in and decoded
/// on the way out.
///
/// The engine handle is released by [`close`](Self::close); a session that
/// is dropped without closing commits on a best-effort basis and logs a
/// warning on failure.
pub struct ArchiveSession<E: ZipEngine = ZipArchive> {
    engine: Option<E>,
    filename: String,
    sink: Box<dyn Sink>,
}

impl ArchiveSession<ZipArchive> {
    /// Open `filename` with the built-in zip engine.
    ///
    /// The parent directory must exist; the archive path is resolved to an
    /// absolute path before opening.
    pub fn open(filename: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let filename = filename.as_ref();
        let context = filename.display().to_string();
        let path = resolve_archive_path(filename)?;

        let engine = ZipArchive::open(&path, mode).map_err(|code| Error::Engine {
            code,
            context: context.clone(),
        })?;
        Ok(Self::from_engine(engine, context))
    }
}

impl<E: ZipEngine> ArchiveSession<E> {
    /// Wrap an already opened engine. `filename` is used as context in
    /// every error raised by this session.
    pub fn from_engine(engine: E, filename: impl Into<String>) -> Self {
        Self {
            engine: Some(engine),
            filename: filename.into(),
            sink: Box::new(NullSink),
        }
    }

    pub fn with_sink(mut self, sink: impl Sink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// The archive this session was opened for
    pub fn filename(&self) -> &str {
        &self.filename
    }

    fn engine(&self) -> Result<&E> {
        match &self.engine {
            Some(engine) => Ok(engine),
            None => Err(self.engine_error(ErrorCode::ZipClosed, self.filename.clone())),
        }
    }

    fn engine_mut(&mut self) -> Result<&mut E> {
        match &mut self.engine {
            Some(engine) => Ok(engine),
            None => {
                let err = Error::Engine {
                    code: ErrorCode::ZipClosed,
                    context: self.filename.clone(),
                };
                self.sink.on_error(&err.to_string());
                Err(err)
            }
        }
    }

    /// Report `err` to the sink and hand it back for returning
    fn fail(&self, err: Error) -> Error {
        self.sink.on_error(&err.to_string());
        err
    }

    fn engine_error(&self, code: ErrorCode, context: String) -> Error {
        self.fail(Error::Engine { code, context })
    }

    /// Classify an engine result, naming `name` as context
    fn check<T>(&self, name: &[u8], result: std::result::Result<T, ErrorCode>) -> Result<T> {
        result.map_err(|code| self.engine_error(code, String::from_utf8_lossy(name).into_owned()))
    }

    fn decode_stat(mut stat: Stat) -> Stat {
        stat.name = codec::decode_path(&stat.name, SEPARATOR);
        stat
    }

    /// Number of entries, including entries deleted in this session
    pub fn num_files(&self) -> Result<usize> {
        Ok(self.engine()?.num_files())
    }

    /// Original name of the entry at `index`
    pub fn name_index(&self, index: usize) -> Result<Vec<u8>> {
        let result = self.engine()?.name_index(index);
        let name = self.check(format!("#{index}").as_bytes(), result)?;
        Ok(codec::decode_path(&name, SEPARATOR))
    }

    /// Add a file from disk; `local_name` defaults to `source` itself
    pub fn add_file(&mut self, source: impl AsRef<Path>, local_name: Option<&[u8]>) -> Result<()> {
        self.add_file_range(source, local_name, 0, 0)
    }

    /// Add `length` bytes of `source` starting at `start` (0 = to the end)
    pub fn add_file_range(
        &mut self,
        source: impl AsRef<Path>,
        local_name: Option<&[u8]>,
        start: u64,
        length: u64,
    ) -> Result<()> {
        let source = source.as_ref();
        let source_bytes = bytes_from_os_str(source.as_os_str());
        let local_name = local_name.unwrap_or(source_bytes.as_slice());
        let encoded = codec::encode_path(local_name, SEPARATOR);

        let result = self
            .engine_mut()?
            .add_file(source, encoded.as_bytes(), start, length);
        self.check(&source_bytes, result)
    }

    pub fn add_from_string(
        &mut self,
        local_name: impl AsRef<[u8]>,
        contents: impl AsRef<[u8]>,
    ) -> Result<()> {
        let local_name = local_name.as_ref();
        let encoded = codec::encode_path(local_name, SEPARATOR);
        let result = self
            .engine_mut()?
            .add_from_bytes(encoded.as_bytes(), contents.as_ref());
        self.check(local_name, result)
    }

    pub fn add_empty_dir(&mut self, dirname: impl AsRef<[u8]>) -> Result<()> {
        let dirname = dirname.as_ref();
        let encoded = codec::encode_path(dirname, SEPARATOR);
        let result = self.engine_mut()?.add_dir(encoded.as_bytes());
        self.check(dirname, result)
    }

    pub fn rename_name(&mut self, name: impl AsRef<[u8]>, new_name: impl AsRef<[u8]>) -> Result<()> {
        let name = name.as_ref();
        let encoded = codec::encode_path(name, SEPARATOR);
        let encoded_new = codec::encode_path(new_name.as_ref(), SEPARATOR);
        let result = self
            .engine_mut()?
            .rename(encoded.as_bytes(), encoded_new.as_bytes());
        self.check(name, result)
    }

    pub fn delete_name(&mut self, name: impl AsRef<[u8]>) -> Result<()> {
        let name = name.as_ref();
        let encoded = codec::encode_path(name, SEPARATOR);
        let result = self.engine_mut()?.delete(encoded.as_bytes());
        self.check(name, result)
    }

    /// Revert every change made to `name` in this session
    pub fn unchange_name(&mut self, name: impl AsRef<[u8]>) -> Result<()> {
        let name = name.as_ref();
        let encoded = codec::encode_path(name, SEPARATOR);
        let result = self.engine_mut()?.unchange(encoded.as_bytes());
        self.check(name, result)
    }

    /// Contents of `name`; a non-zero `length` caps the number of bytes
    pub fn get_from_name(&self, name: impl AsRef<[u8]>, length: usize) -> Result<Vec<u8>> {
        let name = name.as_ref();
        let encoded = codec::encode_path(name, SEPARATOR);
        let result = self.engine()?.read(encoded.as_bytes(), length);
        self.check(name, result)
    }

    pub fn set_comment_name(
        &mut self,
        name: impl AsRef<[u8]>,
        comment: impl AsRef<[u8]>,
    ) -> Result<()> {
        let name = name.as_ref();
        let encoded = codec::encode_path(name, SEPARATOR);
        let result = self
            .engine_mut()?
            .set_comment(encoded.as_bytes(), comment.as_ref());
        self.check(name, result)
    }

    pub fn get_comment_name(&self, name: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        let name = name.as_ref();
        let encoded = codec::encode_path(name, SEPARATOR);
        let result = self.engine()?.comment(encoded.as_bytes());
        self.check(name, result)
    }

    /// Metadata of `name`, reported under its original name
    pub fn stat_name(&self, name: impl AsRef<[u8]>) -> Result<Stat> {
        let name = name.as_ref();
        let encoded = codec::encode_path(name, SEPARATOR);
        let result = self.engine()?.stat_name(encoded.as_bytes());
        self.check(name, result).map(Self::decode_stat)
    }

    /// Metadata of the entry at `index`, reported under its original name
    pub fn stat_index(&self, index: usize) -> Result<Stat> {
        let result = self.engine()?.stat_index(index);
        self.check(format!("#{index}").as_bytes(), result)
            .map(Self::decode_stat)
    }

    /// Commit pending changes and release the archive.
    pub fn close(mut self) -> Result<()> {
        let Some(engine) = self.engine.take() else {
            return Ok(());
        };
        engine
            .close()
            .map_err(|code| self.engine_error(code, self.filename.clone()))
    }
}

impl<E: ZipEngine> Drop for ArchiveSession<E> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            if let Err(code) = engine.close() {
                log::warn!("implicit close of <{}> failed: {code}", self.filename);
            }
        }
    }
}

/// Resolve `filename` against its canonicalized parent directory.
pub fn resolve_archive_path(filename: &Path) -> Result<PathBuf> {
    let parent = match filename.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let directory = parent
        .canonicalize()
        .ok()
        .filter(|dir| dir.is_dir())
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "cannot create zip file in a non-directory <{}>",
                parent.display()
            ))
        })?;

    let name = filename.file_name().ok_or_else(|| {
        Error::InvalidArgument(format!("<{}> does not name a file", filename.display()))
    })?;

    Ok(directory.join(name))
}
