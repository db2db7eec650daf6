//! The `create` and `extract` commands.
//!
//! Both take their paths relative to an explicit working directory so they
//! can run without touching the process environment; [`create`] and
//! [`extract`] resolve it from the current directory.

use std::env;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::io::bytes_from_os_str;
use crate::session::ArchiveSession;
use crate::sink::{ConsoleSink, Sink};
use crate::zip::OpenMode;

#[derive(Debug, Default, Clone, Copy)]
pub struct CreateOptions {
    /// Descend into subdirectories of the source
    pub recursive: bool,
    /// Store names relative to the working directory
    pub truncate: bool,
    /// Add to an existing archive instead of requiring a new one
    pub update: bool,
    pub verbose: bool,
}

impl CreateOptions {
    fn open_mode(&self) -> OpenMode {
        if self.update {
            OpenMode::Create
        } else {
            OpenMode::CreateNew
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractOptions {
    pub verbose: bool,
}

fn working_directory() -> Result<PathBuf> {
    Ok(env::current_dir()?.canonicalize()?)
}

/// Pack `source` into an archive. Returns the archive path.
pub fn create(source: &Path, target: Option<&Path>, options: &CreateOptions) -> Result<PathBuf> {
    create_in(&working_directory()?, source, target, options)
}

/// [`create`] with paths resolved against `cwd`
pub fn create_in(
    cwd: &Path,
    source: &Path,
    target: Option<&Path>,
    options: &CreateOptions,
) -> Result<PathBuf> {
    let source = cwd
        .join(source)
        .canonicalize()
        .ok()
        .filter(|path| path.is_dir())
        .ok_or_else(|| {
            Error::InvalidArgument(format!("<{}> is not a directory", source.display()))
        })?;

    let archive = archive_path(cwd, &source, target)?;
    let inputs = collect_inputs(&source, options.recursive)?;
    log::info!(
        "packing {} files from {} into {}",
        inputs.len(),
        source.display(),
        archive.display()
    );

    let console = ConsoleSink::new(options.verbose);
    let mut session = ArchiveSession::open(&archive, options.open_mode())?.with_sink(console);

    let mut count = 0usize;
    for file in inputs {
        // The archive may live inside the directory being packed
        if file == archive {
            continue;
        }

        let name = local_name(&file, cwd, options.truncate);
        count += 1;
        console.on_progress(&format!(
            "<{count:04}> Add \"{}\"",
            String::from_utf8_lossy(&name)
        ));
        session.add_file(&file, Some(name.as_slice()))?;
    }

    session.close()?;
    Ok(archive)
}

/// Unpack `source` below `target` (default: the working directory).
/// Returns the restored paths.
pub fn extract(
    source: &Path,
    target: Option<&Path>,
    options: &ExtractOptions,
) -> Result<Vec<PathBuf>> {
    extract_in(&working_directory()?, source, target, options)
}

/// [`extract`] with paths resolved against `cwd`
pub fn extract_in(
    cwd: &Path,
    source: &Path,
    target: Option<&Path>,
    options: &ExtractOptions,
) -> Result<Vec<PathBuf>> {
    let archive = cwd.join(source);
    if !archive.is_file() {
        return Err(Error::InvalidArgument(format!(
            "<{}> is not a file",
            source.display()
        )));
    }

    let destination = target.map_or_else(|| cwd.to_path_buf(), |target| cwd.join(target));
    if !destination.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "<{}> is not a directory",
            destination.display()
        )));
    }

    let session = ArchiveSession::open(&archive, OpenMode::Existing)?
        .with_sink(ConsoleSink::new(options.verbose));
    let restored = session.extract_to(&destination)?;
    session.close()?;

    log::info!(
        "restored {} entries from {} into {}",
        restored.len(),
        archive.display(),
        destination.display()
    );
    Ok(restored)
}

/// Where `create` writes: `target` itself, or `<target>/<source name>.zip`
/// when `target` is a directory or omitted.
pub fn archive_path(cwd: &Path, source: &Path, target: Option<&Path>) -> Result<PathBuf> {
    let target = target.map_or_else(|| cwd.to_path_buf(), |target| cwd.join(target));
    if !target.is_dir() {
        return Ok(target);
    }

    let mut name: OsString = source
        .file_name()
        .ok_or_else(|| {
            Error::InvalidArgument(format!("<{}> has no name to archive under", source.display()))
        })?
        .to_os_string();
    name.push(".zip");
    Ok(target.join(name))
}

/// Regular files below `source`, sorted by name. Only direct children
/// unless `recursive`.
pub fn collect_inputs(source: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut files = Vec::new();
    for entry in WalkDir::new(source)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
    {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// The name `file` is stored under: its full path, or with `truncate` the
/// path relative to `cwd` without a leading separator.
pub fn local_name(file: &Path, cwd: &Path, truncate: bool) -> Vec<u8> {
    if !truncate {
        return bytes_from_os_str(file.as_os_str());
    }

    let relative = file.strip_prefix(cwd).unwrap_or(file);
    let mut name = bytes_from_os_str(relative.as_os_str());
    while name.first() == Some(&b'/') {
        name.remove(0);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn canonical(dir: &TempDir) -> PathBuf {
        dir.path().canonicalize().unwrap()
    }

    #[test]
    fn truncate_strips_the_working_directory() {
        let cwd = Path::new("/work/project");
        let file = cwd.join("data/x.txt");

        assert_eq!(local_name(&file, cwd, true), b"data/x.txt");
        assert_eq!(local_name(&file, cwd, false), b"/work/project/data/x.txt");
    }

    #[test]
    fn truncate_outside_the_working_directory() {
        let name = local_name(Path::new("/elsewhere/y.txt"), Path::new("/work"), true);
        assert_eq!(name, b"elsewhere/y.txt");
    }

    #[test]
    fn archive_defaults_to_source_name() {
        let cwd = TempDir::new().unwrap();
        let cwd = canonical(&cwd);
        let source = cwd.join("photos");

        assert_eq!(
            archive_path(&cwd, &source, None).unwrap(),
            cwd.join("photos.zip")
        );
        assert_eq!(
            archive_path(&cwd, &source, Some(Path::new("named.zip"))).unwrap(),
            cwd.join("named.zip")
        );
    }

    #[test]
    fn inputs_are_sorted_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.txt"), b"c").unwrap();

        let flat = collect_inputs(dir.path(), false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.txt"), dir.path().join("b.txt")]);

        let deep = collect_inputs(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 3);
        assert_eq!(deep[2], dir.path().join("sub/c.txt"));
    }

    #[test]
    fn create_then_extract() {
        let cwd = TempDir::new().unwrap();
        let cwd = canonical(&cwd);
        fs::create_dir_all(cwd.join("data/nested")).unwrap();
        fs::write(cwd.join("data/x#1.txt"), b"one").unwrap();
        fs::write(cwd.join("data/nested/y.txt"), b"two").unwrap();
        fs::create_dir(cwd.join("out")).unwrap();

        let options = CreateOptions {
            recursive: true,
            truncate: true,
            ..Default::default()
        };
        let archive = create_in(&cwd, Path::new("data"), None, &options).unwrap();
        assert_eq!(archive, cwd.join("data.zip"));

        let restored = extract_in(
            &cwd,
            Path::new("data.zip"),
            Some(Path::new("out")),
            &ExtractOptions::default(),
        )
        .unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(fs::read(cwd.join("out/data/x#1.txt")).unwrap(), b"one");
        assert_eq!(fs::read(cwd.join("out/data/nested/y.txt")).unwrap(), b"two");
    }

    #[test]
    fn create_refuses_existing_archive_without_update() {
        let cwd = TempDir::new().unwrap();
        let cwd = canonical(&cwd);
        fs::create_dir(cwd.join("data")).unwrap();
        fs::write(cwd.join("data/x.txt"), b"x").unwrap();

        let options = CreateOptions::default();
        create_in(&cwd, Path::new("data"), None, &options).unwrap();
        assert!(create_in(&cwd, Path::new("data"), None, &options).is_err());

        let update = CreateOptions {
            update: true,
            ..options
        };
        create_in(&cwd, Path::new("data"), None, &update).unwrap();
    }

    #[test]
    fn extract_requires_a_directory_target() {
        let cwd = TempDir::new().unwrap();
        let cwd = canonical(&cwd);
        fs::write(cwd.join("a.zip"), b"").unwrap();

        let err = extract_in(
            &cwd,
            Path::new("a.zip"),
            Some(Path::new("missing")),
            &ExtractOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
