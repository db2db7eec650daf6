//! End-to-end extraction through an [`ArchiveSession`].

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::TempDir;
use walkdir::WalkDir;
use zipname::codec::{self, SEPARATOR};
use zipname::{ArchiveSession, Error, ErrorCode, OpenMode, Sink, Stat, ZipArchive, ZipEngine};

#[derive(Default, Clone)]
struct Lines {
    progress: Rc<RefCell<Vec<String>>>,
    errors: Rc<RefCell<Vec<String>>>,
}

impl Sink for Lines {
    fn on_progress(&self, message: &str) {
        self.progress.borrow_mut().push(message.to_string());
    }

    fn on_error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }
}

/// Build `archive` with the given `(name, contents)` entries.
fn build(archive: &Path, entries: &[(&str, &str)]) {
    let mut session = ArchiveSession::open(archive, OpenMode::CreateNew).unwrap();
    for (name, contents) in entries {
        session.add_from_string(name, contents).unwrap();
    }
    session.close().unwrap();
}

/// Every path below `root`, relative and sorted
fn tree(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.unwrap().path().strip_prefix(root).unwrap().to_path_buf())
        .collect()
}

#[test]
fn restores_original_tree() {
    let work = TempDir::new().unwrap();
    let archive = work.path().join("a.zip");
    build(&archive, &[("a.txt", "alpha"), ("sub/b.txt", "beta")]);

    let dest = work.path().join("out");
    fs::create_dir(&dest).unwrap();

    let session = ArchiveSession::open(&archive, OpenMode::Existing).unwrap();
    let restored = session.extract_to(&dest).unwrap();
    session.close().unwrap();

    assert_eq!(restored, vec![dest.join("a.txt"), dest.join("sub/b.txt")]);
    assert_eq!(
        tree(&dest),
        vec![
            PathBuf::from("a.txt"),
            PathBuf::from("sub"),
            PathBuf::from("sub/b.txt")
        ]
    );
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"alpha");
    assert_eq!(fs::read(dest.join("sub/b.txt")).unwrap(), b"beta");
}

#[cfg(unix)]
#[test]
fn restores_arbitrary_name_bytes() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    use zipname::commands::{self, CreateOptions, ExtractOptions};

    let name: &[u8] = b"na#me-\xe9\xff.bin";
    let cwd = TempDir::new().unwrap();
    let cwd = cwd.path().canonicalize().unwrap();
    fs::create_dir(cwd.join("in")).unwrap();
    fs::write(cwd.join("in").join(OsStr::from_bytes(name)), b"payload").unwrap();
    fs::create_dir(cwd.join("out")).unwrap();

    let options = CreateOptions {
        truncate: true,
        ..Default::default()
    };
    let archive = commands::create_in(&cwd, Path::new("in"), None, &options).unwrap();

    let raw = ZipArchive::open(&archive, OpenMode::Existing).unwrap();
    let stored = raw.name_index(0).unwrap();
    assert!(!stored.windows(name.len()).any(|w| w == name));

    commands::extract_in(
        &cwd,
        Path::new("in.zip"),
        Some(Path::new("out")),
        &ExtractOptions::default(),
    )
    .unwrap();

    let restored: Vec<_> = fs::read_dir(cwd.join("out/in"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].as_bytes(), name);
    assert_eq!(
        fs::read(cwd.join("out/in").join(OsStr::from_bytes(name))).unwrap(),
        b"payload"
    );
}

#[derive(Clone, Copy)]
enum Fault {
    /// Report a read error
    Fail,
    /// Report success without writing anything
    Skip,
}

/// Delegates to a real archive but misbehaves on the nth extraction.
struct FaultyEngine {
    inner: ZipArchive,
    fault_on: usize,
    fault: Fault,
    extracted: Cell<usize>,
}

impl FaultyEngine {
    fn open(archive: &Path, fault_on: usize, fault: Fault) -> Self {
        Self {
            inner: ZipArchive::open(archive, OpenMode::Existing).unwrap(),
            fault_on,
            fault,
            extracted: Cell::new(0),
        }
    }
}

impl ZipEngine for FaultyEngine {
    fn num_files(&self) -> usize {
        self.inner.num_files()
    }

    fn name_index(&self, index: usize) -> Result<Vec<u8>, ErrorCode> {
        self.inner.name_index(index)
    }

    fn stat_index(&self, index: usize) -> Result<Stat, ErrorCode> {
        self.inner.stat_index(index)
    }

    fn stat_name(&self, name: &[u8]) -> Result<Stat, ErrorCode> {
        self.inner.stat_name(name)
    }

    fn add_file(
        &mut self,
        source: &Path,
        name: &[u8],
        start: u64,
        length: u64,
    ) -> Result<(), ErrorCode> {
        self.inner.add_file(source, name, start, length)
    }

    fn add_from_bytes(&mut self, name: &[u8], contents: &[u8]) -> Result<(), ErrorCode> {
        self.inner.add_from_bytes(name, contents)
    }

    fn add_dir(&mut self, name: &[u8]) -> Result<(), ErrorCode> {
        self.inner.add_dir(name)
    }

    fn rename(&mut self, name: &[u8], new_name: &[u8]) -> Result<(), ErrorCode> {
        self.inner.rename(name, new_name)
    }

    fn delete(&mut self, name: &[u8]) -> Result<(), ErrorCode> {
        self.inner.delete(name)
    }

    fn unchange(&mut self, name: &[u8]) -> Result<(), ErrorCode> {
        self.inner.unchange(name)
    }

    fn read(&self, name: &[u8], length: usize) -> Result<Vec<u8>, ErrorCode> {
        self.inner.read(name, length)
    }

    fn set_comment(&mut self, name: &[u8], comment: &[u8]) -> Result<(), ErrorCode> {
        self.inner.set_comment(name, comment)
    }

    fn comment(&self, name: &[u8]) -> Result<Vec<u8>, ErrorCode> {
        self.inner.comment(name)
    }

    fn extract(&self, destination: &Path, name: &[u8]) -> Result<(), ErrorCode> {
        let attempt = self.extracted.get() + 1;
        self.extracted.set(attempt);
        match self.fault {
            _ if attempt != self.fault_on => self.inner.extract(destination, name),
            Fault::Fail => Err(ErrorCode::Read),
            Fault::Skip => Ok(()),
        }
    }

    fn close(self) -> Result<(), ErrorCode> {
        self.inner.close()
    }
}

#[test]
fn engine_failure_is_an_incomplete_archive() {
    let work = TempDir::new().unwrap();
    let archive = work.path().join("three.zip");
    build(&archive, &[("1", "one"), ("2", "two"), ("3", "three")]);

    let engine = FaultyEngine::open(&archive, 3, Fault::Fail);
    let lines = Lines::default();
    let session = ArchiveSession::from_engine(engine, "three.zip").with_sink(lines.clone());

    let dest = TempDir::new().unwrap();
    let err = session.extract_to(dest.path()).unwrap_err();

    match &err {
        Error::IncompleteArchive { archive, code, .. } => {
            assert_eq!(archive, "three.zip");
            assert_eq!(*code, Some(ErrorCode::Read));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(lines.errors.borrow().len(), 1);
    assert_eq!(lines.progress.borrow().len(), 3);
    assert!(!dest.path().join("1").exists());
}

#[test]
fn unrestored_entries_are_an_incomplete_archive() {
    let work = TempDir::new().unwrap();
    let archive = work.path().join("two.zip");
    build(&archive, &[("first", "1"), ("second#2", "2")]);

    let engine = FaultyEngine::open(&archive, 2, Fault::Skip);
    let lines = Lines::default();
    let session = ArchiveSession::from_engine(engine, "two.zip").with_sink(lines.clone());

    let dest = TempDir::new().unwrap();
    let err = session.extract_to(dest.path()).unwrap_err();

    match &err {
        Error::IncompleteArchive { archive, code, detail } => {
            assert_eq!(archive, "two.zip");
            assert_eq!(*code, None);
            assert!(detail.contains("1 of 2"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(lines.errors.borrow().len(), 1);
    assert!(dest.path().join("first").is_file());
    assert!(!dest.path().join("second#2").exists());
}

#[test]
fn overwrites_existing_files() {
    let work = TempDir::new().unwrap();
    let archive = work.path().join("a.zip");
    build(&archive, &[("a.txt", "new contents")]);

    let dest = TempDir::new().unwrap();
    fs::write(dest.path().join("a.txt"), b"old").unwrap();

    let session = ArchiveSession::open(&archive, OpenMode::Existing).unwrap();
    session.extract_to(dest.path()).unwrap();

    assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"new contents");
    assert_eq!(tree(dest.path()), vec![PathBuf::from("a.txt")]);
}

#[test]
fn extracting_twice_merges_into_the_same_tree() {
    let work = TempDir::new().unwrap();
    let archive = work.path().join("a.zip");
    build(&archive, &[("d/x#1", "x"), ("d/e/y", "y")]);

    let dest = TempDir::new().unwrap();
    let session = ArchiveSession::open(&archive, OpenMode::Existing).unwrap();
    let first = session.extract_to(dest.path()).unwrap();
    let second = session.extract_to(dest.path()).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        tree(dest.path()),
        vec![
            PathBuf::from("d"),
            PathBuf::from("d/e"),
            PathBuf::from("d/e/y"),
            PathBuf::from("d/x#1")
        ]
    );
}

#[test]
fn directory_entries_are_restored() {
    let work = TempDir::new().unwrap();
    let archive = work.path().join("a.zip");
    let mut session = ArchiveSession::open(&archive, OpenMode::CreateNew).unwrap();
    session.add_empty_dir("empty #dir").unwrap();
    session.close().unwrap();

    let dest = TempDir::new().unwrap();
    let session = ArchiveSession::open(&archive, OpenMode::Existing).unwrap();
    let restored = session.extract_to(dest.path()).unwrap();

    assert_eq!(restored.len(), 1);
    assert!(dest.path().join("empty #dir").is_dir());
}

#[test]
fn parent_directory_names_are_refused() {
    let work = TempDir::new().unwrap();
    let archive = work.path().join("evil.zip");
    let stored = format!("{}/{}", codec::encode(b".."), codec::encode(b"escape.txt"));

    let mut raw = ZipArchive::open(&archive, OpenMode::CreateNew).unwrap();
    raw.add_from_bytes(stored.as_bytes(), b"gotcha").unwrap();
    raw.close().unwrap();

    let dest = TempDir::new().unwrap();
    let session = ArchiveSession::open(&archive, OpenMode::Existing).unwrap();
    let err = session.extract_to(dest.path()).unwrap_err();

    assert!(matches!(err, Error::BrokenArchive { .. }));
    assert!(!work.path().join("escape.txt").exists());
}

#[test]
fn selected_entries_only() {
    let work = TempDir::new().unwrap();
    let archive = work.path().join("a.zip");
    build(
        &archive,
        &[("keep#1.txt", "1"), ("skip.txt", "2"), ("dir/inner", "3")],
    );

    let dest = TempDir::new().unwrap();
    let session = ArchiveSession::open(&archive, OpenMode::Existing).unwrap();
    let restored = session
        .extract_entries_to(dest.path(), &["keep#1.txt", "dir/inner"])
        .unwrap();

    assert_eq!(
        restored,
        vec![dest.path().join("keep#1.txt"), dest.path().join("dir/inner")]
    );
    assert!(!dest.path().join("skip.txt").exists());

    let err = session
        .extract_entries_to(dest.path(), &["missing"])
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NoEntry));
}

#[test]
fn stored_names_are_visible_to_plain_readers() {
    let work = TempDir::new().unwrap();
    let archive = work.path().join("a.zip");
    build(&archive, &[("dir/na#me", "x")]);

    let raw = ZipArchive::open(&archive, OpenMode::Existing).unwrap();
    assert_eq!(
        raw.name_index(0).unwrap(),
        codec::encode_path(b"dir/na#me", SEPARATOR).into_bytes()
    );
}

#[test]
fn destination_must_be_a_directory() {
    let work = TempDir::new().unwrap();
    let archive = work.path().join("a.zip");
    build(&archive, &[("a", "a")]);

    let session = ArchiveSession::open(&archive, OpenMode::Existing).unwrap();
    let err = session.extract_to(work.path().join("nope")).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}
