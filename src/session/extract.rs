//! Two-phase extraction: extract under stored names, then rename back.
//!
//! The engine only understands the literal stored (encoded) names, so every
//! selected entry is first extracted as-is. The reconciliation pass then
//! walks each entry's path segment by segment, renaming the on-disk node
//! from its encoded name to its decoded one. Directory segments come before
//! the entries below them, so by the time a leaf is renamed its parents
//! already carry their final names. Entries sharing a prefix find it
//! already renamed and simply step through it.
//!
//! Failures abort the call but do not undo changes already made on disk.
//! Callers needing atomicity should extract into a staging directory.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::ArchiveSession;
use crate::codec::{self, SEPARATOR};
use crate::engine::ZipEngine;
use crate::error::{Error, ErrorCode, FsAction, Result};
use crate::io::os_string_from_bytes;

/// One extracted entry awaiting reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub index: usize,
    /// Name as stored in the archive
    pub encoded: Vec<u8>,
    /// Original name to restore
    pub decoded: Vec<u8>,
}

/// Entries of one `extract_to` call, in archive order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionPlan {
    entries: Vec<PlannedEntry>,
}

impl ExtractionPlan {
    pub fn push(&mut self, index: usize, encoded: Vec<u8>) {
        let decoded = codec::decode_path(&encoded, SEPARATOR);
        self.entries.push(PlannedEntry {
            index,
            encoded,
            decoded,
        });
    }

    pub fn entries(&self) -> &[PlannedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn lossy(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

/// Whether the stored `name` is the requested entry `wanted`. A request
/// for a directory also matches its trailing-`/` entry.
fn matches_entry(wanted: &[u8], name: &[u8]) -> bool {
    name == wanted || name.strip_suffix(b"/") == Some(wanted)
}

impl<E: ZipEngine> ArchiveSession<E> {
    /// Extract every entry below `destination` under its original name.
    ///
    /// Returns the final path of every entry, in archive order.
    pub fn extract_to(&self, destination: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        self.extract_selected(destination.as_ref(), None)
    }

    /// Extract only the entries named (by their original names) in `entries`.
    pub fn extract_entries_to<N: AsRef<[u8]>>(
        &self,
        destination: impl AsRef<Path>,
        entries: &[N],
    ) -> Result<Vec<PathBuf>> {
        let selection = entries
            .iter()
            .map(|name| codec::encode_path(name.as_ref(), SEPARATOR).into_bytes())
            .collect::<HashSet<_>>();
        self.extract_selected(destination.as_ref(), Some(&selection))
    }

    fn extract_selected(
        &self,
        destination: &Path,
        selection: Option<&HashSet<Vec<u8>>>,
    ) -> Result<Vec<PathBuf>> {
        if !destination.is_dir() {
            return Err(self.fail(Error::InvalidArgument(format!(
                "cannot extract to <{}>: not a directory",
                destination.display()
            ))));
        }

        let plan = self.extract_entries(destination, selection)?;
        let finalized = self.reconcile(destination, &plan)?;

        if finalized.len() != plan.len() {
            return Err(self.fail(Error::IncompleteArchive {
                archive: self.filename.clone(),
                detail: format!(
                    "restored {} of {} extracted entries",
                    finalized.len(),
                    plan.len()
                ),
                code: None,
            }));
        }

        log::debug!(
            "extracted {} entries from <{}> to {}",
            finalized.len(),
            self.filename,
            destination.display()
        );
        Ok(finalized)
    }

    /// Extract phase: every selected entry under its stored name.
    fn extract_entries(
        &self,
        destination: &Path,
        selection: Option<&HashSet<Vec<u8>>>,
    ) -> Result<ExtractionPlan> {
        let engine = self.engine()?;

        let mut names = Vec::with_capacity(engine.num_files());
        for index in 0..engine.num_files() {
            match engine.name_index(index) {
                Ok(name) => names.push((index, name)),
                Err(ErrorCode::Deleted) => continue,
                Err(code) => {
                    return Err(self.fail(Error::IncompleteArchive {
                        archive: self.filename.clone(),
                        detail: format!("cannot read the name of entry {index}"),
                        code: Some(code),
                    }));
                }
            }
        }

        if let Some(selection) = selection {
            names.retain(|(_, name)| selection.iter().any(|wanted| matches_entry(wanted, name)));

            for wanted in selection {
                if !names.iter().any(|(_, name)| matches_entry(wanted, name)) {
                    return Err(self.fail(Error::Engine {
                        code: ErrorCode::NoEntry,
                        context: lossy(&codec::decode_path(wanted, SEPARATOR)),
                    }));
                }
            }
        }

        let mut plan = ExtractionPlan::default();
        for (index, name) in names {
            self.sink
                .on_progress(&format!("Extracting file <{}>...", lossy(&name)));

            engine.extract(destination, &name).map_err(|code| {
                self.fail(Error::IncompleteArchive {
                    archive: self.filename.clone(),
                    detail: format!("unable to extract entry <{}>: {code}", lossy(&name)),
                    code: Some(code),
                })
            })?;

            plan.push(index, name);
        }

        Ok(plan)
    }

    /// Reconciliation phase: rename every planned entry to its original name.
    fn reconcile(&self, destination: &Path, plan: &ExtractionPlan) -> Result<Vec<PathBuf>> {
        let mut finalized = Vec::with_capacity(plan.len());

        for entry in plan.entries() {
            self.sink
                .on_progress(&format!("Renaming to <{}>...", lossy(&entry.decoded)));

            if let Some(path) = self.reconcile_entry(destination, entry)? {
                finalized.push(path);
            }
        }

        Ok(finalized)
    }

    /// Walk one entry's segments left to right, renaming as needed. Returns
    /// the final path if it exists afterwards.
    fn reconcile_entry(&self, destination: &Path, entry: &PlannedEntry) -> Result<Option<PathBuf>> {
        let mut current = destination.to_path_buf();

        for encoded in codec::segments(&entry.encoded, SEPARATOR) {
            if encoded.is_empty() {
                continue;
            }

            let decoded = match codec::try_decode(encoded) {
                Some(decoded) => {
                    self.check_segment(entry, &decoded)?;
                    decoded
                }
                None => encoded.to_vec(),
            };

            let old_path = current.join(os_string_from_bytes(encoded));
            let new_path = current.join(os_string_from_bytes(&decoded));

            match fs::symlink_metadata(&old_path) {
                Ok(meta) if meta.is_dir() => rename_directory(&old_path, &new_path)
                    .map_err(|err| self.fail(err))?,
                Ok(meta) if meta.is_file() => {
                    rename_file(&old_path, &new_path).map_err(|err| self.fail(err))?
                }
                // Already renamed through a shared prefix
                _ => {}
            }

            current = new_path;
        }

        Ok(fs::symlink_metadata(&current).is_ok().then_some(current))
    }

    /// Refuse decoded segments that would escape or alias their parent.
    fn check_segment(&self, entry: &PlannedEntry, decoded: &[u8]) -> Result<()> {
        let reason = match decoded {
            b"" => "an empty name",
            b"." => "the current directory",
            b".." => "the parent directory",
            s if s.contains(&SEPARATOR) => "a name containing a path separator",
            s if s.contains(&0) => "a name containing a NUL byte",
            _ => return Ok(()),
        };

        Err(self.fail(Error::BrokenArchive {
            archive: self.filename.clone(),
            reason: format!(
                "entry <{}> would be renamed to {reason}",
                lossy(&entry.encoded)
            ),
        }))
    }
}

fn fs_error(action: FsAction, from: &Path, to: &Path) -> impl FnOnce(io::Error) -> Error {
    let (from, to) = (from.to_path_buf(), to.to_path_buf());
    move |source| Error::Filesystem {
        action,
        from,
        to,
        source,
    }
}

/// Rename a directory, merging into `new` when it already exists.
fn rename_directory(old: &Path, new: &Path) -> Result<()> {
    if old == new {
        return Ok(());
    }

    if new.is_dir() {
        return merge_directory(old, new);
    }

    fs::rename(old, new).map_err(fs_error(FsAction::RenameDirectory, old, new))
}

/// Rename a file, replacing an existing file at `new`.
fn rename_file(old: &Path, new: &Path) -> Result<()> {
    if old == new {
        return Ok(());
    }

    if new.is_file() {
        fs::remove_file(new).map_err(fs_error(FsAction::Overwrite, old, new))?;
    }

    fs::rename(old, new).map_err(fs_error(FsAction::RenameFile, old, new))
}

/// Move the children of `old` into the existing directory `new`, then
/// remove `old`.
fn merge_directory(old: &Path, new: &Path) -> Result<()> {
    let children = fs::read_dir(old).map_err(fs_error(FsAction::Merge, old, new))?;

    for child in children {
        let child = child.map_err(fs_error(FsAction::Merge, old, new))?;
        let from = child.path();
        let to = new.join(child.file_name());

        if from.is_dir() && to.is_dir() {
            merge_directory(&from, &to)?;
        } else if from.is_dir() {
            fs::rename(&from, &to).map_err(fs_error(FsAction::RenameDirectory, &from, &to))?;
        } else {
            rename_file(&from, &to)?;
        }
    }

    fs::remove_dir(old).map_err(fs_error(FsAction::Merge, old, new))
}
