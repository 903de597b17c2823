// Managed cleanup of temporary shapefile sets
//
// A shapefile written only to be read back once can be registered for
// deletion. ManagedIter wraps a read cursor and, when the cursor is
// exhausted, releases its file handles and deletes the set if the
// registration names it. The registration is cleared so deletion happens at
// most once.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::codec::paths::ShapefilePaths;
use crate::internal::error::Result;

/// Removes `path` if it is a file. Failures are logged, never returned.
pub fn delete_file(path: &Path) {
    if !path.is_file() {
        return;
    }
    info!("Deleting file: {}", path.display());
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Could not delete {}: {}", path.display(), e);
    }
}

/// True if any pattern matches at the start of `stem`.
pub fn name_matches(stem: &str, patterns: &[Regex]) -> bool {
    patterns
        .iter()
        .any(|re| re.find(stem).map_or(false, |m| m.start() == 0))
}

/// Deletes every companion file of the set `path` belongs to, when `delete`
/// is set or the path without extension matches one of `patterns`.
/// `strict_no_del` vetoes everything.
pub fn delete_shp_files_if_req(path: &Path, delete: bool, strict_no_del: bool, patterns: &[Regex]) {
    debug!("strict_no_del == {}, delete == {}", strict_no_del, delete);
    if strict_no_del {
        return;
    }
    let paths = ShapefilePaths::from_path(path);
    if delete || name_matches(&paths.stem().to_string_lossy(), patterns) {
        for companion in paths.all() {
            delete_file(&companion);
        }
    }
}

/// A shapefile set that may be deleted once it has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeFilesDeleter {
    file_name: PathBuf,
}

impl ShapeFilesDeleter {
    pub fn new(file_name: impl Into<PathBuf>) -> Self {
        Self { file_name: file_name.into() }
    }

    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    /// Whether `path` names the same set, by any of its companion files.
    pub fn targets(&self, path: &Path) -> bool {
        ShapefilePaths::from_path(&self.file_name) == ShapefilePaths::from_path(path)
    }

    pub fn delete_files(&self, delete: bool, strict_no_del: bool) {
        delete_shp_files_if_req(&self.file_name, delete, strict_no_del, &[]);
    }
}

/// A shared slot holding at most one deleter.
///
/// Clones share the slot, so a writer can register a deleter that a later
/// reader of the same files consumes.
#[derive(Debug, Clone, Default)]
pub struct DeleterRegistration(Rc<RefCell<Option<ShapeFilesDeleter>>>);

impl DeleterRegistration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any registered deleter.
    pub fn register(&self, deleter: ShapeFilesDeleter) {
        *self.0.borrow_mut() = Some(deleter);
    }

    pub fn clear(&self) {
        self.0.borrow_mut().take();
    }

    pub fn current(&self) -> Option<ShapeFilesDeleter> {
        self.0.borrow().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.0.borrow().is_some()
    }

    /// Removes and returns the deleter if it targets `path`.
    fn take_if_targets(&self, path: &Path) -> Option<ShapeFilesDeleter> {
        let mut slot = self.0.borrow_mut();
        if slot.as_ref().map_or(false, |d| d.targets(path)) {
            slot.take()
        } else {
            None
        }
    }
}

/// Configuration for cleanup after reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionOptions {
    /// Delete a registered set once it has been read to the end
    pub del_after_read: bool,

    /// Never delete anything
    pub strict_no_del: bool,

    /// Files are being overwritten in place, which rules out deletion
    pub overwrite_shp: bool,

    /// Also clean up when an unfinished iterator is dropped
    pub delete_on_abandon: bool,
}

impl Default for DeletionOptions {
    fn default() -> Self {
        Self {
            del_after_read: true,
            strict_no_del: false,
            overwrite_shp: true,
            delete_on_abandon: false,
        }
    }
}

/// A single-pass source of items backed by open files.
pub trait Cursor {
    type Item;

    /// The next item, or `None` at the end.
    fn next_item(&mut self) -> Result<Option<Self::Item>>;

    /// Releases the file handles. Further calls to `next_item` return `None`.
    fn close(&mut self);

    /// Number of records in the underlying file.
    fn len(&self) -> usize;
}

/// Wraps a cursor so the files behind it are cleaned up on exhaustion.
pub struct ManagedIter<C: Cursor> {
    cursor: C,
    path: PathBuf,
    options: DeletionOptions,
    registration: DeleterRegistration,
    finished: bool,
}

impl<C: Cursor> ManagedIter<C> {
    pub fn new(
        cursor: C,
        path: impl Into<PathBuf>,
        options: DeletionOptions,
        registration: DeleterRegistration,
    ) -> Self {
        Self { cursor, path: path.into(), options, registration, finished: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.cursor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The next item. At the end the files are closed and, if eligible,
    /// deleted before `None` is returned. An error ends the iteration
    /// without deleting anything.
    pub fn next_item(&mut self) -> Result<Option<C::Item>> {
        if self.finished {
            return Ok(None);
        }
        match self.cursor.next_item() {
            Ok(Some(item)) => Ok(Some(item)),
            Ok(None) => {
                self.finish();
                Ok(None)
            }
            Err(e) => {
                self.cursor.close();
                self.finished = true;
                Err(e)
            }
        }
    }

    /// Ends the iteration early with the same cleanup as reaching the end.
    pub fn close(&mut self) {
        if !self.finished {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.cursor.close();
        self.finished = true;
        self.maybe_delete_files();
    }

    fn maybe_delete_files(&mut self) {
        let options = &self.options;
        if !options.del_after_read || options.strict_no_del || options.overwrite_shp {
            return;
        }
        if let Some(deleter) = self.registration.take_if_targets(&self.path) {
            deleter.delete_files(options.del_after_read, options.strict_no_del);
        }
    }
}

impl<C: Cursor> Iterator for ManagedIter<C> {
    type Item = Result<C::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_item().transpose()
    }
}

impl<C: Cursor> Drop for ManagedIter<C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.options.delete_on_abandon {
            self.finish();
        } else {
            debug!("Iterator over {} dropped before the end, files kept", self.path.display());
            self.cursor.close();
        }
    }
}
