//! Recursive copies through a [`FileOperations`] implementation.

use super::manager::FileOperations;
use crate::error::{Result, TxError};

use std::fs;
use std::io;
use std::path::Path;

/// Copies a file, or a directory recursively, overwriting existing files.
pub fn copy_tree<O>(ops: &O, source: &Path, destination: &Path) -> Result<()>
where
    O: FileOperations + ?Sized,
{
    copy_tree_with(ops, source, destination, &mut |_| false).map(|_| ())
}

/// Copies a file, or a directory recursively, overwriting existing files.
///
/// `on_copied` receives the source path of every copied file; returning
/// `true` cancels the remaining copies. Returns `Ok(false)` if cancelled.
///
/// Missing destination directories are created through `ops`, so they are
/// removed again if the surrounding transaction rolls back.
pub fn copy_tree_with<O, F>(ops: &O, source: &Path, destination: &Path, on_copied: &mut F) -> Result<bool>
where
    O: FileOperations + ?Sized,
    F: FnMut(&Path) -> bool,
{
    if source.is_file() {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                ops.create_directory(parent)?;
            }
        }
        ops.copy(source, destination, true)?;
        return Ok(!on_copied(source));
    }

    if !source.is_dir() {
        return Err(TxError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Source does not exist: {}", source.display()),
        )));
    }

    if !destination.is_dir() {
        ops.create_directory(destination)?;
    }

    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        } else {
            files.push(entry.path());
        }
    }
    files.sort();
    dirs.sort();

    for file in &files {
        let Some(name) = file.file_name() else {
            continue;
        };
        ops.copy(file, &destination.join(name), true)?;
        if on_copied(file) {
            return Ok(false);
        }
    }

    for dir in &dirs {
        let Some(name) = dir.file_name() else {
            continue;
        };
        if !copy_tree_with(ops, dir, &destination.join(name), on_copied)? {
            return Ok(false);
        }
    }

    Ok(true)
}
