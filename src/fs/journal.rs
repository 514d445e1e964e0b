//! Journal entries that undo one file system mutation.

use super::config::TxFileManagerConfig;
use crate::error::{Result, TxError};

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Undo record for one mutation, captured before the mutation happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOperation {
    /// Restores a file from a backup copy.
    ///
    /// `backup` is `None` when the file did not exist, in which case undoing
    /// deletes whatever is at `original`.
    FileBackup {
        original: PathBuf,
        backup: Option<PathBuf>,
    },
    /// Removes a directory the transaction created.
    DirectoryCreation { path: PathBuf, existed_before: bool },
}

impl RollbackOperation {
    /// Captures the current state of `path`, copying it into the backup
    /// folder if it exists.
    pub fn file_backup(path: &Path, config: &TxFileManagerConfig) -> Result<Self> {
        let backup = if path.is_file() {
            let backup = config.reserve_backup_path(path)?;
            copy_to_backup(path, &backup)?;
            log::debug!("Backed up {} to {}", path.display(), backup.display());
            Some(backup)
        } else {
            None
        };

        Ok(RollbackOperation::FileBackup {
            original: path.to_path_buf(),
            backup,
        })
    }

    pub fn directory_creation(path: &Path) -> Self {
        RollbackOperation::DirectoryCreation {
            path: path.to_path_buf(),
            existed_before: path.is_dir(),
        }
    }

    /// The path this entry protects.
    pub fn path(&self) -> &Path {
        match self {
            RollbackOperation::FileBackup { original, .. } => original,
            RollbackOperation::DirectoryCreation { path, .. } => path,
        }
    }

    pub fn backup_path(&self) -> Option<&Path> {
        match self {
            RollbackOperation::FileBackup { backup, .. } => backup.as_deref(),
            RollbackOperation::DirectoryCreation { .. } => None,
        }
    }

    /// Restores the state captured when the entry was recorded.
    pub fn undo(&self) -> Result<()> {
        match self {
            RollbackOperation::FileBackup {
                original,
                backup: Some(backup),
            } => {
                if let Some(parent) = original.parent() {
                    if !parent.as_os_str().is_empty() && !parent.is_dir() {
                        fs::create_dir_all(parent)?;
                    }
                }
                fs::copy(backup, original).map_err(|e| {
                    TxError::Io(io::Error::new(
                        e.kind(),
                        format!("Failed to restore {}: {}", original.display(), e),
                    ))
                })?;
                log::debug!("Restored {}", original.display());
            }
            RollbackOperation::FileBackup {
                original,
                backup: None,
            } => {
                if original.is_file() {
                    fs::remove_file(original)?;
                    log::debug!("Removed {}", original.display());
                }
            }
            RollbackOperation::DirectoryCreation {
                path,
                existed_before: false,
            } => {
                if path.is_dir() {
                    if fs::read_dir(path)?.next().is_some() {
                        return Err(TxError::DirectoryNotEmpty(path.clone()));
                    }
                    fs::remove_dir(path)?;
                    log::debug!("Removed directory {}", path.display());
                }
            }
            RollbackOperation::DirectoryCreation { .. } => {}
        }
        Ok(())
    }

    /// Deletes the backup copy, if one was taken.
    pub fn clean_up(&self) -> Result<()> {
        if let Some(backup) = self.backup_path() {
            if backup.exists() {
                clear_readonly(backup)?;
                fs::remove_file(backup)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for RollbackOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackOperation::FileBackup {
                original,
                backup: Some(_),
            } => write!(f, "restore {}", original.display()),
            RollbackOperation::FileBackup {
                original,
                backup: None,
            } => write!(f, "remove {}", original.display()),
            RollbackOperation::DirectoryCreation { path, .. } => {
                write!(f, "remove directory {}", path.display())
            }
        }
    }
}

#[cfg(unix)]
fn clear_readonly(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    if perms.readonly() {
        perms.set_mode(perms.mode() | 0o200);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn clear_readonly(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

/// Copies `path` over its reserved backup, releasing the reservation if the
/// copy fails.
fn copy_to_backup(path: &Path, backup: &Path) -> Result<()> {
    if let Err(e) = fs::copy(path, backup) {
        if let Err(remove_err) = fs::remove_file(backup) {
            log::warn!("Failed to remove reserved backup {}: {}", backup.display(), remove_err);
        }
        return Err(TxError::Io(io::Error::new(
            e.kind(),
            format!("Failed to back up {}: {}", path.display(), e),
        )));
    }
    Ok(())
}
