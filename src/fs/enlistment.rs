//! The file system participant.
//!
//! A [`TxEnlistment`] performs file operations directly and, while bound to
//! an active transaction, journals how to undo each one before performing
//! it. It enlists itself with that transaction on the first journaled
//! operation and resolves its journal when the transaction commits or rolls
//! back.
//!
//! ## Journal lifecycle
//!
//! - **Active**: entries are appended in operation order
//! - **Commit**: entries are cleaned up in order (backups deleted)
//! - **Rollback**: entries are undone and cleaned up in reverse order
//!
//! Either way the journal is cleared and the participant is no longer
//! enlisted afterwards.

use super::config::TxFileManagerConfig;
use super::journal::RollbackOperation;
use super::manager::FileOperations;
use crate::error::{Result, TxError};
use crate::txn::{
    Enlistment, EnlistmentNotification, EnlistmentOptions, PreparingEnlistment, Transaction,
    TransactionId,
};

use parking_lot::Mutex;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug, Default)]
struct JournalState {
    journal: Vec<RollbackOperation>,
    /// Transaction currently holding this participant.
    enlisted_in: Option<TransactionId>,
}

/// Counts of pending journal entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalStats {
    pub files: usize,
    pub directories: usize,
    pub total: usize,
}

/// File system resource manager for a single transaction.
///
/// Without a transaction every operation executes immediately with no
/// journaling.
pub struct TxEnlistment {
    transaction: Option<Arc<Transaction>>,
    config: TxFileManagerConfig,
    ignore_exceptions_in_rollback: AtomicBool,
    state: Mutex<JournalState>,
    this: Weak<TxEnlistment>,
}

impl TxEnlistment {
    pub fn new(transaction: Option<Arc<Transaction>>, config: TxFileManagerConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            transaction,
            ignore_exceptions_in_rollback: AtomicBool::new(config.ignore_exceptions_in_rollback),
            config,
            state: Mutex::new(JournalState::default()),
            this: this.clone(),
        })
    }

    pub fn transaction(&self) -> Option<&Arc<Transaction>> {
        self.transaction.as_ref()
    }

    pub fn ignore_exceptions_in_rollback(&self) -> bool {
        self.ignore_exceptions_in_rollback.load(Ordering::Relaxed)
    }

    pub fn set_ignore_exceptions_in_rollback(&self, ignore: bool) {
        self.ignore_exceptions_in_rollback
            .store(ignore, Ordering::Relaxed);
    }

    /// Returns true while enlisted in its transaction.
    pub fn is_enlisted(&self) -> bool {
        let enlisted_in = self.state.lock().enlisted_in;
        match (&self.transaction, enlisted_in) {
            (Some(txn), Some(id)) => txn.id() == id,
            _ => false,
        }
    }

    /// Snapshot of the pending journal, oldest entry first.
    pub fn journal(&self) -> Vec<RollbackOperation> {
        self.state.lock().journal.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().journal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().journal.is_empty()
    }

    /// Returns a human-readable description of each pending undo step.
    pub fn preview(&self) -> Vec<String> {
        self.state
            .lock()
            .journal
            .iter()
            .map(|op| op.to_string())
            .collect()
    }

    pub fn stats(&self) -> JournalStats {
        let state = self.state.lock();
        let mut files = 0;
        let mut directories = 0;

        for op in &state.journal {
            match op {
                RollbackOperation::FileBackup { .. } => files += 1,
                RollbackOperation::DirectoryCreation { .. } => directories += 1,
            }
        }

        JournalStats {
            files,
            directories,
            total: state.journal.len(),
        }
    }

    /// The transaction to journal against, or `None` when operations run
    /// untracked.
    ///
    /// Fails if the transaction has already been resolved.
    fn active_transaction(&self) -> Result<Option<&Arc<Transaction>>> {
        match &self.transaction {
            Some(txn) if !txn.status().is_active() => Err(TxError::InvalidState {
                action: "enlist in",
                status: txn.status(),
            }),
            txn => Ok(txn.as_ref()),
        }
    }

    /// Appends an undo record and enlists with the transaction.
    fn record(&self, txn: &Arc<Transaction>, op: RollbackOperation) -> Result<()> {
        log::debug!("{}: journal {}", txn.id(), op);

        let needs_enlisting = {
            let mut state = self.state.lock();
            state.journal.push(op);
            state.enlisted_in != Some(txn.id())
        };

        if needs_enlisting {
            let this = self.this.upgrade().ok_or_else(|| {
                TxError::Other(anyhow::anyhow!("participant dropped while enlisting"))
            })?;
            txn.enlist_volatile(this, EnlistmentOptions::None)?;
            self.state.lock().enlisted_in = Some(txn.id());
        }

        Ok(())
    }

    /// Journals a backup of `path` if a transaction is active.
    fn journal_file(&self, path: &Path) -> Result<()> {
        if let Some(txn) = self.active_transaction()? {
            let op = RollbackOperation::file_backup(path, &self.config)?;
            self.record(txn, op)?;
        }
        Ok(())
    }

    /// Journals every directory that creating `path` will bring into being.
    ///
    /// Walks the path one component at a time. Components that already exist,
    /// or whose parent cannot be written to, are skipped.
    fn journal_directories(&self, txn: &Arc<Transaction>, path: &Path) -> Result<()> {
        let mut current = PathBuf::new();

        for component in path.components() {
            let parent = current.clone();
            current.push(component);

            if !matches!(component, Component::Normal(_)) {
                continue;
            }

            if !current.exists() && Self::can_create_in(&parent) {
                self.record(txn, RollbackOperation::directory_creation(&current))?;
            }
        }

        Ok(())
    }

    fn can_create_in(parent: &Path) -> bool {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };

        match fs::metadata(parent) {
            Ok(metadata) => !metadata.permissions().readonly(),
            // Missing parents are created by this same call.
            Err(e) => e.kind() == io::ErrorKind::NotFound,
        }
    }

    /// Checks if paths are on same filesystem.
    ///
    /// Determines if `rename()` is possible, or if cross-filesystem
    /// copy+delete is required.
    fn is_same_filesystem(from: &Path, to: &Path) -> Result<bool> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let from_meta = fs::metadata(from)?;
            let to_parent = match to.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let to_meta = fs::metadata(to_parent)?;
            Ok(from_meta.dev() == to_meta.dev())
        }

        #[cfg(not(unix))]
        {
            Ok(volume_prefix(from) == volume_prefix(to))
        }
    }
}

/// Drive or UNC prefix of `path`, resolved against the working directory
/// for relative paths.
#[cfg(not(unix))]
fn volume_prefix(path: &Path) -> Option<std::ffi::OsString> {
    use std::path::Component;

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    match absolute.components().next() {
        Some(Component::Prefix(prefix)) => Some(prefix.as_os_str().to_ascii_lowercase()),
        _ => None,
    }
}

fn io_error(action: &str, path: &Path, e: io::Error) -> TxError {
    TxError::Io(io::Error::new(
        e.kind(),
        format!("Failed to {} {}: {}", action, path.display(), e),
    ))
}

impl FileOperations for TxEnlistment {
    fn append_all_text(&self, path: &Path, contents: &str) -> Result<()> {
        self.journal_file(path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| io_error("open", path, e))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| io_error("append to", path, e))?;
        Ok(())
    }

    fn copy(&self, source: &Path, destination: &Path, overwrite: bool) -> Result<()> {
        self.journal_file(destination)?;

        if !overwrite && destination.exists() {
            return Err(TxError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("Destination already exists: {}", destination.display()),
            )));
        }

        fs::copy(source, destination).map_err(|e| {
            TxError::Io(io::Error::new(
                e.kind(),
                format!(
                    "Failed to copy {} → {}: {}",
                    source.display(),
                    destination.display(),
                    e
                ),
            ))
        })?;
        Ok(())
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        if let Some(txn) = self.active_transaction()? {
            self.journal_directories(txn, path)?;
        }

        fs::create_dir_all(path).map_err(|e| io_error("create directory", path, e))?;
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<()> {
        self.journal_file(path)?;

        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(io_error("delete", path, e)),
            _ => Ok(()),
        }
    }

    fn move_file(&self, source: &Path, destination: &Path) -> Result<()> {
        if !source.is_file() {
            return Err(TxError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Cannot move {}: not a regular file", source.display()),
            )));
        }

        self.journal_file(source)?;
        self.journal_file(destination)?;

        if Self::is_same_filesystem(source, destination)? {
            fs::rename(source, destination).map_err(|e| {
                TxError::Io(io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to move {} → {}: {}",
                        source.display(),
                        destination.display(),
                        e
                    ),
                ))
            })?;
        } else {
            fs::copy(source, destination)?;
            fs::remove_file(source)?;
        }
        Ok(())
    }

    fn snapshot(&self, path: &Path) -> Result<()> {
        self.journal_file(path)
    }

    fn write_all_text(&self, path: &Path, contents: &str) -> Result<()> {
        self.write_all_bytes(path, contents.as_bytes())
    }

    fn write_all_bytes(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.journal_file(path)?;

        fs::write(path, contents).map_err(|e| io_error("write", path, e))?;
        Ok(())
    }
}

impl EnlistmentNotification for TxEnlistment {
    fn prepare(&self, enlistment: &mut PreparingEnlistment) -> Result<()> {
        enlistment.prepared();
        Ok(())
    }

    fn commit(&self, enlistment: &mut Enlistment) -> Result<()> {
        let journal = {
            let mut state = self.state.lock();
            state.enlisted_in = None;
            std::mem::take(&mut state.journal)
        };

        for op in &journal {
            if let Err(e) = op.clean_up() {
                log::warn!("Failed to clean up backup for {}: {}", op.path().display(), e);
            }
        }

        enlistment.done();
        Ok(())
    }

    /// Undoes the journal, most recent entry first.
    ///
    /// An entry that fails to undo keeps its backup so the data is not lost.
    fn rollback(&self, enlistment: &mut Enlistment) -> Result<()> {
        let journal = {
            let mut state = self.state.lock();
            state.enlisted_in = None;
            std::mem::take(&mut state.journal)
        };
        let ignore = self.ignore_exceptions_in_rollback();
        let mut first_error = None;

        for op in journal.iter().rev() {
            match op.undo() {
                Ok(()) => {
                    if let Err(e) = op.clean_up() {
                        log::warn!("Failed to clean up backup for {}: {}", op.path().display(), e);
                    }
                }
                Err(e) => {
                    if let Some(backup) = op.backup_path() {
                        log::warn!("Keeping backup of {} at {}", op.path().display(), backup.display());
                    }
                    if ignore {
                        log::warn!("Failed to {}: {}", op, e);
                    } else {
                        log::error!("Failed to {}: {}", op, e);
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(TxError::RollbackFailed {
                source: Box::new(e),
            });
        }

        enlistment.done();
        Ok(())
    }

    fn in_doubt(&self, enlistment: &mut Enlistment) -> Result<()> {
        self.rollback(enlistment)
    }
}

impl fmt::Debug for TxEnlistment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TxEnlistment")
            .field("transaction", &self.transaction.as_ref().map(|txn| txn.id()))
            .field("journal", &state.journal.len())
            .field("enlisted_in", &state.enlisted_in)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::TransactionStatus;
    use tempfile::TempDir;

    fn config(temp: &TempDir) -> TxFileManagerConfig {
        TxFileManagerConfig {
            temp_dir: temp.path().join("backups"),
            ..Default::default()
        }
    }

    fn backups(temp: &TempDir) -> usize {
        fs::read_dir(temp.path().join("backups"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[test]
    fn test_without_transaction_runs_untracked() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        let participant = TxEnlistment::new(None, config(&temp));

        participant.write_all_text(&file, "content").unwrap();

        assert_eq!(fs::read_to_string(&file).unwrap(), "content");
        assert!(participant.is_empty());
        assert!(!participant.is_enlisted());
        assert_eq!(backups(&temp), 0);
    }

    #[test]
    fn test_enlists_once_per_transaction() {
        let temp = TempDir::new().unwrap();
        let txn = Transaction::new();
        let participant = TxEnlistment::new(Some(txn.clone()), config(&temp));

        participant.write_all_text(&temp.path().join("a.txt"), "a").unwrap();
        participant.write_all_text(&temp.path().join("b.txt"), "b").unwrap();

        assert!(participant.is_enlisted());
        assert_eq!(txn.participant_count(), 1);
        assert_eq!(participant.len(), 2);
    }

    #[test]
    fn test_commit_cleans_up_backups() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "A").unwrap();

        let txn = Transaction::new();
        let participant = TxEnlistment::new(Some(txn.clone()), config(&temp));
        participant.write_all_text(&file, "B").unwrap();
        assert_eq!(backups(&temp), 1);

        assert!(txn.prepare().unwrap());
        txn.commit().unwrap();

        assert_eq!(txn.status(), TransactionStatus::Committed);
        assert_eq!(fs::read_to_string(&file).unwrap(), "B");
        assert_eq!(backups(&temp), 0);
        assert!(participant.is_empty());
        assert!(!participant.is_enlisted());
    }

    #[test]
    fn test_rollback_restores_in_reverse_order() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "A").unwrap();

        let txn = Transaction::new();
        let participant = TxEnlistment::new(Some(txn.clone()), config(&temp));
        participant.write_all_text(&file, "B").unwrap();
        participant.write_all_text(&file, "C").unwrap();

        txn.rollback().unwrap();

        assert_eq!(fs::read_to_string(&file).unwrap(), "A");
        assert_eq!(txn.status(), TransactionStatus::Aborted);
        assert_eq!(backups(&temp), 0);
    }

    #[test]
    fn test_append_creates_and_rolls_back() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("log.txt");
        fs::write(&file, "one\n").unwrap();
        let created = temp.path().join("created.txt");

        let txn = Transaction::new();
        let participant = TxEnlistment::new(Some(txn.clone()), config(&temp));
        participant.append_all_text(&file, "two\n").unwrap();
        participant.append_all_text(&created, "fresh").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "one\ntwo\n");

        txn.rollback().unwrap();

        assert_eq!(fs::read_to_string(&file).unwrap(), "one\n");
        assert!(!created.exists());
    }

    #[test]
    fn test_delete_rolls_back() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "keep").unwrap();

        let txn = Transaction::new();
        let participant = TxEnlistment::new(Some(txn.clone()), config(&temp));
        participant.delete(&file).unwrap();
        participant.delete(&temp.path().join("missing.txt")).unwrap();
        assert!(!file.exists());

        txn.rollback().unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "keep");
    }

    #[test]
    fn test_copy_without_overwrite_fails_on_existing() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("s.txt");
        let dst = temp.path().join("d.txt");
        fs::write(&src, "source").unwrap();
        fs::write(&dst, "dest").unwrap();

        let participant = TxEnlistment::new(None, config(&temp));
        let err = participant.copy(&src, &dst, false).unwrap_err();

        assert!(matches!(err, TxError::Io(e) if e.kind() == io::ErrorKind::AlreadyExists));
        assert_eq!(fs::read_to_string(&dst).unwrap(), "dest");
    }

    #[test]
    fn test_sibling_paths_share_filesystem() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.txt");
        fs::write(&a, "a").unwrap();

        assert!(TxEnlistment::is_same_filesystem(&a, &temp.path().join("b.txt")).unwrap());
    }

    #[cfg(not(unix))]
    #[test]
    fn test_relative_paths_share_volume() {
        assert_eq!(volume_prefix(Path::new("a.txt")), volume_prefix(Path::new("b.txt")));
        assert_ne!(volume_prefix(Path::new(r"C:\a.txt")), volume_prefix(Path::new(r"\\server\share\b.txt")));
    }

    #[test]
    fn test_move_journals_both_paths() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.txt");
        let b = temp.path().join("b.txt");
        fs::write(&a, "a").unwrap();

        let txn = Transaction::new();
        let participant = TxEnlistment::new(Some(txn.clone()), config(&temp));
        participant.move_file(&a, &b).unwrap();

        assert_eq!(
            participant.preview(),
            vec![format!("restore {}", a.display()), format!("remove {}", b.display())]
        );
        assert_eq!(participant.stats().files, 2);
    }

    #[test]
    fn test_snapshot_only_journals() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "A").unwrap();

        let txn = Transaction::new();
        let participant = TxEnlistment::new(Some(txn.clone()), config(&temp));
        participant.snapshot(&file).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "A");

        fs::write(&file, "changed behind our back").unwrap();
        txn.rollback().unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "A");
    }

    #[test]
    fn test_create_directory_journals_each_new_segment() {
        let temp = TempDir::new().unwrap();
        let x = temp.path().join("x");
        fs::create_dir(&x).unwrap();

        let txn = Transaction::new();
        let participant = TxEnlistment::new(Some(txn.clone()), config(&temp));
        participant.create_directory(&x.join("y").join("z")).unwrap();

        let stats = participant.stats();
        assert_eq!(stats.directories, 2);
        assert_eq!(stats.total, 2);
        assert!(x.join("y/z").is_dir());
    }

    #[test]
    fn test_rollback_failure_is_reported_and_state_cleared() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("made");
        let file = temp.path().join("file.txt");
        fs::write(&file, "A").unwrap();

        let txn = Transaction::new();
        let participant = TxEnlistment::new(Some(txn.clone()), config(&temp));
        participant.write_all_text(&file, "B").unwrap();
        participant.create_directory(&dir).unwrap();
        fs::write(dir.join("user.txt"), "external").unwrap();

        let mut enlistment = Enlistment::new();
        let err = participant.rollback(&mut enlistment).unwrap_err();

        assert!(matches!(
            err,
            TxError::RollbackFailed { ref source } if matches!(**source, TxError::DirectoryNotEmpty(_))
        ));
        assert!(!enlistment.is_done());
        // Entries older than the failed one are still undone.
        assert_eq!(fs::read_to_string(&file).unwrap(), "A");
        assert!(dir.join("user.txt").exists());
        assert!(participant.is_empty());
        assert!(!participant.is_enlisted());
    }

    #[test]
    fn test_rollback_failure_ignored_when_configured() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("made");

        let txn = Transaction::new();
        let participant = TxEnlistment::new(Some(txn.clone()), config(&temp));
        participant.set_ignore_exceptions_in_rollback(true);
        participant.create_directory(&dir).unwrap();
        fs::write(dir.join("user.txt"), "external").unwrap();

        txn.rollback().unwrap();

        assert_eq!(txn.status(), TransactionStatus::Aborted);
        assert!(dir.join("user.txt").exists());
    }

    #[test]
    fn test_operations_after_resolution_are_rejected() {
        let temp = TempDir::new().unwrap();
        let txn = Transaction::new();
        let participant = TxEnlistment::new(Some(txn.clone()), config(&temp));
        txn.commit().unwrap();

        let err = participant
            .write_all_text(&temp.path().join("late.txt"), "late")
            .unwrap_err();
        assert!(matches!(err, TxError::InvalidState { .. }));
        assert!(!temp.path().join("late.txt").exists());
    }
}
