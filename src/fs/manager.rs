//! The transactional file manager facade.

use super::config::TxFileManagerConfig;
use super::enlistment::TxEnlistment;
use crate::error::Result;
use crate::txn::{Transaction, TransactionId};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File operations that can take part in a transaction.
///
/// Arguments mirror the plain `std::fs` primitives.
pub trait FileOperations {
    /// Appends `contents`, creating the file if needed.
    fn append_all_text(&self, path: &Path, contents: &str) -> Result<()>;

    /// Copies `source` to `destination`. Fails if `destination` exists and
    /// `overwrite` is false.
    fn copy(&self, source: &Path, destination: &Path, overwrite: bool) -> Result<()>;

    /// Creates `path` and any missing ancestors.
    fn create_directory(&self, path: &Path) -> Result<()>;

    /// Deletes a file. A missing file is not an error.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Moves a regular file, replacing `destination` if it exists. Directories
    /// are rejected.
    fn move_file(&self, source: &Path, destination: &Path) -> Result<()>;

    /// Records a rollback point for a file that is about to be changed by
    /// other means.
    fn snapshot(&self, path: &Path) -> Result<()>;

    fn write_all_text(&self, path: &Path, contents: &str) -> Result<()>;

    fn write_all_bytes(&self, path: &Path, contents: &[u8]) -> Result<()>;
}

/// Transactional file manager.
///
/// Operations join the ambient transaction ([`Transaction::current`]) when
/// there is one, through one participant per transaction. Without an ambient
/// transaction they execute immediately.
///
/// ## Example
///
/// ```no_run
/// # use txfs::fs::{FileOperations, TxFileManager};
/// # use txfs::txn::TransactionScope;
/// # use std::path::Path;
/// # fn example() -> txfs::error::Result<()> {
/// let manager = TxFileManager::new();
/// let mut scope = TransactionScope::new()?;
///
/// manager.create_directory(Path::new("Data/Textures"))?;
/// manager.write_all_text(Path::new("Data/plugins.txt"), "Mod.esp\n")?;
///
/// scope.complete()?; // Without this, dropping the scope undoes both
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct TxFileManager {
    config: TxFileManagerConfig,
    enlistments: Mutex<HashMap<TransactionId, Arc<TxEnlistment>>>,
}

impl TxFileManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TxFileManagerConfig) -> Self {
        Self {
            config,
            enlistments: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the folder receiving backup copies.
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = temp_dir.into();
        self
    }

    /// Sets the prefix of backup file names.
    pub fn with_temp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.temp_prefix = Some(prefix.into());
        self
    }

    pub fn ignore_exceptions_in_rollback(mut self, ignore: bool) -> Self {
        self.config.ignore_exceptions_in_rollback = ignore;
        self
    }

    pub fn config(&self) -> &TxFileManagerConfig {
        &self.config
    }

    /// Returns the participant for `transaction`, creating it on first use.
    ///
    /// Participants of transactions that are no longer active are dropped.
    pub fn enlistment_for(&self, transaction: &Arc<Transaction>) -> Arc<TxEnlistment> {
        let mut enlistments = self.enlistments.lock();
        enlistments.retain(|_, participant| {
            participant
                .transaction()
                .is_some_and(|txn| txn.status().is_active())
        });

        Arc::clone(
            enlistments
                .entry(transaction.id())
                .or_insert_with(|| {
                    log::debug!("{}: new file participant", transaction.id());
                    TxEnlistment::new(Some(Arc::clone(transaction)), self.config.clone())
                }),
        )
    }

    /// Participant for the ambient transaction, or an untracked one.
    fn current_enlistment(&self) -> Arc<TxEnlistment> {
        match Transaction::current() {
            Some(txn) => self.enlistment_for(&txn),
            None => TxEnlistment::new(None, self.config.clone()),
        }
    }
}

impl FileOperations for TxFileManager {
    fn append_all_text(&self, path: &Path, contents: &str) -> Result<()> {
        self.current_enlistment().append_all_text(path, contents)
    }

    fn copy(&self, source: &Path, destination: &Path, overwrite: bool) -> Result<()> {
        self.current_enlistment().copy(source, destination, overwrite)
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        self.current_enlistment().create_directory(path)
    }

    fn delete(&self, path: &Path) -> Result<()> {
        self.current_enlistment().delete(path)
    }

    fn move_file(&self, source: &Path, destination: &Path) -> Result<()> {
        self.current_enlistment().move_file(source, destination)
    }

    fn snapshot(&self, path: &Path) -> Result<()> {
        self.current_enlistment().snapshot(path)
    }

    fn write_all_text(&self, path: &Path, contents: &str) -> Result<()> {
        self.current_enlistment().write_all_text(path, contents)
    }

    fn write_all_bytes(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.current_enlistment().write_all_bytes(path, contents)
    }
}
