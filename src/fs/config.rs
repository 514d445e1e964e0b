//! File manager configuration and backup naming.

use crate::error::Result;

use std::fs;
use std::path::{Path, PathBuf};

/// Length of the random component in backup file names.
const BACKUP_RAND_LEN: usize = 8;

/// Settings shared by every participant a [`TxFileManager`](super::TxFileManager) creates.
#[derive(Debug, Clone)]
pub struct TxFileManagerConfig {
    /// Folder receiving backup copies.
    pub temp_dir: PathBuf,
    /// Prepended to backup file names as `<prefix>-`.
    pub temp_prefix: Option<String>,
    /// Log and swallow undo failures instead of failing the rollback.
    pub ignore_exceptions_in_rollback: bool,
}

impl Default for TxFileManagerConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            temp_prefix: None,
            ignore_exceptions_in_rollback: false,
        }
    }
}

impl TxFileManagerConfig {
    /// Reserves a fresh backup path for `original`.
    ///
    /// The name is `<prefix>-<random><ext>`, keeping the original extension.
    /// The file is created exclusively, so an existing name is never reused.
    pub(crate) fn reserve_backup_path(&self, original: &Path) -> Result<PathBuf> {
        fs::create_dir_all(&self.temp_dir)?;

        let prefix = self
            .temp_prefix
            .as_deref()
            .map(|p| format!("{p}-"))
            .unwrap_or_default();
        let suffix = original
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let reserved = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .rand_bytes(BACKUP_RAND_LEN)
            .tempfile_in(&self.temp_dir)?;

        let path = reserved
            .into_temp_path()
            .keep()
            .map_err(|e| e.error)?;
        Ok(path)
    }
}
