pub mod ops;
pub mod summary;

use crate::cli::TxfsCli;
use crate::error::Result;
use crate::fs::TxFileManager;
use crate::txn::{TransactionScope, TransactionStatus};
use clap::Subcommand;
use summary::Summary;

#[derive(Subcommand)]
pub enum TxfsCommand {
    /// Copy a file or directory tree
    Copy(ops::CopyArgs),
    /// Move a file
    Move(ops::MoveArgs),
    /// Delete files
    Delete(ops::DeleteArgs),
    /// Create a directory and any missing parents
    Mkdir(ops::MkdirArgs),
    /// Write or append text to a file
    Write(ops::WriteArgs),
}

impl TxfsCommand {
    fn run(&self, manager: &TxFileManager) -> Result<()> {
        match self {
            TxfsCommand::Copy(args) => ops::copy(args, manager),
            TxfsCommand::Move(args) => ops::move_file(args, manager),
            TxfsCommand::Delete(args) => ops::delete(args, manager),
            TxfsCommand::Mkdir(args) => ops::mkdir(args, manager),
            TxfsCommand::Write(args) => ops::write(args, manager),
        }
    }
}

/// Runs the command inside one transaction scope.
///
/// Commits on success. Rolls back if the command fails or `--rollback` was
/// given.
pub fn execute(cli: TxfsCli) -> Result<()> {
    let manager = cli.transaction.file_manager();
    let mut scope = TransactionScope::new()?;

    if let Err(e) = cli.command.run(&manager) {
        log::warn!("Operation failed, rolling back");
        if let Err(rollback_err) = scope.dispose() {
            log::error!("{}", rollback_err);
        }
        return Err(e);
    }

    let participant = manager.enlistment_for(scope.transaction());
    let summary = Summary::new(participant.journal());

    let status = if cli.transaction.rollback {
        let txn = scope.transaction().clone();
        scope.dispose()?;
        txn.status()
    } else {
        let status = scope.complete()?;
        scope.dispose()?;
        status
    };

    summary.print(status);

    if status == TransactionStatus::InDoubt {
        log::warn!("Transaction outcome is in doubt");
    }
    Ok(())
}
