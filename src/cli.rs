use crate::command::TxfsCommand;
use crate::fs::{TxFileManager, TxFileManagerConfig};
use clap::{ArgAction, Args, Parser};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "txfs", version, about = "Run file operations as a single all-or-nothing transaction")]
pub struct TxfsCli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub transaction: TransactionArgs,

    #[command(subcommand)]
    pub command: TxfsCommand,
}

#[derive(Args, Debug, Clone)]
pub struct TransactionArgs {
    /// Folder for backup copies (defaults to the system temp folder)
    #[arg(long, value_name = "DIR", global = true)]
    pub temp_dir: Option<PathBuf>,

    /// Prefix for backup file names
    #[arg(long, value_name = "PREFIX", global = true)]
    pub prefix: Option<String>,

    /// Log rollback failures instead of reporting them as errors
    #[arg(long, global = true)]
    pub ignore_rollback_errors: bool,

    /// Perform the operation, then roll it back instead of committing
    #[arg(long, global = true)]
    pub rollback: bool,
}

impl TransactionArgs {
    pub fn file_manager(&self) -> TxFileManager {
        let mut config = TxFileManagerConfig {
            temp_prefix: self.prefix.clone(),
            ignore_exceptions_in_rollback: self.ignore_rollback_errors,
            ..Default::default()
        };
        if let Some(dir) = &self.temp_dir {
            config.temp_dir = dir.clone();
        }
        TxFileManager::with_config(config)
    }
}

impl TxfsCli {
    /// Log filter implied by `-v` flags; `RUST_LOG` takes precedence.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    }
}
