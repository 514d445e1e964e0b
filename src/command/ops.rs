use crate::error::Result;
use crate::fs::{FileOperations, TxFileManager, copy_tree};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
pub struct CopyArgs {
    /// File or directory to copy
    pub source: PathBuf,

    /// Destination path
    pub destination: PathBuf,

    /// Fail instead of replacing an existing destination file
    #[arg(long)]
    pub no_overwrite: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct MoveArgs {
    /// File to move
    pub source: PathBuf,

    /// New path, replaced if it exists
    pub destination: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Files to delete; missing files are ignored
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct MkdirArgs {
    /// Directory to create
    pub path: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct WriteArgs {
    /// File to write
    pub path: PathBuf,

    /// Text to write
    pub content: String,

    /// Append instead of replacing the file
    #[arg(long, short = 'a')]
    pub append: bool,
}

pub fn copy(args: &CopyArgs, manager: &TxFileManager) -> Result<()> {
    if args.no_overwrite {
        if args.source.is_file() {
            return manager.copy(&args.source, &args.destination, false);
        }
        log::warn!("--no-overwrite only applies to single files");
    }
    copy_tree(manager, &args.source, &args.destination)
}

pub fn move_file(args: &MoveArgs, manager: &TxFileManager) -> Result<()> {
    manager.move_file(&args.source, &args.destination)
}

pub fn delete(args: &DeleteArgs, manager: &TxFileManager) -> Result<()> {
    for path in &args.paths {
        manager.delete(path)?;
    }
    Ok(())
}

pub fn mkdir(args: &MkdirArgs, manager: &TxFileManager) -> Result<()> {
    manager.create_directory(&args.path)
}

pub fn write(args: &WriteArgs, manager: &TxFileManager) -> Result<()> {
    if args.append {
        manager.append_all_text(&args.path, &args.content)
    } else {
        manager.write_all_text(&args.path, &args.content)
    }
}
