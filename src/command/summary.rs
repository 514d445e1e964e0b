//! Post-run report of what the transaction touched.

use crate::fs::RollbackOperation;
use crate::txn::TransactionStatus;
use colored::Colorize;
use std::path::Path;

/// Journal entries captured before the transaction was resolved.
pub struct Summary {
    files: Vec<String>,
    created_files: Vec<String>,
    directories: Vec<String>,
}

impl Summary {
    pub fn new(journal: Vec<RollbackOperation>) -> Self {
        let root = std::env::current_dir().unwrap_or_default();

        let mut files = Vec::new();
        let mut created_files = Vec::new();
        let mut directories = Vec::new();

        for op in &journal {
            let display = display_path(op.path(), &root);
            match op {
                RollbackOperation::FileBackup {
                    backup: Some(_), ..
                } => files.push(display),
                RollbackOperation::FileBackup { backup: None, .. } => created_files.push(display),
                RollbackOperation::DirectoryCreation { .. } => directories.push(display),
            }
        }

        // A path journaled twice (e.g. written then appended) is listed once.
        for list in [&mut files, &mut created_files, &mut directories] {
            list.sort();
            list.dedup();
        }

        Self {
            files,
            created_files,
            directories,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.created_files.is_empty() && self.directories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len() + self.created_files.len() + self.directories.len()
    }

    /// Prints the categorized summary to stdout.
    pub fn print(&self, status: TransactionStatus) {
        if self.is_empty() {
            println!("\n{}", "No changes needed".yellow());
            return;
        }

        let (header, mark) = match status {
            TransactionStatus::Committed => ("Changes committed:".green().bold(), "✓".green()),
            TransactionStatus::Aborted => ("Changes rolled back:".yellow().bold(), "↺".yellow()),
            TransactionStatus::InDoubt | TransactionStatus::Active => {
                ("Transaction in doubt:".red().bold(), "?".red())
            }
        };
        println!("\n{}", header);

        let sections = [
            ("📁", "Directories created", &self.directories),
            ("📝", "Files modified", &self.files),
            ("📄", "Files created", &self.created_files),
        ];

        for (icon, title, paths) in sections {
            if paths.is_empty() {
                continue;
            }
            println!(
                "\n{} {} ({} path{})",
                icon.bold(),
                title,
                paths.len(),
                if paths.len() == 1 { "" } else { "s" }
            );
            for path in paths.iter().take(8) {
                println!("   {} {}", mark, path.dimmed());
            }
            if paths.len() > 8 {
                println!("   {} {} more...", mark, paths.len() - 8);
            }
        }

        println!();
        println!("{} {} ({} path{})", mark.bold(), status, self.len(), if self.len() == 1 { "" } else { "s" });
    }
}

/// Path relative to `root`, with forward slashes.
fn display_path(path: &Path, root: &Path) -> String {
    let relative = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
    relative.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_categorizes_and_dedups() {
        let journal = vec![
            RollbackOperation::DirectoryCreation {
                path: PathBuf::from("/work/out"),
                existed_before: false,
            },
            RollbackOperation::FileBackup {
                original: PathBuf::from("/work/out/a.txt"),
                backup: None,
            },
            RollbackOperation::FileBackup {
                original: PathBuf::from("/work/out/a.txt"),
                backup: None,
            },
            RollbackOperation::FileBackup {
                original: PathBuf::from("/work/b.txt"),
                backup: Some(PathBuf::from("/tmp/x.txt")),
            },
        ];

        let summary = Summary::new(journal);

        assert_eq!(summary.directories.len(), 1);
        assert_eq!(summary.created_files.len(), 1);
        assert_eq!(summary.files.len(), 1);
        assert_eq!(summary.len(), 3);

        // Should not panic
        summary.print(TransactionStatus::Committed);
        summary.print(TransactionStatus::Aborted);
    }

    #[test]
    fn test_display_path_relative_with_forward_slashes() {
        let display = display_path(Path::new("/work/a/b/c.txt"), Path::new("/work"));
        assert_eq!(display, "a/b/c.txt");
    }

    #[test]
    fn test_empty_summary() {
        let summary = Summary::new(Vec::new());
        assert!(summary.is_empty());
        summary.print(TransactionStatus::Committed);
    }
}
