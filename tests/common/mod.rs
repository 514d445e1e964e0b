//! Shared fixtures for txfs integration tests.

use assert_cmd::cargo::cargo_bin_cmd;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use txfs::fs::TxFileManager;

/// A scratch workspace with a separate backup folder.
pub struct Fixture {
    pub temp: TempDir,
}

#[allow(unused)]
impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("work")).unwrap();
        Self { temp }
    }

    pub fn work(&self) -> PathBuf {
        self.temp.path().join("work")
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.work().join(relative)
    }

    pub fn backups(&self) -> PathBuf {
        self.temp.path().join("backups")
    }

    pub fn manager(&self) -> TxFileManager {
        TxFileManager::new()
            .with_temp_dir(self.backups())
            .with_temp_prefix("test")
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap()
    }

    pub fn backup_count(&self) -> usize {
        fs::read_dir(self.backups())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Every file and directory under the work folder with file contents,
    /// sorted by path.
    pub fn snapshot(&self) -> Vec<(PathBuf, Option<Vec<u8>>)> {
        let mut entries = Vec::new();
        collect(&self.work(), &self.work(), &mut entries);
        entries.sort();
        entries
    }
}

fn collect(root: &Path, dir: &Path, entries: &mut Vec<(PathBuf, Option<Vec<u8>>)>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let relative = path.strip_prefix(root).unwrap().to_path_buf();
        if path.is_dir() {
            entries.push((relative, None));
            collect(root, &path, entries);
        } else {
            entries.push((relative, Some(fs::read(&path).unwrap())));
        }
    }
}

/// Runs the txfs binary in the fixture's work folder.
#[allow(unused)]
pub fn run_txfs(fixture: &Fixture, args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = cargo_bin_cmd!("txfs");
    cmd.arg("--temp-dir")
        .arg(fixture.backups())
        .args(args)
        .current_dir(fixture.work());

    cmd.assert()
}
