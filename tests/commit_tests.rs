mod common;

use common::*;
use std::sync::Arc;
use txfs::fs::{FileOperations, copy_tree};
use txfs::txn::{Transaction, TransactionScope, TransactionStatus};

#[test]
fn test_commit_leaves_no_backups() {
    let fx = Fixture::new();
    fx.write("a.txt", "a");
    fx.write("b.txt", "b");
    fx.write("c.txt", "c");
    let manager = fx.manager();

    let mut scope = TransactionScope::new().unwrap();
    manager.write_all_text(&fx.path("a.txt"), "a2").unwrap();
    manager.delete(&fx.path("b.txt")).unwrap();
    // Fails on the missing parent; its journal entries must still be cleaned up.
    manager.move_file(&fx.path("c.txt"), &fx.path("moved/c.txt")).unwrap_err();
    manager.create_directory(&fx.path("moved")).unwrap();
    manager.move_file(&fx.path("c.txt"), &fx.path("moved/c.txt")).unwrap();
    manager.snapshot(&fx.path("a.txt")).unwrap();
    assert!(fx.backup_count() > 0);

    assert_eq!(scope.complete().unwrap(), TransactionStatus::Committed);
    scope.dispose().unwrap();

    assert_eq!(fx.backup_count(), 0);
    assert_eq!(fx.read("a.txt"), "a2");
    assert!(!fx.path("b.txt").exists());
    assert_eq!(fx.read("moved/c.txt"), "c");
}

#[test]
fn test_copy_to_new_destination_commits() {
    let fx = Fixture::new();
    fx.write("s.txt", "source");
    let manager = fx.manager();

    let mut scope = TransactionScope::new().unwrap();
    manager.copy(&fx.path("s.txt"), &fx.path("d.txt"), true).unwrap();
    scope.complete().unwrap();
    drop(scope);

    assert_eq!(fx.read("d.txt"), "source");
    assert_eq!(fx.backup_count(), 0);
}

#[test]
fn test_participant_enlisted_once_per_transaction() {
    let fx = Fixture::new();
    let file = fx.write("f.txt", "A");
    let manager = fx.manager();

    let mut scope = TransactionScope::new().unwrap();
    for content in ["B", "C", "D"] {
        manager.write_all_text(&file, content).unwrap();
    }
    assert_eq!(scope.transaction().participant_count(), 1);

    scope.complete().unwrap();
    assert_eq!(fx.read("f.txt"), "D");
    assert_eq!(fx.backup_count(), 0);
}

#[test]
fn test_participant_rejoins_next_transaction() {
    let fx = Fixture::new();
    let file = fx.write("f.txt", "A");
    let manager = fx.manager();

    {
        let mut scope = TransactionScope::new().unwrap();
        manager.write_all_text(&file, "B").unwrap();
        scope.complete().unwrap();
    }

    {
        let scope = TransactionScope::new().unwrap();
        manager.write_all_text(&file, "C").unwrap();
        assert_eq!(scope.transaction().participant_count(), 1);
    }

    assert_eq!(fx.read("f.txt"), "B");
}

#[test]
fn test_copy_tree_commits_whole_tree() {
    let fx = Fixture::new();
    fx.write("mod/plugin.esp", "plugin");
    fx.write("mod/meshes/armor.nif", "nif");
    let manager = fx.manager();

    let mut scope = TransactionScope::new().unwrap();
    copy_tree(&manager, &fx.path("mod"), &fx.path("game/Data")).unwrap();
    let txn = Arc::clone(scope.transaction());
    scope.complete().unwrap();
    drop(scope);

    assert_eq!(txn.status(), TransactionStatus::Committed);
    assert_eq!(fx.read("game/Data/plugin.esp"), "plugin");
    assert_eq!(fx.read("game/Data/meshes/armor.nif"), "nif");
    assert!(Transaction::current().is_none());
}

#[test]
fn test_scope_on_another_thread_is_independent() {
    let _scope = TransactionScope::new().unwrap();

    let handle = std::thread::spawn(|| {
        assert!(Transaction::current().is_none());
        let scope = TransactionScope::new().unwrap();
        scope.transaction().id()
    });

    let other = handle.join().unwrap();
    assert_ne!(other, Transaction::current().unwrap().id());
}
