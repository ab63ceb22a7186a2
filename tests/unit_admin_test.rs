// tests/unit_admin_test.rs

use aegis::core::admin::{AdminAction, ObjectStore};

fn store_in(dir: &tempfile::TempDir) -> ObjectStore {
    ObjectStore::open(&dir.path().join("store.json")).unwrap()
}

#[test]
fn test_create_write_read() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_in(&dir);

    store
        .execute(AdminAction::CreateObject {
            path: "amf".to_string(),
        })
        .unwrap();
    store
        .execute(AdminAction::CreateObjectAndKey {
            path: "amf.timeouts".to_string(),
            key: "cleanup_ms".to_string(),
            value: "3000".to_string(),
        })
        .unwrap();

    let lines = store
        .execute(AdminAction::Read {
            path: "amf.timeouts.cleanup_ms".to_string(),
        })
        .unwrap();
    assert_eq!(lines, vec!["3000".to_string()]);
}

#[test]
fn test_persistence_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = store_in(&dir);
        store
            .execute(AdminAction::CreateObjectAndKey {
                path: "node".to_string(),
                key: "name".to_string(),
                value: "N1".to_string(),
            })
            .unwrap();
    }
    let store = store_in(&dir);
    assert_eq!(store.read("node.name").unwrap(), "N1");
}

#[test]
fn test_delete_and_missing_paths() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_in(&dir);
    store.create_object("a").unwrap();
    store.write_key("a.b", "1").unwrap();

    assert!(store.read("a.missing").is_err());
    store
        .execute(AdminAction::Delete {
            path: "a.b".to_string(),
        })
        .unwrap();
    assert!(store.read("a.b").is_err());
    assert!(store
        .execute(AdminAction::Delete {
            path: "a.b".to_string(),
        })
        .is_err());
}

#[test]
fn test_duplicate_create_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_in(&dir);
    store.create_object("a").unwrap();
    assert!(store.create_object("a").is_err());
}

#[test]
fn test_print_all_lists_leaves() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_in(&dir);
    store.create_object("sg").unwrap();
    store.write_key("sg.pref_active", "2").unwrap();
    store.write_key("sg.pref_standby", "1").unwrap();

    let lines = store.execute(AdminAction::PrintAll).unwrap();
    assert_eq!(
        lines,
        vec![
            "sg.pref_active=2".to_string(),
            "sg.pref_standby=1".to_string()
        ]
    );
}

#[test]
fn test_bulk_load() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("bulk.txt");
    std::fs::write(
        &file,
        "# tunables\nsg.pref_active=2\nsg.limits.max_active=4\n\n",
    )
    .unwrap();

    let mut store = store_in(&dir);
    let lines = store
        .execute(AdminAction::BulkLoad { file: file.clone() })
        .unwrap();
    assert_eq!(lines, vec!["2 keys loaded".to_string()]);
    assert_eq!(store.read("sg.limits.max_active").unwrap(), "4");
}

#[test]
fn test_malformed_bulk_line_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_in(&dir);
    assert!(store.bulk_load("just-a-word\n").is_err());
}

#[test]
fn test_malformed_path_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    assert!(store.read("a..b").is_err());
}
